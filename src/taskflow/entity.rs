pub mod task;

pub use task::Model as Task;
pub use task::TaskPriority;
pub use task::TaskStatus;
