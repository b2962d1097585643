//! Key-value store backends.

pub mod moka;
#[cfg(feature = "redis")]
pub mod redis;

#[doc(inline)]
pub use self::moka::MokaStore;
#[cfg(feature = "redis")]
#[doc(inline)]
pub use self::redis::RedisStore;
