//! # taskflow-cache
//!
//! Cache-aside resource cache with a static per-resource TTL policy table, and the TaskFlow task and analytics
//! controllers built on top of it.
//!
//! # The Basics
//!
//! The crate is designed for the following use case:
//!
//! - Per-user resources that are expensive to compute from a relational store: aggregates, listings.
//! - A shared key-value store (Redis, or an in-process [moka](https://crates.io/crates/moka) cache) in front of it.
//! - Correctness bounded by "fresh after an explicit invalidation or after the TTL", not by any coherency protocol.
//!
//! The cache operates on the following principles:
//!
//! - Every cached resource is registered in a [`PolicyTable`] under a (namespace, resource) pair with its TTL and,
//!   optionally, a set of variants. Using an unregistered resource is a programming error, there is no default TTL.
//! - Keys are structured. A [`CacheKey`] always carries the owner and serializes as
//!   `<namespace>:<resource>:<owner>[:<variant>]`, e.g. `analytics:trends:42:30d`.
//! - Reads go through [`ResourceCache::fetch`]: a hit is served from the store; a miss calls the loader and stores its
//!   result with the policy TTL.
//! - Writes go to the source first and then call one of the `invalidate*` methods for every key whose value they may
//!   have changed.
//! - The cache never fails a request because of itself. An unreachable store, a timeout, a corrupt entry or a failed
//!   write degrade the request to plain pass-through and are reported to the [`Observer`].
//!
//! # Consistency
//!
//! Get-miss-then-set is not atomic and there is no locking. A fetch which has loaded its value before a concurrent
//! mutation and writes it after the mutation's invalidation leaves a stale entry behind. The window is bounded by the
//! resource TTL. Callers needing more than that must not cache the resource.
//!
//! # Features
//!
//! - `taskflow` (default): the [`taskflow`] controllers over SeaORM. Pick a driver with `pg` or `sqlite`.
//! - `redis`: the [`RedisStore`](store::RedisStore).
//! - `test`: the [`test`] module with fakes for the store and the observer.
//! - `cli`: the `taskflow-cache` operator binary.
//! - `tracing`: `tracing-subscriber` for the binary.

pub mod cache;
pub mod error;
pub mod key;
pub mod policy;
pub mod store;
#[cfg(feature = "taskflow")]
pub mod taskflow;
pub mod traits;
pub mod types;

#[doc(inline)]
pub use cache::ResourceCache;
#[doc(inline)]
pub use error::CacheError;
#[doc(inline)]
pub use key::CacheKey;
#[doc(inline)]
pub use policy::CachePolicy;
#[doc(inline)]
pub use policy::PolicyTable;
#[doc(inline)]
pub use traits::KeyValueStore;
#[doc(inline)]
pub use traits::Observer;

pub mod prelude {
    pub use crate::cache::ResourceCache;
    pub use crate::error::CacheError;
    pub use crate::error::StoreError;
    pub use crate::key::CacheKey;
    pub use crate::key::OwnerId;
    pub use crate::policy::CachePolicy;
    pub use crate::policy::PolicyTable;
    pub use crate::store::MokaStore;
    #[cfg(feature = "redis")]
    pub use crate::store::RedisStore;
    pub use crate::traits::KeyValueStore;
    pub use crate::traits::Observer;
    pub use crate::traits::TracingObserver;
    pub use crate::types::*;
}
