//! Primary store: key-value port, Redis adapter and flattened aggregate persistence

pub mod aggregate;
pub mod etag;
pub mod redis;
pub mod traits;

pub use aggregate::{AggregateStore, PlanPage, StoredPlan};
pub use etag::ETag;
pub use self::redis::RedisStore;
pub use traits::KeyValueStore;

#[cfg(test)]
pub(crate) mod mock;
