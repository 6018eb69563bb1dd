//! Redis-backed implementations of the `dispatch-core` storage traits.
//!
//! `RedisJobQueue` and `RedisHeartbeatRegistry` share one
//! [`redis::aio::ConnectionManager`] (cheap to clone, reconnects under the
//! hood) and speak the key layout documented in `keys.rs`. All multi-key
//! state transitions run as a single Lua script (`scripts.rs`) so a `Job`
//! never observes a torn write.

mod error;
mod job_fields;
mod keys;
mod queue;
mod registry;
mod scripts;

pub use queue::RedisJobQueue;
pub use registry::RedisHeartbeatRegistry;
