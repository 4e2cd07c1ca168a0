//! Lock-based concurrent containers for embedding in multi-threaded services
//!
//! - `waitable`: Unbounded FIFO queue with timeout-bounded blocking consumers
//! - `rw_map`: Reader-writer locked hash map of shared handles with a collision policy

pub mod rw_map;
pub mod waitable;

pub use rw_map::{ConcurrentMap, Handle};
pub use syncbox_core::{Diagnostics, MapPolicy, MapSnapshot, QueueConfig, QueueSnapshot};
pub use waitable::WaitableQueue;
