pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logging;

pub use self::config::{MapPolicy, QueueConfig, SyncboxConfig};
pub use diagnostics::*;
pub use error::*;
pub use logging::{init_test_tracing, init_tracing};
