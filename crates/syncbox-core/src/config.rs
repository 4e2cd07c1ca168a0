use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use config as cfg;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Timing knobs for `WaitableQueue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct QueueConfig {
    /// Upper bound for a single `try_wait_item` call
    pub wait_timeout_ms: u64,
    /// Upper bound for `wait_until_empty`
    pub drain_timeout_ms: u64,
    /// First sleep interval while polling for a drain
    pub drain_backoff_initial_ms: u64,
    /// Cap on the doubling drain sleep
    pub drain_backoff_max_ms: u64,
}

impl QueueConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn drain_backoff_initial(&self) -> Duration {
        Duration::from_millis(self.drain_backoff_initial_ms)
    }

    pub fn drain_backoff_max(&self) -> Duration {
        Duration::from_millis(self.drain_backoff_max_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.wait_timeout_ms > 0,
            "Queue wait timeout must be greater than 0"
        );

        anyhow::ensure!(
            self.drain_timeout_ms > 0,
            "Queue drain timeout must be greater than 0"
        );

        anyhow::ensure!(
            self.drain_backoff_initial_ms > 0,
            "Initial drain backoff must be greater than 0"
        );

        anyhow::ensure!(
            self.drain_backoff_initial_ms <= self.drain_backoff_max_ms,
            "Initial drain backoff must not exceed the maximum backoff"
        );

        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 100,
            drain_timeout_ms: 1500,
            drain_backoff_initial_ms: 1,
            drain_backoff_max_ms: 64,
        }
    }
}

/// Collision policy for `ConcurrentMap::add`.
///
/// `fail_on_collision` wins over `replace_existing`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MapPolicy {
    pub replace_existing: bool,
    pub fail_on_collision: bool,
}

impl MapPolicy {
    pub fn replacing() -> Self {
        Self {
            replace_existing: true,
            fail_on_collision: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            replace_existing: false,
            fail_on_collision: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SyncboxConfig {
    pub queue: QueueConfig,
    pub map: MapPolicy,
}

impl SyncboxConfig {
    /// Load configuration from `dir`.
    ///
    /// Sources, later ones overriding earlier ones:
    /// 1. `default.toml`
    /// 2. `local.toml`
    /// 3. environment variables with the `SYNCBOX__` prefix
    ///    (e.g. `SYNCBOX__QUEUE__WAIT_TIMEOUT_MS=250`)
    ///
    /// Missing files are skipped.
    pub fn load_from_sources(dir: &Path) -> crate::Result<Self> {
        let settings: SyncboxConfig = cfg::Config::builder()
            .add_source(cfg::File::from(dir.join("default.toml")).required(false))
            .add_source(cfg::File::from(dir.join("local.toml")).required(false))
            .add_source(
                cfg::Environment::with_prefix("SYNCBOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        debug!("Loaded syncbox configuration from {:?}: {:?}", dir, settings);
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.queue.validate().context("validating queue configuration")
    }
}
