use serde::{Deserialize, Serialize};

pub const QUEUE_TYPVER: &str = "WaitableQueue/1.0.0";
pub const MAP_TYPVER: &str = "ConcurrentMap/1.0.0";

/// Point-in-time counters of a `WaitableQueue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    #[serde(rename = "_typver")]
    pub typver: String,
    pub adds: u64,
    pub removes: u64,
    pub size: usize,
}

/// Point-in-time counters and policy of a `ConcurrentMap`.
///
/// Policy keys keep their historical spelling so existing dashboards keep parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSnapshot {
    #[serde(rename = "_typver")]
    pub typver: String,
    pub adds: u64,
    pub removes: u64,
    #[serde(rename = "ReplaceExisting")]
    pub replace_existing: bool,
    #[serde(rename = "FailOnCollission")]
    pub fail_on_collision: bool,
    pub size: usize,
}

/// Pull-style diagnostics for logging or metrics collaborators.
///
/// Implementations must only take shared access to produce a snapshot.
pub trait Diagnostics {
    type Snapshot: Serialize;

    fn snapshot(&self) -> Self::Snapshot;

    fn to_json(&self) -> crate::Result<serde_json::Value> {
        Ok(serde_json::to_value(self.snapshot())?)
    }
}
