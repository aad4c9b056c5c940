//! Audit trail entries emitted by the engine.
//!
//! Every decision the engine takes (an edge accepted, rejected or kept with
//! warnings, a derived status recomputed, a cascade level that could not be
//! persisted) becomes an [`ActivityEntry`]. Entries are handed to an
//! [`ActivitySink`](crate::store::ActivitySink) and also returned to the caller.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::config::EngineConfig;
use crate::fields::EntityKind;
use crate::store::ActivitySink;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    StatusChanged,
    DependencyAdded,
    DependencyWarning,
    DependencyRejected,
    DependencyRemoved,
    TaskDeleted,
    CascadeDegraded,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Action::StatusChanged => "status_changed",
            Action::DependencyAdded => "dependency_added",
            Action::DependencyWarning => "dependency_warning",
            Action::DependencyRejected => "dependency_rejected",
            Action::DependencyRemoved => "dependency_removed",
            Action::TaskDeleted => "task_deleted",
            Action::CascadeDegraded => "cascade_degraded",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub entity_type: EntityKind,
    pub entity_id: u64,
    pub action: Action,
    #[serde(default)]
    pub metadata: Value,
    pub actor_id: String,
    pub at_utc: i64,
}

impl ActivityEntry {
    pub fn new(entity_type: EntityKind, entity_id: u64, action: Action, metadata: Value, actor_id: &str) -> Self {
        ActivityEntry {
            entity_type,
            entity_id,
            action,
            metadata,
            actor_id: actor_id.to_string(),
            at_utc: Utc::now().timestamp(),
        }
    }
}

/// Hand an entry to the sink if recording is enabled. Sink failures are
/// logged and swallowed; the entry is still appended to `trail`.
pub fn record<S: ActivitySink + ?Sized>(
    sink: &mut S,
    config: &EngineConfig,
    entry: ActivityEntry,
    trail: &mut Vec<ActivityEntry>,
) {
    if config.record_activity {
        if let Err(e) = sink.record_activity(&entry) {
            warn!(
                entity = %entry.entity_type,
                id = entry.entity_id,
                action = %entry.action,
                error = %e,
                "failed to record activity"
            );
        }
    }
    trail.push(entry);
}
