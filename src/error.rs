//! Error taxonomy for the dependency engine, with fix suggestions.

use thiserror::Error;

use crate::constraint::Violation;
use crate::fields::{DependencyType, EntityKind};
use crate::task::{EdgeId, TaskId};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that provide a corrective hint for the caller.
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<String>;
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid {field}: {message}")]
    InvalidArgument { field: &'static str, message: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: u64 },

    #[error("Dependency {task_id} -> {depends_on_task_id} would create a cycle: {}", format_path(.path))]
    CycleDetected {
        task_id: TaskId,
        depends_on_task_id: TaskId,
        /// Existing chain that closes the loop, starting at the new predecessor.
        path: Vec<TaskId>,
    },

    #[error("Task {task_id} already depends on task {depends_on_task_id} ({dependency_type})")]
    AlreadyExists {
        task_id: TaskId,
        depends_on_task_id: TaskId,
        dependency_type: DependencyType,
    },

    #[error("Dependency rejected in strict mode: {}", summarise(.violations))]
    ConstraintViolation { violations: Vec<Violation> },

    /// Strict rejection whose compensating delete did not remove the edge.
    #[error("Dependency {edge_id} violates constraints but could not be removed: {reason}")]
    RollbackFailed {
        edge_id: EdgeId,
        violations: Vec<Violation>,
        reason: String,
    },

    #[error("Cascade degraded at {kind} {id}: {reason}")]
    Degraded { kind: EntityKind, id: u64, reason: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidArgument { field, message: message.into() }
    }

    pub fn task_not_found(id: TaskId) -> Self {
        Error::NotFound { kind: EntityKind::Task, id }
    }
}

fn format_path(path: &[TaskId]) -> String {
    path.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(" -> ")
}

fn summarise(violations: &[Violation]) -> String {
    violations.iter().map(|v| v.message.as_str()).collect::<Vec<_>>().join("; ")
}

impl FixSuggestion for Error {
    fn fix_suggestion(&self) -> Option<String> {
        match self {
            Error::InvalidArgument { field: "dependency_type", .. } => {
                Some("Use one of FS, FF, SS, SF or relates_to".into())
            }
            Error::InvalidArgument { field: "lag_days", .. } => {
                Some("Pass the lag as a whole number of days, e.g. 2 or -1".into())
            }
            Error::InvalidArgument { field: "is_mandatory", .. } => Some("Pass true or false".into()),
            Error::InvalidArgument { .. } => None,
            Error::NotFound { kind, .. } => Some(format!("Check the {kind} id with `pm list`")),
            Error::CycleDetected { .. } => {
                Some("Remove one of the existing dependencies in the chain, or use relates_to".into())
            }
            Error::AlreadyExists { .. } => Some("Remove the existing dependency first to change it".into()),
            Error::ConstraintViolation { violations } => {
                let fixes: Vec<&str> = violations.iter().filter_map(|v| v.suggestion.as_deref()).collect();
                if fixes.is_empty() {
                    None
                } else {
                    Some(fixes.join("; "))
                }
            }
            Error::RollbackFailed { edge_id, .. } => Some(format!("Remove it with `pm dep rm {edge_id}`")),
            Error::Degraded { .. } => Some("Re-run the status change; derived statuses are recomputed".into()),
            Error::Store(_) => None,
            Error::Io(_) => Some("Check file path and permissions".into()),
            Error::Json(_) => Some("The database file is not valid JSON; restore it from a backup".into()),
        }
    }
}
