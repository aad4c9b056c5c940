//! Data model for the task hierarchy and its dependency edges.
//!
//! Features own functions, functions own tasks. Only tasks carry a status set
//! by users; function and feature statuses are derived by the cascade.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::fields::*;

pub type TaskId = u64;
pub type FunctionId = u64;
pub type FeatureId = u64;
pub type EdgeId = u64;

/// A unit of work owned by exactly one function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub function_id: FunctionId,
    pub status: Status,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub estimate: f64,
    #[serde(default)]
    pub actual: f64,
    pub created_at_utc: i64,
    pub updated_at_utc: i64,
}

impl Task {
    /// Apply a user status change, keeping `actual` in step with completion.
    ///
    /// Returns the previous status.
    pub fn transition(&mut self, status: Status, now_utc: i64) -> Status {
        let previous = self.status;
        if previous == status {
            return previous;
        }
        if status == Status::Done {
            self.actual = self.estimate;
        } else if previous == Status::Done {
            self.actual = 0.0;
        }
        self.status = status;
        self.updated_at_utc = now_utc;
        previous
    }
}

/// Payload for task creation. A deadline is mandatory here even though stored
/// tasks may lack one.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub function_id: FunctionId,
    pub deadline: NaiveDate,
    pub start_date: Option<NaiveDate>,
    pub estimate: f64,
    pub status: Status,
}

/// A function groups tasks; its status is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub name: String,
    pub feature_id: FeatureId,
    #[serde(default)]
    pub status: Status,
}

/// A feature groups functions; its status is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub name: String,
    pub project: Option<String>,
    #[serde(default)]
    pub status: Status,
}

/// `task_id` depends on `depends_on_task_id` with the given precedence type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub id: EdgeId,
    pub task_id: TaskId,
    pub depends_on_task_id: TaskId,
    pub dependency_type: DependencyType,
    #[serde(default)]
    pub lag_days: i64,
    #[serde(default = "default_mandatory")]
    pub is_mandatory: bool,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at_utc: i64,
}

fn default_mandatory() -> bool {
    true
}

impl DependencyEdge {
    /// Whether the edge touches the task at either end.
    pub fn touches(&self, task_id: TaskId) -> bool {
        self.task_id == task_id || self.depends_on_task_id == task_id
    }

    /// Same ordered pair and type.
    pub fn same_relation(&self, other: &NewEdge) -> bool {
        self.task_id == other.task_id
            && self.depends_on_task_id == other.depends_on_task_id
            && self.dependency_type == other.dependency_type
    }
}

/// A validated edge that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEdge {
    pub task_id: TaskId,
    pub depends_on_task_id: TaskId,
    pub dependency_type: DependencyType,
    pub lag_days: i64,
    pub is_mandatory: bool,
    pub notes: Option<String>,
}
