//! Date and status constraints implied by a dependency edge.
//!
//! Every check is advisory: a [`Violation`] describes the inconsistency and
//! proposes a corrective value, but only a strict caller turns it into a
//! rejection.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::fields::*;
use crate::task::Task;

/// An inconsistency between two tasks linked by a dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub dependency_type: DependencyType,
    pub successor_id: u64,
    pub predecessor_id: u64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_deadline: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predecessor_status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Which date of a task a boundary refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Start,
    Deadline,
}

impl Boundary {
    fn of(self, task: &Task) -> Option<NaiveDate> {
        match self {
            Boundary::Start => task.start_date,
            Boundary::Deadline => task.deadline,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Boundary::Start => "start date",
            Boundary::Deadline => "deadline",
        }
    }
}

/// (successor boundary, predecessor boundary) compared by each type.
fn boundaries(dependency_type: DependencyType) -> Option<(Boundary, Boundary)> {
    match dependency_type {
        DependencyType::FinishToStart => Some((Boundary::Start, Boundary::Deadline)),
        DependencyType::FinishToFinish => Some((Boundary::Deadline, Boundary::Deadline)),
        DependencyType::StartToStart => Some((Boundary::Start, Boundary::Start)),
        DependencyType::StartToFinish => Some((Boundary::Deadline, Boundary::Start)),
        DependencyType::RelatesTo => None,
    }
}

/// Evaluate the edge `successor` depends on `predecessor`.
///
/// Returns every violation found; an empty vector means the current data is
/// consistent with the edge. Date checks only apply when both dates are set.
pub fn evaluate(
    successor: &Task,
    predecessor: &Task,
    dependency_type: DependencyType,
    lag_days: i64,
    is_mandatory: bool,
) -> Vec<Violation> {
    let severity = if is_mandatory { Severity::Warning } else { Severity::Info };
    let mut violations = Vec::new();

    if let Some(v) = date_violation(successor, predecessor, dependency_type, lag_days, severity) {
        violations.push(v);
    }
    if let Some(v) = status_violation(successor, predecessor, dependency_type, severity) {
        violations.push(v);
    }
    violations
}

fn date_violation(
    successor: &Task,
    predecessor: &Task,
    dependency_type: DependencyType,
    lag_days: i64,
    severity: Severity,
) -> Option<Violation> {
    let (succ_boundary, pred_boundary) = boundaries(dependency_type)?;
    let pred_date = pred_boundary.of(predecessor)?;
    let succ_date = succ_boundary.of(successor)?;
    // Past the calendar range a lag can never be met and a lead always is.
    let required = Duration::try_days(lag_days)
        .and_then(|lag| pred_date.checked_add_signed(lag))
        .unwrap_or(if lag_days > 0 { NaiveDate::MAX } else { NaiveDate::MIN });

    if succ_date >= required {
        return None;
    }

    let lag_note = match lag_days {
        0 => String::new(),
        n if n > 0 => format!(" + {n}d lag"),
        n => format!(" - {}d lead", -n),
    };
    let message = format!(
        "{dependency_type}: task {} {} {} is before task {} {} {}{} (needs {})",
        successor.id,
        succ_boundary.label(),
        succ_date,
        predecessor.id,
        pred_boundary.label(),
        pred_date,
        lag_note,
        required,
    );
    let suggestion = format!("Move task {} {} to {} or later", successor.id, succ_boundary.label(), required);

    let (required_start_date, required_deadline) = match succ_boundary {
        Boundary::Start => (Some(required), None),
        Boundary::Deadline => (None, Some(required)),
    };

    Some(Violation {
        kind: ViolationKind::DateViolation,
        severity,
        dependency_type,
        successor_id: successor.id,
        predecessor_id: predecessor.id,
        message,
        required_start_date,
        required_deadline,
        current_status: None,
        predecessor_status: None,
        suggestion: Some(suggestion),
    })
}

fn status_violation(
    successor: &Task,
    predecessor: &Task,
    dependency_type: DependencyType,
    severity: Severity,
) -> Option<Violation> {
    if !dependency_type.requires_predecessor_finish() {
        return None;
    }
    if successor.status == Status::ToDo || predecessor.status == Status::Done {
        return None;
    }
    Some(Violation {
        kind: ViolationKind::StatusViolation,
        severity,
        dependency_type,
        successor_id: successor.id,
        predecessor_id: predecessor.id,
        message: format!(
            "{dependency_type}: task {} is {} while task {} it depends on is {}",
            successor.id, successor.status, predecessor.id, predecessor.status
        ),
        required_start_date: None,
        required_deadline: None,
        current_status: Some(successor.status),
        predecessor_status: Some(predecessor.status),
        suggestion: Some(format!(
            "Finish task {} first, or move task {} back to ToDo",
            predecessor.id, successor.id
        )),
    })
}
