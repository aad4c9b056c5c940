//! Adding and removing dependency edges.
//!
//! [`DependencyService`] validates a request, rejects cycles, stores the edge,
//! then checks the date and status constraints the edge implies. Violations
//! are warnings unless the request is strict, in which case the stored edge is
//! removed again and the call fails with the violations attached.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::activity::{self, Action, ActivityEntry};
use crate::config::EngineConfig;
use crate::constraint::{self, Violation};
use crate::error::{Error, Result};
use crate::fields::*;
use crate::graph::DependencyGraph;
use crate::store::Store;
use crate::task::*;

/// Largest lag or lead accepted on an edge, about a century.
pub const MAX_LAG_DAYS: i64 = 36_500;

/// Dependency request as it arrives from a caller, before validation.
///
/// Values are loosely typed so that numeric strings ("3") and booleans sent
/// as strings ("false") are accepted the same way a JSON payload would be.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDependency {
    #[serde(alias = "dependsOnTaskId")]
    pub depends_on_task_id: Option<Value>,
    #[serde(alias = "dependencyType", alias = "type")]
    pub dependency_type: Option<Value>,
    #[serde(alias = "lagDays", alias = "lag")]
    pub lag_days: Option<Value>,
    #[serde(alias = "isMandatory")]
    pub is_mandatory: Option<Value>,
    pub notes: Option<String>,
    pub strict: Option<bool>,
}

impl RawDependency {
    /// Convenience constructor for typed callers.
    pub fn new(depends_on_task_id: TaskId, dependency_type: DependencyType) -> Self {
        RawDependency {
            depends_on_task_id: Some(json!(depends_on_task_id)),
            dependency_type: Some(json!(dependency_type.code())),
            ..Default::default()
        }
    }

    pub fn lag(mut self, days: i64) -> Self {
        self.lag_days = Some(json!(days));
        self
    }

    pub fn mandatory(mut self, is_mandatory: bool) -> Self {
        self.is_mandatory = Some(json!(is_mandatory));
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    /// Validate into an edge for `task_id`. Missing type means FS, missing
    /// lag means 0, missing mandatory flag means true.
    ///
    /// Ids and lags may be numbers or numeric strings. The mandatory flag may
    /// be a JSON boolean or the string "true" / "false" in any case. Lags are
    /// limited to [`MAX_LAG_DAYS`] in either direction.
    pub fn validate(&self, task_id: TaskId) -> Result<NewEdge> {
        let depends_on_task_id = match present(&self.depends_on_task_id) {
            None => return Err(Error::invalid("depends_on_task_id", "is required")),
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| Error::invalid("depends_on_task_id", format!("'{n}' is not a task id")))?,
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::invalid("depends_on_task_id", format!("'{s}' is not a task id")))?,
            Some(other) => return Err(Error::invalid("depends_on_task_id", format!("'{other}' is not a task id"))),
        };

        let dependency_type = match present(&self.dependency_type) {
            None => DependencyType::default(),
            Some(Value::String(s)) => s.parse::<DependencyType>().map_err(|e| Error::invalid("dependency_type", e))?,
            Some(other) => return Err(Error::invalid("dependency_type", format!("'{other}' is not a dependency type"))),
        };

        let lag_days = match present(&self.lag_days) {
            None => 0,
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| Error::invalid("lag_days", format!("'{n}' is not a whole number of days")))?,
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| Error::invalid("lag_days", format!("'{s}' is not a whole number of days")))?,
            Some(other) => return Err(Error::invalid("lag_days", format!("'{other}' is not a whole number of days"))),
        };

        if !(-MAX_LAG_DAYS..=MAX_LAG_DAYS).contains(&lag_days) {
            return Err(Error::invalid(
                "lag_days",
                format!("{lag_days} is outside -{MAX_LAG_DAYS}..={MAX_LAG_DAYS} days"),
            ));
        }

        let is_mandatory = match present(&self.is_mandatory) {
            None => true,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => true,
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => false,
            Some(other) => return Err(Error::invalid("is_mandatory", format!("'{other}' is not a boolean"))),
        };

        if dependency_type == DependencyType::RelatesTo && task_id == depends_on_task_id {
            return Err(Error::invalid("depends_on_task_id", "a task cannot relate to itself"));
        }

        Ok(NewEdge {
            task_id,
            depends_on_task_id,
            dependency_type,
            lag_days,
            is_mandatory,
            notes: self.notes.as_ref().map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        })
    }
}

fn present(value: &Option<Value>) -> Option<&Value> {
    value.as_ref().filter(|v| !v.is_null())
}

/// A stored edge and the non-fatal warnings found while adding it.
#[derive(Debug, Clone)]
pub struct AddOutcome {
    pub edge: DependencyEdge,
    pub violations: Vec<Violation>,
    pub activity: Vec<ActivityEntry>,
}

/// Edges around a task, split by direction.
#[derive(Debug, Clone, Default)]
pub struct TaskDependencies {
    /// Edges where the task is the successor.
    pub depends_on: Vec<DependencyEdge>,
    /// Edges where the task is the predecessor.
    pub dependents: Vec<DependencyEdge>,
}

pub struct DependencyService<'a, S: Store> {
    store: &'a mut S,
    config: EngineConfig,
}

impl<'a, S: Store> DependencyService<'a, S> {
    pub fn new(store: &'a mut S, config: EngineConfig) -> Self {
        DependencyService { store, config }
    }

    fn load_task(&self, id: TaskId) -> Result<Task> {
        self.store.get_task(id)?.ok_or(Error::task_not_found(id))
    }

    /// Add `task_id` depends on `request.depends_on_task_id`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` and `NotFound` for bad input, `CycleDetected` when
    /// the edge would close a precedence loop, `AlreadyExists` for a duplicate,
    /// and `ConstraintViolation` when strict and the edge is inconsistent.
    /// Nothing is left in the edge store on any of these. `RollbackFailed`
    /// means a strict rejection could not remove the edge it had stored; the
    /// error names that edge.
    pub fn add_dependency(&mut self, task_id: TaskId, request: &RawDependency, actor: &str) -> Result<AddOutcome> {
        let candidate = request.validate(task_id)?;
        let strict = request.strict.unwrap_or(self.config.strict);
        let successor = self.load_task(candidate.task_id)?;
        let predecessor = self.load_task(candidate.depends_on_task_id)?;
        let mut trail = Vec::new();

        if candidate.dependency_type.is_constraining() {
            let edges = self.store.list_all_edges()?;
            if let Err(e) = DependencyGraph::from_edges(&edges).check_candidate(&candidate) {
                warn!(task_id, depends_on = candidate.depends_on_task_id, "rejected dependency: {e}");
                self.reject(&candidate, &e, actor, &mut trail);
                return Err(e);
            }
        }

        let edge = self.store.insert_edge(candidate.clone())?;
        let violations = constraint::evaluate(
            &successor,
            &predecessor,
            edge.dependency_type,
            edge.lag_days,
            edge.is_mandatory,
        );

        if !violations.is_empty() && strict {
            let err = match self.store.delete_edge(edge.id) {
                Ok(true) => {
                    debug!(edge_id = edge.id, "compensating delete after strict violation");
                    Error::ConstraintViolation { violations }
                }
                Ok(false) => {
                    error!(edge_id = edge.id, "compensating delete found no edge");
                    Error::RollbackFailed { edge_id: edge.id, violations, reason: "edge not found on delete".into() }
                }
                Err(e) => {
                    error!(edge_id = edge.id, error = %e, "compensating delete failed");
                    Error::RollbackFailed { edge_id: edge.id, violations, reason: e.to_string() }
                }
            };
            self.reject(&candidate, &err, actor, &mut trail);
            return Err(err);
        }

        info!(
            edge_id = edge.id,
            task_id,
            depends_on = edge.depends_on_task_id,
            dependency_type = %edge.dependency_type,
            warnings = violations.len(),
            "dependency added"
        );
        let entry = ActivityEntry::new(
            EntityKind::Task,
            task_id,
            Action::DependencyAdded,
            json!({
                "edge_id": edge.id,
                "depends_on_task_id": edge.depends_on_task_id,
                "dependency_type": edge.dependency_type,
                "lag_days": edge.lag_days,
                "is_mandatory": edge.is_mandatory,
            }),
            actor,
        );
        activity::record(&mut *self.store, &self.config, entry, &mut trail);

        if !violations.is_empty() {
            for v in &violations {
                warn!(edge_id = edge.id, "{}", v.message);
            }
            let entry = ActivityEntry::new(
                EntityKind::Task,
                task_id,
                Action::DependencyWarning,
                json!({ "edge_id": edge.id, "violations": violations }),
                actor,
            );
            activity::record(&mut *self.store, &self.config, entry, &mut trail);
        }

        Ok(AddOutcome { edge, violations, activity: trail })
    }

    fn reject(&mut self, candidate: &NewEdge, reason: &Error, actor: &str, trail: &mut Vec<ActivityEntry>) {
        let mut metadata = json!({
            "depends_on_task_id": candidate.depends_on_task_id,
            "dependency_type": candidate.dependency_type,
            "reason": reason.to_string(),
        });
        if let Error::ConstraintViolation { violations } | Error::RollbackFailed { violations, .. } = reason {
            metadata["violations"] = json!(violations);
        }
        let entry = ActivityEntry::new(EntityKind::Task, candidate.task_id, Action::DependencyRejected, metadata, actor);
        activity::record(&mut *self.store, &self.config, entry, trail);
    }

    /// Delete one edge. Task statuses are not affected.
    pub fn remove_dependency(&mut self, edge_id: EdgeId, actor: &str) -> Result<DependencyEdge> {
        let edge = self
            .store
            .get_edge(edge_id)?
            .ok_or(Error::NotFound { kind: EntityKind::Dependency, id: edge_id })?;
        self.store.delete_edge(edge_id)?;
        info!(edge_id, "dependency removed");
        let entry = ActivityEntry::new(
            EntityKind::Task,
            edge.task_id,
            Action::DependencyRemoved,
            json!({ "edge_id": edge.id, "depends_on_task_id": edge.depends_on_task_id }),
            actor,
        );
        activity::record(&mut *self.store, &self.config, entry, &mut Vec::new());
        Ok(edge)
    }

    /// Delete every edge where the task is either endpoint.
    pub fn remove_all_dependencies_for_task(&mut self, task_id: TaskId) -> Result<usize> {
        let removed = self.store.delete_edges_for_task(task_id)?;
        debug!(task_id, removed, "removed dependencies for task");
        Ok(removed)
    }

    pub fn dependencies_for(&self, task_id: TaskId) -> Result<TaskDependencies> {
        self.load_task(task_id)?;
        let (depends_on, dependents): (Vec<_>, Vec<_>) = self
            .store
            .list_edges(task_id)?
            .into_iter()
            .partition(|e| e.task_id == task_id);
        Ok(TaskDependencies { depends_on, dependents })
    }

    /// Re-evaluate every edge around a task against current data. Read-only.
    pub fn check_task(&self, task_id: TaskId) -> Result<Vec<Violation>> {
        self.load_task(task_id)?;
        let mut violations = Vec::new();
        for edge in self.store.list_edges(task_id)? {
            if !edge.dependency_type.is_constraining() {
                continue;
            }
            let (Some(successor), Some(predecessor)) =
                (self.store.get_task(edge.task_id)?, self.store.get_task(edge.depends_on_task_id)?)
            else {
                warn!(edge_id = edge.id, "dependency points at a missing task");
                continue;
            };
            violations.extend(constraint::evaluate(
                &successor,
                &predecessor,
                edge.dependency_type,
                edge.lag_days,
                edge.is_mandatory,
            ));
        }
        Ok(violations)
    }
}
