//! Bottom-up recomputation of derived statuses.
//!
//! When a task changes status, [`CascadeCoordinator`] recomputes the owning
//! function from all of its tasks, then the owning feature from all of its
//! functions. Each level is settled independently: a level that cannot be read
//! or written is reported as degraded and logged, while levels already written
//! stay written. Recomputing an already-correct status writes nothing and logs
//! nothing, so the cascade can be re-run at any time.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::activity::{self, Action, ActivityEntry};
use crate::config::EngineConfig;
use crate::dependency::DependencyService;
use crate::error::{Error, Result};
use crate::fields::*;
use crate::status;
use crate::store::{EntityRef, Store};
use crate::task::*;

/// Result of settling one level of the cascade.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelOutcome {
    Unchanged { status: Status },
    Changed { from: Status, to: Status },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelReport {
    pub kind: EntityKind,
    pub id: u64,
    pub outcome: LevelOutcome,
}

/// What a cascade run did, level by level.
#[derive(Debug, Default)]
pub struct CascadeReport {
    pub function: Option<LevelReport>,
    pub feature: Option<LevelReport>,
    /// One `Degraded` error per level that could not be settled.
    pub degraded: Vec<Error>,
    pub activity: Vec<ActivityEntry>,
}

impl CascadeReport {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

pub struct CascadeCoordinator<'a, S: Store> {
    store: &'a mut S,
    config: EngineConfig,
}

impl<'a, S: Store> CascadeCoordinator<'a, S> {
    pub fn new(store: &'a mut S, config: EngineConfig) -> Self {
        CascadeCoordinator { store, config }
    }

    /// Recompute the task's function and feature after its status changed.
    ///
    /// # Errors
    ///
    /// Only when the task itself cannot be loaded. Failures at the function
    /// or feature level are reported in [`CascadeReport::degraded`].
    pub fn on_task_status_changed(&mut self, task_id: TaskId, actor: &str) -> Result<CascadeReport> {
        let task = self.store.get_task(task_id)?.ok_or_else(|| Error::task_not_found(task_id))?;
        let mut report = CascadeReport::default();
        self.cascade_from_function(task.function_id, json!({ "task_id": task_id }), actor, &mut report);
        Ok(report)
    }

    /// Recompute a function and its feature, e.g. after a task was removed.
    pub fn on_function_status_changed(&mut self, function_id: FunctionId, actor: &str) -> CascadeReport {
        let mut report = CascadeReport::default();
        self.cascade_from_function(function_id, json!({ "function_id": function_id }), actor, &mut report);
        report
    }

    fn cascade_from_function(
        &mut self,
        function_id: FunctionId,
        trigger: serde_json::Value,
        actor: &str,
        report: &mut CascadeReport,
    ) {
        let function = match self.store.get_function(function_id) {
            Ok(Some(f)) => f,
            Ok(None) => {
                let err = Error::NotFound { kind: EntityKind::Function, id: function_id };
                report.function = Some(self.degrade(EntityKind::Function, function_id, &err, actor, report));
                return;
            }
            Err(e) => {
                report.function = Some(self.degrade(EntityKind::Function, function_id, &e, actor, report));
                return;
            }
        };

        let children = self
            .store
            .get_sibling_tasks(function.id)
            .map(|tasks| tasks.iter().map(|t| t.status).collect::<Vec<_>>());
        let outcome = self.settle(EntityKind::Function, function.id, function.status, children, &trigger, actor, report);
        report.function = Some(outcome);

        let feature = match self.store.get_feature(function.feature_id) {
            Ok(Some(f)) => f,
            Ok(None) => {
                let err = Error::NotFound { kind: EntityKind::Feature, id: function.feature_id };
                report.feature = Some(self.degrade(EntityKind::Feature, function.feature_id, &err, actor, report));
                return;
            }
            Err(e) => {
                report.feature = Some(self.degrade(EntityKind::Feature, function.feature_id, &e, actor, report));
                return;
            }
        };

        let children = self
            .store
            .get_sibling_functions(feature.id)
            .map(|functions| functions.iter().map(|f| f.status).collect::<Vec<_>>());
        let trigger = json!({ "function_id": function.id });
        let outcome = self.settle(EntityKind::Feature, feature.id, feature.status, children, &trigger, actor, report);
        report.feature = Some(outcome);
    }

    /// Aggregate, write if changed, and log. Never fails.
    #[allow(clippy::too_many_arguments)]
    fn settle(
        &mut self,
        kind: EntityKind,
        id: u64,
        current: Status,
        children: Result<Vec<Status>>,
        trigger: &serde_json::Value,
        actor: &str,
        report: &mut CascadeReport,
    ) -> LevelReport {
        let result = children.and_then(|statuses| {
            let next = status::aggregate(statuses);
            if next == current {
                return Ok(LevelOutcome::Unchanged { status: current });
            }
            self.store.update_status(entity_ref(kind, id), next)?;
            Ok(LevelOutcome::Changed { from: current, to: next })
        });

        match result {
            Ok(LevelOutcome::Changed { from, to }) => {
                info!(%kind, id, %from, %to, "derived status changed");
                let entry = ActivityEntry::new(
                    kind,
                    id,
                    Action::StatusChanged,
                    json!({ "from": from, "to": to, "derived": true, "triggered_by": trigger }),
                    actor,
                );
                activity::record(&mut *self.store, &self.config, entry, &mut report.activity);
                LevelReport { kind, id, outcome: LevelOutcome::Changed { from, to } }
            }
            Ok(outcome) => {
                debug!(%kind, id, "derived status already up to date");
                LevelReport { kind, id, outcome }
            }
            Err(e) => self.degrade(kind, id, &e, actor, report),
        }
    }

    fn degrade(&mut self, kind: EntityKind, id: u64, cause: &Error, actor: &str, report: &mut CascadeReport) -> LevelReport {
        let reason = cause.to_string();
        warn!(%kind, id, %reason, "cascade level degraded");
        let entry = ActivityEntry::new(kind, id, Action::CascadeDegraded, json!({ "reason": reason }), actor);
        activity::record(&mut *self.store, &self.config, entry, &mut report.activity);
        report.degraded.push(Error::Degraded { kind, id, reason: reason.clone() });
        LevelReport { kind, id, outcome: LevelOutcome::Failed { reason } }
    }
}

fn entity_ref(kind: EntityKind, id: u64) -> EntityRef {
    match kind {
        EntityKind::Feature => EntityRef::Feature(id),
        _ => EntityRef::Function(id),
    }
}

/// A direct task status change and the cascade it triggered.
#[derive(Debug)]
pub struct StatusChange {
    pub task: Task,
    pub previous: Status,
    pub cascade: CascadeReport,
    pub activity: Vec<ActivityEntry>,
}

/// User-facing task operations that feed the cascade.
pub struct TaskStatusService<'a, S: Store> {
    store: &'a mut S,
    config: EngineConfig,
}

impl<'a, S: Store> TaskStatusService<'a, S> {
    pub fn new(store: &'a mut S, config: EngineConfig) -> Self {
        TaskStatusService { store, config }
    }

    /// Set a task's status, then recompute its function and feature.
    ///
    /// `actual` follows completion: it takes the estimate on entering Done and
    /// drops to zero on leaving Done. Setting the current status again writes
    /// nothing for the task but still re-runs the cascade.
    pub fn change_task_status(&mut self, task_id: TaskId, status: Status, actor: &str) -> Result<StatusChange> {
        let mut task = self.store.get_task(task_id)?.ok_or_else(|| Error::task_not_found(task_id))?;
        let mut trail = Vec::new();
        let previous = task.transition(status, Utc::now().timestamp());

        if previous != status {
            self.store.save_task(&task)?;
            info!(task_id, from = %previous, to = %status, "task status changed");
            let entry = ActivityEntry::new(
                EntityKind::Task,
                task_id,
                Action::StatusChanged,
                json!({ "from": previous, "to": status, "actual": task.actual }),
                actor,
            );
            activity::record(&mut *self.store, &self.config, entry, &mut trail);
        }

        let cascade = CascadeCoordinator::new(&mut *self.store, self.config.clone()).on_task_status_changed(task_id, actor)?;
        Ok(StatusChange { task, previous, cascade, activity: trail })
    }

    /// Delete a task with every dependency that touches it, then recompute
    /// the function it belonged to.
    ///
    /// The task goes first, so a failed delete leaves its edges intact. If the
    /// edges cannot be removed afterwards the report is degraded and names
    /// the task.
    pub fn delete_task(&mut self, task_id: TaskId, actor: &str) -> Result<CascadeReport> {
        let task = self.store.delete_task(task_id)?.ok_or_else(|| Error::task_not_found(task_id))?;
        let mut degraded = Vec::new();
        let edges_removed =
            match DependencyService::new(&mut *self.store, self.config.clone()).remove_all_dependencies_for_task(task_id) {
                Ok(n) => n,
                Err(e) => {
                    error!(task_id, error = %e, "dependencies of deleted task were not removed");
                    degraded.push(Error::Degraded { kind: EntityKind::Dependency, id: task_id, reason: e.to_string() });
                    0
                }
            };
        info!(task_id, edges_removed, "task deleted");

        let mut trail = Vec::new();
        let entry = ActivityEntry::new(
            EntityKind::Task,
            task_id,
            Action::TaskDeleted,
            json!({ "title": task.title, "function_id": task.function_id, "edges_removed": edges_removed }),
            actor,
        );
        activity::record(&mut *self.store, &self.config, entry, &mut trail);

        let mut report = CascadeCoordinator::new(&mut *self.store, self.config.clone())
            .on_function_status_changed(task.function_id, actor);
        trail.append(&mut report.activity);
        report.activity = trail;
        degraded.append(&mut report.degraded);
        report.degraded = degraded;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{DependencyService, RawDependency};
    use crate::store::EntityRepository;
    use crate::testing::{Fixture, FlakyStore};

    fn function_status<S: Store>(store: &S, id: FunctionId) -> Status {
        store.get_function(id).unwrap().unwrap().status
    }

    fn feature_status<S: Store>(store: &S, id: FeatureId) -> Status {
        store.get_feature(id).unwrap().unwrap().status
    }

    fn set<S: Store>(store: &mut S, task_id: TaskId, status: Status) -> StatusChange {
        TaskStatusService::new(store, EngineConfig::default())
            .change_task_status(task_id, status, "ana")
            .unwrap()
    }

    #[test]
    fn test_end_to_end_two_task_function() {
        let mut fx = Fixture::new();
        let b = fx.task("B", None, "2024-01-10");
        let a = fx.task("A", Some("2024-01-11"), "2024-01-20");
        DependencyService::new(&mut fx.db, EngineConfig::default())
            .add_dependency(a, &RawDependency::new(b, DependencyType::FinishToStart).lag(0), "ana")
            .unwrap();
        let function = fx.function;

        assert_eq!(function_status(&fx.db, function), Status::ToDo);

        set(&mut fx.db, b, Status::Doing);
        assert_eq!(function_status(&fx.db, function), Status::Doing);

        set(&mut fx.db, b, Status::Done);
        assert_eq!(function_status(&fx.db, function), Status::Doing);

        set(&mut fx.db, a, Status::Done);
        assert_eq!(function_status(&fx.db, function), Status::Done);
        assert_eq!(feature_status(&fx.db, fx.feature), Status::Done);
    }

    #[test]
    fn test_cascade_is_idempotent() {
        let mut fx = Fixture::new();
        let a = fx.task("a", None, "2024-01-10");
        fx.task("b", None, "2024-01-10");
        fx.db.tasks.iter_mut().find(|t| t.id == a).unwrap().status = Status::Doing;

        let mut coordinator = CascadeCoordinator::new(&mut fx.db, EngineConfig::default());
        let first = coordinator.on_task_status_changed(a, "ana").unwrap();
        let second = coordinator.on_task_status_changed(a, "ana").unwrap();

        assert_eq!(first.activity.len(), 2);
        assert!(second.activity.is_empty());
        assert_eq!(
            second.function.unwrap().outcome,
            LevelOutcome::Unchanged { status: Status::Doing }
        );
        assert_eq!(second.feature.unwrap().outcome, LevelOutcome::Unchanged { status: Status::Doing });
        let logged = fx.db.activity.iter().filter(|e| e.action == Action::StatusChanged).count();
        assert_eq!(logged, 2);
    }

    #[test]
    fn test_feature_aggregates_functions() {
        let mut fx = Fixture::new();
        let other = fx.add_function("Login");
        let a = fx.task("a", None, "2024-01-10");
        let b = fx.task_in(other, "b", None, "2024-01-10");

        set(&mut fx.db, a, Status::Done);
        assert_eq!(function_status(&fx.db, fx.function), Status::Done);
        assert_eq!(function_status(&fx.db, other), Status::ToDo);
        assert_eq!(feature_status(&fx.db, fx.feature), Status::Doing);

        let change = set(&mut fx.db, b, Status::Done);
        assert_eq!(
            change.cascade.feature.unwrap().outcome,
            LevelOutcome::Changed { from: Status::Doing, to: Status::Done }
        );
    }

    #[test]
    fn test_actual_follows_done() {
        let mut fx = Fixture::new();
        let a = fx.task("a", None, "2024-01-10");
        let change = set(&mut fx.db, a, Status::Done);
        assert_eq!(change.previous, Status::ToDo);
        assert_eq!(fx.db.task(a).unwrap().actual, 4.0);

        set(&mut fx.db, a, Status::Doing);
        assert_eq!(fx.db.task(a).unwrap().actual, 0.0);
    }

    #[test]
    fn test_repeated_status_logs_nothing_new() {
        let mut fx = Fixture::new();
        let a = fx.task("a", None, "2024-01-10");
        set(&mut fx.db, a, Status::Doing);
        let logged = fx.db.activity.len();
        let change = set(&mut fx.db, a, Status::Doing);
        assert!(change.activity.is_empty());
        assert!(change.cascade.activity.is_empty());
        assert_eq!(fx.db.activity.len(), logged);
    }

    #[test]
    fn test_function_write_failure_degrades_without_rollback() {
        let mut fx = Fixture::new();
        let a = fx.task("a", None, "2024-01-10");
        let function = fx.function;
        let mut store = FlakyStore::new(fx.db).fail_status_write(EntityRef::Function(function));

        let change = set(&mut store, a, Status::Doing);
        assert_eq!(store.get_task(a).unwrap().unwrap().status, Status::Doing);
        assert_eq!(function_status(&store, function), Status::ToDo);
        assert!(change.cascade.is_degraded());
        assert!(matches!(
            change.cascade.degraded[0],
            Error::Degraded { kind: EntityKind::Function, .. }
        ));
        assert!(matches!(change.cascade.function.unwrap().outcome, LevelOutcome::Failed { .. }));
        // The feature still sees the stale function status and stays put.
        assert_eq!(
            change.cascade.feature.unwrap().outcome,
            LevelOutcome::Unchanged { status: Status::ToDo }
        );

        // Once the store recovers, the next status change repairs the projection.
        store.failing_status_writes.clear();
        let b = store.inner.add_task(crate::task::NewTask {
            title: "b".into(),
            function_id: function,
            deadline: crate::testing::date("2024-01-10"),
            start_date: None,
            estimate: 1.0,
            status: Status::ToDo,
        });
        set(&mut store, b.unwrap(), Status::Doing);
        assert_eq!(function_status(&store, function), Status::Doing);
        assert_eq!(feature_status(&store, fx.feature), Status::Doing);
    }

    #[test]
    fn test_feature_write_failure_keeps_function_level() {
        let mut fx = Fixture::new();
        let a = fx.task("a", None, "2024-01-10");
        let feature = fx.feature;
        let mut store = FlakyStore::new(fx.db).fail_status_write(EntityRef::Feature(feature));

        let change = set(&mut store, a, Status::Done);
        assert_eq!(function_status(&store, fx.function), Status::Done);
        assert_eq!(feature_status(&store, feature), Status::ToDo);
        assert_eq!(change.cascade.degraded.len(), 1);
        assert!(store.inner.activity.iter().any(|e| e.action == Action::CascadeDegraded));
    }

    #[test]
    fn test_sibling_read_failure_degrades_function() {
        let mut fx = Fixture::new();
        let a = fx.task("a", None, "2024-01-10");
        let mut store = FlakyStore::new(fx.db);
        store.fail_sibling_reads = true;
        let change = set(&mut store, a, Status::Doing);
        assert_eq!(store.get_task(a).unwrap().unwrap().status, Status::Doing);
        assert!(change.cascade.is_degraded());
    }

    #[test]
    fn test_activity_sink_failure_is_not_fatal() {
        let mut fx = Fixture::new();
        let a = fx.task("a", None, "2024-01-10");
        let mut store = FlakyStore::new(fx.db);
        store.fail_activity = true;
        let change = set(&mut store, a, Status::Done);
        assert!(!change.cascade.is_degraded());
        assert_eq!(function_status(&store, fx.function), Status::Done);
        assert_eq!(change.cascade.activity.len(), 2);
        assert!(store.inner.activity.is_empty());
    }

    #[test]
    fn test_missing_task_is_an_error() {
        let mut fx = Fixture::new();
        let err = CascadeCoordinator::new(&mut fx.db, EngineConfig::default())
            .on_task_status_changed(9, "ana")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: EntityKind::Task, id: 9 }));
    }

    #[test]
    fn test_missing_function_is_degraded() {
        let mut fx = Fixture::new();
        let report = CascadeCoordinator::new(&mut fx.db, EngineConfig::default()).on_function_status_changed(42, "ana");
        assert!(report.is_degraded());
        assert!(report.feature.is_none());
    }

    #[test]
    fn test_delete_task_removes_edges_and_recomputes() {
        let mut fx = Fixture::new();
        let a = fx.task("a", None, "2024-01-10");
        let b = fx.task("b", None, "2024-01-10");
        let c = fx.task("c", None, "2024-01-10");
        let mut deps = DependencyService::new(&mut fx.db, EngineConfig::default());
        deps.add_dependency(b, &RawDependency::new(a, DependencyType::FinishToStart), "ana").unwrap();
        deps.add_dependency(c, &RawDependency::new(b, DependencyType::FinishToStart), "ana").unwrap();
        set(&mut fx.db, a, Status::Done);
        assert_eq!(function_status(&fx.db, fx.function), Status::Doing);

        let mut service = TaskStatusService::new(&mut fx.db, EngineConfig::default());
        service.delete_task(c, "ana").unwrap();
        let report = service.delete_task(b, "ana").unwrap();
        assert_eq!(
            report.function.unwrap().outcome,
            LevelOutcome::Changed { from: Status::Doing, to: Status::Done }
        );
        assert_eq!(report.activity[0].action, Action::TaskDeleted);
        assert!(fx.db.edges.is_empty());
        assert!(fx.db.task(b).is_none());
        assert!(matches!(
            TaskStatusService::new(&mut fx.db, EngineConfig::default()).delete_task(b, "ana"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_failed_task_delete_keeps_edges() {
        let mut fx = Fixture::new();
        let a = fx.task("a", None, "2024-01-10");
        let b = fx.task("b", None, "2024-01-10");
        DependencyService::new(&mut fx.db, EngineConfig::default())
            .add_dependency(b, &RawDependency::new(a, DependencyType::FinishToStart), "ana")
            .unwrap();
        let mut store = FlakyStore::new(fx.db);
        store.fail_task_deletes = true;

        let err = TaskStatusService::new(&mut store, EngineConfig::default()).delete_task(b, "ana").unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert!(store.inner.task(b).is_some());
        assert_eq!(store.inner.edges.len(), 1);
    }

    #[test]
    fn test_failed_edge_cleanup_after_delete_is_degraded() {
        let mut fx = Fixture::new();
        let a = fx.task("a", None, "2024-01-10");
        let b = fx.task("b", None, "2024-01-10");
        DependencyService::new(&mut fx.db, EngineConfig::default())
            .add_dependency(b, &RawDependency::new(a, DependencyType::FinishToStart), "ana")
            .unwrap();
        let function = fx.function;
        let mut store = FlakyStore::new(fx.db);
        store.fail_edge_deletes = true;

        let report = TaskStatusService::new(&mut store, EngineConfig::default()).delete_task(b, "ana").unwrap();
        assert!(store.inner.task(b).is_none());
        assert!(report.is_degraded());
        assert!(matches!(
            report.degraded[0],
            Error::Degraded { kind: EntityKind::Dependency, id, .. } if id == b
        ));
        assert_eq!(report.function.unwrap().id, function);
    }

    #[test]
    fn test_activity_disabled_still_returns_trail() {
        let mut fx = Fixture::new();
        let a = fx.task("a", None, "2024-01-10");
        let config = EngineConfig { record_activity: false, ..EngineConfig::default() };
        let change = TaskStatusService::new(&mut fx.db, config).change_task_status(a, Status::Doing, "ana").unwrap();
        assert_eq!(change.activity.len(), 1);
        assert!(fx.db.activity.is_empty());
    }
}
