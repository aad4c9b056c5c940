//! Fixtures and fakes shared by unit tests.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::activity::ActivityEntry;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fields::Status;
use crate::store::*;
use crate::task::*;

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// One feature with one function, ready for tasks.
pub struct Fixture {
    pub db: Database,
    pub feature: FeatureId,
    pub function: FunctionId,
}

impl Fixture {
    pub fn new() -> Self {
        let mut db = Database::default();
        let feature = db.add_feature("Accounts", Some("capstone".into())).unwrap();
        let function = db.add_function("Sign-up", feature).unwrap();
        Fixture { db, feature, function }
    }

    pub fn add_function(&mut self, name: &str) -> FunctionId {
        self.db.add_function(name, self.feature).unwrap()
    }

    pub fn task(&mut self, title: &str, start: Option<&str>, deadline: &str) -> TaskId {
        self.task_in(self.function, title, start, deadline)
    }

    pub fn task_in(&mut self, function_id: FunctionId, title: &str, start: Option<&str>, deadline: &str) -> TaskId {
        self.db
            .add_task(NewTask {
                title: title.into(),
                function_id,
                deadline: date(deadline),
                start_date: start.map(date),
                estimate: 4.0,
                status: Status::ToDo,
            })
            .unwrap()
    }
}

/// Wraps a `Database` and fails selected operations, to exercise partial
/// failure paths.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: Database,
    pub failing_status_writes: HashSet<(&'static str, u64)>,
    pub fail_activity: bool,
    pub fail_sibling_reads: bool,
    pub fail_edge_deletes: bool,
    pub fail_task_deletes: bool,
}

impl FlakyStore {
    pub fn new(inner: Database) -> Self {
        FlakyStore { inner, ..Default::default() }
    }

    pub fn fail_status_write(mut self, entity: EntityRef) -> Self {
        let key = match entity {
            EntityRef::Function(id) => ("function", id),
            EntityRef::Feature(id) => ("feature", id),
        };
        self.failing_status_writes.insert(key);
        self
    }
}

impl EntityRepository for FlakyStore {
    fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        self.inner.get_task(id)
    }

    fn get_sibling_tasks(&self, function_id: FunctionId) -> Result<Vec<Task>> {
        if self.fail_sibling_reads {
            return Err(Error::Store("sibling read timed out".into()));
        }
        self.inner.get_sibling_tasks(function_id)
    }

    fn get_function(&self, id: FunctionId) -> Result<Option<Function>> {
        self.inner.get_function(id)
    }

    fn get_sibling_functions(&self, feature_id: FeatureId) -> Result<Vec<Function>> {
        self.inner.get_sibling_functions(feature_id)
    }

    fn get_feature(&self, id: FeatureId) -> Result<Option<Feature>> {
        self.inner.get_feature(id)
    }

    fn update_status(&mut self, entity: EntityRef, status: Status) -> Result<()> {
        let key = match entity {
            EntityRef::Function(id) => ("function", id),
            EntityRef::Feature(id) => ("feature", id),
        };
        if self.failing_status_writes.contains(&key) {
            return Err(Error::Store(format!("write to {} {} rejected", key.0, key.1)));
        }
        self.inner.update_status(entity, status)
    }

    fn save_task(&mut self, task: &Task) -> Result<()> {
        self.inner.save_task(task)
    }

    fn delete_task(&mut self, id: TaskId) -> Result<Option<Task>> {
        if self.fail_task_deletes {
            return Err(Error::Store(format!("delete of task {id} failed")));
        }
        self.inner.delete_task(id)
    }
}

impl EdgeRepository for FlakyStore {
    fn list_edges(&self, task_id: TaskId) -> Result<Vec<DependencyEdge>> {
        self.inner.list_edges(task_id)
    }

    fn list_all_edges(&self) -> Result<Vec<DependencyEdge>> {
        self.inner.list_all_edges()
    }

    fn get_edge(&self, id: EdgeId) -> Result<Option<DependencyEdge>> {
        self.inner.get_edge(id)
    }

    fn insert_edge(&mut self, edge: NewEdge) -> Result<DependencyEdge> {
        self.inner.insert_edge(edge)
    }

    fn delete_edge(&mut self, id: EdgeId) -> Result<bool> {
        if self.fail_edge_deletes {
            return Err(Error::Store("edge delete failed".into()));
        }
        self.inner.delete_edge(id)
    }

    fn delete_edges_for_task(&mut self, task_id: TaskId) -> Result<usize> {
        if self.fail_edge_deletes {
            return Err(Error::Store("edge delete failed".into()));
        }
        self.inner.delete_edges_for_task(task_id)
    }
}

impl ActivitySink for FlakyStore {
    fn record_activity(&mut self, entry: &ActivityEntry) -> Result<()> {
        if self.fail_activity {
            return Err(Error::Store("activity sink unavailable".into()));
        }
        self.inner.record_activity(entry)
    }
}
