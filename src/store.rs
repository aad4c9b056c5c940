//! Collaborator contracts the engine consumes.
//!
//! The engine never talks to a storage technology directly: it reads and
//! writes through these narrow traits, which [`Database`](crate::db::Database)
//! implements for the `pm` binary and which tests wrap with fakes.

use crate::activity::ActivityEntry;
use crate::error::Result;
use crate::fields::Status;
use crate::task::*;

/// Reference to an entity whose derived status can be written. Task status
/// goes through `save_task` together with the rest of the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Function(FunctionId),
    Feature(FeatureId),
}

/// Task, function and feature access (CRUD lives outside the engine).
pub trait EntityRepository {
    fn get_task(&self, id: TaskId) -> Result<Option<Task>>;

    /// All tasks owned by the function, including the one that changed.
    fn get_sibling_tasks(&self, function_id: FunctionId) -> Result<Vec<Task>>;

    fn get_function(&self, id: FunctionId) -> Result<Option<Function>>;

    /// All functions owned by the feature.
    fn get_sibling_functions(&self, feature_id: FeatureId) -> Result<Vec<Function>>;

    fn get_feature(&self, id: FeatureId) -> Result<Option<Feature>>;

    fn update_status(&mut self, entity: EntityRef, status: Status) -> Result<()>;

    /// Replace a stored task with the given value.
    fn save_task(&mut self, task: &Task) -> Result<()>;

    /// Remove a task; returns the removed task if it existed.
    fn delete_task(&mut self, id: TaskId) -> Result<Option<Task>>;
}

/// Dependency edge storage.
pub trait EdgeRepository {
    /// Edges where the task is either endpoint.
    fn list_edges(&self, task_id: TaskId) -> Result<Vec<DependencyEdge>>;

    fn list_all_edges(&self) -> Result<Vec<DependencyEdge>>;

    fn get_edge(&self, id: EdgeId) -> Result<Option<DependencyEdge>>;

    /// Insert a new edge.
    ///
    /// Fails with `AlreadyExists` for a duplicate ordered pair and type, and
    /// with `CycleDetected` if the edge set changed underneath the caller so
    /// that the edge now closes a cycle.
    fn insert_edge(&mut self, edge: NewEdge) -> Result<DependencyEdge>;

    /// Returns whether an edge was removed.
    fn delete_edge(&mut self, id: EdgeId) -> Result<bool>;

    /// Removes edges touching the task in both directions; returns the count.
    fn delete_edges_for_task(&mut self, task_id: TaskId) -> Result<usize>;
}

/// Fire-and-forget audit sink. Failures are logged by callers, never propagated.
pub trait ActivitySink {
    fn record_activity(&mut self, entry: &ActivityEntry) -> Result<()>;
}

/// Everything the services need from one backing store.
pub trait Store: EntityRepository + EdgeRepository + ActivitySink {}

impl<T: EntityRepository + EdgeRepository + ActivitySink> Store for T {}
