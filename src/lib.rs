//! # task_cascade
//!
//! Task dependency graph and status cascade engine for hierarchical project
//! tracking (feature → function → task).
//!
//! ## What it does
//!
//! - **Dependency graph**: typed precedence edges between tasks (FS, FF, SS,
//!   SF with a signed lag, plus non-constraining `relates_to`). Edges that
//!   would close a precedence cycle are always rejected.
//! - **Constraint checks**: each new edge is checked against the tasks' dates
//!   and statuses. Inconsistencies come back as warnings with a suggested
//!   fix, or reject the edge when the caller asks for strict mode.
//! - **Status cascade**: a task status change recomputes the owning
//!   function's derived status and then the owning feature's, tolerating
//!   failures level by level.
//! - **Audit trail**: every decision is recorded as an activity entry.
//!
//! Storage, audit sink and notifications are reached through the traits in
//! [`store`]; [`db::Database`] is the JSON-file implementation used by the
//! `pm` binary.
//!
//! ```no_run
//! use task_cascade::cascade::TaskStatusService;
//! use task_cascade::config::EngineConfig;
//! use task_cascade::db::Database;
//! use task_cascade::dependency::{DependencyService, RawDependency};
//! use task_cascade::fields::{DependencyType, Status};
//!
//! # fn main() -> task_cascade::error::Result<()> {
//! let path = std::path::Path::new("tasks.json");
//! let mut db = Database::load(path)?;
//! let config = EngineConfig::default();
//!
//! let outcome = DependencyService::new(&mut db, config.clone())
//!     .add_dependency(2, &RawDependency::new(1, DependencyType::FinishToStart), "ana")?;
//! for warning in &outcome.violations {
//!     println!("warning: {}", warning.message);
//! }
//!
//! TaskStatusService::new(&mut db, config).change_task_status(1, Status::Done, "ana")?;
//! db.save(path)?;
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod cascade;
pub mod config;
pub mod constraint;
pub mod db;
pub mod dependency;
pub mod error;
pub mod fields;
pub mod graph;
pub mod status;
pub mod store;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;
