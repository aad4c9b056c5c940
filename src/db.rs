//! JSON-file backed store and utility functions.
//!
//! This module provides the `Database` struct holding features, functions,
//! tasks, dependency edges and the activity log, implementing the engine's
//! repository contracts, along with date parsing and formatting helpers used
//! by the command line.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::{Datelike, Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::activity::ActivityEntry;
use crate::error::{Error, Result};
use crate::fields::*;
use crate::graph::DependencyGraph;
use crate::store::*;
use crate::task::*;

/// In-memory database persisted as one JSON document.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub edges: Vec<DependencyEdge>,
    #[serde(default)]
    pub activity: Vec<ActivityEntry>,
}

impl Database {
    /// Load database from JSON file, or an empty database if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "database file missing, starting empty");
            return Ok(Database::default());
        }
        let buf = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&buf)?)
    }

    /// Save database to JSON file using atomic write (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(self)?;
        let mut f = File::create(&tmp)?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    fn next_task_id(&self) -> TaskId {
        self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    fn next_function_id(&self) -> FunctionId {
        self.functions.iter().map(|f| f.id).max().unwrap_or(0) + 1
    }

    fn next_feature_id(&self) -> FeatureId {
        self.features.iter().map(|f| f.id).max().unwrap_or(0) + 1
    }

    fn next_edge_id(&self) -> EdgeId {
        self.edges.iter().map(|e| e.id).max().unwrap_or(0) + 1
    }

    pub fn add_feature(&mut self, name: &str, project: Option<String>) -> Result<FeatureId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("name", "feature name cannot be empty"));
        }
        let id = self.next_feature_id();
        self.features.push(Feature {
            id,
            name: name.to_string(),
            project: project.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
            status: Status::ToDo,
        });
        Ok(id)
    }

    pub fn add_function(&mut self, name: &str, feature_id: FeatureId) -> Result<FunctionId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("name", "function name cannot be empty"));
        }
        if self.feature(feature_id).is_none() {
            return Err(Error::NotFound { kind: EntityKind::Feature, id: feature_id });
        }
        let id = self.next_function_id();
        self.functions.push(Function {
            id,
            name: name.to_string(),
            feature_id,
            status: Status::ToDo,
        });
        Ok(id)
    }

    /// Create a task. Derived statuses are not touched here; callers run the
    /// cascade for the owning function afterwards.
    pub fn add_task(&mut self, new: NewTask) -> Result<TaskId> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(Error::invalid("title", "task title cannot be empty"));
        }
        if new.estimate < 0.0 || !new.estimate.is_finite() {
            return Err(Error::invalid("estimate", "estimate must be a non-negative number"));
        }
        if let Some(start) = new.start_date {
            if start > new.deadline {
                return Err(Error::invalid("start_date", format!("start date {start} is after deadline {}", new.deadline)));
            }
        }
        if self.function(new.function_id).is_none() {
            return Err(Error::NotFound { kind: EntityKind::Function, id: new.function_id });
        }
        let now_utc = Utc::now().timestamp();
        let id = self.next_task_id();
        self.tasks.push(Task {
            id,
            title: title.to_string(),
            function_id: new.function_id,
            status: new.status,
            start_date: new.start_date,
            deadline: Some(new.deadline),
            estimate: new.estimate,
            actual: if new.status == Status::Done { new.estimate } else { 0.0 },
            created_at_utc: now_utc,
            updated_at_utc: now_utc,
        });
        Ok(id)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub fn feature(&self, id: FeatureId) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    /// Snapshot of the precedence graph over all stored edges.
    pub fn graph(&self) -> DependencyGraph {
        DependencyGraph::from_edges(&self.edges)
    }
}

impl EntityRepository for Database {
    fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.task(id).cloned())
    }

    fn get_sibling_tasks(&self, function_id: FunctionId) -> Result<Vec<Task>> {
        Ok(self.tasks.iter().filter(|t| t.function_id == function_id).cloned().collect())
    }

    fn get_function(&self, id: FunctionId) -> Result<Option<Function>> {
        Ok(self.function(id).cloned())
    }

    fn get_sibling_functions(&self, feature_id: FeatureId) -> Result<Vec<Function>> {
        Ok(self.functions.iter().filter(|f| f.feature_id == feature_id).cloned().collect())
    }

    fn get_feature(&self, id: FeatureId) -> Result<Option<Feature>> {
        Ok(self.feature(id).cloned())
    }

    fn update_status(&mut self, entity: EntityRef, status: Status) -> Result<()> {
        let slot = match entity {
            EntityRef::Function(id) => self.functions.iter_mut().find(|f| f.id == id).map(|f| &mut f.status),
            EntityRef::Feature(id) => self.features.iter_mut().find(|f| f.id == id).map(|f| &mut f.status),
        };
        match slot {
            Some(s) => {
                *s = status;
                Ok(())
            }
            None => Err(match entity {
                EntityRef::Function(id) => Error::NotFound { kind: EntityKind::Function, id },
                EntityRef::Feature(id) => Error::NotFound { kind: EntityKind::Feature, id },
            }),
        }
    }

    fn save_task(&mut self, task: &Task) -> Result<()> {
        let Some(slot) = self.tasks.iter_mut().find(|t| t.id == task.id) else {
            return Err(Error::task_not_found(task.id));
        };
        *slot = task.clone();
        Ok(())
    }

    fn delete_task(&mut self, id: TaskId) -> Result<Option<Task>> {
        let Some(idx) = self.tasks.iter().position(|t| t.id == id) else {
            return Ok(None);
        };
        Ok(Some(self.tasks.remove(idx)))
    }
}

impl EdgeRepository for Database {
    fn list_edges(&self, task_id: TaskId) -> Result<Vec<DependencyEdge>> {
        Ok(self.edges.iter().filter(|e| e.touches(task_id)).cloned().collect())
    }

    fn list_all_edges(&self) -> Result<Vec<DependencyEdge>> {
        Ok(self.edges.clone())
    }

    fn get_edge(&self, id: EdgeId) -> Result<Option<DependencyEdge>> {
        Ok(self.edges.iter().find(|e| e.id == id).cloned())
    }

    fn insert_edge(&mut self, edge: NewEdge) -> Result<DependencyEdge> {
        if self.edges.iter().any(|e| e.same_relation(&edge)) {
            return Err(Error::AlreadyExists {
                task_id: edge.task_id,
                depends_on_task_id: edge.depends_on_task_id,
                dependency_type: edge.dependency_type,
            });
        }
        // Re-validate against the edge set this insert actually sees.
        self.graph().check_candidate(&edge)?;

        let stored = DependencyEdge {
            id: self.next_edge_id(),
            task_id: edge.task_id,
            depends_on_task_id: edge.depends_on_task_id,
            dependency_type: edge.dependency_type,
            lag_days: edge.lag_days,
            is_mandatory: edge.is_mandatory,
            notes: edge.notes,
            created_at_utc: Utc::now().timestamp(),
        };
        self.edges.push(stored.clone());
        Ok(stored)
    }

    fn delete_edge(&mut self, id: EdgeId) -> Result<bool> {
        let before = self.edges.len();
        self.edges.retain(|e| e.id != id);
        Ok(self.edges.len() != before)
    }

    fn delete_edges_for_task(&mut self, task_id: TaskId) -> Result<usize> {
        let before = self.edges.len();
        self.edges.retain(|e| !e.touches(task_id));
        Ok(before - self.edges.len())
    }
}

impl ActivitySink for Database {
    fn record_activity(&mut self, entry: &ActivityEntry) -> Result<()> {
        self.activity.push(entry.clone());
        Ok(())
    }
}

/// Parse human-readable date input with smart natural language support.
///
/// Supports:
/// - "today", "tomorrow", "yesterday"
/// - "next monday", "this friday", bare weekday names
/// - "end of week", "end of month"
/// - "in 3d", "in 2w", "in 1m"
/// - "YYYY-MM-DD" format
pub fn parse_date_input(s: &str) -> Option<NaiveDate> {
    parse_date_relative(s, Local::now().date_naive())
}

/// Same as [`parse_date_input`] with an explicit reference day.
pub fn parse_date_relative(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();

    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return today.succ_opt(),
        "yesterday" => return today.pred_opt(),
        "end of week" | "eow" => {
            let (_, end) = start_end_of_week(today);
            return Some(end);
        }
        "end of month" | "eom" => {
            let (year, month) = if today.month() == 12 { (today.year() + 1, 1) } else { (today.year(), today.month() + 1) };
            let first_of_next = NaiveDate::from_ymd_opt(year, month, 1)?;
            return Some(first_of_next - Duration::days(1));
        }
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("in ") {
        let rest = rest.trim();
        if let Some(unit) = rest.chars().last() {
            let count = &rest[..rest.len() - unit.len_utf8()];
            if let Ok(n) = count.trim().parse::<i64>() {
                let offset = match unit {
                    'd' => Some(Duration::try_days(n)),
                    'w' => Some(Duration::try_weeks(n)),
                    // Approximate: 30 days per month
                    'm' => Some(n.checked_mul(30).and_then(Duration::try_days)),
                    _ => None,
                };
                if let Some(offset) = offset {
                    return offset.and_then(|d| today.checked_add_signed(d));
                }
            }
        }
    }

    let weekdays = [
        ("monday", 0), ("tuesday", 1), ("wednesday", 2), ("thursday", 3),
        ("friday", 4), ("saturday", 5), ("sunday", 6),
        ("mon", 0), ("tue", 1), ("wed", 2), ("thu", 3),
        ("fri", 4), ("sat", 5), ("sun", 6),
    ];
    let current = today.weekday().num_days_from_monday() as i64;
    for (day_name, target) in weekdays {
        let days_ahead = (target + 7 - current) % 7;
        if s == day_name || s == format!("this {day_name}") {
            return today.checked_add_signed(Duration::days(days_ahead));
        }
        if s == format!("next {day_name}") {
            let days = if days_ahead == 0 { 7 } else { days_ahead + 7 };
            return today.checked_add_signed(Duration::days(days));
        }
    }

    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

/// Calculate the start and end dates of the ISO week (Monday to Sunday).
pub fn start_end_of_week(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let weekday = today.weekday().num_days_from_monday() as i64;
    let start = today - Duration::days(weekday);
    (start, start + Duration::days(6))
}

/// Format a date relative to today ("today", "tomorrow", "in 3d", "2d late").
pub fn format_due_relative(due: Option<NaiveDate>, today: NaiveDate) -> String {
    match due {
        None => "-".into(),
        Some(d) => {
            let delta = (d - today).num_days();
            match delta {
                0 => "today".into(),
                1 => "tomorrow".into(),
                n if n > 1 => format!("in {n}d"),
                n => format!("{}d late", -n),
            }
        }
    }
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// Warn about tasks whose owning function is missing. Such tasks never take
/// part in a cascade.
pub fn orphan_tasks(db: &Database) -> Vec<TaskId> {
    let orphans: Vec<TaskId> = db
        .tasks
        .iter()
        .filter(|t| db.function(t.function_id).is_none())
        .map(|t| t.id)
        .collect();
    if !orphans.is_empty() {
        warn!(count = orphans.len(), "tasks reference missing functions");
    }
    orphans
}
