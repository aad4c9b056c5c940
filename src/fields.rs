//! Enumerations and field types for the dependency engine.
//!
//! This module defines the closed value sets used across the engine: task and
//! derived status, dependency types, entity kinds for the activity log, and the
//! classification of constraint violations.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Progress state shared by tasks, functions and features.
///
/// Legacy spellings are accepted on load and normalised on the next save.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    #[serde(alias = "ToDo", alias = "To Do", alias = "open", alias = "Open")]
    #[value(name = "todo")]
    ToDo,
    #[serde(alias = "Doing", alias = "in-progress", alias = "InProgress", alias = "In Progress")]
    Doing,
    #[serde(alias = "Done", alias = "completed", alias = "Completed")]
    Done,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Status::ToDo => "ToDo",
            Status::Doing => "Doing",
            Status::Done => "Done",
        })
    }
}

/// Precedence relation between two tasks.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DependencyType {
    /// Finish-to-Start.
    #[default]
    #[serde(rename = "FS")]
    FinishToStart,
    /// Finish-to-Finish.
    #[serde(rename = "FF")]
    FinishToFinish,
    /// Start-to-Start.
    #[serde(rename = "SS")]
    StartToStart,
    /// Start-to-Finish.
    #[serde(rename = "SF")]
    StartToFinish,
    /// Association only, never constrains dates or participates in cycles.
    #[serde(rename = "relates_to")]
    RelatesTo,
}

impl DependencyType {
    /// Short code as stored and shown.
    pub fn code(self) -> &'static str {
        match self {
            DependencyType::FinishToStart => "FS",
            DependencyType::FinishToFinish => "FF",
            DependencyType::StartToStart => "SS",
            DependencyType::StartToFinish => "SF",
            DependencyType::RelatesTo => "relates_to",
        }
    }

    /// Whether the edge encodes precedence (and so takes part in cycle checks).
    pub fn is_constraining(self) -> bool {
        self != DependencyType::RelatesTo
    }

    /// FS and FF require the predecessor to finish before the successor progresses.
    pub fn requires_predecessor_finish(self) -> bool {
        matches!(self, DependencyType::FinishToStart | DependencyType::FinishToFinish)
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.code())
    }
}

impl FromStr for DependencyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "FS" | "fs" => Ok(DependencyType::FinishToStart),
            "FF" | "ff" => Ok(DependencyType::FinishToFinish),
            "SS" | "ss" => Ok(DependencyType::StartToStart),
            "SF" | "sf" => Ok(DependencyType::StartToFinish),
            "relates_to" => Ok(DependencyType::RelatesTo),
            other => Err(format!(
                "unknown dependency type '{}', expected one of FS, FF, SS, SF, relates_to",
                other
            )),
        }
    }
}

/// Entity kinds that appear in the activity log and in cascade reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Task,
    Function,
    Feature,
    Dependency,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            EntityKind::Task => "task",
            EntityKind::Function => "function",
            EntityKind::Feature => "feature",
            EntityKind::Dependency => "dependency",
        })
    }
}

/// How strongly a violation is surfaced. Never blocks on its own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Info,
    Warning,
}

/// Whether a violation concerns dates or statuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    DateViolation,
    StatusViolation,
}
