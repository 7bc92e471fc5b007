//! Structured views of items reported by Things.
//!
//! Records are produced per request and never cached; Things stays the
//! system of record.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

/// Status of a to-do or project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Open,
    Completed,
    Canceled,
}

impl Status {
    /// Parse the status constant as Things prints it.
    #[must_use]
    pub fn from_script(text: &str) -> Option<Self> {
        match text.trim() {
            "open" => Some(Self::Open),
            "completed" => Some(Self::Completed),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        })
    }
}

/// A to-do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Todo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<NaiveDate>,
}

/// A project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: String,
    pub title: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_todos: Option<u32>,
}

/// An area of responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Area {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
}

/// Today's and upcoming to-dos plus active projects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DailyOverview {
    pub today: Vec<Todo>,
    pub upcoming: Vec<Todo>,
    pub projects: Vec<Project>,
}
