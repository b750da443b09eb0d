use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::remote::DocId;

/// File attachment category. Names are unique across the collection,
/// case-sensitive, at most [`crate::stores::categories::MAX_NAME_CHARS`]
/// characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: DocId,
    pub name: String,
}

/// One uploaded file. `content` is a self-describing data URI, so there is
/// no separate blob channel. Within one category the `name` is unique;
/// a re-upload retires the old record and issues a fresh one with a bumped
/// `version` rather than mutating in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(default)]
    pub id: DocId,
    pub category_name: String,
    pub name: String,
    pub content: String,
    pub date: DateTime<Utc>,
    pub version: u32,
    pub size: u64,
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Sort rank: high before medium before low.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    /// Marker color used when a task deadline is projected onto the
    /// calendar.
    pub fn calendar_color(self) -> &'static str {
        match self {
            Priority::High => "#dc3545",
            Priority::Medium => "#ffc107",
            Priority::Low => "#28a745",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        f.write_str(name)
    }
}

impl FromStr for Priority {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(StoreError::Validation(format!(
                "priority must be high, medium or low, got: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: DocId,
    pub text: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub priority: Priority,
    pub category: String,
    pub completed: bool,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Task {
    /// `created` and `last_updated` come from the store layer, never from
    /// the caller.
    pub fn new(
        text: String,
        date: Option<NaiveDate>,
        priority: Priority,
        category: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DocId::default(),
            text,
            date,
            priority,
            category,
            completed: false,
            created: now,
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: DocId,
    pub title: String,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    pub all_day: bool,
    #[serde(default)]
    pub location: String,
    #[serde(rename = "type", default = "default_event_type")]
    pub event_type: String,
    #[serde(default)]
    pub description: String,
}

pub fn default_event_type() -> String {
    "other".to_string()
}
