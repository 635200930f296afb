//! Normalized intermediate records.
//!
//! Source readers resolve every legacy field alias exactly once and hand these
//! records to the resolver. Nothing downstream looks at raw JSON field names.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::{MessageType, Priority, TaskStatus};

/// Which store a task was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOrigin {
    /// Relational metadata store (top-level tasks)
    Metadata,
    /// File-based subtask store
    Subtask,
}

/// A task after alias resolution, before enrichment and filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub origin: TaskOrigin,

    /// Explicit `is_subtask` flag when the source carried one
    pub explicit_subtask: Option<bool>,
    pub subtask_index: Option<u32>,
    pub parent_task_id: Option<String>,
    pub project_id: Option<String>,
    pub agent_id: Option<String>,

    /// Dependency references, possibly still symbolic slugs
    pub dependencies: Vec<String>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Timestamp fields that were present but could not be parsed
    pub malformed: Vec<&'static str>,

    pub estimated_hours: f64,
    pub actual_hours: f64,
    pub labels: Vec<String>,
    pub metadata: Map<String, Value>,
}

impl TaskRecord {
    /// Create a bare record with only identity set.
    pub fn new(id: impl Into<String>, name: impl Into<String>, origin: TaskOrigin) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            origin,
            explicit_subtask: None,
            subtask_index: None,
            parent_task_id: None,
            project_id: None,
            agent_id: None,
            dependencies: Vec::new(),
            created_at: None,
            updated_at: None,
            started_at: None,
            completed_at: None,
            malformed: Vec::new(),
            estimated_hours: 0.0,
            actual_hours: 0.0,
            labels: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// Explicit flag wins; otherwise parent presence decides.
    pub fn is_subtask(&self) -> bool {
        self.explicit_subtask
            .unwrap_or_else(|| self.parent_task_id.is_some())
    }

    /// When the task began, for timeline placement.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.started_at.or(self.created_at)
    }

    /// When the task last finished or changed, for dependency ordering.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.completed_at.or(self.updated_at).or(self.created_at)
    }

    /// Span between creation and last update, if both are known.
    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.created_at, self.updated_at) {
            (Some(created), Some(updated)) => {
                Some((updated - created).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }
}

/// Timing facts for one task from a secondary store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingRecord {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub actual_hours: Option<f64>,
    pub estimated_hours: Option<f64>,
}

/// A message after alias resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub id: String,
    /// `None` when missing or unparseable; such messages never reach a snapshot
    pub timestamp: Option<DateTime<Utc>>,
    pub content: String,
    pub message_type: MessageType,
    pub from_agent_id: String,
    pub to_agent_id: String,
    /// Agent the line is about, when the log names one
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
    pub parent_message_id: Option<String>,
    /// Upstream project correlation id, if the log line carried one
    pub project_id: Option<String>,
    pub board_id: Option<String>,
    pub metadata: Map<String, Value>,
}

/// An agent event after alias resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub event_type: String,
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
    pub project_id: Option<String>,
    pub board_id: Option<String>,
    pub data: Value,
}

impl MessageRecord {
    /// Project or board correlation ids carried by this line.
    pub fn correlation_ids(&self) -> impl Iterator<Item = &str> {
        self.project_id
            .as_deref()
            .into_iter()
            .chain(self.board_id.as_deref())
    }
}

impl EventRecord {
    pub fn correlation_ids(&self) -> impl Iterator<Item = &str> {
        self.project_id
            .as_deref()
            .into_iter()
            .chain(self.board_id.as_deref())
    }
}
