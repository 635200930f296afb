//! Data models for Cato snapshots.
//!
//! This module defines the denormalized output structures:
//! - `Task` - Work items with embedded parent/project/agent identity and timeline positions
//! - `Agent` - Inferred participants with precomputed workload and communication counters
//! - `Message` - Normalized communication records with duplicate flags
//! - `Event` - Sourced or synthesized timeline occurrences
//! - `Metrics` - Aggregate statistics computed once per snapshot
//! - `Snapshot` - The immutable root handed to the frontend
//!
//! Intermediate records produced by the source readers live in [`record`].

pub mod graph;
pub mod record;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Task status in the workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
    Blocked,
}

impl TaskStatus {
    /// Parse a raw status string, case-insensitive.
    ///
    /// Upstream stores use several spellings; anything unrecognised
    /// (including `pending`) is treated as not started.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "done" | "completed" | "complete" => TaskStatus::Done,
            "in_progress" | "in-progress" | "inprogress" | "started" => TaskStatus::InProgress,
            "blocked" => TaskStatus::Blocked,
            _ => TaskStatus::Todo,
        }
    }

    /// Returns true for statuses that still render without finished timing data.
    pub fn is_incomplete(&self) -> bool {
        !matches!(self, TaskStatus::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Parse a raw priority string, falling back to medium.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Priority::Low,
            "high" => Priority::High,
            "urgent" | "critical" => Priority::Urgent,
            _ => Priority::Medium,
        }
    }
}

/// Which slice of the task forest a snapshot displays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Leaf work: subtasks plus parentless tasks without children
    #[default]
    Subtasks,
    /// Top-level tasks only
    Parents,
    /// No filtering
    All,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Subtasks => "subtasks",
            ViewMode::Parents => "parents",
            ViewMode::All => "all",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "subtasks" => Ok(ViewMode::Subtasks),
            "parents" => Ok(ViewMode::Parents),
            "all" => Ok(ViewMode::All),
            _ => Err(format!("Unknown view mode: {}", s)),
        }
    }
}

/// Kind of a communication record.
///
/// Unknown upstream types are carried through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageType {
    Instruction,
    Question,
    Answer,
    #[default]
    StatusUpdate,
    Blocker,
    TaskAssignment,
    Other(String),
}

impl MessageType {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "instruction" => MessageType::Instruction,
            "question" => MessageType::Question,
            "answer" => MessageType::Answer,
            "status_update" | "" => MessageType::StatusUpdate,
            "blocker" => MessageType::Blocker,
            "task_assignment" => MessageType::TaskAssignment,
            other => MessageType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Instruction => "instruction",
            MessageType::Question => "question",
            MessageType::Answer => "answer",
            MessageType::StatusUpdate => "status_update",
            MessageType::Blocker => "blocker",
            MessageType::TaskAssignment => "task_assignment",
            MessageType::Other(s) => s,
        }
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role of an inferred agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// The orchestrator itself
    System,
    Agent,
}

/// Severity attached to diagnostic findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A project from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Registry identifier
    pub id: String,

    /// Display name
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,

    /// External board-system project identifier (numeric-like string)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_project_id: Option<String>,

    /// External board-system board identifier (numeric-like string)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_board_id: Option<String>,
}

impl Project {
    /// Create a project with only identity set.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            created_at: None,
            last_used: None,
            external_project_id: None,
            external_board_id: None,
        }
    }

    /// External correlation ids, board first.
    pub fn correlation_ids(&self) -> Vec<&str> {
        [&self.external_board_id, &self.external_project_id]
            .into_iter()
            .filter_map(|id| id.as_deref())
            .filter(|id| !id.is_empty())
            .collect()
    }
}

/// A project with the number of tasks resolved for it.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    pub task_count: usize,
}

/// A denormalized task with all relationships embedded.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,

    pub name: String,

    pub description: String,

    pub status: TaskStatus,

    pub priority: Priority,

    /// Derived from status and effort, never stored upstream (0-100)
    pub progress_percent: u8,

    pub created_at: DateTime<Utc>,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,

    pub estimated_hours: f64,

    pub actual_hours: f64,

    pub parent_task_id: Option<String>,

    /// Resolved from the full task set, so present even when the parent is hidden
    pub parent_task_name: Option<String>,

    pub is_subtask: bool,

    pub subtask_index: Option<u32>,

    pub project_id: String,

    pub project_name: String,

    pub assigned_agent_id: Option<String>,

    pub assigned_agent_name: Option<String>,

    pub assigned_agent_role: Option<AgentRole>,

    /// Task IDs this task depends on (may reference tasks outside the view)
    pub dependency_ids: Vec<String>,

    /// Reverse of `dependency_ids` within the view
    pub dependent_task_ids: Vec<String>,

    /// Linear timeline position (0.0-1.0)
    pub timeline_linear_position: f64,

    /// Power-scaled timeline position (0.0-1.0)
    pub timeline_scaled_position: f64,

    pub timeline_scale_exponent: f64,

    pub labels: Vec<String>,

    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Task {
    /// Wall-clock span between creation and last update, in seconds.
    pub fn duration_seconds(&self) -> f64 {
        (self.updated_at - self.created_at).num_milliseconds() as f64 / 1000.0
    }
}

/// An agent inferred from task assignments and message participants.
#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    pub skills: Vec<String>,

    /// Tasks in todo or in_progress
    pub current_task_ids: Vec<String>,
    pub current_task_names: Vec<String>,
    pub completed_task_ids: Vec<String>,
    pub completed_tasks_count: usize,

    /// Sum of actual hours over completed tasks
    pub total_hours_worked: f64,
    pub average_task_duration_hours: f64,

    pub messages_sent: usize,
    pub messages_received: usize,
    pub blockers_reported: usize,
}

/// A normalized communication record.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub from_agent_id: String,
    pub from_agent_name: String,
    pub to_agent_id: String,
    pub to_agent_name: String,
    pub task_id: Option<String>,
    pub task_name: Option<String>,
    pub parent_message_id: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Set on every member of a duplicate cluster except the earliest
    pub is_duplicate: bool,
    pub duplicate_group_id: Option<String>,
    pub duplicate_count: usize,
}

/// A timeline event, either sourced from a log or synthesized by diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Free string; diagnostics use the `diagnostic:` prefix
    pub event_type: String,
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    pub task_id: Option<String>,
    pub task_name: Option<String>,
    pub data: serde_json::Value,
}

/// Aggregate statistics for one snapshot.
///
/// All ratios are 0.0-1.0 floats.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub in_progress_tasks: usize,
    pub blocked_tasks: usize,
    pub completion_rate: f64,

    pub total_duration_minutes: i64,
    /// Minutes; serialized under the key the frontend already reads
    #[serde(rename = "average_task_duration_hours")]
    pub average_task_duration_minutes: f64,

    /// Max tasks running simultaneously
    pub peak_parallel_tasks: usize,
    pub average_parallel_tasks: f64,
    /// Observed span over summed task durations, at most 1.0
    pub parallelization_efficiency: f64,

    pub total_agents: usize,
    pub active_agents: usize,
    pub tasks_per_agent: f64,

    pub total_blockers: usize,
    pub blocked_task_percentage: f64,
}

/// One complete, immutable materialization of the aggregation pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub snapshot_id: String,
    /// Strictly increasing per aggregator instance
    pub snapshot_version: u64,
    pub timestamp: DateTime<Utc>,
    pub project_id: Option<String>,
    pub project_name: String,
    pub project_filter_applied: bool,
    pub included_project_ids: Vec<String>,
    pub view_mode: ViewMode,

    pub tasks: Vec<Task>,
    pub agents: Vec<Agent>,
    pub messages: Vec<Message>,
    pub timeline_events: Vec<Event>,

    pub metrics: Metrics,

    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,

    /// Task id -> dependency ids (dangling ids preserved)
    pub task_dependency_graph: BTreeMap<String, Vec<String>>,
    /// Sender id -> distinct recipient ids
    pub agent_communication_graph: BTreeMap<String, Vec<String>>,

    /// Always "UTC"
    pub timezone: String,
}

impl Snapshot {
    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
