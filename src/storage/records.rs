//! Raw upstream record shapes and their normalization.
//!
//! Upstream stores are loosely typed: ids may be strings or numbers, hours may
//! be strings, and several logical fields have legacy aliases. Each raw struct
//! accepts anything JSON-shaped, and a single `normalize` per entity resolves
//! aliases into the typed records in [`crate::models::record`].

use serde::Deserialize;
use serde_json::{Map, Value};

use super::time::TimestampField;
use crate::models::record::{EventRecord, MessageRecord, TaskOrigin, TaskRecord, TimingRecord};
use crate::models::{MessageType, Priority, Project, TaskStatus};

/// Participant assumed when a message omits sender or recipient.
pub const SYSTEM_AGENT_ID: &str = "system";

/// Non-empty string from a string or number value.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn opt_string(value: &Option<Value>) -> Option<String> {
    value.as_ref().and_then(value_to_string)
}

/// Float from a number or numeric string.
pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|f: &f64| f.is_finite())
}

fn opt_f64(value: &Option<Value>) -> Option<f64> {
    value.as_ref().and_then(value_to_f64)
}

/// List of ids from an array, or a single id.
fn value_to_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_to_string).collect(),
        other => value_to_string(other).into_iter().collect(),
    }
}

fn value_to_object(value: &Option<Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

/// A project entry from the registry file.
#[derive(Debug, Default, Deserialize)]
pub struct RawProject {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub description: Option<Value>,
    #[serde(default)]
    pub created_at: Option<Value>,
    #[serde(default)]
    pub last_used: Option<Value>,
    #[serde(default)]
    pub provider_config: Option<RawProviderConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawProviderConfig {
    #[serde(default)]
    pub project_id: Option<Value>,
    #[serde(default)]
    pub board_id: Option<Value>,
}

impl RawProject {
    /// Returns `None` when the entry has no usable id.
    pub fn normalize(self) -> Option<Project> {
        let id = opt_string(&self.id)?;
        let name = opt_string(&self.name).unwrap_or_else(|| id.clone());
        let (external_project_id, external_board_id) = match &self.provider_config {
            Some(cfg) => (opt_string(&cfg.project_id), opt_string(&cfg.board_id)),
            None => (None, None),
        };
        Some(Project {
            description: opt_string(&self.description).unwrap_or_default(),
            created_at: TimestampField::from_value(self.created_at.as_ref()).valid(),
            last_used: TimestampField::from_value(self.last_used.as_ref()).valid(),
            id,
            name,
            external_project_id,
            external_board_id,
        })
    }
}

/// A task from either task store.
#[derive(Debug, Default, Deserialize)]
pub struct RawTask {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub title: Option<Value>,
    #[serde(default)]
    pub description: Option<Value>,
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub priority: Option<Value>,
    #[serde(default)]
    pub is_subtask: Option<Value>,
    #[serde(default)]
    pub subtask_index: Option<Value>,
    #[serde(default)]
    pub parent_task_id: Option<Value>,
    #[serde(default)]
    pub parent_id: Option<Value>,
    #[serde(default)]
    pub project_id: Option<Value>,
    #[serde(default)]
    pub assigned_agent_id: Option<Value>,
    #[serde(default)]
    pub agent_id: Option<Value>,
    #[serde(default)]
    pub assigned_to: Option<Value>,
    #[serde(default)]
    pub dependencies: Option<Value>,
    #[serde(default)]
    pub dependency_ids: Option<Value>,
    #[serde(default)]
    pub depends_on: Option<Value>,
    #[serde(default)]
    pub created_at: Option<Value>,
    #[serde(default)]
    pub updated_at: Option<Value>,
    #[serde(default)]
    pub started_at: Option<Value>,
    #[serde(default)]
    pub completed_at: Option<Value>,
    #[serde(default)]
    pub estimated_hours: Option<Value>,
    #[serde(default)]
    pub actual_hours: Option<Value>,
    #[serde(default)]
    pub labels: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl RawTask {
    /// Resolve aliases. Returns `None` when the task has no usable id.
    ///
    /// `fallback_id` is used for records stored under a key without an `id` field.
    pub fn normalize(self, origin: TaskOrigin, fallback_id: Option<&str>) -> Option<TaskRecord> {
        let id = opt_string(&self.id).or_else(|| fallback_id.map(str::to_string))?;
        let name = opt_string(&self.name)
            .or_else(|| opt_string(&self.title))
            .unwrap_or_default();

        let mut record = TaskRecord::new(id, name, origin);
        record.description = opt_string(&self.description).unwrap_or_default();
        record.status = opt_string(&self.status)
            .map(|s| TaskStatus::parse(&s))
            .unwrap_or_default();
        record.priority = opt_string(&self.priority)
            .map(|s| Priority::parse(&s))
            .unwrap_or_default();
        record.explicit_subtask = self.is_subtask.as_ref().and_then(Value::as_bool);
        record.subtask_index = opt_f64(&self.subtask_index)
            .filter(|i| *i >= 0.0)
            .map(|i| i as u32);
        record.parent_task_id = opt_string(&self.parent_task_id).or_else(|| opt_string(&self.parent_id));
        record.project_id = opt_string(&self.project_id);
        record.agent_id = opt_string(&self.assigned_agent_id)
            .or_else(|| opt_string(&self.agent_id))
            .or_else(|| opt_string(&self.assigned_to));
        record.dependencies = [&self.dependencies, &self.dependency_ids, &self.depends_on]
            .into_iter()
            .find_map(|v| v.as_ref().filter(|v| !v.is_null()))
            .map(value_to_string_list)
            .unwrap_or_default();
        dedup_in_place(&mut record.dependencies);

        let stamps = [
            ("created_at", &self.created_at),
            ("updated_at", &self.updated_at),
            ("started_at", &self.started_at),
            ("completed_at", &self.completed_at),
        ];
        for (field, raw) in stamps {
            let parsed = TimestampField::from_value(raw.as_ref());
            if parsed == TimestampField::Malformed {
                record.malformed.push(field);
            }
            let slot = match field {
                "created_at" => &mut record.created_at,
                "updated_at" => &mut record.updated_at,
                "started_at" => &mut record.started_at,
                _ => &mut record.completed_at,
            };
            *slot = parsed.valid();
        }

        record.estimated_hours = opt_f64(&self.estimated_hours).unwrap_or(0.0);
        record.actual_hours = opt_f64(&self.actual_hours).unwrap_or(0.0);
        record.labels = self
            .labels
            .as_ref()
            .map(value_to_string_list)
            .unwrap_or_default();
        record.metadata = value_to_object(&self.metadata);
        Some(record)
    }
}

fn dedup_in_place(ids: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
}

/// A row of the `task_outcomes` collection.
#[derive(Debug, Default, Deserialize)]
pub struct RawOutcome {
    #[serde(default)]
    pub actual_hours: Option<Value>,
    #[serde(default)]
    pub estimated_hours: Option<Value>,
    #[serde(default)]
    pub started_at: Option<Value>,
    #[serde(default)]
    pub completed_at: Option<Value>,
}

impl RawOutcome {
    pub fn normalize(self) -> TimingRecord {
        TimingRecord {
            started_at: TimestampField::from_value(self.started_at.as_ref()).valid(),
            completed_at: TimestampField::from_value(self.completed_at.as_ref()).valid(),
            actual_hours: opt_f64(&self.actual_hours),
            estimated_hours: opt_f64(&self.estimated_hours),
        }
    }
}

/// A row of the `events` collection.
#[derive(Debug, Default, Deserialize)]
pub struct RawStoredEvent {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub data: Option<RawCompletionData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawCompletionData {
    #[serde(default)]
    pub task_id: Option<Value>,
    #[serde(default)]
    pub started_at: Option<Value>,
    #[serde(default)]
    pub completed_at: Option<Value>,
}

impl RawStoredEvent {
    /// Timing facts for a `task_completed` event carrying both endpoints.
    pub fn completion_timing(self) -> Option<(String, TimingRecord)> {
        if self.event_type.as_deref() != Some("task_completed") {
            return None;
        }
        let data = self.data?;
        let task_id = opt_string(&data.task_id)?;
        let started = TimestampField::from_value(data.started_at.as_ref()).valid()?;
        let completed = TimestampField::from_value(data.completed_at.as_ref()).valid()?;
        let hours = (completed - started).num_milliseconds() as f64 / 3_600_000.0;
        Some((
            task_id,
            TimingRecord {
                started_at: Some(started),
                completed_at: Some(completed),
                actual_hours: Some(hours),
                estimated_hours: None,
            },
        ))
    }
}

/// A line of a conversation log.
#[derive(Debug, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default, rename = "type")]
    pub kind: Option<Value>,
    #[serde(default)]
    pub message_type: Option<Value>,
    #[serde(default)]
    pub from_agent_id: Option<Value>,
    #[serde(default)]
    pub to_agent_id: Option<Value>,
    #[serde(default)]
    pub agent_id: Option<Value>,
    #[serde(default)]
    pub task_id: Option<Value>,
    #[serde(default)]
    pub parent_message_id: Option<Value>,
    #[serde(default)]
    pub project_id: Option<Value>,
    #[serde(default)]
    pub board_id: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl RawMessage {
    pub fn normalize(self) -> MessageRecord {
        let metadata = value_to_object(&self.metadata);
        let task_id = opt_string(&self.task_id)
            .or_else(|| metadata.get("task_id").and_then(value_to_string));
        let content = self
            .message
            .as_ref()
            .or(self.content.as_ref())
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .unwrap_or_default();
        let message_type = opt_string(&self.kind)
            .or_else(|| opt_string(&self.message_type))
            .map(|s| MessageType::parse(&s))
            .unwrap_or_default();

        MessageRecord {
            id: opt_string(&self.id).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            timestamp: TimestampField::from_value(self.timestamp.as_ref()).valid(),
            content,
            message_type,
            from_agent_id: opt_string(&self.from_agent_id)
                .unwrap_or_else(|| SYSTEM_AGENT_ID.to_string()),
            to_agent_id: opt_string(&self.to_agent_id)
                .unwrap_or_else(|| SYSTEM_AGENT_ID.to_string()),
            agent_id: opt_string(&self.agent_id),
            task_id,
            parent_message_id: opt_string(&self.parent_message_id),
            project_id: opt_string(&self.project_id)
                .or_else(|| metadata.get("project_id").and_then(value_to_string)),
            board_id: opt_string(&self.board_id)
                .or_else(|| metadata.get("board_id").and_then(value_to_string)),
            metadata,
        }
    }
}

/// A line of an agent event log.
#[derive(Debug, Default, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub event_type: Option<Value>,
    #[serde(default)]
    pub agent_id: Option<Value>,
    #[serde(default)]
    pub task_id: Option<Value>,
    #[serde(default)]
    pub project_id: Option<Value>,
    #[serde(default)]
    pub board_id: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RawEvent {
    pub fn normalize(self) -> EventRecord {
        let data = match self.data {
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(v) => v,
        };
        let from_data = |key: &str| data.get(key).and_then(value_to_string);
        EventRecord {
            id: opt_string(&self.id).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            timestamp: TimestampField::from_value(self.timestamp.as_ref()).valid(),
            event_type: opt_string(&self.event_type).unwrap_or_else(|| "unknown".to_string()),
            agent_id: opt_string(&self.agent_id),
            task_id: opt_string(&self.task_id),
            project_id: opt_string(&self.project_id).or_else(|| from_data("project_id")),
            board_id: opt_string(&self.board_id).or_else(|| from_data("board_id")),
            data,
        }
    }
}
