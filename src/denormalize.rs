//! Embedding parent, project and agent identity into output records.
//!
//! Lookups for parent and task names go through the full task superset, so a
//! subtask always finds its parent's name even when the parent is not shown.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::models::record::{EventRecord, MessageRecord, TaskRecord};
use crate::models::{AgentRole, Event, Message, Project, Task, TaskStatus};
use crate::storage::records::SYSTEM_AGENT_ID;
use crate::timeline::Timeline;

/// Display name of the orchestrator agent.
pub const SYSTEM_AGENT_NAME: &str = "Marcus";

/// Display identity of one inferred agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
}

impl AgentIdentity {
    /// `system` and `marcus` (any case) are the orchestrator; everyone else is an agent.
    pub fn from_id(id: &str) -> Self {
        if id.eq_ignore_ascii_case("system") || id.eq_ignore_ascii_case("marcus") {
            Self {
                id: id.to_string(),
                name: SYSTEM_AGENT_NAME.to_string(),
                role: AgentRole::System,
            }
        } else {
            Self {
                id: id.to_string(),
                name: id.to_string(),
                role: AgentRole::Agent,
            }
        }
    }
}

/// Agents inferred from task assignees and message participants, in discovery order.
///
/// The system agent is always present and always first.
#[derive(Debug, Clone)]
pub struct AgentDirectory {
    agents: Vec<AgentIdentity>,
    index: HashMap<String, usize>,
}

impl AgentDirectory {
    pub fn infer(tasks: &[TaskRecord], messages: &[MessageRecord]) -> Self {
        let mut directory = Self {
            agents: Vec::new(),
            index: HashMap::new(),
        };
        directory.insert(SYSTEM_AGENT_ID);
        for id in tasks.iter().filter_map(|t| t.agent_id.as_deref()) {
            directory.insert(id);
        }
        for message in messages {
            directory.insert(&message.from_agent_id);
            directory.insert(&message.to_agent_id);
            if let Some(id) = message.agent_id.as_deref() {
                directory.insert(id);
            }
        }
        info!(count = directory.len(), "inferred agents");
        directory
    }

    fn insert(&mut self, id: &str) {
        if id.is_empty() || self.index.contains_key(id) {
            return;
        }
        self.index.insert(id.to_string(), self.agents.len());
        self.agents.push(AgentIdentity::from_id(id));
    }

    pub fn get(&self, id: &str) -> Option<&AgentIdentity> {
        self.index.get(id).map(|&idx| &self.agents[idx])
    }

    /// Display name for `id`, falling back to the id itself.
    pub fn name_of(&self, id: &str) -> String {
        self.get(id)
            .map(|a| a.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentIdentity> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Keep messages relevant to the displayed tasks.
///
/// A message is kept when it names a displayed task, or when its sender or
/// recipient is an agent working on displayed tasks or talking about them.
pub fn filter_relevant_messages(messages: Vec<MessageRecord>, view: &[TaskRecord]) -> Vec<MessageRecord> {
    let task_ids: HashSet<&str> = view.iter().map(|t| t.id.as_str()).collect();
    let about_view = |m: &MessageRecord| m.task_id.as_deref().is_some_and(|id| task_ids.contains(id));

    let mut agents: HashSet<String> = view.iter().filter_map(|t| t.agent_id.clone()).collect();
    for message in messages.iter().filter(|m| about_view(m)) {
        agents.insert(message.from_agent_id.clone());
        agents.insert(message.to_agent_id.clone());
    }

    let total = messages.len();
    let relevant: Vec<MessageRecord> = messages
        .into_iter()
        .filter(|m| about_view(m) || agents.contains(&m.from_agent_id) || agents.contains(&m.to_agent_id))
        .collect();
    info!(
        kept = relevant.len(),
        total,
        agents = agents.len(),
        "filtered messages to displayed tasks"
    );
    relevant
}

/// Derived completion percentage.
///
/// In-progress work reports its hour ratio capped at 90, or 50 without hours.
pub fn progress_percent(task: &TaskRecord) -> u8 {
    match task.status {
        TaskStatus::Done => 100,
        TaskStatus::InProgress => {
            if task.estimated_hours > 0.0 && task.actual_hours > 0.0 {
                (task.actual_hours / task.estimated_hours * 100.0).min(90.0) as u8
            } else {
                50
            }
        }
        TaskStatus::Todo | TaskStatus::Blocked => 0,
    }
}

/// Lookup tables shared by every builder in one snapshot.
pub struct Lookups<'a> {
    pub tasks: HashMap<&'a str, &'a TaskRecord>,
    pub projects: HashMap<&'a str, &'a Project>,
    pub agents: &'a AgentDirectory,
    /// Attributed to tasks that carry no project id of their own
    pub default_project: Option<&'a Project>,
}

impl<'a> Lookups<'a> {
    pub fn new(
        superset: &'a [TaskRecord],
        projects: &'a [Project],
        agents: &'a AgentDirectory,
        default_project: Option<&'a Project>,
    ) -> Self {
        Self {
            tasks: superset.iter().map(|t| (t.id.as_str(), t)).collect(),
            projects: projects.iter().map(|p| (p.id.as_str(), p)).collect(),
            agents,
            default_project,
        }
    }

    fn task_name(&self, id: &str) -> Option<String> {
        self.tasks.get(id).map(|t| t.name.clone())
    }
}

/// Build output tasks with positions and reverse dependency links.
pub fn build_tasks(
    view: &[TaskRecord],
    lookups: &Lookups<'_>,
    timeline: &Timeline,
    exponent: f64,
    now: DateTime<Utc>,
) -> Vec<Task> {
    let mut tasks: Vec<Task> = view
        .iter()
        .map(|record| build_task(record, lookups, timeline, exponent, now))
        .collect();
    fill_dependents(&mut tasks);
    tasks
}

fn build_task(
    record: &TaskRecord,
    lookups: &Lookups<'_>,
    timeline: &Timeline,
    exponent: f64,
    now: DateTime<Utc>,
) -> Task {
    let (linear, scaled) = timeline.positions(record, exponent);

    let project = record
        .project_id
        .as_deref()
        .and_then(|id| lookups.projects.get(id).copied())
        .or(lookups.default_project);
    let project_id = record
        .project_id
        .clone()
        .or_else(|| lookups.default_project.map(|p| p.id.clone()))
        .unwrap_or_default();

    let agent = record.agent_id.as_deref().and_then(|id| lookups.agents.get(id));
    let created_at = record.created_at.unwrap_or(now);

    Task {
        id: record.id.clone(),
        name: record.name.clone(),
        description: record.description.clone(),
        status: record.status,
        priority: record.priority,
        progress_percent: progress_percent(record),
        created_at,
        started_at: record.started_at,
        completed_at: record.completed_at,
        updated_at: record.updated_at.unwrap_or(created_at),
        estimated_hours: record.estimated_hours,
        actual_hours: record.actual_hours,
        parent_task_id: record.parent_task_id.clone(),
        parent_task_name: record
            .parent_task_id
            .as_deref()
            .and_then(|id| lookups.task_name(id)),
        is_subtask: record.is_subtask(),
        subtask_index: record.subtask_index,
        project_id,
        project_name: project.map(|p| p.name.clone()).unwrap_or_default(),
        assigned_agent_id: record.agent_id.clone(),
        assigned_agent_name: agent.map(|a| a.name.clone()),
        assigned_agent_role: agent.map(|a| a.role),
        dependency_ids: record.dependencies.clone(),
        dependent_task_ids: Vec::new(),
        timeline_linear_position: linear,
        timeline_scaled_position: scaled,
        timeline_scale_exponent: exponent,
        labels: record.labels.clone(),
        metadata: record.metadata.clone(),
    }
}

/// Invert every dependency edge whose target is in `tasks`.
fn fill_dependents(tasks: &mut [Task]) {
    let index: HashMap<String, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.clone(), i))
        .collect();

    let mut edges: Vec<(usize, String)> = Vec::new();
    for task in tasks.iter() {
        for dep in &task.dependency_ids {
            if let Some(&target) = index.get(dep) {
                edges.push((target, task.id.clone()));
            }
        }
    }
    for (target, dependent) in edges {
        tasks[target].dependent_task_ids.push(dependent);
    }
}

/// Build output messages for the displayed tasks.
///
/// Messages about tasks outside `view_ids` and messages without a timestamp are dropped.
pub fn build_messages(
    records: Vec<MessageRecord>,
    view_ids: &HashSet<&str>,
    lookups: &Lookups<'_>,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(records.len());
    for record in records {
        if record.task_id.as_deref().is_some_and(|id| !view_ids.contains(id)) {
            continue;
        }
        let Some(timestamp) = record.timestamp else {
            debug!(message = %record.id, "dropping message without timestamp");
            continue;
        };
        messages.push(Message {
            timestamp,
            message: record.content,
            message_type: record.message_type,
            from_agent_name: lookups.agents.name_of(&record.from_agent_id),
            to_agent_name: lookups.agents.name_of(&record.to_agent_id),
            task_name: record.task_id.as_deref().and_then(|id| lookups.task_name(id)),
            id: record.id,
            from_agent_id: record.from_agent_id,
            to_agent_id: record.to_agent_id,
            task_id: record.task_id,
            parent_message_id: record.parent_message_id,
            metadata: record.metadata,
            is_duplicate: false,
            duplicate_group_id: None,
            duplicate_count: 0,
        });
    }
    messages
}

/// Build output events for the displayed tasks, with the same drop rules as messages.
pub fn build_events(
    records: Vec<EventRecord>,
    view_ids: &HashSet<&str>,
    lookups: &Lookups<'_>,
) -> Vec<Event> {
    records
        .into_iter()
        .filter(|r| r.task_id.as_deref().is_none_or(|id| view_ids.contains(id)))
        .filter_map(|record| {
            let Some(timestamp) = record.timestamp else {
                debug!(event = %record.id, "dropping event without timestamp");
                return None;
            };
            Some(Event {
                id: record.id,
                timestamp,
                event_type: record.event_type,
                agent_name: record
                    .agent_id
                    .as_deref()
                    .and_then(|id| lookups.agents.get(id))
                    .map(|a| a.name.clone()),
                agent_id: record.agent_id,
                task_name: record.task_id.as_deref().and_then(|id| lookups.task_name(id)),
                task_id: record.task_id,
                data: record.data,
            })
        })
        .collect()
}
