//! Synthetic timeline events for structural problems in the task set.
//!
//! Every finding is an [`Event`] whose type carries the `diagnostic:` prefix and
//! whose data holds `severity`, `description` and `recommendation` plus
//! detector-specific fields.

use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::info;

use crate::models::graph::TaskGraph;
use crate::models::{Event, Severity, Task, TaskStatus};

/// Default number of dependents at which an unfinished task is a bottleneck.
pub const DEFAULT_BOTTLENECK_THRESHOLD: usize = 3;

/// Runs every detector over a denormalized task list.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsEngine {
    bottleneck_threshold: usize,
}

impl Default for DiagnosticsEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BOTTLENECK_THRESHOLD)
    }
}

impl DiagnosticsEngine {
    pub fn new(bottleneck_threshold: usize) -> Self {
        Self {
            bottleneck_threshold: bottleneck_threshold.max(1),
        }
    }

    /// Zombies, bottlenecks, cycles, then redundant edges.
    pub fn run(&self, tasks: &[Task]) -> Vec<Event> {
        let graph = TaskGraph::from_tasks(tasks);
        let mut events = zombie_tasks(tasks);
        events.extend(bottlenecks(tasks, self.bottleneck_threshold));
        events.extend(circular_dependencies(tasks, &graph));
        events.extend(redundant_dependencies(tasks, &graph));
        info!(count = events.len(), "generated diagnostic events");
        events
    }
}

fn payload(severity: Severity, description: String, recommendation: &str) -> Value {
    json!({
        "severity": severity,
        "description": description,
        "recommendation": recommendation,
    })
}

fn with_fields(mut data: Value, fields: Value) -> Value {
    if let (Value::Object(target), Value::Object(extra)) = (&mut data, fields) {
        target.extend(extra);
    }
    data
}

/// In-progress tasks nobody is assigned to.
pub fn zombie_tasks(tasks: &[Task]) -> Vec<Event> {
    tasks
        .iter()
        .filter(|t| t.status == TaskStatus::InProgress && t.assigned_agent_id.is_none())
        .map(|task| Event {
            id: format!("diagnostic_zombie_{}", task.id),
            timestamp: task.updated_at,
            event_type: "diagnostic:zombie_task".to_string(),
            agent_id: None,
            agent_name: None,
            task_id: Some(task.id.clone()),
            task_name: Some(task.name.clone()),
            data: payload(
                Severity::High,
                format!("Task '{}' is marked IN_PROGRESS but has no assigned agent", task.name),
                "Reset to TODO status or assign to an available agent",
            ),
        })
        .collect()
}

/// Unfinished tasks that at least `threshold` tasks depend on.
///
/// Dependents are counted per edge, in the order dependencies first appear.
pub fn bottlenecks(tasks: &[Task], threshold: usize) -> Vec<Event> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for dep in tasks.iter().flat_map(|t| t.dependency_ids.iter()) {
        let count = counts.entry(dep.as_str()).or_insert(0);
        if *count == 0 {
            order.push(dep);
        }
        *count += 1;
    }

    order
        .into_iter()
        .filter_map(|id| {
            let count = counts[id];
            let task = by_id.get(id)?;
            if count < threshold || task.status == TaskStatus::Done {
                return None;
            }
            Some(Event {
                id: format!("diagnostic_bottleneck_{}", task.id),
                timestamp: task.updated_at,
                event_type: "diagnostic:bottleneck".to_string(),
                agent_id: task.assigned_agent_id.clone(),
                agent_name: task.assigned_agent_name.clone(),
                task_id: Some(task.id.clone()),
                task_name: Some(task.name.clone()),
                data: with_fields(
                    payload(
                        Severity::Medium,
                        format!("Task '{}' is blocking {} other tasks", task.name, count),
                        &format!("Prioritize completing this task to unblock {} tasks", count),
                    ),
                    json!({ "blocks_count": count }),
                ),
            })
        })
        .collect()
}

/// One event per distinct dependency cycle.
pub fn circular_dependencies(tasks: &[Task], graph: &TaskGraph) -> Vec<Event> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    graph
        .find_cycles()
        .into_iter()
        .filter_map(|cycle| {
            let members: Vec<&Task> = cycle.iter().filter_map(|id| by_id.get(id.as_str()).copied()).collect();
            let latest = members.iter().map(|t| t.updated_at).max()?;
            let names: Vec<&str> = cycle
                .iter()
                .take(3)
                .filter_map(|id| by_id.get(id.as_str()).map(|t| t.name.as_str()))
                .collect();
            let id_suffix = cycle.iter().take(2).cloned().collect::<Vec<_>>().join("_");

            Some(Event {
                id: format!("diagnostic_circular_{}", id_suffix),
                timestamp: latest,
                event_type: "diagnostic:circular_dependency".to_string(),
                agent_id: None,
                agent_name: None,
                task_id: cycle.first().cloned(),
                task_name: None,
                data: with_fields(
                    payload(
                        Severity::Critical,
                        format!("Circular dependency detected: {}...", names.join(" → ")),
                        "Break the cycle by removing one dependency link",
                    ),
                    json!({ "cycle_length": cycle.len(), "cycle": cycle }),
                ),
            })
        })
        .collect()
}

/// Direct dependencies that are also reached through another dependency.
///
/// Only tasks with two or more direct dependencies are examined.
pub fn redundant_dependencies(tasks: &[Task], graph: &TaskGraph) -> Vec<Event> {
    let mut events = Vec::new();
    for task in tasks.iter().filter(|t| t.dependency_ids.len() >= 2) {
        let Some(node) = graph.index_of(&task.id) else {
            continue;
        };
        for dep in graph.redundant_dependencies(node) {
            let dep_id = graph.id(dep);
            let Some(dep_task) = tasks.iter().find(|t| t.id == dep_id) else {
                continue;
            };
            events.push(Event {
                id: format!("diagnostic_redundant_{}_{}", task.id, dep_id),
                timestamp: task.updated_at,
                event_type: "diagnostic:redundant_dependency".to_string(),
                agent_id: None,
                agent_name: None,
                task_id: Some(task.id.clone()),
                task_name: Some(task.name.clone()),
                data: with_fields(
                    payload(
                        Severity::Low,
                        format!(
                            "Task '{}' has redundant dependency on '{}'",
                            task.name, dep_task.name
                        ),
                        "Remove redundant dependency to simplify graph",
                    ),
                    json!({
                        "redundant_dependency_id": dep_id,
                        "redundant_dependency_name": dep_task.name,
                    }),
                ),
            });
        }
    }
    events
}
