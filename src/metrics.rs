//! Per-agent counters and the snapshot-wide metrics record.

use std::collections::HashMap;

use crate::denormalize::AgentDirectory;
use crate::models::{Agent, Message, MessageType, Metrics, Task, TaskStatus};
use crate::timeline::Timeline;

/// Build one [`Agent`] per directory entry with its task and message counters.
pub fn build_agents(directory: &AgentDirectory, tasks: &[Task], messages: &[Message]) -> Vec<Agent> {
    let mut assigned: HashMap<&str, Vec<&Task>> = HashMap::new();
    for task in tasks {
        if let Some(agent) = task.assigned_agent_id.as_deref() {
            assigned.entry(agent).or_default().push(task);
        }
    }

    directory
        .iter()
        .map(|identity| {
            let own = assigned.get(identity.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            let current: Vec<&Task> = own
                .iter()
                .copied()
                .filter(|t| matches!(t.status, TaskStatus::Todo | TaskStatus::InProgress))
                .collect();
            let completed: Vec<&Task> = own
                .iter()
                .copied()
                .filter(|t| t.status == TaskStatus::Done)
                .collect();

            let total_hours: f64 = completed.iter().map(|t| t.actual_hours).sum();
            let average = if completed.is_empty() {
                0.0
            } else {
                total_hours / completed.len() as f64
            };

            let sent = messages.iter().filter(|m| m.from_agent_id == identity.id);
            let blockers = sent
                .clone()
                .filter(|m| m.message_type == MessageType::Blocker)
                .count();

            Agent {
                id: identity.id.clone(),
                name: identity.name.clone(),
                role: identity.role,
                skills: Vec::new(),
                current_task_ids: current.iter().map(|t| t.id.clone()).collect(),
                current_task_names: current.iter().map(|t| t.name.clone()).collect(),
                completed_task_ids: completed.iter().map(|t| t.id.clone()).collect(),
                completed_tasks_count: completed.len(),
                total_hours_worked: total_hours,
                average_task_duration_hours: average,
                messages_sent: sent.count(),
                messages_received: messages.iter().filter(|m| m.to_agent_id == identity.id).count(),
                blockers_reported: blockers,
            }
        })
        .collect()
}

/// Concurrency statistics from a sweep over task intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Parallelization {
    pub peak: usize,
    pub average: f64,
    /// Observed span over summed durations, in `[0, 1]`
    pub efficiency: f64,
}

/// Sweep `(created, +1)` / `(updated, -1)` events over every task with positive duration.
///
/// At equal instants ends are processed before starts, so back-to-back tasks
/// never count as overlapping.
pub fn parallelization(tasks: &[Task]) -> Parallelization {
    let mut events: Vec<(i64, i32)> = Vec::new();
    let mut summed = 0i64;
    for task in tasks {
        let start = task.created_at.timestamp_millis();
        let end = task.updated_at.timestamp_millis();
        if end > start {
            events.push((start, 1));
            events.push((end, -1));
            summed += end - start;
        }
    }
    if events.is_empty() {
        return Parallelization::default();
    }
    events.sort_unstable();

    let mut running: i64 = 0;
    let mut peak: i64 = 0;
    let mut weighted = 0f64;
    let mut last = events[0].0;
    for &(at, delta) in &events {
        if at > last && running > 0 {
            weighted += (at - last) as f64 * running as f64;
            peak = peak.max(running);
        }
        running += i64::from(delta);
        last = at;
    }

    let span = (events[events.len() - 1].0 - events[0].0) as f64;
    if span <= 0.0 {
        return Parallelization::default();
    }
    Parallelization {
        peak: peak as usize,
        average: weighted / span,
        efficiency: (span / summed as f64).clamp(0.0, 1.0),
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Aggregate metrics for one snapshot. Rates are ratios in `[0, 1]`.
pub fn compute_metrics(tasks: &[Task], agents: &[Agent], timeline: &Timeline) -> Metrics {
    let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
    let total_tasks = tasks.len();
    let completed_tasks = count(TaskStatus::Done);
    let blocked_tasks = count(TaskStatus::Blocked);

    let durations: Vec<f64> = tasks
        .iter()
        .map(Task::duration_seconds)
        .filter(|d| *d > 0.0)
        .map(|d| d / 60.0)
        .collect();
    let average_task_duration_minutes = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    };

    let parallel = parallelization(tasks);

    Metrics {
        total_tasks,
        completed_tasks,
        in_progress_tasks: count(TaskStatus::InProgress),
        blocked_tasks,
        completion_rate: ratio(completed_tasks, total_tasks),
        total_duration_minutes: (timeline.span_seconds() / 60.0).round() as i64,
        average_task_duration_minutes,
        peak_parallel_tasks: parallel.peak,
        average_parallel_tasks: parallel.average,
        parallelization_efficiency: parallel.efficiency,
        total_agents: agents.len(),
        active_agents: agents.iter().filter(|a| !a.current_task_ids.is_empty()).count(),
        tasks_per_agent: ratio(total_tasks, agents.len()),
        total_blockers: agents.iter().map(|a| a.blockers_reported).sum(),
        blocked_task_percentage: ratio(blocked_tasks, total_tasks),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::{MessageRecord, TaskOrigin, TaskRecord};
    use crate::models::{AgentRole, Priority};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::Map;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
    }

    fn task(id: &str, start_h: i64, end_h: i64, status: TaskStatus) -> Task {
        Task {
            id: id.to_string(),
            name: format!("Task {}", id),
            description: String::new(),
            status,
            priority: Priority::Medium,
            progress_percent: 0,
            created_at: base() + Duration::hours(start_h),
            started_at: None,
            completed_at: None,
            updated_at: base() + Duration::hours(end_h),
            estimated_hours: 0.0,
            actual_hours: 0.0,
            parent_task_id: None,
            parent_task_name: None,
            is_subtask: false,
            subtask_index: None,
            project_id: String::new(),
            project_name: String::new(),
            assigned_agent_id: None,
            assigned_agent_name: None,
            assigned_agent_role: None,
            dependency_ids: Vec::new(),
            dependent_task_ids: Vec::new(),
            timeline_linear_position: 0.0,
            timeline_scaled_position: 0.0,
            timeline_scale_exponent: 0.4,
            labels: Vec::new(),
            metadata: Map::new(),
        }
    }

    fn message(from: &str, to: &str, kind: MessageType) -> Message {
        Message {
            id: "m".to_string(),
            timestamp: base(),
            message: String::new(),
            message_type: kind,
            from_agent_id: from.to_string(),
            from_agent_name: from.to_string(),
            to_agent_id: to.to_string(),
            to_agent_name: to.to_string(),
            task_id: None,
            task_name: None,
            parent_message_id: None,
            metadata: Map::new(),
            is_duplicate: false,
            duplicate_group_id: None,
            duplicate_count: 0,
        }
    }

    fn directory(ids: &[&str]) -> AgentDirectory {
        let records: Vec<MessageRecord> = ids
            .iter()
            .map(|id| MessageRecord {
                id: "seed".to_string(),
                timestamp: None,
                content: String::new(),
                message_type: MessageType::StatusUpdate,
                from_agent_id: id.to_string(),
                to_agent_id: String::new(),
                agent_id: None,
                task_id: None,
                parent_message_id: None,
                project_id: None,
                board_id: None,
                metadata: Map::new(),
            })
            .collect();
        AgentDirectory::infer(&[] as &[TaskRecord], &records)
    }

    #[test]
    fn test_serial_tasks() {
        let tasks = vec![
            task("a", 0, 1, TaskStatus::Done),
            task("b", 1, 2, TaskStatus::Done),
        ];
        let p = parallelization(&tasks);
        assert_eq!(p.peak, 1);
        assert!((p.average - 1.0).abs() < 1e-9);
        assert!((p.efficiency - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fully_overlapping_tasks() {
        let tasks = vec![
            task("a", 0, 2, TaskStatus::Done),
            task("b", 0, 2, TaskStatus::Done),
            task("c", 0, 2, TaskStatus::Done),
        ];
        let p = parallelization(&tasks);
        assert_eq!(p.peak, 3);
        assert!((p.average - 3.0).abs() < 1e-9);
        assert!((p.efficiency - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_duration_tasks_are_ignored() {
        let tasks = vec![task("a", 3, 3, TaskStatus::Todo)];
        assert_eq!(parallelization(&tasks), Parallelization::default());
        assert_eq!(parallelization(&[]), Parallelization::default());
    }

    #[test]
    fn test_efficiency_stays_in_unit_interval() {
        let layouts: [&[(i64, i64)]; 4] = [
            &[(0, 10), (1, 2), (3, 4), (5, 6)],
            &[(0, 1), (5, 6)],
            &[(0, 5), (0, 5), (4, 9)],
            &[(2, 3)],
        ];
        for layout in layouts {
            let tasks: Vec<Task> = layout
                .iter()
                .enumerate()
                .map(|(i, (s, e))| task(&i.to_string(), *s, *e, TaskStatus::Done))
                .collect();
            let p = parallelization(&tasks);
            assert!((0.0..=1.0).contains(&p.efficiency), "{:?} -> {}", layout, p.efficiency);
        }
    }

    #[test]
    fn test_build_agents_counters() {
        let mut done = task("1", 0, 2, TaskStatus::Done);
        done.assigned_agent_id = Some("agent-1".to_string());
        done.actual_hours = 3.0;
        let mut doing = task("2", 0, 2, TaskStatus::InProgress);
        doing.assigned_agent_id = Some("agent-1".to_string());
        let mut blocked = task("3", 0, 2, TaskStatus::Blocked);
        blocked.assigned_agent_id = Some("agent-1".to_string());

        let messages = vec![
            message("agent-1", "system", MessageType::Blocker),
            message("agent-1", "system", MessageType::Question),
            message("system", "agent-1", MessageType::Answer),
        ];
        let agents = build_agents(&directory(&["agent-1"]), &[done, doing, blocked], &messages);
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].role, AgentRole::System);
        assert_eq!(agents[0].messages_sent, 1);

        let worker = &agents[1];
        assert_eq!(worker.current_task_ids, vec!["2"]);
        assert_eq!(worker.current_task_names, vec!["Task 2"]);
        assert_eq!(worker.completed_task_ids, vec!["1"]);
        assert_eq!(worker.completed_tasks_count, 1);
        assert_eq!(worker.total_hours_worked, 3.0);
        assert_eq!(worker.average_task_duration_hours, 3.0);
        assert_eq!(worker.messages_sent, 2);
        assert_eq!(worker.messages_received, 1);
        assert_eq!(worker.blockers_reported, 1);
    }

    #[test]
    fn test_compute_metrics() {
        let mut doing = task("2", 1, 3, TaskStatus::InProgress);
        doing.assigned_agent_id = Some("agent-1".to_string());
        let tasks = vec![
            task("1", 0, 2, TaskStatus::Done),
            doing,
            task("3", 4, 4, TaskStatus::Blocked),
            task("4", 0, 1, TaskStatus::Todo),
        ];
        let agents = build_agents(&directory(&["agent-1"]), &tasks, &[]);
        let timeline = Timeline {
            start: base(),
            end: base() + Duration::hours(4),
            duration_minutes: 240,
        };
        let m = compute_metrics(&tasks, &agents, &timeline);
        assert_eq!(m.total_tasks, 4);
        assert_eq!(m.completed_tasks, 1);
        assert_eq!(m.in_progress_tasks, 1);
        assert_eq!(m.blocked_tasks, 1);
        assert_eq!(m.completion_rate, 0.25);
        assert_eq!(m.blocked_task_percentage, 0.25);
        assert_eq!(m.total_duration_minutes, 240);
        assert!((m.average_task_duration_minutes - 100.0).abs() < 1e-9);
        assert_eq!(m.peak_parallel_tasks, 2);
        assert_eq!(m.total_agents, 2);
        assert_eq!(m.active_agents, 1);
        assert_eq!(m.tasks_per_agent, 2.0);
    }

    #[test]
    fn test_empty_metrics_are_zero() {
        let timeline = Timeline::from_tasks(&[], base());
        let m = compute_metrics(&[], &[], &timeline);
        assert_eq!(m, Metrics::default());
    }

    #[test]
    fn test_agent_without_assignments_has_empty_counters() {
        let dir = AgentDirectory::infer(&[TaskRecord::new("x", "x", TaskOrigin::Subtask)], &[]);
        let agents = build_agents(&dir, &[], &[]);
        assert_eq!(agents.len(), 1);
        assert!(agents[0].current_task_ids.is_empty());
    }
}
