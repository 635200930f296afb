//! Project-scoped task filtering.

use std::collections::HashSet;
use tracing::{info, warn};

use crate::matcher::{ProjectMatcher, correlation_prefix};
use crate::models::Project;
use crate::models::record::{EventRecord, MessageRecord, TaskOrigin, TaskRecord};

/// Why tasks were kept when a project filter was applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeReport {
    /// Subtasks whose id correlates with the project
    pub subtasks: usize,
    /// Parents referenced by a log line carrying the project's correlation id
    pub parents_from_logs: usize,
    /// Parents of retained subtasks
    pub parents_from_subtasks: usize,
    /// Parents named as a dependency of a retained task
    pub parents_from_dependencies: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParentReason {
    Log,
    Child,
    Dependency,
}

/// Log lines that may reference tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRefs<'a> {
    pub messages: &'a [MessageRecord],
    pub events: &'a [EventRecord],
}

/// Restrict tasks to one project.
///
/// Returns `None` for the report when the filter could not be applied (the
/// project is unknown or has no usable correlation ids); every task is kept in
/// that case.
pub fn scope_to_project(
    tasks: Vec<TaskRecord>,
    project_id: &str,
    project: Option<&Project>,
    matcher: &ProjectMatcher,
    logs: LogRefs<'_>,
) -> (Vec<TaskRecord>, Option<ScopeReport>) {
    let Some(project) = project else {
        warn!(project = project_id, "project not found, returning all tasks");
        return (tasks, None);
    };
    let correlation: Vec<&str> = project
        .correlation_ids()
        .into_iter()
        .filter(|id| correlation_prefix(id).is_some())
        .collect();
    if correlation.is_empty() {
        warn!(project = project_id, "project has no usable correlation ids, returning all tasks");
        return (tasks, None);
    }

    let mut report = ScopeReport::default();
    let mut keep = vec![false; tasks.len()];

    for (idx, task) in tasks.iter().enumerate() {
        if task.origin == TaskOrigin::Subtask && matcher.matches_correlation(&task.id, &correlation) {
            keep[idx] = true;
            report.subtasks += 1;
        }
    }

    let log_refs = referenced_by_logs(&correlation, matcher, logs);
    let parent_refs: HashSet<&str> = tasks
        .iter()
        .zip(&keep)
        .filter(|(_, kept)| **kept)
        .filter_map(|(t, _)| t.parent_task_id.as_deref())
        .collect();

    // Parents pulled in by logs or children, decided before dependency references
    let mut parent_reason: Vec<Option<ParentReason>> = vec![None; tasks.len()];
    for (idx, task) in tasks.iter().enumerate() {
        if task.origin != TaskOrigin::Metadata {
            continue;
        }
        if log_refs.contains(task.id.as_str()) {
            parent_reason[idx] = Some(ParentReason::Log);
        } else if parent_refs.contains(task.id.as_str()) {
            parent_reason[idx] = Some(ParentReason::Child);
        }
    }

    let dependency_refs: HashSet<&str> = tasks
        .iter()
        .enumerate()
        .filter(|(idx, _)| keep[*idx] || parent_reason[*idx].is_some())
        .flat_map(|(_, t)| t.dependencies.iter().map(String::as_str))
        .collect();
    for (idx, task) in tasks.iter().enumerate() {
        if task.origin == TaskOrigin::Metadata
            && parent_reason[idx].is_none()
            && dependency_refs.contains(task.id.as_str())
        {
            parent_reason[idx] = Some(ParentReason::Dependency);
        }
    }

    for (idx, reason) in parent_reason.iter().enumerate() {
        match reason {
            Some(ParentReason::Log) => report.parents_from_logs += 1,
            Some(ParentReason::Child) => report.parents_from_subtasks += 1,
            Some(ParentReason::Dependency) => report.parents_from_dependencies += 1,
            None => continue,
        }
        keep[idx] = true;
    }

    let total = tasks.len();
    let scoped: Vec<TaskRecord> = tasks
        .into_iter()
        .zip(keep)
        .filter_map(|(task, kept)| kept.then_some(task))
        .collect();

    info!(
        project = project_id,
        kept = scoped.len(),
        total,
        subtasks = report.subtasks,
        parents_from_logs = report.parents_from_logs,
        parents_from_subtasks = report.parents_from_subtasks,
        parents_from_dependencies = report.parents_from_dependencies,
        "scoped tasks to project"
    );
    (scoped, Some(report))
}

/// Task ids named by log lines whose project or board id correlates with the project.
fn referenced_by_logs<'a>(
    correlation: &[&str],
    matcher: &ProjectMatcher,
    logs: LogRefs<'a>,
) -> HashSet<&'a str> {
    let from_messages = logs
        .messages
        .iter()
        .filter(|m| correlates(m.correlation_ids(), correlation, matcher))
        .filter_map(|m| m.task_id.as_deref());
    let from_events = logs
        .events
        .iter()
        .filter(|e| correlates(e.correlation_ids(), correlation, matcher))
        .filter_map(|e| e.task_id.as_deref());
    from_messages.chain(from_events).collect()
}

fn correlates<'s>(
    mut ids: impl Iterator<Item = &'s str>,
    correlation: &[&str],
    matcher: &ProjectMatcher,
) -> bool {
    ids.any(|id| correlation.contains(&id) || matcher.matches_correlation(id, correlation))
}
