//! Timing enrichment and the renderability filter.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::models::record::{TaskRecord, TimingRecord};
use crate::storage::find_timing;

/// Apply outcome facts, then completion-event facts, to every task.
///
/// Event timings are applied last and win where both stores know a task.
/// A start time replaces `created_at`/`started_at`, an end time replaces
/// `updated_at`/`completed_at`.
pub fn enrich(
    tasks: Vec<TaskRecord>,
    outcomes: &BTreeMap<String, TimingRecord>,
    completions: &BTreeMap<String, TimingRecord>,
) -> Vec<TaskRecord> {
    let total = tasks.len();
    let mut enriched_count = 0usize;

    let tasks: Vec<TaskRecord> = tasks
        .into_iter()
        .map(|mut task| {
            let mut touched = false;
            if let Some(outcome) = find_timing(outcomes, &task.id) {
                apply_timing(&mut task, outcome);
                touched = true;
            }
            if let Some(timing) = find_timing(completions, &task.id) {
                apply_timing(&mut task, timing);
                touched = true;
            }
            if touched {
                enriched_count += 1;
            }
            task
        })
        .collect();

    info!(
        enriched = enriched_count,
        total,
        outcomes = outcomes.len(),
        completions = completions.len(),
        "enriched tasks with timing data"
    );
    tasks
}

fn apply_timing(task: &mut TaskRecord, timing: &TimingRecord) {
    if let Some(hours) = timing.actual_hours {
        task.actual_hours = hours;
    }
    if let Some(hours) = timing.estimated_hours {
        if task.estimated_hours <= 0.0 {
            task.estimated_hours = hours;
        }
    }
    if let Some(start) = timing.started_at {
        task.created_at = Some(start);
        task.started_at = Some(start);
        task.malformed.retain(|f| *f != "created_at" && *f != "started_at");
    }
    if let Some(end) = timing.completed_at {
        task.updated_at = Some(end);
        task.completed_at = Some(end);
        task.malformed.retain(|f| *f != "updated_at" && *f != "completed_at");
    }
}

/// Keep only tasks that can be placed on a timeline.
///
/// - Tasks with an unparseable timestamp are dropped.
/// - Incomplete tasks are always kept; a missing `created_at` becomes `now`
///   and a missing `updated_at` becomes `created_at`.
/// - Done tasks need both timestamps and either a non-negative span or
///   positive actual hours.
pub fn retain_renderable(tasks: Vec<TaskRecord>, now: DateTime<Utc>) -> Vec<TaskRecord> {
    let total = tasks.len();
    let mut kept = Vec::with_capacity(total);

    for mut task in tasks {
        if let Some(field) = task.malformed.first() {
            info!(task = %task.id, field, "dropping task with unparseable timestamp");
            continue;
        }

        if task.status.is_incomplete() {
            let created = *task.created_at.get_or_insert(now);
            task.updated_at.get_or_insert(created);
            kept.push(task);
            continue;
        }

        match task.duration_seconds() {
            Some(duration) if duration >= 0.0 || task.actual_hours > 0.0 => kept.push(task),
            Some(duration) => {
                debug!(task = %task.id, duration, "dropping task with negative duration");
            }
            None => {
                debug!(task = %task.id, "dropping completed task without timestamps");
            }
        }
    }

    info!(
        kept = kept.len(),
        removed = total - kept.len(),
        "filtered tasks to renderable timing"
    );
    kept
}
