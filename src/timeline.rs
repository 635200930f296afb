//! Timeline bounds, task positions and dependency-driven start correction.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::models::record::TaskRecord;

/// Default exponent for [`power_scale`].
pub const DEFAULT_SCALE_EXPONENT: f64 = 0.4;

/// Map a linear position in `[0, 1]` onto a power curve.
///
/// Exponents below 1 stretch the early part of the timeline.
pub fn power_scale(x: f64, exponent: f64) -> f64 {
    if x <= 0.0 {
        0.0
    } else if x >= 1.0 {
        1.0
    } else {
        x.powf(exponent)
    }
}

/// Global time bounds of the displayed tasks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeline {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Whole minutes between `start` and `end`
    pub duration_minutes: i64,
}

impl Timeline {
    /// Bounds over every `created_at` and `updated_at` of `tasks`.
    ///
    /// With no timestamps at all both bounds collapse to `now`.
    pub fn from_tasks(tasks: &[TaskRecord], now: DateTime<Utc>) -> Self {
        let stamps = tasks
            .iter()
            .flat_map(|t| [t.created_at, t.updated_at])
            .flatten();
        let (start, end) = stamps.fold(None, |acc: Option<(DateTime<Utc>, DateTime<Utc>)>, ts| {
            Some(match acc {
                Some((lo, hi)) => (lo.min(ts), hi.max(ts)),
                None => (ts, ts),
            })
        })
        .unwrap_or((now, now));

        Self {
            start,
            end,
            duration_minutes: (end - start).num_minutes(),
        }
    }

    pub fn span_seconds(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }

    /// Linear position of `at` within the bounds, clamped to `[0, 1]`.
    pub fn linear_position(&self, at: Option<DateTime<Utc>>) -> f64 {
        let span = self.span_seconds();
        match at {
            Some(at) if span > 0.0 => {
                let offset = (at - self.start).num_milliseconds() as f64 / 1000.0;
                (offset / span).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    /// `(linear, scaled)` positions for a task.
    pub fn positions(&self, task: &TaskRecord, exponent: f64) -> (f64, f64) {
        let linear = self.linear_position(task.start_time());
        (linear, power_scale(linear, exponent))
    }
}

/// Counts of start times changed by [`correct_start_times`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartCorrections {
    /// Missing start times filled in
    pub synthesized: usize,
    /// Recorded start times moved later
    pub overridden: usize,
}

/// Make every task start no earlier than its dependencies end.
///
/// The end of a dependency is its `completed_at`, else `updated_at`, else
/// `created_at`, looked up in `superset` so dependencies outside the view count.
/// Unknown dependency ids are ignored.
pub fn correct_start_times(
    mut tasks: Vec<TaskRecord>,
    superset: &[TaskRecord],
) -> (Vec<TaskRecord>, StartCorrections) {
    let ends: HashMap<&str, DateTime<Utc>> = superset
        .iter()
        .filter_map(|t| t.end_time().map(|end| (t.id.as_str(), end)))
        .collect();

    let mut corrections = StartCorrections::default();
    for task in &mut tasks {
        let latest = task
            .dependencies
            .iter()
            .filter_map(|dep| ends.get(dep.as_str()).copied())
            .max();
        let Some(latest) = latest else {
            continue;
        };

        match task.started_at {
            None => {
                info!(task = %task.id, start = %latest, "synthesized start time from dependencies");
                task.started_at = Some(latest);
                corrections.synthesized += 1;
            }
            Some(started) if started < latest => {
                warn!(
                    task = %task.id,
                    recorded = %started,
                    corrected = %latest,
                    "task started before its dependencies finished, correcting"
                );
                task.started_at = Some(latest);
                corrections.overridden += 1;
            }
            Some(_) => {}
        }
    }

    (tasks, corrections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::TaskOrigin;
    use chrono::{Duration, TimeZone};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, h, 0, 0).unwrap()
    }

    fn task(id: &str, created: u32, updated: u32) -> TaskRecord {
        let mut t = TaskRecord::new(id, id, TaskOrigin::Subtask);
        t.created_at = Some(at(created));
        t.updated_at = Some(at(updated));
        t
    }

    #[test]
    fn test_power_scale_boundaries() {
        for e in [0.1, 0.4, 1.0, 2.5] {
            assert_eq!(power_scale(0.0, e), 0.0);
            assert_eq!(power_scale(-0.5, e), 0.0);
            assert_eq!(power_scale(1.0, e), 1.0);
            assert_eq!(power_scale(1.5, e), 1.0);
            for x in [0.001, 0.25, 0.5, 0.999] {
                let y = power_scale(x, e);
                assert!(y > 0.0 && y < 1.0, "scale({x}, {e}) = {y}");
            }
        }
    }

    #[test]
    fn test_power_scale_expands_early_positions() {
        assert!(power_scale(0.1, DEFAULT_SCALE_EXPONENT) > 0.1);
    }

    #[test]
    fn test_bounds_from_tasks() {
        let tl = Timeline::from_tasks(&[task("a", 2, 5), task("b", 1, 3)], at(20));
        assert_eq!(tl.start, at(1));
        assert_eq!(tl.end, at(5));
        assert_eq!(tl.duration_minutes, 240);
    }

    #[test]
    fn test_empty_bounds_collapse_to_now() {
        let tl = Timeline::from_tasks(&[], at(7));
        assert_eq!(tl.start, at(7));
        assert_eq!(tl.end, at(7));
        assert_eq!(tl.duration_minutes, 0);
        assert_eq!(tl.linear_position(Some(at(7))), 0.0);
    }

    #[test]
    fn test_duration_truncates_to_minutes() {
        let mut t = task("a", 1, 1);
        t.updated_at = Some(at(1) + Duration::seconds(119));
        let tl = Timeline::from_tasks(&[t], at(9));
        assert_eq!(tl.duration_minutes, 1);
    }

    #[test]
    fn test_positions_use_start_time() {
        let tl = Timeline::from_tasks(&[task("a", 0, 10)], at(12));
        let mut t = task("b", 0, 10);
        assert_eq!(tl.positions(&t, 1.0), (0.0, 0.0));
        t.started_at = Some(at(5));
        let (linear, scaled) = tl.positions(&t, 0.5);
        assert!((linear - 0.5).abs() < 1e-9);
        assert!((scaled - 0.5f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_synthesized_start_equals_dependency_completion() {
        let mut a = task("A", 1, 2);
        a.completed_at = Some(at(3));
        let mut b = task("B", 1, 4);
        b.dependencies = vec!["A".to_string()];

        let superset = vec![a.clone(), b.clone()];
        let (out, corrections) = correct_start_times(vec![a, b], &superset);
        assert_eq!(out[1].started_at, Some(at(3)));
        assert_eq!(corrections, StartCorrections { synthesized: 1, overridden: 0 });
    }

    #[test]
    fn test_early_start_is_overridden_late_start_kept() {
        let dep = task("D", 1, 6);
        let mut early = task("E", 1, 8);
        early.dependencies = vec!["D".to_string()];
        early.started_at = Some(at(2));
        let mut late = task("L", 1, 9);
        late.dependencies = vec!["D".to_string(), "missing".to_string()];
        late.started_at = Some(at(7));

        let superset = vec![dep.clone(), early.clone(), late.clone()];
        let (out, corrections) = correct_start_times(vec![early, late], &superset);
        assert_eq!(out[0].started_at, Some(at(6)));
        assert_eq!(out[1].started_at, Some(at(7)));
        assert_eq!(corrections, StartCorrections { synthesized: 0, overridden: 1 });
    }

    #[test]
    fn test_dependency_outside_view_still_counts() {
        let hidden = task("H", 1, 5);
        let mut visible = task("V", 1, 6);
        visible.dependencies = vec!["H".to_string()];
        let superset = vec![hidden, visible.clone()];
        let (out, _) = correct_start_times(vec![visible], &superset);
        assert_eq!(out[0].started_at, Some(at(5)));
    }
}
