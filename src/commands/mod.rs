//! Command implementations for the `cato` binary.

use serde::Serialize;
use std::fmt::Write as _;

use crate::Result;
use crate::models::{ProjectSummary, Snapshot, ViewMode};
use crate::snapshot::Aggregator;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json_or_error<T: Serialize>(value: &T, pretty: bool) -> String {
    let encoded = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    encoded.unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

/// Result of `cato snapshot`.
pub struct SnapshotResult {
    pub snapshot: Snapshot,
    pub pretty: bool,
}

impl Output for SnapshotResult {
    fn to_json(&self) -> String {
        json_or_error(&self.snapshot, self.pretty)
    }

    fn to_human(&self) -> String {
        let s = &self.snapshot;
        let m = &s.metrics;
        let mut out = String::new();
        let scope = if s.project_name.is_empty() {
            "all projects".to_string()
        } else {
            s.project_name.clone()
        };
        let _ = writeln!(out, "Snapshot v{} ({}, {} view)", s.snapshot_version, scope, s.view_mode);
        let _ = writeln!(
            out,
            "  Timeline: {} -> {} ({} min)",
            s.start_time.to_rfc3339(),
            s.end_time.to_rfc3339(),
            s.duration_minutes
        );
        let _ = writeln!(
            out,
            "  Tasks: {} total, {} done, {} in progress, {} blocked ({:.0}% complete)",
            m.total_tasks,
            m.completed_tasks,
            m.in_progress_tasks,
            m.blocked_tasks,
            m.completion_rate * 100.0
        );
        let _ = writeln!(
            out,
            "  Agents: {} ({} active), Messages: {}, Events: {}",
            m.total_agents,
            m.active_agents,
            s.messages.len(),
            s.timeline_events.len()
        );
        let _ = writeln!(
            out,
            "  Parallelism: peak {}, average {:.2}, efficiency {:.2}",
            m.peak_parallel_tasks, m.average_parallel_tasks, m.parallelization_efficiency
        );

        let diagnostics: Vec<_> = s
            .timeline_events
            .iter()
            .filter(|e| e.event_type.starts_with("diagnostic:"))
            .collect();
        if !diagnostics.is_empty() {
            let _ = writeln!(out, "  Diagnostics:");
            for event in diagnostics {
                let severity = event.data["severity"].as_str().unwrap_or("?");
                let description = event.data["description"].as_str().unwrap_or("");
                let _ = writeln!(out, "    [{}] {}", severity, description);
            }
        }
        out.trim_end().to_string()
    }
}

/// Result of `cato projects`.
#[derive(Serialize)]
pub struct ProjectList {
    pub projects: Vec<ProjectSummary>,
}

impl Output for ProjectList {
    fn to_json(&self) -> String {
        json_or_error(self, false)
    }

    fn to_human(&self) -> String {
        if self.projects.is_empty() {
            return "No projects with tasks.".to_string();
        }
        let mut out = format!("{} project(s):", self.projects.len());
        for p in &self.projects {
            let _ = write!(out, "\n  {} {} ({} tasks)", p.id, p.name, p.task_count);
        }
        out
    }
}

/// Build one snapshot. `exponent` falls back to the configured default.
pub fn snapshot(
    aggregator: &Aggregator,
    project: Option<&str>,
    view: ViewMode,
    exponent: Option<f64>,
    pretty: bool,
) -> Result<SnapshotResult> {
    let exponent = exponent.unwrap_or(aggregator.options().default_exponent);
    let snapshot = aggregator.create_snapshot(project, view, exponent)?;
    Ok(SnapshotResult { snapshot, pretty })
}

/// List projects with tasks.
pub fn projects(aggregator: &Aggregator) -> Result<ProjectList> {
    Ok(ProjectList {
        projects: aggregator.list_projects(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::AggregatorOptions;
    use crate::test_utils::TestEnv;

    #[test]
    fn test_snapshot_outputs() {
        let env = TestEnv::new();
        let aggregator = Aggregator::new(env.path(), AggregatorOptions::default());
        let result = snapshot(&aggregator, None, ViewMode::Subtasks, None, false).unwrap();
        assert_eq!(result.snapshot.tasks.first().map(|t| t.timeline_scale_exponent), None);

        let json: serde_json::Value = serde_json::from_str(&result.to_json()).unwrap();
        assert_eq!(json["snapshot_version"], 1);
        assert_eq!(json["timezone"], "UTC");
        assert!(result.to_human().starts_with("Snapshot v1 (all projects, subtasks view)"));
    }

    #[test]
    fn test_snapshot_rejects_bad_exponent() {
        let env = TestEnv::new();
        let aggregator = Aggregator::new(env.path(), AggregatorOptions::default());
        assert!(snapshot(&aggregator, None, ViewMode::All, Some(-2.0), false).is_err());
    }

    #[test]
    fn test_empty_project_list() {
        let env = TestEnv::new();
        let aggregator = Aggregator::new(env.path(), AggregatorOptions::default());
        let list = projects(&aggregator).unwrap();
        assert_eq!(list.to_json(), r#"{"projects":[]}"#);
        assert_eq!(list.to_human(), "No projects with tasks.");
    }
}
