//! The aggregation pipeline driver.
//!
//! [`Aggregator::create_snapshot`] runs one linear pass per call:
//! read sources, resolve tasks, apply the view, correct start times, filter
//! messages, build timeline and denormalized records, detect duplicates, run
//! diagnostics, compute metrics and graphs, then assemble the [`Snapshot`].
//! Nothing is shared between calls except the project-list cache inside
//! [`Sources`] and the version counter.

use chrono::Utc;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::denormalize::{self, AgentDirectory, Lookups};
use crate::diagnostics::{DEFAULT_BOTTLENECK_THRESHOLD, DiagnosticsEngine};
use crate::duplicates::{self, DEFAULT_DUPLICATE_WINDOW};
use crate::matcher::ProjectMatcher;
use crate::metrics;
use crate::models::graph::{communication_graph, dependency_graph};
use crate::models::{ProjectSummary, Snapshot, ViewMode};
use crate::resolver::{LogRefs, TaskResolver};
use crate::storage::{SourcePaths, Sources};
use crate::timeline::{self, DEFAULT_SCALE_EXPONENT, Timeline};
use crate::view::filter_by_view;
use crate::{Error, Result};

/// Default lifetime of the cached project list.
pub const DEFAULT_PROJECT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Tunables for one aggregator instance.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorOptions {
    /// Max numeric distance for fuzzy project matching
    pub fuzzy_tolerance: i64,
    /// `None` disables the project-list cache
    pub project_cache_ttl: Option<Duration>,
    /// Seconds within which repeated messages are duplicates
    pub duplicate_window: f64,
    /// Dependents at which an unfinished task is a bottleneck
    pub bottleneck_threshold: usize,
    /// Exponent used when the caller does not pass one
    pub default_exponent: f64,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            fuzzy_tolerance: ProjectMatcher::DEFAULT_TOLERANCE,
            project_cache_ttl: Some(DEFAULT_PROJECT_CACHE_TTL),
            duplicate_window: DEFAULT_DUPLICATE_WINDOW,
            bottleneck_threshold: DEFAULT_BOTTLENECK_THRESHOLD,
            default_exponent: DEFAULT_SCALE_EXPONENT,
        }
    }
}

/// Builds snapshots from one data root.
///
/// Safe to share across threads; every call reads fresh state from disk.
pub struct Aggregator {
    sources: Sources,
    options: AggregatorOptions,
    version: AtomicU64,
}

impl Aggregator {
    pub fn new(data_root: &Path, options: AggregatorOptions) -> Self {
        let sources = Sources::new(SourcePaths::new(data_root), options.project_cache_ttl);
        Self::with_sources(sources, options)
    }

    /// Use pre-built sources, e.g. with an injected project cache.
    pub fn with_sources(sources: Sources, options: AggregatorOptions) -> Self {
        Self {
            sources,
            options,
            version: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &AggregatorOptions {
        &self.options
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    fn resolver(&self) -> TaskResolver<'_> {
        TaskResolver::new(&self.sources, ProjectMatcher::new(self.options.fuzzy_tolerance))
    }

    /// Build one snapshot.
    ///
    /// Fails only when `exponent` is not a positive finite number. Missing or
    /// malformed sources degrade to empty inputs.
    pub fn create_snapshot(
        &self,
        project_id: Option<&str>,
        view_mode: ViewMode,
        exponent: f64,
    ) -> Result<Snapshot> {
        if !exponent.is_finite() || exponent <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "Timeline scale exponent must be a positive number, got {}",
                exponent
            )));
        }

        let started = Instant::now();
        let now = Utc::now();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        info!(version, project = ?project_id, view = %view_mode, "creating snapshot");

        let projects = self.sources.load_projects();
        let raw_messages = self.sources.load_messages();
        let raw_events = self.sources.load_events();

        let resolved = self.resolver().resolve(
            project_id,
            &projects,
            LogRefs {
                messages: &raw_messages,
                events: &raw_events,
            },
            now,
        );

        let view = filter_by_view(&resolved.tasks, view_mode);
        let (view, corrections) = timeline::correct_start_times(view, &resolved.superset);
        debug!(
            synthesized = corrections.synthesized,
            overridden = corrections.overridden,
            "start time corrections"
        );

        let relevant = denormalize::filter_relevant_messages(raw_messages, &view);
        let directory = AgentDirectory::infer(&view, &relevant);
        let project = project_id.and_then(|id| projects.iter().find(|p| p.id == id));
        let timeline = Timeline::from_tasks(&view, now);

        let lookups = Lookups::new(&resolved.superset, &projects, &directory, project);
        let tasks = denormalize::build_tasks(&view, &lookups, &timeline, exponent, now);
        let view_ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

        let messages = duplicates::mark_duplicates(
            denormalize::build_messages(relevant, &view_ids, &lookups),
            self.options.duplicate_window,
        );
        let agents = metrics::build_agents(&directory, &tasks, &messages);

        let mut timeline_events = denormalize::build_events(raw_events, &view_ids, &lookups);
        timeline_events.extend(DiagnosticsEngine::new(self.options.bottleneck_threshold).run(&tasks));

        let metrics = metrics::compute_metrics(&tasks, &agents, &timeline);

        let (project_name, included_project_ids) = match project {
            Some(p) => (p.name.clone(), vec![p.id.clone()]),
            None => (String::new(), projects.iter().map(|p| p.id.clone()).collect()),
        };

        let snapshot = Snapshot {
            snapshot_id: uuid::Uuid::new_v4().to_string(),
            snapshot_version: version,
            timestamp: now,
            project_id: project_id.map(str::to_string),
            project_name,
            project_filter_applied: project_id.is_some(),
            included_project_ids,
            view_mode,
            task_dependency_graph: dependency_graph(&tasks),
            agent_communication_graph: communication_graph(&messages),
            tasks,
            agents,
            messages,
            timeline_events,
            metrics,
            start_time: timeline.start,
            end_time: timeline.end,
            duration_minutes: timeline.duration_minutes,
            timezone: "UTC".to_string(),
        };

        info!(
            version,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            tasks = snapshot.tasks.len(),
            agents = snapshot.agents.len(),
            messages = snapshot.messages.len(),
            events = snapshot.timeline_events.len(),
            "snapshot created"
        );
        Ok(snapshot)
    }

    /// Snapshot with the configured default exponent.
    pub fn create_default_snapshot(&self, project_id: Option<&str>, view_mode: ViewMode) -> Result<Snapshot> {
        self.create_snapshot(project_id, view_mode, self.options.default_exponent)
    }

    /// Projects that own at least one task, most recently used first.
    pub fn list_projects(&self) -> Vec<ProjectSummary> {
        let projects = self.sources.load_projects();
        let messages = self.sources.load_messages();
        let events = self.sources.load_events();
        let resolver = self.resolver();
        let superset = resolver.load(Utc::now());
        let logs = LogRefs {
            messages: &messages,
            events: &events,
        };

        let mut summaries: Vec<ProjectSummary> = projects
            .iter()
            .filter_map(|project| {
                let (tasks, _) = resolver.scope(superset.clone(), &project.id, &projects, logs);
                if tasks.is_empty() {
                    return None;
                }
                Some(ProjectSummary {
                    id: project.id.clone(),
                    name: project.name.clone(),
                    description: project.description.clone(),
                    created_at: project.created_at,
                    last_used: project.last_used,
                    task_count: tasks.len(),
                })
            })
            .collect();

        summaries.sort_by(|a, b| b.last_used.or(b.created_at).cmp(&a.last_used.or(a.created_at)));
        info!(
            listed = summaries.len(),
            total = projects.len(),
            "listed projects with tasks"
        );
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;
    use serde_json::json;

    fn aggregator(env: &TestEnv) -> Aggregator {
        Aggregator::new(
            env.path(),
            AggregatorOptions {
                project_cache_ttl: None,
                ..AggregatorOptions::default()
            },
        )
    }

    #[test]
    fn test_empty_data_root_yields_degenerate_snapshot() {
        let env = TestEnv::new();
        let snap = aggregator(&env).create_snapshot(None, ViewMode::Subtasks, 0.4).unwrap();
        assert!(snap.tasks.is_empty());
        assert_eq!(snap.agents.len(), 1);
        assert_eq!(snap.start_time, snap.end_time);
        assert_eq!(snap.duration_minutes, 0);
        assert_eq!(snap.timezone, "UTC");
        assert!(!snap.project_filter_applied);
    }

    #[test]
    fn test_rejects_bad_exponent() {
        let env = TestEnv::new();
        let agg = aggregator(&env);
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                agg.create_snapshot(None, ViewMode::All, bad),
                Err(Error::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_versions_increase() {
        let env = TestEnv::new();
        let agg = aggregator(&env);
        let first = agg.create_default_snapshot(None, ViewMode::Subtasks).unwrap();
        let second = agg.create_default_snapshot(None, ViewMode::Subtasks).unwrap();
        assert_eq!(first.snapshot_version, 1);
        assert_eq!(second.snapshot_version, 2);
        assert_ne!(first.snapshot_id, second.snapshot_id);
    }

    #[test]
    fn test_project_metadata() {
        let env = TestEnv::new();
        env.write_projects(&json!({
            "active_project": "p1",
            "p1": {"id": "p1", "name": "One"},
            "p2": {"id": "p2", "name": "Two"}
        }));
        let agg = aggregator(&env);

        let all = agg.create_snapshot(None, ViewMode::All, 0.4).unwrap();
        assert_eq!(all.project_name, "");
        assert_eq!(all.included_project_ids.len(), 2);

        let one = agg.create_snapshot(Some("p1"), ViewMode::All, 0.4).unwrap();
        assert!(one.project_filter_applied);
        assert_eq!(one.project_name, "One");
        assert_eq!(one.included_project_ids, vec!["p1"]);
    }

    #[test]
    fn test_list_projects_omits_empty_and_sorts_recent_first() {
        let env = TestEnv::new();
        env.write_projects(&json!({
            "old": {
                "id": "old", "name": "Old",
                "created_at": "2025-01-01T00:00:00Z",
                "provider_config": {"project_id": "1111111100000000000"}
            },
            "new": {
                "id": "new", "name": "New",
                "created_at": "2025-01-01T00:00:00Z",
                "last_used": "2025-06-01T00:00:00Z",
                "provider_config": {"project_id": "2222222200000000000"}
            },
            "empty": {
                "id": "empty", "name": "Empty",
                "provider_config": {"project_id": "3333333300000000000"}
            }
        }));
        env.write_subtasks(&json!([
            {"id": "1111111100000000005_sub_1", "name": "Old work"},
            {"id": "2222222200000000003_sub_1", "name": "New work"},
            {"id": "2222222200000000003_sub_2", "name": "More new work"}
        ]));

        let listed = aggregator(&env).list_projects();
        let ids: Vec<&str> = listed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(listed[0].task_count, 2);
        assert_eq!(listed[1].task_count, 1);
    }
}
