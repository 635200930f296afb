//! Task resolution: one coherent task list per aggregation call.
//!
//! The passes run in a fixed order, each taking the previous task list by value:
//!
//! 1. load parent tasks (metadata store) and subtasks (file store), merged by id
//! 2. [`timing::enrich`] with outcome and completion-event facts
//! 3. [`timing::retain_renderable`] drops tasks that cannot be placed on a timeline
//! 4. [`dependencies::resolve_slugs`] canonicalizes dependency references
//! 5. [`dependencies::inherit_parent_dependencies`] while parents are still present
//! 6. [`scope::scope_to_project`] when a project filter is given

pub mod dependencies;
pub mod scope;
pub mod timing;

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

use crate::matcher::ProjectMatcher;
use crate::models::Project;
use crate::models::record::TaskRecord;
use crate::storage::Sources;

pub use scope::{LogRefs, ScopeReport};

/// Output of task resolution.
#[derive(Debug, Clone)]
pub struct ResolvedTasks {
    /// Every task after repair, before project scoping. Used for name and timing lookups.
    pub superset: Vec<TaskRecord>,
    /// Tasks in scope for the request
    pub tasks: Vec<TaskRecord>,
    /// Present when a project filter was actually applied
    pub scope: Option<ScopeReport>,
}

/// Reads both task stores and runs the resolution passes.
pub struct TaskResolver<'a> {
    sources: &'a Sources,
    matcher: ProjectMatcher,
}

impl<'a> TaskResolver<'a> {
    pub fn new(sources: &'a Sources, matcher: ProjectMatcher) -> Self {
        Self { sources, matcher }
    }

    /// Load, enrich, filter and repair every task, independent of any project.
    pub fn load(&self, now: DateTime<Utc>) -> Vec<TaskRecord> {
        let outcomes = self.sources.load_outcomes();
        let completions = self.sources.load_completion_timings();

        let merged = merge(
            self.sources.load_parent_tasks(&outcomes),
            self.sources.load_subtasks(),
        );
        let enriched = timing::enrich(merged, &outcomes, &completions);
        let renderable = timing::retain_renderable(enriched, now);
        let resolved = dependencies::resolve_slugs(renderable);
        dependencies::inherit_parent_dependencies(resolved)
    }

    /// Restrict an already loaded task list to one project.
    pub fn scope(
        &self,
        tasks: Vec<TaskRecord>,
        project_id: &str,
        projects: &[Project],
        logs: LogRefs<'_>,
    ) -> (Vec<TaskRecord>, Option<ScopeReport>) {
        let project = projects.iter().find(|p| p.id == project_id);
        scope::scope_to_project(tasks, project_id, project, &self.matcher, logs)
    }

    /// Full resolution for one request.
    pub fn resolve(
        &self,
        project_id: Option<&str>,
        projects: &[Project],
        logs: LogRefs<'_>,
        now: DateTime<Utc>,
    ) -> ResolvedTasks {
        let superset = self.load(now);
        let (tasks, scope) = match project_id {
            Some(id) => self.scope(superset.clone(), id, projects, logs),
            None => (superset.clone(), None),
        };
        ResolvedTasks {
            superset,
            tasks,
            scope,
        }
    }
}

/// Concatenate parents then subtasks, keeping the first record for a repeated id.
fn merge(parents: Vec<TaskRecord>, subtasks: Vec<TaskRecord>) -> Vec<TaskRecord> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(parents.len() + subtasks.len());
    for task in parents.into_iter().chain(subtasks) {
        if seen.insert(task.id.clone()) {
            merged.push(task);
        } else {
            debug!(task = %task.id, "skipping duplicate task id");
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;
    use crate::models::record::TaskOrigin;
    use crate::test_utils::TestEnv;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_merge_keeps_first_duplicate() {
        let parents = vec![TaskRecord::new("1", "parent copy", TaskOrigin::Metadata)];
        let subtasks = vec![
            TaskRecord::new("1", "subtask copy", TaskOrigin::Subtask),
            TaskRecord::new("2", "other", TaskOrigin::Subtask),
        ];
        let merged = merge(parents, subtasks);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "parent copy");
    }

    #[test]
    fn test_load_runs_passes_in_order() {
        let env = TestEnv::new();
        env.insert_persistence(
            "task_metadata",
            "P",
            &json!({"id": "P", "name": "Parent", "dependencies": ["design_doc"]}),
        );
        env.write_subtasks(&json!({"subtasks": {
            "D": {"id": "D", "name": "Design Doc", "status": "todo"},
            "C": {"id": "C", "name": "Child", "parent_task_id": "P", "status": "todo"}
        }}));
        let sources = Sources::new(env.paths(), None);
        let resolver = TaskResolver::new(&sources, ProjectMatcher::default());

        let tasks = resolver.load(now());
        let find = |id: &str| tasks.iter().find(|t| t.id == id).unwrap();
        // slug resolved on the parent, then inherited by the child
        assert_eq!(find("P").dependencies, vec!["D"]);
        assert_eq!(find("C").dependencies, vec!["D"]);
        assert_eq!(find("P").status, TaskStatus::Todo);
        assert_eq!(find("C").created_at, Some(now()));
    }

    #[test]
    fn test_resolve_without_project_keeps_everything() {
        let env = TestEnv::new();
        env.write_subtasks(&json!([
            {"id": "a", "name": "A"},
            {"id": "b", "name": "B"}
        ]));
        let sources = Sources::new(env.paths(), None);
        let resolver = TaskResolver::new(&sources, ProjectMatcher::default());
        let resolved = resolver.resolve(None, &[], LogRefs::default(), now());
        assert_eq!(resolved.tasks.len(), 2);
        assert_eq!(resolved.superset.len(), 2);
        assert!(resolved.scope.is_none());
    }
}
