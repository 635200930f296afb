//! Dependency symbol resolution and parent-to-child dependency inheritance.

use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::models::record::TaskRecord;

/// Lowercase name with spaces replaced by underscores.
pub fn slug(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

fn is_numeric(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Replace symbolic dependency references with canonical task ids.
///
/// Purely numeric entries and entries that already name a task are left alone,
/// so running this twice is a no-op. Slugs that match no task are kept as
/// dangling references.
pub fn resolve_slugs(mut tasks: Vec<TaskRecord>) -> Vec<TaskRecord> {
    let ids: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();
    let mut slugs: HashMap<String, String> = HashMap::new();
    for task in &tasks {
        if !task.name.trim().is_empty() {
            slugs.entry(slug(&task.name)).or_insert_with(|| task.id.clone());
        }
    }

    let mut resolved = 0usize;
    let mut unresolved = 0usize;
    for task in &mut tasks {
        let mut deps: Vec<String> = Vec::with_capacity(task.dependencies.len());
        for dep in std::mem::take(&mut task.dependencies) {
            let dep = if is_numeric(&dep) || ids.contains(&dep) {
                dep
            } else if let Some(id) = slugs.get(&slug(&dep)) {
                resolved += 1;
                id.clone()
            } else {
                warn!(task = %task.id, dependency = %dep, "unresolved dependency reference");
                unresolved += 1;
                dep
            };
            if dep != task.id && !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        task.dependencies = deps;
    }

    if resolved > 0 || unresolved > 0 {
        info!(resolved, unresolved, "resolved symbolic dependencies");
    }
    tasks
}

/// Copy each parent's dependencies onto its first dependency-free child.
///
/// The first child is the lowest `subtask_index`, then the earliest in input
/// order. Parents without such a child are left as they are. Assignments are
/// computed from the input lists before any are applied, so the result does
/// not depend on processing order.
pub fn inherit_parent_dependencies(mut tasks: Vec<TaskRecord>) -> Vec<TaskRecord> {
    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, task) in tasks.iter().enumerate() {
        if let Some(parent) = task.parent_task_id.as_deref() {
            children.entry(parent).or_default().push(idx);
        }
    }

    let mut assignments: Vec<(usize, Vec<String>)> = Vec::new();
    for parent in &tasks {
        if parent.dependencies.is_empty() {
            continue;
        }
        let Some(kids) = children.get(parent.id.as_str()) else {
            continue;
        };
        let first = kids
            .iter()
            .copied()
            .filter(|&idx| tasks[idx].dependencies.is_empty())
            .min_by_key(|&idx| (tasks[idx].subtask_index.unwrap_or(u32::MAX), idx));
        if let Some(child) = first {
            assignments.push((child, parent.dependencies.clone()));
        }
    }

    let count = assignments.len();
    for (child, inherited) in assignments {
        let task = &mut tasks[child];
        for dep in inherited {
            if dep != task.id && !task.dependencies.contains(&dep) {
                task.dependencies.push(dep);
            }
        }
    }

    if count > 0 {
        info!(children = count, "inherited parent dependencies");
    }
    tasks
}
