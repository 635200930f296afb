//! Projection of the resolved task list onto a display mode.

use std::collections::HashSet;

use crate::models::ViewMode;
use crate::models::record::TaskRecord;

/// Select the tasks shown in `mode`.
///
/// - `Subtasks`: every subtask, plus parentless tasks that have no children
///   in the set (standalone and bundled design tasks)
/// - `Parents`: every task that is not a subtask
/// - `All`: everything
pub fn filter_by_view(tasks: &[TaskRecord], mode: ViewMode) -> Vec<TaskRecord> {
    match mode {
        ViewMode::All => tasks.to_vec(),
        ViewMode::Parents => tasks.iter().filter(|t| !t.is_subtask()).cloned().collect(),
        ViewMode::Subtasks => {
            let parents: HashSet<&str> = tasks
                .iter()
                .filter_map(|t| t.parent_task_id.as_deref())
                .collect();
            tasks
                .iter()
                .filter(|t| t.is_subtask() || !parents.contains(t.id.as_str()))
                .cloned()
                .collect()
        }
    }
}
