//! Task-to-project membership heuristics.
//!
//! Task ids minted by the external board system are numerically offset from,
//! not equal to, the project's own ids, so membership is decided by numeric
//! proximity with a literal-prefix fallback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of leading characters compared when correlating ids.
pub const CORRELATION_PREFIX_LEN: usize = 8;

/// How a task is tested for membership in a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Equal ids, or the task id starts with `{project_id}_`
    Exact,
    /// Leading numeric tokens within the tolerance, else exact
    #[default]
    Fuzzy,
    /// Task created inside the project's active window
    Timeframe,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::Exact => write!(f, "exact"),
            MatchStrategy::Fuzzy => write!(f, "fuzzy"),
            MatchStrategy::Timeframe => write!(f, "timeframe"),
        }
    }
}

impl std::str::FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(MatchStrategy::Exact),
            "fuzzy" => Ok(MatchStrategy::Fuzzy),
            "timeframe" => Ok(MatchStrategy::Timeframe),
            _ => Err(format!("Unknown match strategy: {}", s)),
        }
    }
}

/// Inputs for the timeframe strategy. Any missing value is a non-match.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeframe {
    pub project_created: Option<DateTime<Utc>>,
    pub project_last_used: Option<DateTime<Utc>>,
    pub task_created: Option<DateTime<Utc>>,
}

/// Decides whether tasks belong to projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectMatcher {
    tolerance: i64,
}

impl ProjectMatcher {
    pub const DEFAULT_TOLERANCE: i64 = 20;

    pub fn new(tolerance: i64) -> Self {
        Self {
            tolerance: tolerance.max(0),
        }
    }

    pub fn tolerance(&self) -> i64 {
        self.tolerance
    }

    /// Membership of `task_id` in `project_id` under `strategy`.
    pub fn matches(
        &self,
        task_id: &str,
        project_id: &str,
        strategy: MatchStrategy,
        timeframe: &Timeframe,
    ) -> bool {
        match strategy {
            MatchStrategy::Exact => exact_match(task_id, project_id),
            MatchStrategy::Fuzzy => self.fuzzy_match(task_id, project_id),
            MatchStrategy::Timeframe => timeframe_match(timeframe),
        }
    }

    /// Compare the leading `_`-separated token of the task id numerically.
    pub fn fuzzy_match(&self, task_id: &str, project_id: &str) -> bool {
        let task_token = task_id.split('_').next().unwrap_or_default();
        match (parse_number(task_token), parse_number(project_id)) {
            (Some(task_num), Some(project_num)) => self.within_tolerance(task_num, project_num),
            _ => exact_match(task_id, project_id),
        }
    }

    /// Whether a task id correlates with any external project/board id.
    ///
    /// Compares 8-character prefixes numerically; a prefix that is not a number
    /// falls back to a literal prefix match. Ids shorter than the prefix never match.
    pub fn matches_correlation(&self, task_id: &str, correlation_ids: &[&str]) -> bool {
        let Some(task_prefix) = correlation_prefix(task_id) else {
            return false;
        };
        let task_num = parse_number(task_prefix);

        correlation_ids
            .iter()
            .filter_map(|id| correlation_prefix(id))
            .any(|target| match (task_num, parse_number(target)) {
                (Some(a), Some(b)) => self.within_tolerance(a, b),
                _ => task_id.starts_with(target),
            })
    }

    fn within_tolerance(&self, a: i128, b: i128) -> bool {
        (a - b).abs() <= i128::from(self.tolerance)
    }
}

impl Default for ProjectMatcher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TOLERANCE)
    }
}

/// Equal ids, or `task_id` starts with `{project_id}_`.
pub fn exact_match(task_id: &str, project_id: &str) -> bool {
    task_id == project_id
        || task_id
            .strip_prefix(project_id)
            .is_some_and(|rest| rest.starts_with('_'))
}

/// Task creation inside `[project_created, project_last_used]`, inclusive.
pub fn timeframe_match(timeframe: &Timeframe) -> bool {
    match (
        timeframe.project_created,
        timeframe.project_last_used,
        timeframe.task_created,
    ) {
        (Some(start), Some(end), Some(created)) => start <= created && created <= end,
        _ => false,
    }
}

/// First 8 characters of an id, or `None` when the id is shorter.
pub fn correlation_prefix(id: &str) -> Option<&str> {
    let id = id.trim();
    match id.char_indices().nth(CORRELATION_PREFIX_LEN) {
        Some((end, _)) => Some(&id[..end]),
        None if id.chars().count() == CORRELATION_PREFIX_LEN => Some(id),
        None => None,
    }
}

fn parse_number(s: &str) -> Option<i128> {
    s.trim().parse().ok()
}
