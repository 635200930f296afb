//! Source readers for the Marcus data root.
//!
//! Every upstream source is read fresh on each call (except the project
//! registry, which sits behind a short-lived [`ReadThroughCache`]).
//!
//! ## Layout
//!
//! Relative to the data root:
//!
//! - `data/marcus_state/projects.json` - project registry
//! - `data/marcus_state/subtasks.json` - file-based subtask store
//! - `data/marcus.db` - SQLite `persistence(collection, key, data)` table holding
//!   `task_metadata`, `task_outcomes` and `events`
//! - `logs/conversations/*.jsonl` - message log
//! - `logs/agent_events/*.jsonl` - agent event log
//!
//! Readers are fail-soft: a missing or unreadable source is logged and read as
//! empty, and a single malformed record is skipped without affecting the rest.

pub mod cache;
pub mod records;
pub mod time;

pub use cache::{Clock, ManualClock, ReadThroughCache, SystemClock};

use crate::models::Project;
use crate::models::TaskStatus;
use crate::models::record::{EventRecord, MessageRecord, TaskOrigin, TaskRecord, TimingRecord};
use crate::{Error, Result};
use records::{RawEvent, RawMessage, RawOutcome, RawProject, RawStoredEvent, RawTask};
use rusqlite::{Connection, OpenFlags, params};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Registry key holding the active project pointer rather than a project.
const ACTIVE_PROJECT_KEY: &str = "active_project";

/// Locations of every upstream source under one data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePaths {
    pub root: PathBuf,
    pub projects_file: PathBuf,
    pub subtasks_file: PathBuf,
    pub database_file: PathBuf,
    pub conversations_dir: PathBuf,
    pub agent_events_dir: PathBuf,
}

impl SourcePaths {
    pub fn new(root: &Path) -> Self {
        let state = root.join("data").join("marcus_state");
        let logs = root.join("logs");
        Self {
            root: root.to_path_buf(),
            projects_file: state.join("projects.json"),
            subtasks_file: state.join("subtasks.json"),
            database_file: root.join("data").join("marcus.db"),
            conversations_dir: logs.join("conversations"),
            agent_events_dir: logs.join("agent_events"),
        }
    }
}

/// Readers over one data root.
pub struct Sources {
    paths: SourcePaths,
    projects: ReadThroughCache<Vec<Project>>,
}

impl Sources {
    /// Create readers with the project registry cached for `project_cache_ttl`.
    pub fn new(paths: SourcePaths, project_cache_ttl: Option<Duration>) -> Self {
        Self::with_project_cache(paths, ReadThroughCache::new(project_cache_ttl))
    }

    pub fn with_project_cache(paths: SourcePaths, projects: ReadThroughCache<Vec<Project>>) -> Self {
        Self { paths, projects }
    }

    pub fn paths(&self) -> &SourcePaths {
        &self.paths
    }

    /// Load the project registry.
    pub fn load_projects(&self) -> Vec<Project> {
        if !self.paths.projects_file.exists() {
            warn!(path = %self.paths.projects_file.display(), "projects file not found");
            return Vec::new();
        }
        match self.projects.get_or_try_load(|| self.try_load_projects()) {
            Ok(projects) => projects,
            Err(e) => {
                warn!(error = %e, "failed to load projects");
                Vec::new()
            }
        }
    }

    fn try_load_projects(&self) -> Result<Vec<Project>> {
        let text = fs::read_to_string(&self.paths.projects_file)?;
        let value: Value = serde_json::from_str(&text)?;
        let Value::Object(entries) = value else {
            return Err(Error::InvalidInput(
                "projects file must contain an object".to_string(),
            ));
        };

        let mut projects = Vec::new();
        for (key, entry) in entries {
            if key == ACTIVE_PROJECT_KEY || !entry.is_object() {
                continue;
            }
            match serde_json::from_value::<RawProject>(entry) {
                Ok(raw) => match raw.normalize() {
                    Some(project) => projects.push(project),
                    None => debug!(key = %key, "skipping project without id"),
                },
                Err(e) => debug!(key = %key, error = %e, "skipping malformed project"),
            }
        }
        info!(count = projects.len(), "loaded projects");
        Ok(projects)
    }

    /// Load top-level tasks from the metadata store, with status derived from outcomes.
    pub fn load_parent_tasks(&self, outcomes: &BTreeMap<String, TimingRecord>) -> Vec<TaskRecord> {
        let rows = self.read_collection("task_metadata");
        let mut tasks = Vec::with_capacity(rows.len());
        for (key, data) in rows {
            let Some(raw) = parse_record::<RawTask>(&data, &key) else {
                continue;
            };
            let Some(mut task) = raw.normalize(TaskOrigin::Metadata, Some(&key)) else {
                continue;
            };
            task.status = status_from_timing(find_timing(outcomes, &task.id));
            tasks.push(task);
        }
        info!(count = tasks.len(), "loaded parent tasks");
        tasks
    }

    /// Load the outcome store keyed by its composite `{task}_{agent}_{time}` key.
    pub fn load_outcomes(&self) -> BTreeMap<String, TimingRecord> {
        let outcomes: BTreeMap<String, TimingRecord> = self
            .read_collection("task_outcomes")
            .into_iter()
            .filter_map(|(key, data)| {
                parse_record::<RawOutcome>(&data, &key).map(|raw| (key, raw.normalize()))
            })
            .collect();
        info!(count = outcomes.len(), "loaded task outcomes");
        outcomes
    }

    /// Load start/end timing from `task_completed` events, keyed by task id.
    pub fn load_completion_timings(&self) -> BTreeMap<String, TimingRecord> {
        let rows = match self.try_query(
            "SELECT key, data FROM persistence
             WHERE collection = 'events'
               AND json_extract(data, '$.event_type') = 'task_completed'",
            &[],
        ) {
            Ok(rows) => rows,
            Err(e) => {
                self.warn_db(&e, "events");
                return BTreeMap::new();
            }
        };

        let timings: BTreeMap<String, TimingRecord> = rows
            .into_iter()
            .filter_map(|(key, data)| parse_record::<RawStoredEvent>(&data, &key))
            .filter_map(RawStoredEvent::completion_timing)
            .collect();
        info!(count = timings.len(), "loaded completion timings");
        timings
    }

    /// Load the subtask store, accepting any of its three on-disk shapes.
    pub fn load_subtasks(&self) -> Vec<TaskRecord> {
        if !self.paths.subtasks_file.exists() {
            warn!(path = %self.paths.subtasks_file.display(), "subtasks file not found");
            return Vec::new();
        }
        match self.try_load_subtasks() {
            Ok(tasks) => {
                info!(count = tasks.len(), "loaded subtasks");
                tasks
            }
            Err(e) => {
                warn!(error = %e, "failed to load subtasks");
                Vec::new()
            }
        }
    }

    fn try_load_subtasks(&self) -> Result<Vec<TaskRecord>> {
        let text = fs::read_to_string(&self.paths.subtasks_file)?;
        let value: Value = serde_json::from_str(&text)?;

        let entries: Vec<(Option<String>, Value)> = match value {
            Value::Object(mut map) => match map.remove("subtasks") {
                Some(Value::Object(inner)) => inner.into_iter().map(|(k, v)| (Some(k), v)).collect(),
                Some(Value::Array(items)) => items.into_iter().map(|v| (None, v)).collect(),
                Some(_) => {
                    return Err(Error::InvalidInput(
                        "subtasks wrapper must hold an object or array".to_string(),
                    ));
                }
                None => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
            },
            Value::Array(items) => items.into_iter().map(|v| (None, v)).collect(),
            _ => {
                return Err(Error::InvalidInput(
                    "subtasks file must contain an object or array".to_string(),
                ));
            }
        };

        let mut tasks = Vec::with_capacity(entries.len());
        for (key, entry) in entries {
            if !entry.is_object() {
                debug!(key = ?key, "skipping non-object subtask entry");
                continue;
            }
            match serde_json::from_value::<RawTask>(entry) {
                Ok(raw) => match raw.normalize(TaskOrigin::Subtask, key.as_deref()) {
                    Some(task) => tasks.push(task),
                    None => debug!("skipping subtask without id"),
                },
                Err(e) => debug!(key = ?key, error = %e, "skipping malformed subtask"),
            }
        }
        Ok(tasks)
    }

    /// Load every message from the conversation logs.
    pub fn load_messages(&self) -> Vec<MessageRecord> {
        let messages: Vec<MessageRecord> = read_jsonl_dir::<RawMessage>(&self.paths.conversations_dir)
            .into_iter()
            .map(RawMessage::normalize)
            .collect();
        info!(count = messages.len(), "loaded messages");
        messages
    }

    /// Load every event from the agent event logs.
    pub fn load_events(&self) -> Vec<EventRecord> {
        let events: Vec<EventRecord> = read_jsonl_dir::<RawEvent>(&self.paths.agent_events_dir)
            .into_iter()
            .map(RawEvent::normalize)
            .collect();
        info!(count = events.len(), "loaded events");
        events
    }

    /// Read `(key, data)` rows of one collection, empty on any failure.
    fn read_collection(&self, collection: &str) -> Vec<(String, String)> {
        match self.try_query(
            "SELECT key, data FROM persistence WHERE collection = ?1",
            &[collection],
        ) {
            Ok(rows) => rows,
            Err(e) => {
                self.warn_db(&e, collection);
                Vec::new()
            }
        }
    }

    fn try_query(&self, sql: &str, args: &[&str]) -> Result<Vec<(String, String)>> {
        if !self.paths.database_file.exists() {
            return Err(Error::Other(format!(
                "database not found at {}",
                self.paths.database_file.display()
            )));
        }
        let conn = Connection::open_with_flags(
            &self.paths.database_file,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let mut stmt = conn.prepare(sql)?;
        let rows = match args {
            [] => stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            [one] => stmt
                .query_map(params![*one], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            _ => {
                return Err(Error::InvalidInput(
                    "at most one query parameter is supported".to_string(),
                ));
            }
        };
        Ok(rows)
    }

    fn warn_db(&self, error: &Error, collection: &str) {
        warn!(collection, error = %error, "relational store unavailable");
    }
}

/// Look up timing facts by exact task id, then by the first `{task_id}_` prefixed key.
pub fn find_timing<'a>(timings: &'a BTreeMap<String, TimingRecord>, task_id: &str) -> Option<&'a TimingRecord> {
    if let Some(timing) = timings.get(task_id) {
        return Some(timing);
    }
    let prefix = format!("{}_", task_id);
    timings
        .range(prefix.clone()..)
        .next()
        .filter(|(key, _)| key.starts_with(&prefix))
        .map(|(_, timing)| timing)
}

/// Done when completed, in progress when only started, otherwise not started.
///
/// Parent status comes from outcomes alone; a task without one is todo.
fn status_from_timing(timing: Option<&TimingRecord>) -> TaskStatus {
    let Some(timing) = timing else {
        return TaskStatus::Todo;
    };
    match (timing.started_at, timing.completed_at) {
        (_, Some(_)) => TaskStatus::Done,
        (Some(_), None) => TaskStatus::InProgress,
        (None, None) => TaskStatus::Todo,
    }
}

fn parse_record<T: DeserializeOwned>(data: &str, key: &str) -> Option<T> {
    match serde_json::from_str(data) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!(key, error = %e, "skipping malformed row");
            None
        }
    }
}

/// Parse every line of every `*.jsonl` file in `dir`, skipping bad lines.
///
/// Files are visited in name order.
fn read_jsonl_dir<T: DeserializeOwned>(dir: &Path) -> Vec<T> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "log directory unavailable");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();

    let mut records = Vec::new();
    for path in files {
        if let Err(e) = read_jsonl_file(&path, &mut records) {
            warn!(path = %path.display(), error = %e, "failed to read log file");
        }
    }
    records
}

fn read_jsonl_file<T: DeserializeOwned>(path: &Path, out: &mut Vec<T>) -> Result<()> {
    let reader = BufReader::new(File::open(path)?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => out.push(record),
            Err(e) => debug!(path = %path.display(), line = line_no + 1, error = %e, "skipping malformed line"),
        }
    }
    Ok(())
}
