//! Common test utilities for cato integration tests.
//!
//! Provides `TestEnv`, a throwaway Marcus data root, and a `cato()` command
//! builder that never reads the user's own config.

#![allow(dead_code)]

use assert_cmd::Command;
use rusqlite::{Connection, params};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// An isolated data root plus an empty config directory.
pub struct TestEnv {
    pub root: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Get the path to the data root.
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    fn state_dir(&self) -> PathBuf {
        self.path().join("data").join("marcus_state")
    }

    /// Get a Command for the cato binary pointed at this data root.
    ///
    /// Both env vars are set per-command so tests can run in parallel.
    pub fn cato(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_cato"));
        cmd.env("CATO_DATA_ROOT", self.path());
        cmd.env("CATO_CONFIG_DIR", self.config_dir.path());
        cmd.env_remove("RUST_LOG");
        cmd
    }

    pub fn write_projects(&self, value: &Value) {
        fs::create_dir_all(self.state_dir()).unwrap();
        fs::write(self.state_dir().join("projects.json"), value.to_string()).unwrap();
    }

    pub fn write_subtasks(&self, value: &Value) {
        fs::create_dir_all(self.state_dir()).unwrap();
        fs::write(self.state_dir().join("subtasks.json"), value.to_string()).unwrap();
    }

    /// Insert one row into the `persistence` table of `data/marcus.db`.
    pub fn insert_persistence(&self, collection: &str, key: &str, data: &Value) {
        let db = self.path().join("data").join("marcus.db");
        fs::create_dir_all(db.parent().unwrap()).unwrap();
        let conn = Connection::open(db).unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS persistence (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                data TEXT NOT NULL
            )",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO persistence (collection, key, data) VALUES (?1, ?2, ?3)",
            params![collection, key, data.to_string()],
        )
        .unwrap();
    }

    /// Write one conversation log, one JSON value per line.
    pub fn write_messages(&self, file_name: &str, lines: &[Value]) {
        let dir = self.path().join("logs").join("conversations");
        fs::create_dir_all(&dir).unwrap();
        let body: Vec<String> = lines.iter().map(Value::to_string).collect();
        fs::write(dir.join(file_name), body.join("\n")).unwrap();
    }

    /// Write one agent event log, one JSON value per line.
    pub fn write_events(&self, file_name: &str, lines: &[Value]) {
        let dir = self.path().join("logs").join("agent_events");
        fs::create_dir_all(&dir).unwrap();
        let body: Vec<String> = lines.iter().map(Value::to_string).collect();
        fs::write(dir.join(file_name), body.join("\n")).unwrap();
    }

    /// Write `<data-root>/cato.kdl`.
    pub fn write_config(&self, kdl: &str) {
        fs::write(self.path().join("cato.kdl"), kdl).unwrap();
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a command's stdout as JSON.
pub fn parse_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).unwrap()
}
