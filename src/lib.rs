//! Cato - a read-side aggregator for agent task, message and event stores.
//!
//! This library loads loosely-structured records from the Marcus data root
//! (project registry, task stores, conversation and event logs), resolves their
//! cross-references and produces one denormalized, immutable [`Snapshot`]
//! for a visualization frontend.
//!
//! The pipeline for one snapshot, leaves first:
//! - [`storage`] reads every source, falling back to empty on failure, and normalizes raw records
//! - [`matcher`] decides task-to-project membership
//! - [`resolver`] merges, enriches and repairs the task list
//! - [`view`] projects tasks down to a display mode
//! - [`timeline`] computes bounds and power-scaled positions
//! - [`denormalize`] embeds parent/project/agent identity into every record
//! - [`metrics`], [`duplicates`] and [`diagnostics`] analyse the result
//! - [`snapshot`] drives the steps and assembles the output
//!
//! [`Snapshot`]: models::Snapshot

pub mod cli;
pub mod commands;
pub mod config;
pub mod denormalize;
pub mod diagnostics;
pub mod duplicates;
pub mod matcher;
pub mod metrics;
pub mod models;
pub mod resolver;
pub mod snapshot;
pub mod storage;
pub mod timeline;
pub mod view;

pub use snapshot::{Aggregator, AggregatorOptions};


/// Library-level error type for Cato operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Cato operations.
pub type Result<T> = std::result::Result<T, Error>;
