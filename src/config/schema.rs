//! KDL schema for `cato.kdl`.

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Aggregator settings stored in `cato.kdl`.
///
/// Every key is optional; unset keys fall through to the next layer.
///
/// # KDL Schema
///
/// ```kdl
/// data-root "/srv/marcus"
/// fuzzy-tolerance 20
/// timeline-exponent 0.4
/// project-cache-ttl 60      // seconds, 0 disables the cache
/// duplicate-window 2.0      // seconds
/// bottleneck-threshold 3
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatoConfig {
    /// Root of the Marcus data layout
    pub data_root: Option<PathBuf>,

    /// Max numeric distance between task and project correlation prefixes
    pub fuzzy_tolerance: Option<i64>,

    /// Default power-scale exponent for timeline positions
    pub timeline_exponent: Option<f64>,

    /// Project-list cache lifetime in seconds
    pub project_cache_ttl: Option<u64>,

    /// Window in seconds for duplicate message detection
    pub duplicate_window: Option<f64>,

    /// Dependents needed to flag an unfinished task as a bottleneck
    pub bottleneck_threshold: Option<usize>,
}

fn first_value<'a>(doc: &'a KdlDocument, key: &str) -> Option<&'a KdlValue> {
    doc.get(key)
        .and_then(|node| node.entries().first())
        .map(KdlEntry::value)
}

/// Floats also accept integer literals (`timeline-exponent 1`).
fn as_number(value: &KdlValue) -> Option<f64> {
    value.as_float().or_else(|| value.as_integer().map(|i| i as f64))
}

fn push_node(doc: &mut KdlDocument, name: &str, value: KdlValue) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(value));
    doc.nodes_mut().push(node);
}

impl CatoConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check value ranges.
    ///
    /// Returns an error message naming the first invalid key.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(tolerance) = self.fuzzy_tolerance {
            if tolerance < 0 {
                return Err(format!("fuzzy-tolerance must be >= 0, got {}", tolerance));
            }
        }
        if let Some(exponent) = self.timeline_exponent {
            if !exponent.is_finite() || exponent <= 0.0 {
                return Err(format!("timeline-exponent must be > 0, got {}", exponent));
            }
        }
        if let Some(window) = self.duplicate_window {
            if !window.is_finite() || window < 0.0 {
                return Err(format!("duplicate-window must be >= 0, got {}", window));
            }
        }
        if let Some(threshold) = self.bottleneck_threshold {
            if threshold < 1 {
                return Err(format!("bottleneck-threshold must be >= 1, got {}", threshold));
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    ///
    /// Keys with a value of the wrong type are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        if let Some(root) = first_value(doc, "data-root").and_then(KdlValue::as_string) {
            config.data_root = Some(PathBuf::from(root));
        }
        if let Some(tolerance) = first_value(doc, "fuzzy-tolerance").and_then(KdlValue::as_integer) {
            config.fuzzy_tolerance = i64::try_from(tolerance).ok();
        }
        config.timeline_exponent = first_value(doc, "timeline-exponent").and_then(as_number);
        if let Some(ttl) = first_value(doc, "project-cache-ttl").and_then(KdlValue::as_integer) {
            config.project_cache_ttl = u64::try_from(ttl).ok();
        }
        config.duplicate_window = first_value(doc, "duplicate-window").and_then(as_number);
        if let Some(threshold) = first_value(doc, "bottleneck-threshold").and_then(KdlValue::as_integer) {
            config.bottleneck_threshold = usize::try_from(threshold).ok();
        }

        config
    }

    /// Convert config to a KDL document, skipping unset keys.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(ref root) = self.data_root {
            push_node(&mut doc, "data-root", KdlValue::String(root.display().to_string()));
        }
        if let Some(tolerance) = self.fuzzy_tolerance {
            push_node(&mut doc, "fuzzy-tolerance", KdlValue::Integer(tolerance as i128));
        }
        if let Some(exponent) = self.timeline_exponent {
            push_node(&mut doc, "timeline-exponent", KdlValue::Float(exponent));
        }
        if let Some(ttl) = self.project_cache_ttl {
            push_node(&mut doc, "project-cache-ttl", KdlValue::Integer(ttl as i128));
        }
        if let Some(window) = self.duplicate_window {
            push_node(&mut doc, "duplicate-window", KdlValue::Float(window));
        }
        if let Some(threshold) = self.bottleneck_threshold {
            push_node(&mut doc, "bottleneck-threshold", KdlValue::Integer(threshold as i128));
        }

        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &CatoConfig) {
        if other.data_root.is_some() {
            self.data_root = other.data_root.clone();
        }
        if other.fuzzy_tolerance.is_some() {
            self.fuzzy_tolerance = other.fuzzy_tolerance;
        }
        if other.timeline_exponent.is_some() {
            self.timeline_exponent = other.timeline_exponent;
        }
        if other.project_cache_ttl.is_some() {
            self.project_cache_ttl = other.project_cache_ttl;
        }
        if other.duplicate_window.is_some() {
            self.duplicate_window = other.duplicate_window;
        }
        if other.bottleneck_threshold.is_some() {
            self.bottleneck_threshold = other.bottleneck_threshold;
        }
    }
}
