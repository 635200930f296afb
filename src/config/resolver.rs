//! Precedence resolution for aggregator settings.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. `CATO_DATA_ROOT` environment variable (data root only)
//! 3. Config layers, in the order given (see [`super::load_layers`])
//! 4. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::CatoConfig;
use crate::diagnostics::DEFAULT_BOTTLENECK_THRESHOLD;
use crate::duplicates::DEFAULT_DUPLICATE_WINDOW;
use crate::matcher::ProjectMatcher;
use crate::snapshot::{AggregatorOptions, DEFAULT_PROJECT_CACHE_TTL};
use crate::timeline::DEFAULT_SCALE_EXPONENT;

/// Environment variable naming the data root.
pub const CATO_DATA_ROOT_ENV: &str = "CATO_DATA_ROOT";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from a config file
    ConfigFile(PathBuf),
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::ConfigFile(path) => write!(f, "file:{}", path.display()),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// One parsed config file.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub path: PathBuf,
    pub config: CatoConfig,
}

/// CLI overrides for settings resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_root: Option<PathBuf>,
    pub fuzzy_tolerance: Option<i64>,
    pub timeline_exponent: Option<f64>,
    pub project_cache_ttl: Option<u64>,
    pub duplicate_window: Option<f64>,
    pub bottleneck_threshold: Option<usize>,
    /// Explicit `--config` file
    pub config_path: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = Some(root.into());
        self
    }

    pub fn with_fuzzy_tolerance(mut self, tolerance: i64) -> Self {
        self.fuzzy_tolerance = Some(tolerance);
        self
    }

    pub fn with_timeline_exponent(mut self, exponent: f64) -> Self {
        self.timeline_exponent = Some(exponent);
        self
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }
}

/// Fully resolved settings with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub data_root: Resolved<PathBuf>,
    pub fuzzy_tolerance: Resolved<i64>,
    pub timeline_exponent: Resolved<f64>,
    /// Seconds; 0 disables the project cache
    pub project_cache_ttl: Resolved<u64>,
    pub duplicate_window: Resolved<f64>,
    pub bottleneck_threshold: Resolved<usize>,
}

impl ResolvedSettings {
    pub fn data_root(&self) -> &Path {
        &self.data_root.value
    }

    /// Options for [`crate::Aggregator`].
    pub fn aggregator_options(&self) -> AggregatorOptions {
        let ttl = self.project_cache_ttl.value;
        AggregatorOptions {
            fuzzy_tolerance: self.fuzzy_tolerance.value,
            project_cache_ttl: (ttl > 0).then(|| Duration::from_secs(ttl)),
            duplicate_window: self.duplicate_window.value,
            bottleneck_threshold: self.bottleneck_threshold.value,
            default_exponent: self.timeline_exponent.value,
        }
    }
}

/// Pick the first defined value: CLI flag, then each layer, then the default.
fn pick<T: Clone>(
    cli: Option<&T>,
    layers: &[ConfigLayer],
    field: impl Fn(&CatoConfig) -> Option<T>,
    default: T,
) -> Resolved<T> {
    if let Some(value) = cli {
        return Resolved::new(value.clone(), ValueSource::CliFlag);
    }
    layers
        .iter()
        .find_map(|layer| {
            field(&layer.config).map(|v| Resolved::new(v, ValueSource::ConfigFile(layer.path.clone())))
        })
        .unwrap_or_else(|| Resolved::new(default, ValueSource::Default))
}

/// Resolve the data root alone.
///
/// Needed before the data-root config file can be located.
pub fn resolve_data_root(overrides: &ConfigOverrides, layers: &[ConfigLayer]) -> Resolved<PathBuf> {
    if let Some(ref root) = overrides.data_root {
        return Resolved::new(root.clone(), ValueSource::CliFlag);
    }
    if let Ok(root) = std::env::var(CATO_DATA_ROOT_ENV) {
        if !root.is_empty() {
            return Resolved::new(
                PathBuf::from(root),
                ValueSource::EnvVar(CATO_DATA_ROOT_ENV.to_string()),
            );
        }
    }
    pick(None, layers, |c| c.data_root.clone(), PathBuf::from("."))
}

/// Resolve every setting. `layers` are ordered highest precedence first.
pub fn resolve_settings(overrides: &ConfigOverrides, layers: &[ConfigLayer]) -> ResolvedSettings {
    ResolvedSettings {
        data_root: resolve_data_root(overrides, layers),
        fuzzy_tolerance: pick(
            overrides.fuzzy_tolerance.as_ref(),
            layers,
            |c| c.fuzzy_tolerance,
            ProjectMatcher::DEFAULT_TOLERANCE,
        ),
        timeline_exponent: pick(
            overrides.timeline_exponent.as_ref(),
            layers,
            |c| c.timeline_exponent,
            DEFAULT_SCALE_EXPONENT,
        ),
        project_cache_ttl: pick(
            overrides.project_cache_ttl.as_ref(),
            layers,
            |c| c.project_cache_ttl,
            DEFAULT_PROJECT_CACHE_TTL.as_secs(),
        ),
        duplicate_window: pick(
            overrides.duplicate_window.as_ref(),
            layers,
            |c| c.duplicate_window,
            DEFAULT_DUPLICATE_WINDOW,
        ),
        bottleneck_threshold: pick(
            overrides.bottleneck_threshold.as_ref(),
            layers,
            |c| c.bottleneck_threshold,
            DEFAULT_BOTTLENECK_THRESHOLD,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn layer(path: &str, config: CatoConfig) -> ConfigLayer {
        ConfigLayer {
            path: PathBuf::from(path),
            config,
        }
    }

    #[test]
    fn test_value_source_display() {
        assert_eq!(format!("{}", ValueSource::EnvVar("FOO".to_string())), "env:FOO");
        assert_eq!(
            format!("{}", ValueSource::ConfigFile(PathBuf::from("/etc/cato.kdl"))),
            "file:/etc/cato.kdl"
        );
        assert_eq!(format!("{}", ValueSource::CliFlag), "cli");
        assert_eq!(format!("{}", ValueSource::Default), "default");
    }

    #[test]
    #[serial]
    fn test_defaults() {
        unsafe { std::env::remove_var(CATO_DATA_ROOT_ENV) };
        let settings = resolve_settings(&ConfigOverrides::default(), &[]);
        assert_eq!(settings.data_root.value, PathBuf::from("."));
        assert_eq!(settings.data_root.source, ValueSource::Default);
        assert_eq!(settings.fuzzy_tolerance.value, 20);
        assert_eq!(settings.timeline_exponent.value, 0.4);
        assert_eq!(settings.aggregator_options(), AggregatorOptions::default());
    }

    #[test]
    #[serial]
    fn test_first_layer_wins() {
        unsafe { std::env::remove_var(CATO_DATA_ROOT_ENV) };
        let layers = vec![
            layer(
                "/explicit.kdl",
                CatoConfig {
                    fuzzy_tolerance: Some(5),
                    ..Default::default()
                },
            ),
            layer(
                "/system.kdl",
                CatoConfig {
                    fuzzy_tolerance: Some(50),
                    duplicate_window: Some(4.0),
                    ..Default::default()
                },
            ),
        ];
        let settings = resolve_settings(&ConfigOverrides::default(), &layers);
        assert_eq!(settings.fuzzy_tolerance.value, 5);
        assert_eq!(
            settings.fuzzy_tolerance.source,
            ValueSource::ConfigFile(PathBuf::from("/explicit.kdl"))
        );
        assert_eq!(settings.duplicate_window.value, 4.0);
        assert_eq!(
            settings.duplicate_window.source,
            ValueSource::ConfigFile(PathBuf::from("/system.kdl"))
        );
    }

    #[test]
    #[serial]
    fn test_cli_overrides_files() {
        let layers = vec![layer(
            "/cato.kdl",
            CatoConfig {
                timeline_exponent: Some(0.8),
                ..Default::default()
            },
        )];
        let overrides = ConfigOverrides::new().with_timeline_exponent(0.3);
        let settings = resolve_settings(&overrides, &layers);
        assert_eq!(settings.timeline_exponent.value, 0.3);
        assert_eq!(settings.timeline_exponent.source, ValueSource::CliFlag);
    }

    #[test]
    #[serial]
    fn test_data_root_env_between_cli_and_file() {
        let layers = vec![layer(
            "/cato.kdl",
            CatoConfig {
                data_root: Some(PathBuf::from("/from/file")),
                ..Default::default()
            },
        )];
        unsafe { std::env::set_var(CATO_DATA_ROOT_ENV, "/from/env") };

        let from_env = resolve_data_root(&ConfigOverrides::default(), &layers);
        assert_eq!(from_env.value, PathBuf::from("/from/env"));
        assert_eq!(from_env.source, ValueSource::EnvVar(CATO_DATA_ROOT_ENV.to_string()));

        let from_cli = resolve_data_root(&ConfigOverrides::new().with_data_root("/from/cli"), &layers);
        assert_eq!(from_cli.value, PathBuf::from("/from/cli"));

        unsafe { std::env::remove_var(CATO_DATA_ROOT_ENV) };
        let from_file = resolve_data_root(&ConfigOverrides::default(), &layers);
        assert_eq!(from_file.value, PathBuf::from("/from/file"));
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let settings = resolve_settings(
            &ConfigOverrides {
                project_cache_ttl: Some(0),
                ..Default::default()
            },
            &[],
        );
        assert_eq!(settings.aggregator_options().project_cache_ttl, None);
    }
}
