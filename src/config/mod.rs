//! Configuration for Cato.
//!
//! Settings live in KDL files, looked up in this order (highest precedence first):
//!
//! - the file passed with `--config`
//! - `<data-root>/cato.kdl`
//! - `~/.config/cato/config.kdl` (directory overridable with `CATO_CONFIG_DIR`)
//!
//! CLI flags beat every file and `CATO_DATA_ROOT` beats the files for the data
//! root. See [`resolver`] for the precedence rules.

pub mod resolver;
pub mod schema;

use kdl::KdlDocument;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{Error, Result};

pub use resolver::{
    CATO_DATA_ROOT_ENV, ConfigLayer, ConfigOverrides, Resolved, ResolvedSettings, ValueSource,
    resolve_data_root, resolve_settings,
};
pub use schema::CatoConfig;

/// Environment variable overriding the system config directory.
pub const CATO_CONFIG_DIR_ENV: &str = "CATO_CONFIG_DIR";

/// Name of the config file inside a data root.
pub const DATA_ROOT_CONFIG_FILE: &str = "cato.kdl";

/// Read and validate one config file.
pub fn load_file(path: &Path) -> Result<CatoConfig> {
    let text = fs::read_to_string(path)?;
    let doc: KdlDocument = text
        .parse()
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    let config = CatoConfig::from_kdl(&doc);
    config
        .validate()
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}

fn load_optional(path: PathBuf) -> Result<Option<ConfigLayer>> {
    if !path.is_file() {
        debug!(path = %path.display(), "no config file");
        return Ok(None);
    }
    let config = load_file(&path)?;
    debug!(path = %path.display(), "loaded config file");
    Ok(Some(ConfigLayer { path, config }))
}

/// Path of the per-user config file, if a config directory exists.
pub fn system_config_path() -> Option<PathBuf> {
    let dir = match std::env::var(CATO_CONFIG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::config_dir()?.join("cato"),
    };
    Some(dir.join("config.kdl"))
}

/// Load every config layer, highest precedence first.
///
/// An explicit `--config` file must exist; the others are optional. The
/// data-root file is located after resolving the data root from the CLI,
/// the environment, the explicit file and the system file.
pub fn load_layers(overrides: &ConfigOverrides) -> Result<Vec<ConfigLayer>> {
    let explicit = match overrides.config_path {
        Some(ref path) => Some(ConfigLayer {
            path: path.clone(),
            config: load_file(path)?,
        }),
        None => None,
    };
    let system = match system_config_path() {
        Some(path) => load_optional(path)?,
        None => None,
    };

    let outer: Vec<ConfigLayer> = explicit.iter().chain(system.iter()).cloned().collect();
    let root = resolve_data_root(overrides, &outer).value;
    let in_root = load_optional(root.join(DATA_ROOT_CONFIG_FILE))?;

    Ok(explicit.into_iter().chain(in_root).chain(system).collect())
}

/// Load config files and resolve every setting.
pub fn resolve(overrides: &ConfigOverrides) -> Result<ResolvedSettings> {
    let layers = load_layers(overrides)?;
    Ok(resolve_settings(overrides, &layers))
}
