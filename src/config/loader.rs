// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Environment variable that overrides the default config location.
pub const CONFIG_ENV_VAR: &str = "SCRIPTEXEC_CONFIG";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load the config at `path`, or the defaults when `path` is the implicit
/// default location and nothing is there.
///
/// An explicitly requested file that does not exist is still an error.
pub fn load_or_default(path: Option<&Path>) -> Result<ConfigFile> {
    match path {
        Some(p) => load_and_validate(p),
        None => {
            let p = default_config_path();
            if p.exists() {
                load_and_validate(&p)
            } else {
                debug!(path = ?p, "no config file found; using defaults");
                ConfigFile::try_from(RawConfigFile::default())
            }
        }
    }
}

/// Default config path: `$SCRIPTEXEC_CONFIG`, else `Scriptexec.toml` in the
/// current working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Scriptexec.toml"))
}
