// src/errors.rs

//! Crate-wide error type.
//!
//! Only the kinds that represent a failed call live here. An interrupted
//! execution is reported through [`crate::types::ExecutionOutcome`] and a
//! script file that could not be removed is only logged.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Configuration error: {message} ({hint})")]
    Configuration { message: String, hint: String },

    #[error("Invalid binding: {0}")]
    InvalidBinding(String),

    #[error("Could not materialize script at {path:?}: {source}")]
    Materialization {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start interpreter '{program}': {source}. {hint}")]
    Spawn {
        program: String,
        hint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Script process execution has failed with exit code {0}")]
    NonZeroExit(i32),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScriptError {
    pub(crate) fn config(message: impl Into<String>, hint: impl Into<String>) -> Self {
        ScriptError::Configuration {
            message: message.into(),
            hint: hint.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;
