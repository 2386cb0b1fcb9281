// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [interpreter]
/// command = "/usr/bin/perl"
/// elevate = false
///
/// [script]
/// directory = "/var/tmp/scripts"
///
/// [reaper]
/// enabled = true
///
/// [relay]
/// drain_timeout = "5s"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub interpreter: InterpreterSection,

    #[serde(default)]
    pub script: ScriptSection,

    #[serde(default)]
    pub reaper: ReaperSection,

    #[serde(default)]
    pub relay: RelaySection,
}

/// Validated configuration. Construct through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub interpreter: InterpreterSection,
    pub script: ScriptSection,
    pub reaper: ReaperSection,
    /// Upper bound for draining the child's stdout/stderr after it exited.
    pub drain_timeout: Duration,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, drain_timeout: Duration) -> Self {
        Self {
            interpreter: raw.interpreter,
            script: raw.script,
            reaper: raw.reaper,
            drain_timeout,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        ConfigFile::new_unchecked(RawConfigFile::default(), Duration::from_secs(5))
    }
}

/// `[interpreter]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct InterpreterSection {
    /// Interpreter executable, looked up on `PATH` when not absolute.
    #[serde(default = "default_command")]
    pub command: String,

    /// Prefix the invocation with `elevation_prefix`.
    #[serde(default)]
    pub elevate: bool,

    /// Command (and arguments) placed before the interpreter when `elevate`
    /// is set. `-E` keeps the flattened environment across `sudo`.
    #[serde(default = "default_elevation_prefix")]
    pub elevation_prefix: Vec<String>,

    /// Working directory of the interpreter process; inherited when unset.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
}

fn default_command() -> String {
    "perl".to_string()
}

fn default_elevation_prefix() -> Vec<String> {
    vec!["sudo".to_string(), "-E".to_string()]
}

impl Default for InterpreterSection {
    fn default() -> Self {
        Self {
            command: default_command(),
            elevate: false,
            elevation_prefix: default_elevation_prefix(),
            working_directory: None,
        }
    }
}

/// `[script]` section: where and how scripts are materialized.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptSection {
    /// Directory for script files; the system temp dir when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    #[serde(default = "default_extension")]
    pub extension: String,

    /// Replace `$NAME` in the script with flattened binding values before
    /// writing it out. Off by default since Perl uses `$` itself.
    #[serde(default)]
    pub substitute_variables: bool,
}

fn default_file_prefix() -> String {
    "scriptexec-".to_string()
}

fn default_extension() -> String {
    ".pl".to_string()
}

impl Default for ScriptSection {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: default_file_prefix(),
            extension: default_extension(),
            substitute_variables: false,
        }
    }
}

impl ScriptSection {
    pub fn effective_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// `[reaper]` section: process-tree cleanup.
#[derive(Debug, Clone, Deserialize)]
pub struct ReaperSection {
    /// Global switch; per-execution opt-out goes through `disable_key`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Environment variable carrying the per-execution token.
    #[serde(default = "default_token_variable")]
    pub token_variable: String,

    /// Binding holding the identifying context map.
    #[serde(default = "default_context_binding")]
    pub context_binding: String,

    #[serde(default = "default_job_id_key")]
    pub job_id_key: String,

    #[serde(default = "default_task_id_key")]
    pub task_id_key: String,

    /// Context key that disables reaping when set to an affirmative value.
    #[serde(default = "default_disable_key")]
    pub disable_key: String,
}

fn default_true() -> bool {
    true
}

fn default_token_variable() -> String {
    "SCRIPTEXEC_PROCESS_TREE_COOKIE".to_string()
}

fn default_context_binding() -> String {
    crate::types::VARIABLES_BINDING_NAME.to_string()
}

fn default_job_id_key() -> String {
    "PA_JOB_ID".to_string()
}

fn default_task_id_key() -> String {
    "PA_TASK_ID".to_string()
}

fn default_disable_key() -> String {
    "DISABLE_PTK".to_string()
}

impl Default for ReaperSection {
    fn default() -> Self {
        Self {
            enabled: true,
            token_variable: default_token_variable(),
            context_binding: default_context_binding(),
            job_id_key: default_job_id_key(),
            task_id_key: default_task_id_key(),
            disable_key: default_disable_key(),
        }
    }
}

/// `[relay]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    /// Duration string such as `"5s"` or `"250ms"`.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout: String,
}

fn default_drain_timeout() -> String {
    "5s".to_string()
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            drain_timeout: default_drain_timeout(),
        }
    }
}
