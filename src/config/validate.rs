// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, ScriptError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ScriptError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let drain_timeout = parse_duration(&raw.relay.drain_timeout).map_err(|e| {
            ScriptError::config(
                format!("invalid [relay].drain_timeout: {e}"),
                "use a duration such as \"5s\" or \"250ms\"",
            )
        })?;
        Ok(ConfigFile::new_unchecked(raw, drain_timeout))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_interpreter(cfg)?;
    validate_script(cfg)?;
    validate_reaper(cfg)?;
    Ok(())
}

fn validate_interpreter(cfg: &RawConfigFile) -> Result<()> {
    if cfg.interpreter.command.trim().is_empty() {
        return Err(ScriptError::config(
            "[interpreter].command must not be empty",
            "set it to the interpreter executable, e.g. \"/usr/bin/perl\"",
        ));
    }

    if cfg.interpreter.elevate
        && cfg
            .interpreter
            .elevation_prefix
            .first()
            .is_none_or(|c| c.trim().is_empty())
    {
        return Err(ScriptError::config(
            "[interpreter].elevate is set but elevation_prefix is empty",
            "set elevation_prefix, e.g. [\"sudo\", \"-E\"], or disable elevate",
        ));
    }

    Ok(())
}

fn validate_script(cfg: &RawConfigFile) -> Result<()> {
    let prefix = &cfg.script.file_prefix;
    if prefix.contains('/') || prefix.contains('\\') {
        return Err(ScriptError::config(
            format!("[script].file_prefix '{prefix}' must not contain path separators"),
            "use [script].directory to choose the location",
        ));
    }
    Ok(())
}

fn validate_reaper(cfg: &RawConfigFile) -> Result<()> {
    let var = &cfg.reaper.token_variable;
    if var.is_empty() || var.contains('=') || var.contains('\0') {
        return Err(ScriptError::config(
            format!("[reaper].token_variable '{}' is not a valid environment variable name", var.escape_debug()),
            "use a plain identifier such as SCRIPTEXEC_PROCESS_TREE_COOKIE",
        ));
    }
    Ok(())
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
