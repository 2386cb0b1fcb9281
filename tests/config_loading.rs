use std::error::Error;
use std::io::Write;
use std::time::Duration;

use scriptexec::config::{load_and_validate, load_or_default};
use scriptexec::errors::ScriptError;
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[test]
fn full_config_file_is_loaded() -> TestResult {
    let file = write_config(
        r#"
[interpreter]
command = "/usr/bin/perl"
elevate = true
elevation_prefix = ["doas"]

[script]
directory = "/var/tmp"
file_prefix = "job-"
substitute_variables = true

[reaper]
enabled = false
token_variable = "MY_COOKIE"

[relay]
drain_timeout = "250ms"
"#,
    )?;

    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.interpreter.command, "/usr/bin/perl");
    assert!(cfg.interpreter.elevate);
    assert_eq!(cfg.interpreter.elevation_prefix, vec!["doas".to_string()]);
    assert_eq!(cfg.script.file_prefix, "job-");
    assert!(cfg.script.substitute_variables);
    assert_eq!(cfg.script.extension, ".pl");
    assert!(!cfg.reaper.enabled);
    assert_eq!(cfg.reaper.token_variable, "MY_COOKIE");
    assert_eq!(cfg.reaper.job_id_key, "PA_JOB_ID");
    assert_eq!(cfg.drain_timeout, Duration::from_millis(250));
    Ok(())
}

#[test]
fn empty_file_gives_defaults() -> TestResult {
    let file = write_config("")?;

    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.interpreter.command, "perl");
    assert!(!cfg.interpreter.elevate);
    assert!(cfg.reaper.enabled);
    assert_eq!(cfg.drain_timeout, Duration::from_secs(5));
    Ok(())
}

#[test]
fn blank_interpreter_is_a_configuration_error() -> TestResult {
    let file = write_config("[interpreter]\ncommand = \"  \"\n")?;

    let err = load_and_validate(file.path()).unwrap_err();

    assert!(matches!(err, ScriptError::Configuration { .. }), "got {err:?}");
    Ok(())
}

#[test]
fn bad_duration_is_a_configuration_error() -> TestResult {
    let file = write_config("[relay]\ndrain_timeout = \"soon\"\n")?;

    let err = load_and_validate(file.path()).unwrap_err();

    assert!(matches!(err, ScriptError::Configuration { .. }), "got {err:?}");
    Ok(())
}

#[test]
fn malformed_toml_is_reported() -> TestResult {
    let file = write_config("[interpreter\ncommand = 1")?;

    let err = load_and_validate(file.path()).unwrap_err();

    assert!(matches!(err, ScriptError::TomlError(_)), "got {err:?}");
    Ok(())
}

#[test]
fn explicit_missing_path_is_an_error() {
    let result = load_or_default(Some(std::path::Path::new("/nonexistent/Scriptexec.toml")));
    assert!(matches!(result, Err(ScriptError::IoError(_))));
}
