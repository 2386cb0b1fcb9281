// src/exec/command.rs

//! Process spawner.
//!
//! [`CommandFactory`] is built once from `[interpreter]` and then used for
//! every execution: `[elevation prefix] interpreter <script path>`.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::info;

use crate::config::InterpreterSection;
use crate::errors::{Result, ScriptError};
use crate::types::FlatEnvironment;

/// Which of the child's standard streams are piped back to us.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipedStreams {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
}

fn stdio(piped: bool) -> Stdio {
    if piped { Stdio::piped() } else { Stdio::null() }
}

/// Builds interpreter invocations.
#[derive(Debug, Clone)]
pub struct CommandFactory {
    interpreter: String,
    elevation_prefix: Vec<String>,
    working_directory: Option<PathBuf>,
}

impl CommandFactory {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            elevation_prefix: Vec::new(),
            working_directory: None,
        }
    }

    pub fn from_config(cfg: &InterpreterSection) -> Self {
        Self {
            interpreter: cfg.command.clone(),
            elevation_prefix: if cfg.elevate {
                cfg.elevation_prefix.clone()
            } else {
                Vec::new()
            },
            working_directory: cfg.working_directory.clone(),
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    /// The full argument vector, program first.
    pub fn invocation(&self, script: &Path) -> Vec<String> {
        let mut argv = self.elevation_prefix.clone();
        argv.push(self.interpreter.clone());
        argv.push(script.to_string_lossy().into_owned());
        argv
    }

    /// Build the command with `environment` as the child's entire environment.
    pub fn build(&self, script: &Path, environment: &FlatEnvironment, piped: PipedStreams) -> Command {
        let mut argv = self.invocation(script).into_iter();
        // `invocation` always yields at least the interpreter and the script.
        let program = argv.next().unwrap_or_else(|| self.interpreter.clone());

        let mut cmd = Command::new(program);
        cmd.args(argv)
            .env_clear()
            .envs(environment)
            .stdin(stdio(piped.stdin))
            .stdout(stdio(piped.stdout))
            .stderr(stdio(piped.stderr))
            .kill_on_drop(true);

        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Start the interpreter for `script`.
    pub fn spawn(&self, script: &Path, environment: &FlatEnvironment, piped: PipedStreams) -> Result<Child> {
        let argv = self.invocation(script);
        info!(cmd = ?argv, "starting interpreter process");

        self.build(script, environment, piped)
            .spawn()
            .map_err(|source| self.spawn_error(source))
    }

    fn spawn_error(&self, source: io::Error) -> ScriptError {
        let program = self
            .elevation_prefix
            .first()
            .unwrap_or(&self.interpreter)
            .clone();
        let hint = match source.kind() {
            io::ErrorKind::NotFound => format!(
                "Check that '{program}' is installed and that [interpreter].command points at it"
            ),
            io::ErrorKind::PermissionDenied => {
                format!("Check that '{program}' is executable by the current user")
            }
            _ => "Check the [interpreter] configuration".to_string(),
        };
        ScriptError::Spawn {
            program,
            hint,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_without_elevation() {
        let factory = CommandFactory::from_config(&InterpreterSection::default());
        assert_eq!(
            factory.invocation(Path::new("/tmp/file.pl")),
            vec!["perl".to_string(), "/tmp/file.pl".to_string()]
        );
    }

    #[test]
    fn invocation_with_elevation() {
        let cfg = InterpreterSection {
            command: "/usr/bin/perl".to_string(),
            elevate: true,
            ..InterpreterSection::default()
        };
        let factory = CommandFactory::from_config(&cfg);
        assert_eq!(
            factory.invocation(Path::new("file.pl")),
            vec!["sudo", "-E", "/usr/bin/perl", "file.pl"]
        );
    }

    #[test]
    fn elevation_prefix_ignored_unless_enabled() {
        let cfg = InterpreterSection {
            elevation_prefix: vec!["doas".to_string()],
            ..InterpreterSection::default()
        };
        let factory = CommandFactory::from_config(&cfg);
        assert_eq!(factory.invocation(Path::new("a.pl"))[0], "perl");
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_spawn_error() {
        let factory = CommandFactory::new("/nonexistent/interpreter-binary");
        let err = factory
            .spawn(Path::new("file.pl"), &FlatEnvironment::new(), PipedStreams::default())
            .unwrap_err();

        match err {
            ScriptError::Spawn { program, hint, .. } => {
                assert_eq!(program, "/nonexistent/interpreter-binary");
                assert!(hint.contains("installed"));
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }
}
