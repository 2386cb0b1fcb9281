// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `scriptexec`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scriptexec",
    version,
    about = "Run scripts through an external interpreter with bindings as environment.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `$SCRIPTEXEC_CONFIG`, else `Scriptexec.toml` in the current
    /// directory; built-in defaults apply when neither exists.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCRIPTEXEC_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Execute a script file.
    Run {
        /// Script to execute.
        script: PathBuf,

        /// TOML file whose top-level keys become bindings.
        #[arg(long, value_name = "PATH")]
        bindings: Option<PathBuf>,

        /// Forward this process's stdin to the script.
        #[arg(long)]
        stdin: bool,

        /// Print the invocation and flattened bindings, but don't execute.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the interpreter version reported by the version probe.
    Version,

    /// Print engine metadata.
    Info,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_flags() {
        let args = CliArgs::try_parse_from([
            "scriptexec",
            "run",
            "job.pl",
            "--bindings",
            "vars.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();

        match args.command {
            Command::Run { script, bindings, stdin, dry_run } => {
                assert_eq!(script, PathBuf::from("job.pl"));
                assert_eq!(bindings, Some(PathBuf::from("vars.toml")));
                assert!(!stdin);
                assert!(!dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
