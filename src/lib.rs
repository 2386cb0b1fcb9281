// src/lib.rs

pub mod bindings;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod metadata;
pub mod reaper;
pub mod types;

use std::path::Path;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::debug;

use crate::cli::{CliArgs, Command};
use crate::config::load_or_default;
use crate::errors::ScriptError;
use crate::exec::{ScriptEngine, ScriptIo, probe_version};
use crate::metadata::ENGINE_INFO;
use crate::types::{Bindings, ExecutionOutcome};

pub use crate::exec::engine::Interrupt;
pub use crate::types::{BindingValue, EXIT_VALUE_BINDING_NAME};

/// Exit status used when the script was interrupted by a shutdown signal.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// High-level entry point used by `main.rs`. Returns the exit status for
/// this process.
///
/// This wires together:
/// - config loading
/// - engine construction
/// - bindings file parsing
/// - signal handling (Ctrl-C interrupts, a second Ctrl-C or SIGTERM also
///   fires the shutdown hooks)
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_or_default(args.config.as_deref()).context("loading configuration")?;
    let engine = ScriptEngine::from_config(cfg);

    match args.command {
        Command::Info => {
            print_info(&engine);
            Ok(0)
        }
        Command::Version => {
            println!("{}", probe_version(&engine).await);
            Ok(0)
        }
        Command::Run {
            script,
            bindings,
            stdin,
            dry_run,
        } => {
            let mut bindings = match bindings {
                Some(path) => load_bindings(&path)?,
                None => Bindings::new(),
            };
            let text = tokio::fs::read_to_string(&script)
                .await
                .with_context(|| format!("reading script at {:?}", script))?;

            if dry_run {
                print_dry_run(&engine, &text, &bindings)?;
                return Ok(0);
            }

            run_script(&engine, &text, &mut bindings, stdin).await
        }
    }
}

async fn run_script(
    engine: &ScriptEngine,
    script: &str,
    bindings: &mut Bindings,
    stdin: bool,
) -> Result<i32> {
    let (interrupt_tx, interrupt_rx) = oneshot::channel::<()>();
    let _signals = engine
        .hooks()
        .forward_signals(interrupt_tx)
        .context("installing shutdown signal handlers")?;

    match engine
        .eval(script, bindings, ScriptIo::inherit(stdin), Some(interrupt_rx))
        .await
    {
        Ok(ExecutionOutcome::Completed { exit_code }) => Ok(exit_code),
        Ok(ExecutionOutcome::Interrupted) => Ok(INTERRUPTED_EXIT_CODE),
        Err(ScriptError::NonZeroExit(code)) => {
            debug!(exit_code = code, "script failed");
            Ok(code)
        }
        Err(e) => Err(e.into()),
    }
}

/// Read a TOML file whose top-level keys become bindings.
pub fn load_bindings(path: &Path) -> Result<Bindings> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading bindings file at {:?}", path))?;
    let table: toml::Table = toml::from_str(&contents)
        .with_context(|| format!("parsing TOML bindings from {:?}", path))?;
    Ok(Bindings::from_toml_table(table))
}

fn print_info(engine: &ScriptEngine) {
    println!("engine:      {}", ENGINE_INFO.name);
    println!("names:       {}", ENGINE_INFO.names.join(", "));
    println!("language:    {}", ENGINE_INFO.language);
    println!("version:     {}", ENGINE_INFO.engine_version);
    println!("extensions:  {}", ENGINE_INFO.extensions.join(", "));
    println!("mime types:  {}", ENGINE_INFO.mime_types.join(", "));
    println!("interpreter: {}", engine.commands().interpreter());
}

/// Show what would run, without running it.
fn print_dry_run(engine: &ScriptEngine, script: &str, bindings: &Bindings) -> Result<()> {
    let flat = crate::bindings::flatten(bindings)?;
    let text = engine.prepare_script(script, bindings)?;
    let path = crate::exec::script_file::unique_script_path(&engine.config().script)?;

    println!("scriptexec dry-run");
    println!("  invocation: {:?}", engine.commands().invocation(&path));
    println!("  script bytes: {}", text.len());
    println!();
    println!("environment from bindings ({}):", flat.len());
    for (name, value) in flat.iter() {
        println!("  {name}={value}");
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
