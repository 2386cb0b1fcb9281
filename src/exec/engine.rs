// src/exec/engine.rs

//! Execution coordinator.
//!
//! One call to [`ScriptEngine::eval`] goes through:
//!
//! 1. flattening the bindings into the child environment,
//! 2. materializing the script file,
//! 3. tracking the process tree, registering the shutdown hook, spawning,
//! 4. relaying streams while waiting for exit (or an interrupt),
//! 5. finalizing: script removal, hook removal, process-tree kill.
//!
//! Step 5 runs whatever happened in 3 and 4. Only after it has run is the
//! result of the execution looked at.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, info, warn};

use crate::bindings::{flatten, flatten_into, substitute_variables};
use crate::config::ConfigFile;
use crate::errors::{Result, ScriptError};
use crate::exec::command::CommandFactory;
use crate::exec::relay::{Relay, ScriptIo};
use crate::exec::script_file::{MaterializedScript, materialize, unique_script_path};
use crate::reaper::{
    HookRegistration, ProcessTreeKiller, ProcessTreeReaper, ReaperHandle, ShutdownHooks,
    default_killer,
};
use crate::types::{
    BindingValue, Bindings, EXIT_VALUE_BINDING_NAME, ExecutionOutcome, FlatEnvironment,
    VARIABLES_BINDING_NAME,
};

/// Receiving end of an interrupt request.
///
/// Sending `()` interrupts the execution; dropping the sender does not.
pub type Interrupt = oneshot::Receiver<()>;

/// How the wait on the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    Exited(i32),
    Interrupted,
}

/// Runs scripts through an external interpreter.
///
/// Holds no per-execution state, so one engine can serve concurrent calls.
#[derive(Debug, Clone)]
pub struct ScriptEngine {
    config: ConfigFile,
    commands: CommandFactory,
    reaper: ProcessTreeReaper,
    hooks: ShutdownHooks,
}

impl ScriptEngine {
    pub fn new(config: ConfigFile, killer: Arc<dyn ProcessTreeKiller>, hooks: ShutdownHooks) -> Self {
        let commands = CommandFactory::from_config(&config.interpreter);
        let reaper = ProcessTreeReaper::new(config.reaper.clone(), killer);
        Self {
            config,
            commands,
            reaper,
            hooks,
        }
    }

    /// Engine with the platform's reaper backend and its own hook registry.
    pub fn from_config(config: ConfigFile) -> Self {
        Self::new(config, default_killer(), ShutdownHooks::new())
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn commands(&self) -> &CommandFactory {
        &self.commands
    }

    pub fn hooks(&self) -> &ShutdownHooks {
        &self.hooks
    }

    /// Host environment with the flattened bindings layered on top.
    pub fn prepare_environment(&self, bindings: &Bindings) -> Result<FlatEnvironment> {
        let mut environment: FlatEnvironment = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        flatten_into(Some(bindings), Some(&mut environment))?;
        Ok(environment)
    }

    /// Script text as it will be written to disk.
    pub fn prepare_script<'a>(&self, script: &'a str, bindings: &Bindings) -> Result<std::borrow::Cow<'a, str>> {
        if self.config.script.substitute_variables {
            let variables = flatten(bindings)?;
            Ok(substitute_variables(script, &variables))
        } else {
            Ok(std::borrow::Cow::Borrowed(script))
        }
    }

    /// Execute `script` with `bindings` as its environment.
    ///
    /// On exit the child's status is stored in `bindings` under
    /// `EXIT_VALUE` (and inside the `variables` map when present). A
    /// non-zero status is returned as [`ScriptError::NonZeroExit`].
    /// An interrupted execution is `Ok(ExecutionOutcome::Interrupted)`.
    pub async fn eval(
        &self,
        script: &str,
        bindings: &mut Bindings,
        io: ScriptIo,
        interrupt: Option<Interrupt>,
    ) -> Result<ExecutionOutcome> {
        let mut environment = self.prepare_environment(bindings)?;
        let text = self.prepare_script(script, bindings)?;

        let script_file = materialize(&text, &unique_script_path(&self.config.script)?)?;

        let tree = self.reaper.track(bindings, &mut environment);
        let shutdown = Arc::new(Notify::new());
        let registration = self.register_shutdown_hook(tree.clone(), Arc::clone(&shutdown));

        let run = self
            .run_child(&script_file, &environment, io, interrupt, &shutdown)
            .await;

        self.finalize(script_file, registration, tree.as_ref());

        let (waited, relay) = run?;
        relay.finish(self.config.drain_timeout).await;

        match waited {
            WaitOutcome::Interrupted => {
                info!("script execution interrupted; interpreter process terminated");
                Ok(ExecutionOutcome::Interrupted)
            }
            WaitOutcome::Exited(code) => {
                record_exit_value(bindings, code);
                if code != 0 {
                    return Err(ScriptError::NonZeroExit(code));
                }
                Ok(ExecutionOutcome::Completed { exit_code: code })
            }
        }
    }

    /// [`eval`](Self::eval) for callers without a runtime. Blocks the
    /// calling thread; must not be called from inside an async context.
    pub fn eval_blocking(
        &self,
        script: &str,
        bindings: &mut Bindings,
        io: ScriptIo,
        interrupt: Option<Interrupt>,
    ) -> Result<ExecutionOutcome> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.eval(script, bindings, io, interrupt))
    }

    /// Read the whole script from `reader`, then [`eval`](Self::eval) it.
    pub async fn eval_reader<R>(
        &self,
        mut reader: R,
        bindings: &mut Bindings,
        io: ScriptIo,
        interrupt: Option<Interrupt>,
    ) -> Result<ExecutionOutcome>
    where
        R: AsyncRead + Unpin,
    {
        let mut script = String::new();
        reader.read_to_string(&mut script).await?;
        self.eval(&script, bindings, io, interrupt).await
    }

    /// The hook never signals the child by pid: the child is only killed
    /// through its own handle, which knows whether it was already reaped.
    fn register_shutdown_hook(
        &self,
        tree: Option<ReaperHandle>,
        shutdown: Arc<Notify>,
    ) -> HookRegistration {
        self.hooks.register(move || {
            // Stores a permit when nobody waits yet.
            shutdown.notify_one();
            if let Some(tree) = tree {
                tree.kill();
            }
        })
    }

    async fn run_child(
        &self,
        script: &MaterializedScript,
        environment: &FlatEnvironment,
        io: ScriptIo,
        interrupt: Option<Interrupt>,
        shutdown: &Notify,
    ) -> Result<(WaitOutcome, Relay)> {
        let mut child = self
            .commands
            .spawn(script.path(), environment, io.piped())?;

        let relay = Relay::start(&mut child, io);
        let waited = wait_for_exit(&mut child, interrupt, shutdown).await?;

        Ok((waited, relay))
    }

    fn finalize(
        &self,
        script: MaterializedScript,
        registration: HookRegistration,
        tree: Option<&ReaperHandle>,
    ) {
        let path = script.path().to_path_buf();
        if !script.release() {
            warn!(script = ?path, "script file could not be removed after execution");
        }
        registration.unregister();
        if let Some(tree) = tree {
            tree.kill();
        }
        debug!(script = ?path, "execution finalized");
    }
}

/// Wait for the child. On an interrupt or a fired shutdown hook, kill it
/// and wait again so it is reaped.
///
/// A stop request wins over a simultaneous exit.
async fn wait_for_exit(
    child: &mut Child,
    interrupt: Option<Interrupt>,
    shutdown: &Notify,
) -> Result<WaitOutcome> {
    let interrupted = async move {
        if let Some(rx) = interrupt {
            if rx.await.is_ok() {
                return;
            }
            debug!("interrupt sender dropped; waiting for normal exit");
        }
        std::future::pending::<()>().await
    };

    tokio::select! {
        biased;

        () = interrupted => {
            info!(pid = ?child.id(), "interrupt requested; killing interpreter process");
        }
        () = shutdown.notified() => {
            info!(pid = ?child.id(), "shutdown hook fired; killing interpreter process");
        }
        status = child.wait() => return Ok(exited(status?)),
    }

    if let Err(e) = child.start_kill() {
        warn!(error = %e, "failed to signal interpreter process");
    }
    match child.wait().await {
        Ok(status) => debug!(?status, "interrupted interpreter process reaped"),
        Err(e) => info!(error = %e, "interpreter process did not finish cleanly after interrupt"),
    }
    Ok(WaitOutcome::Interrupted)
}

fn exited(status: std::process::ExitStatus) -> WaitOutcome {
    let code = status.code().unwrap_or(-1);
    info!(exit_code = code, success = status.success(), "interpreter process exited");
    WaitOutcome::Exited(code)
}

fn record_exit_value(bindings: &mut Bindings, code: i32) {
    if let Some(variables) = bindings
        .get_mut(VARIABLES_BINDING_NAME)
        .and_then(BindingValue::as_map_mut)
    {
        variables.insert(EXIT_VALUE_BINDING_NAME.to_string(), code.into());
    }
    bindings.insert(EXIT_VALUE_BINDING_NAME, code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn exit_value_goes_into_bindings_and_variables() {
        let mut b = Bindings::new();
        b.insert(VARIABLES_BINDING_NAME, BindingValue::Map(BTreeMap::new()));

        record_exit_value(&mut b, 7);

        assert_eq!(b.exit_value(), Some(7));
        let vars = b.get(VARIABLES_BINDING_NAME).and_then(BindingValue::as_map).unwrap();
        assert_eq!(vars.get(EXIT_VALUE_BINDING_NAME), Some(&BindingValue::from("7")));
    }

    #[test]
    fn environment_keeps_host_variables() {
        let engine = ScriptEngine::from_config(ConfigFile::default());
        let mut b = Bindings::new();
        b.insert("SCRIPTEXEC_TEST_BINDING", "x");

        let env = engine.prepare_environment(&b).unwrap();

        assert_eq!(env["SCRIPTEXEC_TEST_BINDING"], "x");
        if let Ok(path) = std::env::var("PATH") {
            assert_eq!(env.get("PATH"), Some(&path));
        }
    }

    #[test]
    fn substitution_only_when_enabled() {
        let mut b = Bindings::new();
        b.insert("name", "world");

        let engine = ScriptEngine::from_config(ConfigFile::default());
        assert_eq!(engine.prepare_script("hi $name", &b).unwrap(), "hi $name");

        let mut cfg = ConfigFile::default();
        cfg.script.substitute_variables = true;
        let engine = ScriptEngine::from_config(cfg);
        assert_eq!(engine.prepare_script("hi $name", &b).unwrap(), "hi world");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hook_fired_before_the_wait_still_stops_the_child() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let shutdown = Notify::new();
        shutdown.notify_one();

        let waited = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            wait_for_exit(&mut child, None, &shutdown),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(waited, WaitOutcome::Interrupted);
        assert!(child.try_wait().unwrap().is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn normal_exit_is_reported_without_stop_request() {
        let mut child = tokio::process::Command::new("sh")
            .args(["-c", "exit 3"])
            .spawn()
            .unwrap();

        let waited = wait_for_exit(&mut child, None, &Notify::new()).await.unwrap();

        assert_eq!(waited, WaitOutcome::Exited(3));
    }
}
