// src/exec/version.rs

//! Interpreter version probe.

use tracing::debug;

use crate::exec::engine::ScriptEngine;
use crate::exec::relay::{CaptureBuffer, ScriptIo};
use crate::types::Bindings;

/// Returned when the interpreter cannot be run.
pub const VERSION_IF_NOT_INSTALLED: &str = "Could not determine version";

/// Prints only the version number (`$]`).
const VERSION_SCRIPT: &str = "print $];";

/// Run a minimal script and return what it printed.
///
/// Any failure yields [`VERSION_IF_NOT_INSTALLED`]. A missing interpreter is
/// an expected situation here, so nothing is logged above debug level.
pub async fn probe_version(engine: &ScriptEngine) -> String {
    probe_with_script(engine, VERSION_SCRIPT).await
}

/// [`probe_version`] with a caller-chosen probe script.
pub async fn probe_with_script(engine: &ScriptEngine, script: &str) -> String {
    let stdout = CaptureBuffer::new();
    let io = ScriptIo::null().with_stdout(stdout.clone());
    let mut bindings = Bindings::new();

    match engine.eval(script, &mut bindings, io, None).await {
        Ok(_) => {
            let out = stdout.to_string_lossy().trim().to_string();
            if out.is_empty() {
                VERSION_IF_NOT_INSTALLED.to_string()
            } else {
                out
            }
        }
        Err(e) => {
            debug!(error = %e, "version probe failed");
            VERSION_IF_NOT_INSTALLED.to_string()
        }
    }
}
