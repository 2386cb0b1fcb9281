// src/reaper/mod.rs

//! Process-tree reaping.
//!
//! A per-execution token is injected into the child's environment before it
//! is spawned. Every process forked below it inherits the variable, so the
//! whole tree can be found again later by scanning the process table, even
//! after the direct child exited and its children were re-parented.
//!
//! - [`procfs`] holds the platform backends.
//! - [`hooks`] is the shutdown-callback registry used as the second trigger.

pub mod hooks;
pub mod procfs;

use std::fmt::{self, Debug};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ReaperSection;
use crate::types::{BindingValue, Bindings, FlatEnvironment};

pub use hooks::{HookRegistration, ShutdownHooks, ShutdownSignal};
pub use procfs::{DirectChildOnly, default_killer};
#[cfg(target_os = "linux")]
pub use procfs::ProcEnvironKiller;

/// Unique marker for one execution's process tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaperToken {
    variable: String,
    value: String,
}

impl ReaperToken {
    pub fn new(variable: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            value: value.into(),
        }
    }

    /// Derive a fresh token from the identifying context.
    ///
    /// The context is hashed together with a random UUID, so two executions
    /// of the same job/task never share a token.
    pub fn derive(variable: impl Into<String>, job_id: &str, task_id: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(job_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(task_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        let hex = hasher.finalize().to_hex();
        Self::new(variable, &hex.as_str()[..32])
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// The `NAME=value` entry as it appears in a process environment block.
    pub fn env_entry(&self) -> String {
        format!("{}={}", self.variable, self.value)
    }
}

/// Platform capability for finding and killing a process tree by token.
pub trait ProcessTreeKiller: Send + Sync + Debug {
    /// Called once the token is in the environment, before the spawn.
    fn track(&self, _token: &ReaperToken) {}

    /// Terminate every process carrying `token`. Returns how many processes
    /// were signalled. Killing an already-dead tree is a no-op.
    fn kill_all(&self, token: &ReaperToken) -> usize;
}

/// Token plus the backend that can act on it.
#[derive(Clone)]
pub struct ReaperHandle {
    token: ReaperToken,
    killer: Arc<dyn ProcessTreeKiller>,
}

impl Debug for ReaperHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaperHandle")
            .field("token", &self.token)
            .field("killer", &self.killer)
            .finish()
    }
}

impl ReaperHandle {
    pub fn token(&self) -> &ReaperToken {
        &self.token
    }

    pub fn kill(&self) -> usize {
        let killed = self.killer.kill_all(&self.token);
        if killed > 0 {
            info!(token = %self.token.value, killed, "terminated leftover processes of script tree");
        } else {
            debug!(token = %self.token.value, "no leftover processes found for script tree");
        }
        killed
    }
}

/// Decides per execution whether reaping applies and produces the handle.
#[derive(Debug, Clone)]
pub struct ProcessTreeReaper {
    settings: ReaperSection,
    killer: Arc<dyn ProcessTreeKiller>,
}

impl ProcessTreeReaper {
    pub fn new(settings: ReaperSection, killer: Arc<dyn ProcessTreeKiller>) -> Self {
        Self { settings, killer }
    }

    /// Put a fresh token into `environment` and start tracking it.
    ///
    /// Returns `None` when reaping is disabled globally, when `bindings`
    /// carries no identifying context, or when the context opts out.
    pub fn track(&self, bindings: &Bindings, environment: &mut FlatEnvironment) -> Option<ReaperHandle> {
        if !self.settings.enabled {
            return None;
        }

        let context = bindings.get(&self.settings.context_binding)?.as_map()?;
        if context
            .get(&self.settings.disable_key)
            .is_some_and(is_affirmative)
        {
            debug!(key = %self.settings.disable_key, "process tree reaping disabled by binding context");
            return None;
        }

        let job_id = context_string(context.get(&self.settings.job_id_key));
        let task_id = context_string(context.get(&self.settings.task_id_key));
        if job_id.is_empty() && task_id.is_empty() {
            return None;
        }

        let token = ReaperToken::derive(&self.settings.token_variable, &job_id, &task_id);
        environment.insert(token.variable.clone(), token.value.clone());
        self.killer.track(&token);
        debug!(job_id = %job_id, task_id = %task_id, token = %token.value, "tracking script process tree");

        Some(ReaperHandle {
            token,
            killer: Arc::clone(&self.killer),
        })
    }
}

fn context_string(value: Option<&BindingValue>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn is_affirmative(value: &BindingValue) -> bool {
    matches!(
        value.to_string().trim().to_lowercase().as_str(),
        "true" | "yes" | "on" | "1"
    )
}
