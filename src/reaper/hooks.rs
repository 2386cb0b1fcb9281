// src/reaper/hooks.rs

//! Last-resort cleanup callbacks for when the host goes away.
//!
//! Every execution registers one callback before spawning and drops the
//! [`HookRegistration`] once its own cleanup has run, so a callback only
//! ever fires for executions that are still in flight.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct HooksInner {
    next_id: u64,
    hooks: BTreeMap<u64, Hook>,
}

/// Registry of callbacks run on unexpected termination of the host.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone, Default)]
pub struct ShutdownHooks {
    inner: Arc<Mutex<HooksInner>>,
}

impl fmt::Debug for ShutdownHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHooks")
            .field("registered", &self.len())
            .finish()
    }
}

fn lock(inner: &Mutex<HooksInner>) -> MutexGuard<'_, HooksInner> {
    // A panicking hook must not disable the registry for everyone else.
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook`; it stays registered until the returned guard is
    /// dropped or [`HookRegistration::unregister`] is called.
    pub fn register(&self, hook: impl FnOnce() + Send + 'static) -> HookRegistration {
        let mut guard = lock(&self.inner);
        let id = guard.next_id;
        guard.next_id += 1;
        guard.hooks.insert(id, Box::new(hook));
        debug!(hook_id = id, "registered shutdown hook");

        HookRegistration {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Run and remove every registered hook. Returns how many ran.
    pub fn fire(&self) -> usize {
        let hooks = std::mem::take(&mut lock(&self.inner).hooks);
        let count = hooks.len();
        if count > 0 {
            info!(count, "running shutdown hooks");
        }

        for (id, hook) in hooks {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(hook)).is_err() {
                warn!(hook_id = id, "shutdown hook panicked");
            }
        }
        count
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Turn host shutdown signals into an interrupt plus cleanup.
    ///
    /// The first signal sends on `interrupt`. `SIGTERM` (container or
    /// service manager stop) also fires the registry right away. After a
    /// first Ctrl-C the registry fires on the next signal of either kind.
    ///
    /// Signal handlers are installed before this returns, so a signal sent
    /// afterwards is never lost to the default disposition. Must be called
    /// from within a Tokio runtime.
    pub fn forward_signals(&self, interrupt: oneshot::Sender<()>) -> io::Result<JoinHandle<()>> {
        let mut listener = ShutdownListener::install()?;
        let hooks = self.clone();

        Ok(tokio::spawn(async move {
            let Some(received) = listener.recv().await else {
                return;
            };
            info!(signal = ?received, "shutdown signal received; interrupting script");
            let _ = interrupt.send(());

            if received == ShutdownSignal::Interrupt {
                // A second signal while cleanup is still running.
                let Some(received) = listener.recv().await else {
                    return;
                };
                info!(signal = ?received, "second shutdown signal received");
            }
            hooks.fire();
        }))
    }
}

/// Which host signal asked us to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// `SIGINT` / Ctrl-C.
    Interrupt,
    /// `SIGTERM`.
    Terminate,
}

struct ShutdownListener {
    #[cfg(unix)]
    interrupt: Signal,
    #[cfg(unix)]
    terminate: Signal,
}

impl ShutdownListener {
    #[cfg(unix)]
    fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    fn install() -> io::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        tokio::select! {
            res = self.interrupt.recv() => res.map(|()| ShutdownSignal::Interrupt),
            res = self.terminate.recv() => res.map(|()| ShutdownSignal::Terminate),
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(ShutdownSignal::Interrupt),
            Err(e) => {
                warn!(error = %e, "failed to listen for Ctrl+C");
                None
            }
        }
    }
}

/// Keeps a shutdown hook registered while alive.
#[derive(Debug)]
pub struct HookRegistration {
    id: u64,
    registry: Weak<Mutex<HooksInner>>,
}

impl HookRegistration {
    pub fn unregister(self) {
        // Removal happens in `Drop`.
    }
}

impl Drop for HookRegistration {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            if lock(&inner).hooks.remove(&self.id).is_some() {
                debug!(hook_id = self.id, "unregistered shutdown hook");
            }
        }
    }
}
