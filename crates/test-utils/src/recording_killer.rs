use std::sync::{Arc, Mutex};

use scriptexec::reaper::{ProcessTreeKiller, ReaperToken};

/// A reaper backend that:
/// - records every tracked token and every kill request
/// - optionally forwards to a real backend.
#[derive(Debug, Default)]
pub struct RecordingKiller {
    inner: Option<Arc<dyn ProcessTreeKiller>>,
    tracked: Mutex<Vec<ReaperToken>>,
    kills: Mutex<Vec<ReaperToken>>,
}

impl RecordingKiller {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn wrapping(inner: Arc<dyn ProcessTreeKiller>) -> Arc<Self> {
        Arc::new(Self {
            inner: Some(inner),
            ..Self::default()
        })
    }

    pub fn tracked(&self) -> Vec<ReaperToken> {
        self.tracked.lock().unwrap().clone()
    }

    pub fn kills(&self) -> Vec<ReaperToken> {
        self.kills.lock().unwrap().clone()
    }
}

impl ProcessTreeKiller for RecordingKiller {
    fn track(&self, token: &ReaperToken) {
        self.tracked.lock().unwrap().push(token.clone());
        if let Some(inner) = &self.inner {
            inner.track(token);
        }
    }

    fn kill_all(&self, token: &ReaperToken) -> usize {
        self.kills.lock().unwrap().push(token.clone());
        self.inner.as_ref().map_or(0, |inner| inner.kill_all(token))
    }
}
