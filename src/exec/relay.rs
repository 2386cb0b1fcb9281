// src/exec/relay.rs

//! Stream relay between the caller and the interpreter process.
//!
//! Each direction is an independent Tokio task, so a child blocked on a full
//! stdout pipe never waits on someone reading stderr (or on us waiting for
//! its exit).

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::exec::command::PipedStreams;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The caller's side of the child's standard streams.
///
/// A stream left as `None` is connected to the null device.
#[derive(Default)]
pub struct ScriptIo {
    pub stdin: Option<BoxedReader>,
    pub stdout: Option<BoxedWriter>,
    pub stderr: Option<BoxedWriter>,
}

impl ScriptIo {
    /// No input, output discarded.
    pub fn null() -> Self {
        Self::default()
    }

    /// Connect to this process's own stdout/stderr, and stdin when `stdin`
    /// is set.
    pub fn inherit(stdin: bool) -> Self {
        Self {
            stdin: stdin.then(|| Box::new(tokio::io::stdin()) as BoxedReader),
            stdout: Some(Box::new(tokio::io::stdout())),
            stderr: Some(Box::new(tokio::io::stderr())),
        }
    }

    pub fn with_stdin(mut self, r: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stdin = Some(Box::new(r));
        self
    }

    pub fn with_stdout(mut self, w: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdout = Some(Box::new(w));
        self
    }

    pub fn with_stderr(mut self, w: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(w));
        self
    }

    pub(crate) fn piped(&self) -> PipedStreams {
        PipedStreams {
            stdin: self.stdin.is_some(),
            stdout: self.stdout.is_some(),
            stderr: self.stderr.is_some(),
        }
    }
}

/// In-memory writer whose contents can be read after the execution.
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.inner
            .lock()
            .map(|b| b.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl AsyncWrite for CaptureBuffer {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.inner.lock() {
            Ok(mut b) => {
                b.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            Err(_) => Poll::Ready(Err(io::Error::other("capture buffer poisoned"))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Running relay tasks for one child.
#[derive(Debug, Default)]
pub struct Relay {
    stdin: Option<JoinHandle<()>>,
    outputs: Vec<(&'static str, JoinHandle<()>)>,
}

impl Relay {
    /// Take the child's pipes and start one copy task per direction.
    pub fn start(child: &mut Child, io: ScriptIo) -> Self {
        let mut relay = Relay::default();

        if let (Some(mut input), Some(mut child_stdin)) = (io.stdin, child.stdin.take()) {
            relay.stdin = Some(tokio::spawn(async move {
                match tokio::io::copy(&mut input, &mut child_stdin).await {
                    Ok(bytes) => debug!(bytes, "stdin relay reached end of input"),
                    // The child closing its stdin early is a normal end.
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                        debug!("child closed stdin")
                    }
                    Err(e) => warn!(error = %e, "stdin relay failed"),
                }
                let _ = child_stdin.shutdown().await;
            }));
        }

        if let (Some(out), Some(child_out)) = (io.stdout, child.stdout.take()) {
            relay.outputs.push(("stdout", spawn_copy("stdout", child_out, out)));
        }
        if let (Some(err), Some(child_err)) = (io.stderr, child.stderr.take()) {
            relay.outputs.push(("stderr", spawn_copy("stderr", child_err, err)));
        }

        relay
    }

    /// Stop feeding stdin and wait for the output relays to drain.
    ///
    /// Output relays normally end on their own once the child's pipes close.
    /// A descendant still holding a pipe open is cut off after `drain_timeout`.
    pub async fn finish(mut self, drain_timeout: Duration) {
        if let Some(stdin) = self.stdin.take() {
            stdin.abort();
        }

        for (stream, handle) in std::mem::take(&mut self.outputs) {
            let abort = handle.abort_handle();
            match tokio::time::timeout(drain_timeout, handle).await {
                Ok(_) => debug!(stream, "relay drained"),
                Err(_) => {
                    warn!(stream, ?drain_timeout, "relay did not drain in time; abandoning it");
                    abort.abort();
                }
            }
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if let Some(stdin) = self.stdin.take() {
            stdin.abort();
        }
        for (_, handle) in self.outputs.drain(..) {
            handle.abort();
        }
    }
}

fn spawn_copy<R>(stream: &'static str, mut from: R, mut to: BoxedWriter) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        match tokio::io::copy(&mut from, &mut to).await {
            Ok(bytes) => debug!(stream, bytes, "child stream reached end of file"),
            Err(e) => warn!(stream, error = %e, "output relay failed"),
        }
        if let Err(e) = to.flush().await {
            debug!(stream, error = %e, "flushing caller stream failed");
        }
    })
}
