// src/exec/mod.rs

//! Process execution layer.
//!
//! This module turns a script string into a finished interpreter process,
//! using `tokio::process::Command`.
//!
//! - [`script_file`] writes the script to disk and removes it again.
//! - [`command`] builds and spawns the interpreter invocation.
//! - [`relay`] connects the caller's streams to the child.
//! - [`engine`] owns the execution sequence and its cleanup.
//! - [`version`] runs the interpreter version probe.

pub mod command;
pub mod engine;
pub mod relay;
pub mod script_file;
pub mod version;

pub use command::{CommandFactory, PipedStreams};
pub use engine::{Interrupt, ScriptEngine};
pub use relay::{CaptureBuffer, ScriptIo};
pub use script_file::{MaterializedScript, materialize};
pub use version::{VERSION_IF_NOT_INSTALLED, probe_version};
