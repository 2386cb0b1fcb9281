// src/exec/script_file.rs

//! Script materializer.
//!
//! The script text is written to its own file, flushed and closed before the
//! interpreter is started, and removed again once the execution is over.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::ScriptSection;
use crate::errors::{Result, ScriptError};

/// A script file on disk owned by one execution.
///
/// [`release`](MaterializedScript::release) removes it; dropping an
/// unreleased value removes it as well.
#[derive(Debug)]
pub struct MaterializedScript {
    path: PathBuf,
    released: bool,
}

impl MaterializedScript {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file. A failure is only logged since the script already ran.
    ///
    /// Returns `true` when the file is gone afterwards.
    pub fn release(mut self) -> bool {
        self.released = true;
        remove_script(&self.path)
    }
}

impl Drop for MaterializedScript {
    fn drop(&mut self) {
        if !self.released {
            remove_script(&self.path);
        }
    }
}

fn remove_script(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(script = ?path, "removed script file");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(script = ?path, error = %e, "script file was not deleted");
            false
        }
    }
}

/// A fresh, unique path for a script file according to `[script]`.
///
/// The path is absolute: the interpreter may run in another working
/// directory than ours.
pub fn unique_script_path(settings: &ScriptSection) -> Result<PathBuf> {
    let path = settings.effective_directory().join(format!(
        "{}{}{}",
        settings.file_prefix,
        uuid::Uuid::new_v4().simple(),
        settings.extension
    ));
    std::path::absolute(&path).map_err(|source| ScriptError::Materialization { path, source })
}

/// Write `content` verbatim to `target`.
///
/// A pre-existing file is deleted first so the interpreter never sees stale
/// content; if the file still cannot be created the execution fails.
pub fn materialize(content: &str, target: &Path) -> Result<MaterializedScript> {
    let to_error = |source: io::Error| ScriptError::Materialization {
        path: target.to_path_buf(),
        source,
    };

    if target.exists() {
        debug!(script = ?target, "script file already exists; recreating");
        fs::remove_file(target).map_err(to_error)?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .map_err(to_error)?;

    // From here on the file exists and is ours to clean up.
    let script = MaterializedScript {
        path: target.to_path_buf(),
        released: false,
    };

    file.write_all(content.as_bytes()).map_err(to_error)?;
    file.flush().map_err(to_error)?;
    file.sync_all().map_err(to_error)?;
    drop(file);

    debug!(script = ?target, bytes = content.len(), "materialized script");
    Ok(script)
}
