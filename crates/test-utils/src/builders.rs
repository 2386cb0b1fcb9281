use std::collections::BTreeMap;
use std::path::Path;

use scriptexec::config::{ConfigFile, RawConfigFile};
use scriptexec::types::{BindingValue, Bindings, VARIABLES_BINDING_NAME};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    /// Run scripts with `sh` so tests don't need a Perl installation.
    pub fn shell() -> Self {
        Self::new().interpreter("sh")
    }

    pub fn interpreter(mut self, command: &str) -> Self {
        self.config.interpreter.command = command.to_string();
        self
    }

    pub fn script_dir(mut self, dir: &Path) -> Self {
        self.config.script.directory = Some(dir.to_path_buf());
        self
    }

    pub fn working_directory(mut self, dir: &Path) -> Self {
        self.config.interpreter.working_directory = Some(dir.to_path_buf());
        self
    }

    pub fn substitute_variables(mut self, val: bool) -> Self {
        self.config.script.substitute_variables = val;
        self
    }

    pub fn reaper_enabled(mut self, val: bool) -> Self {
        self.config.reaper.enabled = val;
        self
    }

    pub fn drain_timeout(mut self, duration: &str) -> Self {
        self.config.relay.drain_timeout = duration.to_string();
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `Bindings`.
#[derive(Default)]
pub struct BindingsBuilder {
    bindings: Bindings,
    context: Option<BTreeMap<String, BindingValue>>,
}

impl BindingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar(mut self, name: &str, value: &str) -> Self {
        self.bindings.insert(name, value);
        self
    }

    pub fn null(mut self, name: &str) -> Self {
        self.bindings.insert(name, BindingValue::Null);
        self
    }

    pub fn list(mut self, name: &str, values: &[&str]) -> Self {
        self.bindings.insert(
            name,
            BindingValue::List(values.iter().map(|v| BindingValue::from(*v)).collect()),
        );
        self
    }

    pub fn map(mut self, name: &str, entries: &[(&str, &str)]) -> Self {
        let map = entries
            .iter()
            .map(|(k, v)| (k.to_string(), BindingValue::from(*v)))
            .collect();
        self.bindings.insert(name, BindingValue::Map(map));
        self
    }

    /// Add an entry to the `variables` context map.
    pub fn context(mut self, key: &str, value: &str) -> Self {
        self.context
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), BindingValue::from(value));
        self
    }

    /// Job/task identifiers that activate process-tree reaping.
    pub fn job(self, job_id: &str, task_id: &str) -> Self {
        self.context("PA_JOB_ID", job_id).context("PA_TASK_ID", task_id)
    }

    pub fn build(mut self) -> Bindings {
        if let Some(ctx) = self.context {
            self.bindings.insert(VARIABLES_BINDING_NAME, BindingValue::Map(ctx));
        }
        self.bindings
    }
}
