use std::collections::BTreeMap;
use std::fmt;

/// Binding key the exit code is written back under after an execution.
pub const EXIT_VALUE_BINDING_NAME: &str = "EXIT_VALUE";

/// Binding holding the caller's context map (job/task identifiers etc.).
pub const VARIABLES_BINDING_NAME: &str = "variables";

/// Flat `name -> value` environment handed to the interpreter process.
pub type FlatEnvironment = BTreeMap<String, String>;

/// A value the caller makes visible to the script.
///
/// Scalars keep their textual form; lists and maps are flattened into
/// several namespaced environment entries by [`crate::bindings::flatten`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BindingValue {
    #[default]
    Null,
    Scalar(String),
    List(Vec<BindingValue>),
    Map(BTreeMap<String, BindingValue>),
}

impl BindingValue {
    pub fn as_map(&self) -> Option<&BTreeMap<String, BindingValue>> {
        match self {
            BindingValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, BindingValue>> {
        match self {
            BindingValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl fmt::Display for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingValue::Null => Ok(()),
            BindingValue::Scalar(s) => f.write_str(s),
            BindingValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            BindingValue::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for BindingValue {
    fn from(s: &str) -> Self {
        BindingValue::Scalar(s.to_string())
    }
}

impl From<String> for BindingValue {
    fn from(s: String) -> Self {
        BindingValue::Scalar(s)
    }
}

impl From<i32> for BindingValue {
    fn from(v: i32) -> Self {
        BindingValue::Scalar(v.to_string())
    }
}

impl From<i64> for BindingValue {
    fn from(v: i64) -> Self {
        BindingValue::Scalar(v.to_string())
    }
}

impl From<f64> for BindingValue {
    fn from(v: f64) -> Self {
        BindingValue::Scalar(v.to_string())
    }
}

impl From<bool> for BindingValue {
    fn from(v: bool) -> Self {
        BindingValue::Scalar(v.to_string())
    }
}

impl<T: Into<BindingValue>> From<Option<T>> for BindingValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(BindingValue::Null)
    }
}

impl<T: Into<BindingValue>> From<Vec<T>> for BindingValue {
    fn from(items: Vec<T>) -> Self {
        BindingValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<toml::Value> for BindingValue {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => BindingValue::Scalar(s),
            toml::Value::Integer(i) => BindingValue::Scalar(i.to_string()),
            toml::Value::Float(f) => BindingValue::Scalar(f.to_string()),
            toml::Value::Boolean(b) => BindingValue::Scalar(b.to_string()),
            toml::Value::Datetime(d) => BindingValue::Scalar(d.to_string()),
            toml::Value::Array(items) => {
                BindingValue::List(items.into_iter().map(BindingValue::from).collect())
            }
            toml::Value::Table(table) => BindingValue::Map(
                table
                    .into_iter()
                    .map(|(k, v)| (k, BindingValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// The caller's named values.
///
/// Read before the execution (to build the child environment) and written
/// after it (`EXIT_VALUE`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    entries: BTreeMap<String, BindingValue>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<BindingValue>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&BindingValue> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut BindingValue> {
        self.entries.get_mut(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BindingValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exit code stored by the last execution, if any.
    pub fn exit_value(&self) -> Option<i32> {
        match self.entries.get(EXIT_VALUE_BINDING_NAME) {
            Some(BindingValue::Scalar(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// Build bindings from a TOML table (used by the CLI `--bindings` file).
    pub fn from_toml_table(table: toml::Table) -> Self {
        let entries = table
            .into_iter()
            .map(|(k, v)| (k, BindingValue::from(v)))
            .collect();
        Self { entries }
    }
}

impl FromIterator<(String, BindingValue)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (String, BindingValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// How an execution ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The interpreter exited with status 0.
    Completed { exit_code: i32 },
    /// The wait was interrupted; the child was killed and reaped.
    Interrupted,
}

impl ExecutionOutcome {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecutionOutcome::Completed { exit_code } => Some(*exit_code),
            ExecutionOutcome::Interrupted => None,
        }
    }
}
