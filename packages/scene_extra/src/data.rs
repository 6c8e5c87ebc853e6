//! Cloud data bindings: resolving the latest bound values for a tag.
//!
//! The host hands over a snapshot of data frames, a binding template used to
//! fill `${var}` placeholders in a tag's binding context, and a lookup for
//! rule maps. [`SnapshotDataSource`] bundles the three behind [`DataSource`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single telemetry value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// Latest value per field name.
pub type ValueMap = BTreeMap<String, DataValue>;

/// Values substituted into `${var}` placeholders of binding contexts.
pub type DataBindingTemplate = BTreeMap<String, String>;

/// Binding configuration carried by a tag's anchor component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueDataBinding {
    /// Label constraints a field must carry, e.g. `entityId`, `componentName`.
    #[serde(default)]
    pub data_binding_context: BTreeMap<String, serde_json::Value>,
    /// Restrict matching to the frame with this id.
    #[serde(default)]
    pub data_frame_label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataField {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<DataValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFrame {
    pub data_frame_id: String,
    #[serde(default)]
    pub fields: Vec<DataField>,
}

/// Snapshot of cloud data for one refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataInput {
    #[serde(default)]
    pub data_frames: Vec<DataFrame>,
}

/// Ordered rule statements. The first true expression decides the target state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleBasedMap {
    #[serde(default)]
    pub statements: Vec<RuleStatement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStatement {
    pub expression: String,
    pub target: String,
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("No data input available")]
    NoInput,

    #[error("Binding template has no value for '${{{0}}}'")]
    MissingTemplateVariable(String),

    #[error("Binding context entry '{0}' is not a string or number")]
    InvalidContext(String),

    #[error("Failed to read data snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse data snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Host-side binding resolution consumed by the controller's data refresh.
pub trait DataSource {
    /// Latest values for `binding`. An absent binding resolves to no values.
    fn resolve_values(&self, binding: Option<&ValueDataBinding>) -> Result<ValueMap, DataError>;

    fn rule_map(&self, id: Option<&str>) -> Option<RuleBasedMap>;
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder regex is valid"))
}

/// Replace every `${var}` in `text` with its template value.
pub fn substitute(text: &str, template: &DataBindingTemplate) -> Result<String, DataError> {
    let mut missing = None;
    let replaced = placeholder_regex().replace_all(text, |caps: &regex::Captures| {
        let var = &caps[1];
        match template.get(var) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| var.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(var) => Err(DataError::MissingTemplateVariable(var)),
        None => Ok(replaced.into_owned()),
    }
}

/// Binding context with placeholders filled, as plain label constraints.
pub fn resolve_context(
    binding: &ValueDataBinding,
    template: &DataBindingTemplate,
) -> Result<BTreeMap<String, String>, DataError> {
    binding
        .data_binding_context
        .iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => substitute(s, template)?,
                serde_json::Value::Number(n) => n.to_string(),
                _ => return Err(DataError::InvalidContext(key.clone())),
            };
            Ok((key.clone(), text))
        })
        .collect()
}

/// Data frames, binding template and rule maps captured from the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDataSource {
    #[serde(default)]
    pub data_input: Option<DataInput>,
    #[serde(default)]
    pub data_binding_template: DataBindingTemplate,
    #[serde(default)]
    pub rule_maps: HashMap<String, RuleBasedMap>,
}

impl SnapshotDataSource {
    pub fn new(data_input: Option<DataInput>, data_binding_template: DataBindingTemplate) -> Self {
        Self {
            data_input,
            data_binding_template,
            rule_maps: HashMap::new(),
        }
    }

    pub fn with_rule_map(mut self, id: impl Into<String>, rule: RuleBasedMap) -> Self {
        self.rule_maps.insert(id.into(), rule);
        self
    }

    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl DataSource for SnapshotDataSource {
    fn resolve_values(&self, binding: Option<&ValueDataBinding>) -> Result<ValueMap, DataError> {
        let Some(binding) = binding else {
            return Ok(ValueMap::new());
        };
        let input = self.data_input.as_ref().ok_or(DataError::NoInput)?;
        let context = resolve_context(binding, &self.data_binding_template)?;

        let mut values = ValueMap::new();
        let frames = input.data_frames.iter().filter(|frame| {
            binding
                .data_frame_label
                .as_ref()
                .map_or(true, |label| *label == frame.data_frame_id)
        });
        for frame in frames {
            for field in &frame.fields {
                let matches = context
                    .iter()
                    .all(|(key, expected)| field.labels.get(key) == Some(expected));
                if !matches {
                    continue;
                }
                if let Some(last) = field.values.last() {
                    values.insert(field.name.clone(), last.clone());
                }
            }
        }
        Ok(values)
    }

    fn rule_map(&self, id: Option<&str>) -> Option<RuleBasedMap> {
        id.and_then(|id| self.rule_maps.get(id)).cloned()
    }
}
