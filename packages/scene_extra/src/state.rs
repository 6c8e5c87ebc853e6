//! State values and load status shared by every extra object.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Seed state accepted before loading completes.
pub const INIT_STATE: &str = "init";

/// State applied when no rule matches the bound values.
pub const UNDEFINED_STATE: &str = "undefined";

/// Cloud-synchronised state of an object: text or number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Number(f64),
    Text(String),
}

impl StateValue {
    pub fn init() -> Self {
        StateValue::Text(INIT_STATE.to_string())
    }

    pub fn undefined() -> Self {
        StateValue::Text(UNDEFINED_STATE.to_string())
    }

    pub fn is_init(&self) -> bool {
        matches!(self, StateValue::Text(s) if s == INIT_STATE)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StateValue::Text(s) => Some(s),
            StateValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            StateValue::Number(n) => Some(*n),
            StateValue::Text(_) => None,
        }
    }
}

impl Default for StateValue {
    fn default() -> Self {
        StateValue::Text(String::new())
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Number(n) => write!(f, "{}", n),
            StateValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::Text(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::Text(value)
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        StateValue::Number(value)
    }
}

impl From<i32> for StateValue {
    fn from(value: i32) -> Self {
        StateValue::Number(value as f64)
    }
}

/// Asynchronous construction progress of an object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Unloaded,
    Loaded,
    /// An asset failed to load. The object will never become loaded.
    Failed(String),
}

impl LoadStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadStatus::Loaded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LoadStatus::Failed(_))
    }
}

/// Outcome of a state change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// Equal to the current state, or dropped because the object is not loaded.
    Ignored,
    /// The init sentinel was stored without a reaction.
    Seeded,
    /// The state was stored and observers notified.
    Applied,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_empty_text() {
        assert_eq!(StateValue::default(), StateValue::Text(String::new()));
        assert_eq!(StateValue::default().to_string(), "");
    }

    #[test]
    fn test_untagged_serde() {
        let text: StateValue = serde_json::from_str("\"running\"").unwrap();
        let number: StateValue = serde_json::from_str("42").unwrap();
        assert_eq!(text, StateValue::from("running"));
        assert_eq!(number, StateValue::from(42));
    }

    #[test]
    fn test_number_and_text_differ() {
        assert_ne!(StateValue::from("1"), StateValue::from(1));
        assert!(StateValue::init().is_init());
        assert!(!StateValue::undefined().is_init());
    }
}
