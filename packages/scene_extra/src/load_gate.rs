//! Counting gate over independently loading assets.

use std::collections::BTreeSet;

/// Completes once every required key has been reported.
///
/// Unknown and duplicate keys are ignored. Completion is reported exactly once,
/// by the `complete` call that fills the last slot.
#[derive(Debug, Clone, Default)]
pub struct LoadGate {
    required: BTreeSet<String>,
    completed: BTreeSet<String>,
    fired: bool,
}

impl LoadGate {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            completed: BTreeSet::new(),
            fired: false,
        }
    }

    /// Record `key` as loaded. Returns true only on the call that completes the gate.
    pub fn complete(&mut self, key: &str) -> bool {
        if !self.required.contains(key) {
            log::debug!("Load gate ignoring unknown key '{}'", key);
            return false;
        }
        self.completed.insert(key.to_string());
        self.take_completion()
    }

    /// Mark the gate fired if it is complete and has not fired yet.
    pub fn take_completion(&mut self) -> bool {
        if self.is_complete() && !self.fired {
            self.fired = true;
            true
        } else {
            false
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed.len() == self.required.len()
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Keys still outstanding, in sorted order.
    pub fn pending(&self) -> Vec<&str> {
        self.required
            .difference(&self.completed)
            .map(String::as_str)
            .collect()
    }
}
