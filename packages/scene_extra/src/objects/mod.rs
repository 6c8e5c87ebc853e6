//! Widgets a tag can be replaced with.

pub mod button;
pub mod chart;
pub mod font;
pub mod group;
pub mod html;
pub mod image;
pub mod loading;
pub mod model;
pub mod text;
pub mod video_atlas;

use std::sync::OnceLock;

use regex::Regex;

use crate::data::{DataValue, ValueMap};
use crate::state::StateValue;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("placeholder regex is valid"))
}

/// Fill `{state}` and `{field}` placeholders. Unknown names are left as written.
pub fn fill_placeholders(template: &str, state: &StateValue, values: &ValueMap) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            if name == "state" {
                return state.to_string();
            }
            match values.get(name) {
                Some(DataValue::Bool(b)) => b.to_string(),
                Some(DataValue::Number(n)) => n.to_string(),
                Some(DataValue::Text(s)) => s.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
