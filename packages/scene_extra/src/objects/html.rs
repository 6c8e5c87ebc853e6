//! Markup rendered on the CSS overlay layer.

use serde::{Deserialize, Serialize};

use crate::data::ValueMap;
use crate::extra_object::{ExtraObject, ExtraObjectCore, ExtraObjectParameter, ModelParameterBase};
use crate::objects::fill_placeholders;
use crate::scene_graph::ObjectKind;
use crate::state::StateValue;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlParameter {
    #[serde(flatten)]
    pub base: ModelParameterBase,

    /// Element markup. `{state}` and `{field}` placeholders are filled in.
    #[serde(default)]
    pub markup: String,
}

pub struct HtmlObject {
    core: ExtraObjectCore,
    template: String,
    values: ValueMap,
}

impl HtmlObject {
    pub fn new(param: ExtraObjectParameter, parameter: HtmlParameter) -> Self {
        let markup = fill_placeholders(&parameter.markup, &StateValue::default(), &ValueMap::new());
        let mut core = ExtraObjectCore::new(param, ObjectKind::Css { markup }, &parameter.base);
        core.mark_loaded();
        Self {
            core,
            template: parameter.markup,
            values: ValueMap::new(),
        }
    }

    /// Markup currently shown on the overlay.
    pub fn markup(&self) -> String {
        match self.core.object().kind() {
            ObjectKind::Css { markup } => markup,
            _ => String::new(),
        }
    }

    pub fn set_template(&mut self, template: impl Into<String>) {
        self.template = template.into();
        self.render();
    }

    fn render(&self) {
        let markup = fill_placeholders(&self.template, self.core.state(), &self.values);
        self.core.object().set_kind(ObjectKind::Css { markup });
    }
}

impl ExtraObject for HtmlObject {
    fn core(&self) -> &ExtraObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ExtraObjectCore {
        &mut self.core
    }

    fn on_state_changed(&mut self, _state: &StateValue) {
        self.render();
    }

    fn on_values_updated(&mut self, values: &ValueMap) {
        self.values = values.clone();
        self.render();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataValue;
    use crate::headless::headless_parameter;

    #[test]
    fn test_markup_follows_values_and_state() {
        let parameter = HtmlParameter {
            markup: "<div class=\"{state}\">{rpm} rpm</div>".to_string(),
            ..HtmlParameter::default()
        };
        let mut html = HtmlObject::new(headless_parameter("Panel"), parameter);
        assert_eq!(html.markup(), "<div class=\"\">{rpm} rpm</div>");

        html.update_values(ValueMap::from([("rpm".to_string(), DataValue::Number(1200.0))]));
        html.state_change("running".into());
        assert_eq!(html.markup(), "<div class=\"running\">1200 rpm</div>");
    }
}
