//! Text panel.

use serde::{Deserialize, Serialize};

use crate::data::ValueMap;
use crate::extra_object::{ExtraObject, ExtraObjectCore, ExtraObjectParameter, ModelParameterBase};
use crate::objects::fill_placeholders;
use crate::objects::font::FontData;
use crate::scene_graph::ObjectKind;
use crate::state::StateValue;

fn default_width() -> f32 {
    1.0
}

fn default_height() -> f32 {
    0.3
}

fn default_font_size() -> f32 {
    0.07
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextParameter {
    #[serde(flatten)]
    pub base: ModelParameterBase,

    /// Displayed text. `{state}` and `{field}` placeholders are filled in.
    #[serde(default)]
    pub content: String,

    #[serde(default = "default_width")]
    pub width: f32,

    #[serde(default = "default_height")]
    pub height: f32,

    #[serde(default = "default_font_size")]
    pub font_size: f32,

    #[serde(default)]
    pub font: FontData,

    #[serde(default)]
    pub billboard: bool,
}

impl Default for TextParameter {
    fn default() -> Self {
        Self {
            base: ModelParameterBase::default(),
            content: String::new(),
            width: default_width(),
            height: default_height(),
            font_size: default_font_size(),
            font: FontData::default(),
            billboard: false,
        }
    }
}

type StateFormatter = Box<dyn Fn(&StateValue) -> String>;
type ValueFormatter = Box<dyn Fn(&ValueMap) -> Option<String>>;

pub struct TextObject {
    core: ExtraObjectCore,
    parameter: TextParameter,
    values: ValueMap,
    text: String,
    state_formatter: Option<StateFormatter>,
    value_formatter: Option<ValueFormatter>,
}

impl TextObject {
    pub fn new(param: ExtraObjectParameter, parameter: TextParameter) -> Self {
        let kind = ObjectKind::Panel {
            width: parameter.width,
            height: parameter.height,
        };
        let mut core = ExtraObjectCore::new(param, kind, &parameter.base);
        core.set_billboard(parameter.billboard);
        core.mark_loaded();

        let mut text = Self {
            core,
            text: String::new(),
            parameter,
            values: ValueMap::new(),
            state_formatter: None,
            value_formatter: None,
        };
        text.refresh();
        text
    }

    /// Render the text from the current state instead of the template.
    pub fn with_state_formatter(mut self, formatter: impl Fn(&StateValue) -> String + 'static) -> Self {
        self.state_formatter = Some(Box::new(formatter));
        self.refresh();
        self
    }

    /// Render the text from bound values. `None` keeps the previous text.
    pub fn with_value_formatter(
        mut self,
        formatter: impl Fn(&ValueMap) -> Option<String> + 'static,
    ) -> Self {
        self.value_formatter = Some(Box::new(formatter));
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn font(&self) -> &FontData {
        &self.parameter.font
    }

    pub fn font_size(&self) -> f32 {
        self.parameter.font_size
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.parameter.content = content.into();
        self.refresh();
    }

    fn refresh(&mut self) {
        self.text = match &self.state_formatter {
            Some(format) => format(self.core.state()),
            None => fill_placeholders(&self.parameter.content, self.core.state(), &self.values),
        };
    }
}

impl ExtraObject for TextObject {
    fn core(&self) -> &ExtraObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ExtraObjectCore {
        &mut self.core
    }

    fn on_state_changed(&mut self, _state: &StateValue) {
        self.refresh();
    }

    fn on_values_updated(&mut self, values: &ValueMap) {
        self.values = values.clone();
        if let Some(format) = &self.value_formatter {
            if let Some(text) = format(values) {
                self.text = text;
            }
            return;
        }
        self.refresh();
    }
}
