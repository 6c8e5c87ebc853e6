//! Image panel showing one texture out of a list.

use serde::{Deserialize, Serialize};

use crate::assets::AssetTicket;
use crate::extra_object::{
    AnimationParameter, ExtraObject, ExtraObjectCore, ExtraObjectParameter, ModelParameterBase,
};
use crate::load_gate::LoadGate;
use crate::scene_graph::ObjectKind;

const IMAGE_LOADED_KEY: &str = "imageLoaded";

/// One path or a list of paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImagePath {
    One(String),
    Many(Vec<String>),
}

impl ImagePath {
    pub fn paths(&self) -> Vec<&str> {
        match self {
            ImagePath::One(path) => vec![path.as_str()],
            ImagePath::Many(paths) => paths.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageParameter {
    #[serde(flatten)]
    pub base: ModelParameterBase,

    pub image_path: ImagePath,

    pub width: f32,
    pub height: f32,

    #[serde(default)]
    pub is_billboard: bool,
}

pub struct ImageObject {
    core: ExtraObjectCore,
    pending: Vec<AssetTicket>,
    textures: Vec<String>,
    index: usize,
}

impl ImageObject {
    pub fn new(param: ExtraObjectParameter, parameter: ImageParameter) -> Self {
        let kind = ObjectKind::Panel {
            width: parameter.width,
            height: parameter.height,
        };
        let mut core = ExtraObjectCore::new(param, kind, &parameter.base);
        core.set_billboard(parameter.is_billboard);
        core.install_load_gate(LoadGate::new([IMAGE_LOADED_KEY]));

        let mut image = Self {
            core,
            pending: Vec::new(),
            textures: Vec::new(),
            index: 0,
        };
        image.set_image(&parameter.image_path);
        image
    }

    /// Replace the texture list. Loading completes once every texture arrived.
    pub fn set_image(&mut self, image_path: &ImagePath) {
        self.clear_image();
        self.pending = image_path
            .paths()
            .into_iter()
            .map(|path| self.core.assets().load(path))
            .collect();
    }

    pub fn clear_image(&mut self) {
        self.pending.clear();
        self.textures.clear();
        self.index = 0;
    }

    pub fn texture_index(&self) -> usize {
        self.index
    }

    pub fn texture_counts(&self) -> usize {
        self.textures.len()
    }

    /// Path of the texture on display.
    pub fn current_texture(&self) -> Option<&str> {
        self.textures.get(self.index).map(String::as_str)
    }

    /// Show the texture at `index`, clamped to the loaded list.
    pub fn set_index(&mut self, index: isize) {
        if self.textures.is_empty() {
            return;
        }
        let last = self.textures.len() as isize - 1;
        self.index = index.clamp(0, last) as usize;
    }

    pub fn show_next_image(&mut self) {
        self.set_index(self.index as isize + 1);
    }

    pub fn show_before_image(&mut self) {
        self.set_index(self.index as isize - 1);
    }

    fn poll_textures(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut failure = None;
        for ticket in &mut self.pending {
            match ticket.poll() {
                Some(Ok(_)) => self.textures.push(ticket.path().to_string()),
                Some(Err(e)) => {
                    failure.get_or_insert(e.to_string());
                }
                None => {}
            }
        }
        self.pending.retain(|ticket| !ticket.is_finished());

        if let Some(reason) = failure {
            self.core.fail_load(reason);
        } else if self.pending.is_empty() {
            self.core.complete_asset(IMAGE_LOADED_KEY);
        }
    }
}

impl ExtraObject for ImageObject {
    fn core(&self) -> &ExtraObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ExtraObjectCore {
        &mut self.core
    }

    fn on_frame(&mut self, _parameter: &AnimationParameter) {
        self.poll_textures();
    }
}
