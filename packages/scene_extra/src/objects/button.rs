//! Clickable panel with hover and selected styling.

use serde::{Deserialize, Serialize};

use crate::assets::AssetTicket;
use crate::extra_object::{
    AnimationParameter, ExtraObject, ExtraObjectCore, ExtraObjectParameter, ModelParameterBase,
};
use crate::input::Raycaster;
use crate::load_gate::LoadGate;
use crate::objects::font::FontData;
use crate::scene_graph::ObjectKind;

const IMAGE_KEY: &str = "image";

fn default_width() -> f32 {
    0.4
}

fn default_height() -> f32 {
    0.15
}

fn default_hover_scale() -> f32 {
    1.1
}

fn default_selected_scale() -> f32 {
    0.95
}

/// What the button face shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ButtonContent {
    Text { text: String },
    /// Texture loaded through the asset loader before the button counts as loaded.
    Image { path: String },
}

impl Default for ButtonContent {
    fn default() -> Self {
        ButtonContent::Text {
            text: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonParameter {
    #[serde(flatten)]
    pub base: ModelParameterBase,

    #[serde(default)]
    pub content: ButtonContent,

    #[serde(default = "default_width")]
    pub width: f32,

    #[serde(default = "default_height")]
    pub height: f32,

    #[serde(default = "default_hover_scale")]
    pub hover_scale: f32,

    #[serde(default = "default_selected_scale")]
    pub selected_scale: f32,

    #[serde(default)]
    pub font: FontData,
}

impl Default for ButtonParameter {
    fn default() -> Self {
        Self {
            base: ModelParameterBase::default(),
            content: ButtonContent::default(),
            width: default_width(),
            height: default_height(),
            hover_scale: default_hover_scale(),
            selected_scale: default_selected_scale(),
            font: FontData::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonVisual {
    #[default]
    Idle,
    Hovered,
    Selected,
}

pub struct ButtonObject {
    core: ExtraObjectCore,
    parameter: ButtonParameter,
    visual: ButtonVisual,
    hit: bool,
    image: Option<AssetTicket>,
}

impl ButtonObject {
    pub fn new(param: ExtraObjectParameter, parameter: ButtonParameter) -> Self {
        let kind = ObjectKind::Panel {
            width: parameter.width,
            height: parameter.height,
        };
        let mut core = ExtraObjectCore::new(param, kind, &parameter.base);

        let image = match &parameter.content {
            ButtonContent::Image { path } => {
                core.install_load_gate(LoadGate::new([IMAGE_KEY]));
                Some(core.assets().load(path))
            }
            ButtonContent::Text { .. } => {
                core.mark_loaded();
                None
            }
        };

        Self {
            core,
            parameter,
            visual: ButtonVisual::Idle,
            hit: false,
            image,
        }
    }

    pub fn visual(&self) -> ButtonVisual {
        self.visual
    }

    pub fn content(&self) -> &ButtonContent {
        &self.parameter.content
    }

    pub fn font(&self) -> &FontData {
        &self.parameter.font
    }

    fn poll_image(&mut self) {
        let Some(result) = self.image.as_mut().and_then(AssetTicket::poll) else {
            return;
        };
        match result {
            Ok(_) => self.core.complete_asset(IMAGE_KEY),
            Err(e) => self.core.fail_load(e.to_string()),
        }
    }

    fn set_visual(&mut self, visual: ButtonVisual) {
        if visual == self.visual {
            return;
        }
        let base_scale = self.core.object().scale() / self.visual_scale(self.visual);
        self.visual = visual;
        self.core
            .object()
            .set_scale(base_scale * self.visual_scale(visual));
        if visual == ButtonVisual::Selected {
            self.notify_click();
        }
    }

    fn visual_scale(&self, visual: ButtonVisual) -> f32 {
        match visual {
            ButtonVisual::Idle => 1.0,
            ButtonVisual::Hovered => self.parameter.hover_scale,
            ButtonVisual::Selected => self.parameter.selected_scale,
        }
    }
}

impl ExtraObject for ButtonObject {
    fn core(&self) -> &ExtraObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ExtraObjectCore {
        &mut self.core
    }

    fn on_frame(&mut self, parameter: &AnimationParameter) {
        self.poll_image();

        self.hit = parameter
            .raycaster()
            .and_then(|ray| ray.intersects_panel(self.core.object()))
            .is_some();
        let visual = match (self.hit, parameter.pointer.is_select) {
            (true, true) => ButtonVisual::Selected,
            (true, false) => ButtonVisual::Hovered,
            (false, _) => ButtonVisual::Idle,
        };
        self.set_visual(visual);
    }

    fn permit_input_passthrough(&self, ray: &Raycaster) -> bool {
        ray.intersects_panel(self.core.object()).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ManualAssetLoader;
    use crate::headless::{headless_parameter, headless_parameter_with_assets};
    use crate::host::CameraSnapshot;
    use crate::input::{PointerPhase, PointerSnapshot};
    use crate::notifier::EventKind;
    use crate::extra_object::Observe;
    use glam::{Mat4, Vec2, Vec3};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn camera() -> CameraSnapshot {
        CameraSnapshot::new(
            Some(Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0))),
            Mat4::perspective_rh_gl(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0),
            3,
        )
    }

    fn frame(pointer: Option<Vec2>, is_select: bool) -> PointerSnapshot {
        PointerSnapshot {
            pointer,
            is_select,
            phase: PointerPhase::Move,
        }
    }

    fn run(button: &mut ButtonObject, pointer: PointerSnapshot, camera: &CameraSnapshot) {
        button.call_animation_loop(&AnimationParameter {
            pointer,
            camera,
            delta: 1.0 / 60.0,
            frame_rate: 60.0,
        });
    }

    #[test]
    fn test_hover_select_and_click() {
        let clicks = Rc::new(RefCell::new(0));
        let c = clicks.clone();
        let mut button = ButtonObject::new(headless_parameter("Go"), ButtonParameter::default())
            .on_click(move |_| *c.borrow_mut() += 1);
        let camera = camera();

        run(&mut button, frame(Some(Vec2::ZERO), false), &camera);
        assert_eq!(button.visual(), ButtonVisual::Hovered);

        run(&mut button, frame(Some(Vec2::ZERO), true), &camera);
        assert_eq!(button.visual(), ButtonVisual::Selected);
        run(&mut button, frame(Some(Vec2::ZERO), true), &camera);
        assert_eq!(*clicks.borrow(), 1);

        run(&mut button, frame(Some(Vec2::new(0.9, 0.9)), false), &camera);
        assert_eq!(button.visual(), ButtonVisual::Idle);
        assert!((button.object().scale().x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_passthrough_only_off_the_button() {
        let button = ButtonObject::new(headless_parameter("Go"), ButtonParameter::default());
        let camera = camera();
        let on = Raycaster::from_camera(Vec2::ZERO, &camera).unwrap();
        let off = Raycaster::from_camera(Vec2::new(0.9, 0.9), &camera).unwrap();
        assert!(!button.permit_input_passthrough(&on));
        assert!(button.permit_input_passthrough(&off));
    }

    #[test]
    fn test_image_button_loads_through_gate() {
        let assets = Rc::new(ManualAssetLoader::new());
        let parameter = ButtonParameter {
            content: ButtonContent::Image {
                path: "icons/go.png".to_string(),
            },
            ..ButtonParameter::default()
        };
        let loads = Rc::new(RefCell::new(0));
        let l = loads.clone();
        let mut button = ButtonObject::new(headless_parameter_with_assets("Go", assets.clone()), parameter)
            .on(EventKind::Load, move |_| *l.borrow_mut() += 1);
        button.awake();
        assert!(!button.is_loaded());

        assert!(assets.complete("icons/go.png", vec![0]));
        run(&mut button, frame(None, false), &CameraSnapshot::default());
        assert!(button.is_loaded());
        assert_eq!(*loads.borrow(), 1);
    }
}
