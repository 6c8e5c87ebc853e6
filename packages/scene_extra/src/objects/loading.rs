//! Spinner shown while something else is loading.

use glam::Quat;
use serde::{Deserialize, Serialize};

use crate::extra_object::{
    AnimationParameter, ExtraObject, ExtraObjectCore, ExtraObjectParameter, ModelParameterBase,
};
use crate::scene_graph::{Object3D, ObjectKind};

/// Spinner rotation per frame in radians.
const ROTATE_SPEED: f32 = 0.06;

fn default_size() -> f32 {
    0.4
}

fn default_line_width() -> f32 {
    0.02
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingParameter {
    #[serde(flatten)]
    pub base: ModelParameterBase,

    #[serde(default = "default_size")]
    pub size: f32,

    #[serde(default = "default_line_width")]
    pub line_width: f32,
}

impl Default for LoadingParameter {
    fn default() -> Self {
        Self {
            base: ModelParameterBase::default(),
            size: default_size(),
            line_width: default_line_width(),
        }
    }
}

pub struct LoadingViewObject {
    core: ExtraObjectCore,
    spinner: Object3D,
    parameter: LoadingParameter,
}

impl LoadingViewObject {
    pub fn new(param: ExtraObjectParameter, parameter: LoadingParameter) -> Self {
        let kind = ObjectKind::Panel {
            width: parameter.size,
            height: parameter.size,
        };
        let mut core = ExtraObjectCore::new(param, kind, &parameter.base);
        core.set_billboard(true);
        core.mark_loaded();

        let ring = parameter.size / 3.0 + parameter.line_width;
        let spinner = Object3D::new(
            "Spinner",
            ObjectKind::Panel {
                width: ring * 2.0,
                height: ring * 2.0,
            },
        );
        spinner.set_position(glam::Vec3::new(0.0, 0.0, 0.0001));
        core.object().add(&spinner);

        Self {
            core,
            spinner,
            parameter,
        }
    }

    pub fn spinner(&self) -> &Object3D {
        &self.spinner
    }

    pub fn size(&self) -> f32 {
        self.parameter.size
    }
}

impl ExtraObject for LoadingViewObject {
    fn core(&self) -> &ExtraObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ExtraObjectCore {
        &mut self.core
    }

    fn on_frame(&mut self, _parameter: &AnimationParameter) {
        let rotation = self.spinner.rotation() * Quat::from_rotation_z(-ROTATE_SPEED);
        self.spinner.set_rotation(rotation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::headless_parameter;
    use crate::host::CameraSnapshot;
    use crate::input::PointerSnapshot;
    use glam::{Mat4, Vec3};

    #[test]
    fn test_spinner_turns_and_faces_camera() {
        let mut loading = LoadingViewObject::new(headless_parameter("Wait"), LoadingParameter::default());
        let camera_rotation = Quat::from_rotation_y(0.5);
        let camera = CameraSnapshot::new(
            Some(Mat4::from_rotation_translation(camera_rotation, Vec3::new(0.0, 0.0, 5.0))),
            Mat4::IDENTITY,
            3,
        );
        for _ in 0..10 {
            loading.call_animation_loop(&AnimationParameter {
                pointer: PointerSnapshot::default(),
                camera: &camera,
                delta: 1.0 / 60.0,
                frame_rate: 60.0,
            });
        }
        let (_, angle) = loading.spinner().rotation().to_axis_angle();
        assert!((angle - 0.6).abs() < 1e-4);
        assert!((loading.object().rotation().dot(camera_rotation).abs() - 1.0).abs() < 1e-5);
    }
}
