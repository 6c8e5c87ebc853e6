//! Animated 3D model with state-driven motion clips.
//!
//! The model file and every motion clip load independently. The object
//! counts as loaded once all of them have arrived; a failure of any one of
//! them fails the whole object. Applied states pick the set of motions to
//! play, either through a bound handler or the `stateMotions` table.

use std::collections::BTreeMap;

use glam::{EulerRot, Quat};
use serde::{Deserialize, Serialize};

use crate::assets::AssetTicket;
use crate::extra_object::{
    AnimationParameter, ExtraObject, ExtraObjectCore, ExtraObjectParameter, ModelParameterBase,
};
use crate::load_gate::LoadGate;
use crate::scene_graph::ObjectKind;
use crate::state::StateValue;

const MODEL_KEY: &str = "model";

fn motion_key(name: &str) -> String {
    format!("motion:{}", name)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelParameter {
    #[serde(flatten)]
    pub base: ModelParameterBase,

    pub model_path: String,

    /// Motion name to clip path.
    #[serde(default)]
    pub motions: BTreeMap<String, String>,

    /// State to the motions played while it is current.
    #[serde(default)]
    pub state_motions: BTreeMap<String, Vec<String>>,

    /// Yaw override in degrees.
    #[serde(default)]
    pub angle: Option<f32>,
}

type StateHandler = Box<dyn Fn(&StateValue) -> Vec<String>>;

struct PendingAsset {
    key: String,
    ticket: AssetTicket,
}

pub struct ModelObject {
    core: ExtraObjectCore,
    parameter: ModelParameter,
    pending: Vec<PendingAsset>,
    playing: Vec<String>,
    motion_time: f32,
    state_handler: Option<StateHandler>,
}

impl ModelObject {
    pub fn new(param: ExtraObjectParameter, parameter: ModelParameter) -> Self {
        let kind = ObjectKind::Mesh {
            asset: parameter.model_path.clone(),
        };
        let mut core = ExtraObjectCore::new(param, kind, &parameter.base);

        if let Some(angle) = parameter.angle {
            let (x, _, z) = core.object().rotation().to_euler(EulerRot::XYZ);
            core.object()
                .set_rotation(Quat::from_euler(EulerRot::XYZ, x, angle.to_radians(), z));
        }

        let mut keys = vec![MODEL_KEY.to_string()];
        keys.extend(parameter.motions.keys().map(|name| motion_key(name)));
        core.install_load_gate(LoadGate::new(keys));

        let mut pending = vec![PendingAsset {
            key: MODEL_KEY.to_string(),
            ticket: core.assets().load(&parameter.model_path),
        }];
        for (name, path) in &parameter.motions {
            pending.push(PendingAsset {
                key: motion_key(name),
                ticket: core.assets().load(path),
            });
        }

        Self {
            core,
            parameter,
            pending,
            playing: Vec::new(),
            motion_time: 0.0,
            state_handler: None,
        }
    }

    /// Choose motions for each applied state with `handler` instead of the table.
    pub fn bind_state_handler(mut self, handler: impl Fn(&StateValue) -> Vec<String> + 'static) -> Self {
        self.state_handler = Some(Box::new(handler));
        self
    }

    /// Motions currently playing.
    pub fn playing(&self) -> &[String] {
        &self.playing
    }

    /// Seconds since the current motions started.
    pub fn motion_time(&self) -> f32 {
        self.motion_time
    }

    pub fn play(&mut self, names: &[String]) {
        self.playing = names
            .iter()
            .filter(|name| {
                let known = self.parameter.motions.contains_key(name.as_str());
                if !known {
                    log::warn!("Model '{}' has no motion '{}'", self.core.name(), name);
                }
                known
            })
            .cloned()
            .collect();
        self.motion_time = 0.0;
    }

    pub fn stop_all(&mut self) {
        self.playing.clear();
        self.motion_time = 0.0;
    }

    fn poll_assets(&mut self) {
        let mut finished = Vec::new();
        for asset in &mut self.pending {
            if let Some(result) = asset.ticket.poll() {
                finished.push((asset.key.clone(), result));
            }
        }
        self.pending.retain(|asset| !asset.ticket.is_finished());

        for (key, result) in finished {
            match result {
                Ok(_) => self.core.complete_asset(&key),
                Err(e) => self.core.fail_load(e.to_string()),
            }
        }
    }
}

impl ExtraObject for ModelObject {
    fn core(&self) -> &ExtraObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ExtraObjectCore {
        &mut self.core
    }

    fn on_frame(&mut self, parameter: &AnimationParameter) {
        self.poll_assets();
        if !self.playing.is_empty() {
            self.motion_time += parameter.delta;
        }
    }

    fn on_state_changed(&mut self, state: &StateValue) {
        let motions = match &self.state_handler {
            Some(handler) => handler(state),
            None => self
                .parameter
                .state_motions
                .get(&state.to_string())
                .cloned()
                .unwrap_or_default(),
        };
        if motions.is_empty() {
            self.stop_all();
        } else {
            self.play(&motions);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ManualAssetLoader;
    use crate::headless::headless_parameter_with_assets;
    use crate::host::CameraSnapshot;
    use crate::input::PointerSnapshot;
    use std::rc::Rc;

    fn parameter() -> ModelParameter {
        ModelParameter {
            model_path: "robot.glb".to_string(),
            motions: BTreeMap::from([
                ("walk".to_string(), "walk.vmd".to_string()),
                ("wave".to_string(), "wave.vmd".to_string()),
            ]),
            state_motions: BTreeMap::from([("running".to_string(), vec!["walk".to_string()])]),
            ..ModelParameter::default()
        }
    }

    fn frame(model: &mut ModelObject) {
        let camera = CameraSnapshot::default();
        model.call_animation_loop(&AnimationParameter {
            pointer: PointerSnapshot::default(),
            camera: &camera,
            delta: 0.5,
            frame_rate: 60.0,
        });
    }

    #[test]
    fn test_loaded_after_model_and_motions() {
        let assets = Rc::new(ManualAssetLoader::new());
        let mut model = ModelObject::new(headless_parameter_with_assets("Robot", assets.clone()), parameter());
        model.awake();
        assert_eq!(assets.pending_paths(), vec!["robot.glb", "walk.vmd", "wave.vmd"]);

        assets.complete("robot.glb", vec![]);
        frame(&mut model);
        assert!(!model.is_loaded());

        assets.complete_all();
        frame(&mut model);
        assert!(model.is_loaded());
    }

    #[test]
    fn test_state_selects_motions() {
        let assets = Rc::new(ManualAssetLoader::new());
        let mut model = ModelObject::new(headless_parameter_with_assets("Robot", assets.clone()), parameter());
        model.awake();
        assets.complete_all();
        frame(&mut model);

        model.state_change("running".into());
        assert_eq!(model.playing(), &["walk".to_string()]);
        frame(&mut model);
        assert_eq!(model.motion_time(), 0.5);

        model.state_change("idle".into());
        assert!(model.playing().is_empty());
    }

    #[test]
    fn test_bound_handler_and_unknown_motion() {
        let assets = Rc::new(ManualAssetLoader::new());
        let mut model = ModelObject::new(headless_parameter_with_assets("Robot", assets.clone()), parameter())
            .bind_state_handler(|_| vec!["wave".to_string(), "dance".to_string()]);
        model.awake();
        assets.complete_all();
        frame(&mut model);

        model.state_change("anything".into());
        assert_eq!(model.playing(), &["wave".to_string()]);
    }

    #[test]
    fn test_failed_motion_fails_model() {
        let assets = Rc::new(ManualAssetLoader::new());
        let mut model = ModelObject::new(headless_parameter_with_assets("Robot", assets.clone()), parameter());
        model.awake();
        assets.fail("wave.vmd", "corrupt");
        assets.complete_all();
        frame(&mut model);

        assert!(model.load_status().is_failed());
        model.state_change("running".into());
        assert!(model.playing().is_empty());
    }
}
