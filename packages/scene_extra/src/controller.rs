//! Scene controller: waits for the host scene, installs widgets in place of
//! tags, relays cloud data into them and drives them every frame.
//!
//! The host owns two clocks. A slow poll (500 ms by default) calls
//! [`SceneController::exec`] and [`SceneController::exec_data`]; the render
//! loop calls [`SceneController::animate`] once per frame. None of the three
//! ever blocks.

use std::rc::Rc;

use crate::assets::AssetLoader;
use crate::config::ControllerConfig;
use crate::data::{DataError, DataSource};
use crate::extra_object::{AnimationParameter, ExtraObject, OverrideTags};
use crate::fault;
use crate::host::{
    search_root_scene, CameraSnapshot, CanvasRect, NodeMap, ObjectResolver, RootScene,
};
use crate::input::{
    to_ndc, MouseEventInterceptor, PointerEvent, PointerInput, PointerQueue, PointerSource, Raycaster,
};
use crate::replace::ReplaceContext;
use crate::rules::RuleEvaluator;
use crate::scene_graph::{Object3D, ObjectKind};
use crate::state::StateValue;
use crate::tag_search::search_tag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneControllerState {
    Initialize,
    Active,
}

pub struct SceneController {
    tags: OverrideTags,
    config: Rc<ControllerConfig>,
    assets: Rc<dyn AssetLoader>,
    pointer_source: Box<dyn PointerSource>,
    queue: PointerQueue,
    pointer: PointerInput,
    interceptor: MouseEventInterceptor,
    root_scene: Option<RootScene>,
    objects: Vec<(String, Box<dyn ExtraObject>)>,
    camera: Option<CameraSnapshot>,
    installed: bool,
    running: bool,
}

impl SceneController {
    pub fn new(
        tags: OverrideTags,
        config: ControllerConfig,
        pointer_source: Box<dyn PointerSource>,
        assets: Rc<dyn AssetLoader>,
    ) -> Self {
        Self {
            tags,
            config: Rc::new(config),
            assets,
            pointer_source,
            queue: PointerQueue::new(),
            pointer: PointerInput::default(),
            interceptor: MouseEventInterceptor::new(),
            root_scene: None,
            objects: Vec::new(),
            camera: None,
            installed: false,
            running: false,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// One poll step. Installs every configured tag the first time the root
    /// scene resolves and returns the state the caller should keep.
    pub fn exec(
        &mut self,
        state: SceneControllerState,
        node_map: &NodeMap,
        resolver: &dyn ObjectResolver,
    ) -> SceneControllerState {
        if self.installed || state == SceneControllerState::Active {
            return SceneControllerState::Active;
        }
        let Some(root_scene) = search_root_scene(node_map, resolver) else {
            log::debug!("Root scene not ready, {} nodes scanned", node_map.len());
            return state;
        };

        self.setup(&root_scene);
        self.install(&root_scene, node_map, resolver);
        self.root_scene = Some(root_scene);
        self.installed = true;

        log::info!(
            "Scene controller active with {}/{} tags installed",
            self.objects.len(),
            self.tags.len()
        );
        SceneControllerState::Active
    }

    /// One-time scene preparation: lighting, renderer tuning, canvas and
    /// overlay sizing, pointer hookup and frame loop start.
    fn setup(&mut self, root_scene: &RootScene) {
        root_scene.add(&Object3D::new(
            "AmbientLight",
            ObjectKind::AmbientLight {
                color: self.config.ambient_color,
                intensity: self.config.ambient_intensity,
            },
        ));

        let rect = {
            let mut viewport = root_scene.viewport().borrow_mut();
            viewport.configure_renderer(&self.config.renderer);
            let rect = viewport.canvas_rect();
            viewport.resize_overlay(rect);
            rect
        };
        self.pointer.set_canvas_rect(rect);
        self.interceptor.sync(rect);
        self.pointer_source.attach(self.queue.clone());
        self.running = true;

        log::debug!(
            "Scene setup done, canvas {}x{} at ({}, {})",
            rect.width,
            rect.height,
            rect.left,
            rect.top
        );
    }

    fn install(&mut self, root_scene: &RootScene, node_map: &NodeMap, resolver: &dyn ObjectResolver) {
        let assets = self.assets.clone();
        let config = self.config.clone();
        let mut installed = Vec::new();

        for (name, factory) in self.tags.iter_mut() {
            let context = search_tag(node_map, name, |reference, anchor| {
                Some(ReplaceContext::new(
                    root_scene.clone(),
                    name,
                    anchor.clone(),
                    resolver.resolve(Some(reference)),
                    assets.clone(),
                    config.clone(),
                ))
            });
            let Some(context) = context else {
                log::warn!("No tag named '{}' in the scene document", name);
                continue;
            };

            match fault::isolate(|| format!("Factory for '{}'", name), || (**factory)(context)) {
                Some(Some(object)) => {
                    log::info!("Replaced tag '{}'", name);
                    installed.push((name.to_string(), object));
                }
                Some(None) => log::warn!("Factory for '{}' did not build an object", name),
                None => {}
            }
        }

        for (_, object) in installed.iter_mut() {
            object.awake();
        }
        self.objects.extend(installed);
    }

    /// Relay the latest bound values and the rule outcome into every object.
    /// A failure for one object is logged and does not affect the others.
    pub fn exec_data(&mut self, source: &dyn DataSource, rules: &dyn RuleEvaluator) {
        for (name, object) in self.objects.iter_mut() {
            let outcome = fault::isolate(|| format!("Data refresh for '{}'", name), || {
                let anchor = object.anchor().clone();
                let values = source.resolve_values(anchor.value_data_binding.as_ref())?;
                let rule = source.rule_map(anchor.rule_based_map_id.as_deref());
                let target = rules.evaluate(&StateValue::undefined(), &values, rule.as_ref());

                object.update_values(values);
                if let Some(state) = target {
                    object.state_change(state);
                }
                Ok::<(), DataError>(())
            });

            if let Some(Err(e)) = outcome {
                log::warn!("Skipping data for '{}': {}", name, e);
            }
        }
    }

    /// One frame. Does nothing until the scene has been set up.
    pub fn animate(&mut self, delta: f32) {
        if !self.running {
            return;
        }
        let Some(root_scene) = self.root_scene.clone() else {
            return;
        };

        let rect = root_scene.viewport().borrow().canvas_rect();
        if rect != self.pointer.canvas_rect() {
            self.resize(&root_scene, rect);
        }
        root_scene
            .viewport()
            .borrow_mut()
            .render_overlay(root_scene.scene());

        let camera = root_scene.camera_snapshot(self.config.fingerprint_precision);
        for event in self.queue.drain() {
            self.pointer.put_event(event);
        }
        let frame_rate = match root_scene.viewport().borrow().frame_rate() {
            rate if rate > 0.0 => rate,
            _ => self.config.frame_rate,
        };

        let parameter = AnimationParameter {
            pointer: self.pointer.current_event(),
            camera: &camera,
            delta,
            frame_rate,
        };
        for (name, object) in self.objects.iter_mut() {
            fault::isolate(|| format!("Frame for '{}'", name), || {
                object.call_animation_loop(&parameter)
            });
        }

        self.pointer.next();
        root_scene.viewport().borrow_mut().update_ui();
        self.camera = Some(camera);
    }

    /// Follow a canvas resize: overlay size and pointer geometry.
    fn resize(&mut self, root_scene: &RootScene, rect: CanvasRect) {
        root_scene.viewport().borrow_mut().resize_overlay(rect);
        self.pointer.set_canvas_rect(rect);
        self.interceptor.sync(rect);
        log::debug!("Canvas resized to {}x{}", rect.width, rect.height);
    }

    /// True if `event` should be kept from the host's own handlers because a
    /// visible widget is under the pointer.
    pub fn intercept_pointer(&mut self, event: &PointerEvent) -> bool {
        let passthrough = match (event.client, &self.camera) {
            (Some(client), Some(camera)) => {
                let ndc = to_ndc(client, &self.pointer.canvas_rect());
                match Raycaster::from_camera(ndc, camera) {
                    Some(ray) => self
                        .objects
                        .iter()
                        .all(|(_, object)| object.permit_input_passthrough(&ray)),
                    None => true,
                }
            }
            _ => true,
        };
        self.interceptor.set_enable_propagation(passthrough);
        self.interceptor.should_intercept(event)
    }

    pub fn get_object(&self, name: &str) -> Option<&(dyn ExtraObject + 'static)> {
        self.objects
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, object)| object.as_ref())
    }

    pub fn get_object_mut(&mut self, name: &str) -> Option<&mut Box<dyn ExtraObject>> {
        self.objects
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, object)| object)
    }

    /// Installed object names in installation order.
    pub fn object_names(&self) -> Vec<&str> {
        self.objects.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn root_scene(&self) -> Option<&RootScene> {
        self.root_scene.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Detach the pointer source and stop the frame loop. Installed objects
    /// stay in the scene.
    pub fn shutdown(&mut self) {
        if self.running {
            self.pointer_source.detach();
            self.running = false;
            log::info!("Scene controller stopped");
        }
    }
}

impl Drop for SceneController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Tracks the poll cadence for hosts that only have a frame clock.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    interval: f32,
    elapsed: f32,
    started: bool,
}

impl PollSchedule {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval: interval_ms as f32 / 1000.0,
            elapsed: 0.0,
            started: false,
        }
    }

    /// Advance by `delta` seconds. True when a poll is due; the first call
    /// always polls.
    pub fn advance(&mut self, delta: f32) -> bool {
        if !self.started {
            self.started = true;
            return true;
        }
        self.elapsed += delta;
        if self.elapsed >= self.interval {
            self.elapsed -= self.interval;
            true
        } else {
            false
        }
    }
}
