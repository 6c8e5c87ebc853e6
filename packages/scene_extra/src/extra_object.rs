//! The extra object contract: the runtime replacement for a tag.
//!
//! Every widget embeds an [`ExtraObjectCore`] holding the shared state
//! machine (load status, current state, notifier, optional load gate, camera
//! watcher, billboard flag) and implements [`ExtraObject`] to add its own
//! per-frame, state and value hooks.

use std::any::Any;
use std::collections::VecDeque;
use std::rc::Rc;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::assets::AssetLoader;
use crate::config::ControllerConfig;
use crate::data::ValueMap;
use crate::host::{AnchorComponent, CameraSnapshot, RootScene};
use crate::input::{PointerSnapshot, Raycaster};
use crate::load_gate::LoadGate;
use crate::notifier::{EventContext, EventKind, EventNotifier, EventPayload};
use crate::replace::ReplaceContext;
use crate::scene_graph::{Object3D, ObjectKind, Transform};
use crate::state::{LoadStatus, StateTransition, StateValue};

/// Per-widget placement adjustment relative to the replaced tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelParameterBase {
    /// Added to the tag position.
    #[serde(default)]
    pub position: Option<[f32; 3]>,
    /// XYZ Euler angles in radians, applied after the tag rotation.
    #[serde(default)]
    pub rotation: Option<[f32; 3]>,
    /// Multiplied with the tag scale.
    #[serde(default)]
    pub scale: Option<[f32; 3]>,
}

impl ModelParameterBase {
    /// Combine with the tag's transform snapshot.
    pub fn apply_to(&self, tag: &Transform) -> Transform {
        let offset = self.position.map(Vec3::from).unwrap_or(Vec3::ZERO);
        let rotation = self
            .rotation
            .map(|[x, y, z]| Quat::from_euler(glam::EulerRot::XYZ, x, y, z))
            .unwrap_or(Quat::IDENTITY);
        let scale = self.scale.map(Vec3::from).unwrap_or(Vec3::ONE);
        Transform {
            position: tag.position + offset,
            rotation: tag.rotation * rotation,
            scale: tag.scale * scale,
        }
    }
}

/// Everything a widget needs from a consumed replacement context.
pub struct ExtraObjectParameter {
    pub root_scene: RootScene,
    pub name: String,
    pub breadcrumb: Vec<String>,
    pub anchor: AnchorComponent,
    /// Absolute transform of the tag at conversion time.
    pub transform: Transform,
    /// Container to attach to instead of the root scene.
    pub parent: Option<Object3D>,
    pub assets: Rc<dyn AssetLoader>,
    pub config: Rc<ControllerConfig>,
}

/// Per-frame inputs handed to every object.
#[derive(Debug, Clone, Copy)]
pub struct AnimationParameter<'a> {
    pub pointer: PointerSnapshot,
    pub camera: &'a CameraSnapshot,
    /// Seconds since the previous frame.
    pub delta: f32,
    pub frame_rate: f32,
}

impl AnimationParameter<'_> {
    /// Ray through the current pointer, if there is a pointer and a camera.
    pub fn raycaster(&self) -> Option<Raycaster> {
        Raycaster::from_camera(self.pointer.pointer?, self.camera)
    }
}

/// State shared by every extra object.
pub struct ExtraObjectCore {
    name: String,
    breadcrumb: Vec<String>,
    root_scene: RootScene,
    anchor: AnchorComponent,
    transform: Transform,
    object: Object3D,
    state: StateValue,
    status: LoadStatus,
    notifier: EventNotifier,
    gate: Option<LoadGate>,
    awakened: bool,
    load_emitted: bool,
    billboard: bool,
    camera_fingerprint: Option<String>,
    assets: Rc<dyn AssetLoader>,
    config: Rc<ControllerConfig>,
}

impl ExtraObjectCore {
    /// Create the widget's top node, place it from the tag snapshot and attach
    /// it to the parent container or the root scene.
    pub fn new(parameter: ExtraObjectParameter, kind: ObjectKind, base: &ModelParameterBase) -> Self {
        let object = Object3D::new(parameter.name.clone(), kind);
        object.set_transform(base.apply_to(&parameter.transform));
        match &parameter.parent {
            Some(parent) => parent.add(&object),
            None => parameter.root_scene.add(&object),
        }

        Self {
            name: parameter.name,
            breadcrumb: parameter.breadcrumb,
            root_scene: parameter.root_scene,
            anchor: parameter.anchor,
            transform: parameter.transform,
            object,
            state: StateValue::default(),
            status: LoadStatus::Unloaded,
            notifier: EventNotifier::new(),
            gate: None,
            awakened: false,
            load_emitted: false,
            billboard: false,
            camera_fingerprint: None,
            assets: parameter.assets,
            config: parameter.config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breadcrumb(&self) -> &[String] {
        &self.breadcrumb
    }

    pub fn root_scene(&self) -> &RootScene {
        &self.root_scene
    }

    pub fn anchor(&self) -> &AnchorComponent {
        &self.anchor
    }

    /// Tag transform captured at conversion time.
    pub fn tag_transform(&self) -> &Transform {
        &self.transform
    }

    pub fn object(&self) -> &Object3D {
        &self.object
    }

    pub fn state(&self) -> &StateValue {
        &self.state
    }

    pub fn load_status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn assets(&self) -> &Rc<dyn AssetLoader> {
        &self.assets
    }

    pub fn config(&self) -> &Rc<ControllerConfig> {
        &self.config
    }

    pub fn notifier_mut(&mut self) -> &mut EventNotifier {
        &mut self.notifier
    }

    pub fn set_billboard(&mut self, enabled: bool) {
        self.billboard = enabled;
    }

    pub fn is_billboard(&self) -> bool {
        self.billboard
    }

    pub fn emit(&mut self, kind: EventKind, payload: EventPayload) {
        let context = EventContext {
            kind,
            tag_name: &self.name,
            breadcrumb: &self.breadcrumb,
            root_scene: &self.root_scene,
            object: &self.object,
            state: &self.state,
            payload: &payload,
        };
        self.notifier.emit(&context);
    }

    /// Mark construction complete. Ignored once loading has failed.
    pub fn mark_loaded(&mut self) {
        if self.status.is_failed() {
            return;
        }
        self.status = LoadStatus::Loaded;
    }

    /// Enter the failed state and notify observers. Later state changes are dropped.
    pub fn fail_load(&mut self, reason: impl Into<String>) {
        if self.status.is_failed() {
            return;
        }
        let reason = reason.into();
        log::warn!("'{}' failed to load: {}", self.name, reason);
        self.status = LoadStatus::Failed(reason.clone());
        self.emit(EventKind::LoadFailed, EventPayload::Failure(reason));
    }

    /// Defer loading until every key in `required` has been reported.
    pub fn install_load_gate(&mut self, gate: LoadGate) {
        self.gate = Some(gate);
    }

    pub fn load_gate(&self) -> Option<&LoadGate> {
        self.gate.as_ref()
    }

    /// Report one asset of the load gate as finished.
    pub fn complete_asset(&mut self, key: &str) {
        let Some(gate) = self.gate.as_mut() else {
            return;
        };
        if gate.complete(key) {
            self.mark_loaded();
            if self.awakened && self.status.is_loaded() {
                self.emit_load_once();
            }
        }
    }

    fn emit_load_once(&mut self) {
        if self.load_emitted {
            return;
        }
        self.load_emitted = true;
        self.emit(EventKind::Load, EventPayload::None);
    }

    pub fn is_awake(&self) -> bool {
        self.awakened
    }

    /// Run once after installation. Emits Load now, or when the gate completes.
    pub fn awake(&mut self) {
        if self.awakened {
            return;
        }
        self.awakened = true;
        let gate_ready = match self.gate.as_mut() {
            None => true,
            Some(gate) => {
                gate.take_completion();
                gate.is_complete()
            }
        };
        if gate_ready && !self.status.is_failed() {
            if self.gate.is_some() {
                self.mark_loaded();
            }
            self.emit_load_once();
        }
    }

    /// Store `new_state` if the gating rules allow it.
    pub fn apply_state(&mut self, new_state: &StateValue) -> StateTransition {
        if self.state == *new_state {
            return StateTransition::Ignored;
        }
        if new_state.is_init() {
            self.state = new_state.clone();
            return StateTransition::Seeded;
        }
        if !self.status.is_loaded() {
            log::debug!("'{}' dropped state {} before load", self.name, new_state);
            return StateTransition::Ignored;
        }
        self.state = new_state.clone();
        self.emit(EventKind::UpdateState, EventPayload::State(new_state.clone()));
        StateTransition::Applied
    }

    /// True when the camera fingerprint differs from the last observed one.
    /// The first observation only records a baseline.
    pub fn camera_changed(&mut self, fingerprint: &str) -> bool {
        match &self.camera_fingerprint {
            Some(previous) if previous == fingerprint => false,
            Some(_) => {
                self.camera_fingerprint = Some(fingerprint.to_string());
                true
            }
            None => {
                self.camera_fingerprint = Some(fingerprint.to_string());
                false
            }
        }
    }

    /// Tick, billboard and camera-change steps that follow the frame hook.
    /// Returns true if the camera moved this frame.
    pub fn finish_frame(&mut self, parameter: &AnimationParameter) -> bool {
        self.emit(EventKind::Tick, EventPayload::None);

        if self.billboard {
            if let Some(camera) = parameter.camera.matrix {
                let (_, camera_rotation, _) = camera.to_scale_rotation_translation();
                let parent_rotation = self
                    .object
                    .parent()
                    .map(|p| p.world_rotation())
                    .unwrap_or(Quat::IDENTITY);
                self.object
                    .set_rotation(parent_rotation.inverse() * camera_rotation);
            }
        }

        let moved = self.camera_changed(&parameter.camera.fingerprint);
        if moved {
            self.emit(
                EventKind::UpdateCameraAngle,
                EventPayload::Camera(parameter.camera.clone()),
            );
        }
        moved
    }

    /// Flip visibility of the top node, notifying only on an actual change.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        let changed = self.object.set_visible(visible);
        if changed {
            let kind = if visible {
                EventKind::Visible
            } else {
                EventKind::Hide
            };
            self.emit(kind, EventPayload::None);
        }
        changed
    }
}

impl std::fmt::Debug for ExtraObjectCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtraObjectCore")
            .field("name", &self.name)
            .field("breadcrumb", &self.breadcrumb)
            .field("state", &self.state)
            .field("status", &self.status)
            .field("awakened", &self.awakened)
            .finish()
    }
}

/// Upcast to `Any` for downcasting trait objects to concrete widgets.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Runtime replacement for a tag.
///
/// Implementors provide access to their core and override the hooks they
/// need. The provided methods implement the shared lifecycle and should only
/// be overridden by composites that forward to children.
pub trait ExtraObject: AsAny {
    fn core(&self) -> &ExtraObjectCore;

    fn core_mut(&mut self) -> &mut ExtraObjectCore;

    /// Per-frame work of the concrete widget.
    fn on_frame(&mut self, _parameter: &AnimationParameter) {}

    /// Reaction to an applied state change.
    fn on_state_changed(&mut self, _state: &StateValue) {}

    /// Reaction to freshly bound cloud values.
    fn on_values_updated(&mut self, _values: &ValueMap) {}

    /// False if a pointer on `ray` should be kept from other libraries.
    fn permit_input_passthrough(&self, _ray: &Raycaster) -> bool {
        true
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn object(&self) -> Object3D {
        self.core().object().clone()
    }

    fn anchor(&self) -> &AnchorComponent {
        self.core().anchor()
    }

    fn is_loaded(&self) -> bool {
        self.core().load_status().is_loaded()
    }

    fn load_status(&self) -> LoadStatus {
        self.core().load_status().clone()
    }

    fn state(&self) -> &StateValue {
        self.core().state()
    }

    fn state_change(&mut self, new_state: StateValue) -> StateTransition {
        let transition = self.core_mut().apply_state(&new_state);
        if transition == StateTransition::Applied {
            self.on_state_changed(&new_state);
        }
        transition
    }

    fn call_animation_loop(&mut self, parameter: &AnimationParameter) {
        self.on_frame(parameter);
        self.core_mut().finish_frame(parameter);
    }

    fn awake(&mut self) {
        self.core_mut().awake();
    }

    fn update_values(&mut self, values: ValueMap) {
        self.on_values_updated(&values);
        self.core_mut()
            .emit(EventKind::UpdateValue, EventPayload::Values(values));
    }

    fn notify_click(&mut self) {
        self.core_mut().emit(EventKind::Click, EventPayload::None);
    }

    fn set_visible(&mut self, visible: bool) -> bool {
        self.core_mut().set_visible(visible)
    }

    fn fail_load(&mut self, reason: &str) {
        self.core_mut().fail_load(reason);
    }

    /// Register a receiver on an already boxed object.
    fn observe(&mut self, kind: EventKind, receiver: Box<dyn FnMut(&EventContext)>) {
        self.core_mut().notifier_mut().observe(kind, receiver);
    }
}

impl dyn ExtraObject {
    pub fn downcast_ref<T: ExtraObject + 'static>(&self) -> Option<&T> {
        AsAny::as_any(self).downcast_ref::<T>()
    }

    pub fn downcast_mut<T: ExtraObject + 'static>(&mut self) -> Option<&mut T> {
        AsAny::as_any_mut(self).downcast_mut::<T>()
    }
}

/// Chainable receiver registration on owned widgets.
pub trait Observe: ExtraObject + Sized + 'static {
    fn on(mut self, kind: EventKind, receiver: impl FnMut(&EventContext) + 'static) -> Self {
        self.core_mut().notifier_mut().observe(kind, receiver);
        self
    }

    fn on_load(self, receiver: impl FnMut(&EventContext) + 'static) -> Self {
        self.on(EventKind::Load, receiver)
    }

    fn on_load_failed(self, receiver: impl FnMut(&EventContext) + 'static) -> Self {
        self.on(EventKind::LoadFailed, receiver)
    }

    fn on_tick(self, receiver: impl FnMut(&EventContext) + 'static) -> Self {
        self.on(EventKind::Tick, receiver)
    }

    fn on_update_state(self, receiver: impl FnMut(&EventContext) + 'static) -> Self {
        self.on(EventKind::UpdateState, receiver)
    }

    fn on_visible(self, receiver: impl FnMut(&EventContext) + 'static) -> Self {
        self.on(EventKind::Visible, receiver)
    }

    fn on_hide(self, receiver: impl FnMut(&EventContext) + 'static) -> Self {
        self.on(EventKind::Hide, receiver)
    }

    fn on_click(self, receiver: impl FnMut(&EventContext) + 'static) -> Self {
        self.on(EventKind::Click, receiver)
    }

    fn on_update_value(self, receiver: impl FnMut(&EventContext) + 'static) -> Self {
        self.on(EventKind::UpdateValue, receiver)
    }

    fn on_update_camera_angle(self, receiver: impl FnMut(&EventContext) + 'static) -> Self {
        self.on(EventKind::UpdateCameraAngle, receiver)
    }

    fn boxed(self) -> Box<dyn ExtraObject> {
        Box::new(self)
    }
}

impl<T: ExtraObject + 'static> Observe for T {}

/// Builds the replacement for one tag. `None` means "not installed this time".
pub type TagFactory = Box<dyn FnMut(ReplaceContext) -> Option<Box<dyn ExtraObject>>>;

/// Ordered mapping from tag display name to factory.
#[derive(Default)]
pub struct OverrideTags {
    entries: VecDeque<(String, TagFactory)>,
}

impl OverrideTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a factory. A repeated name replaces the earlier factory in place.
    pub fn with(
        mut self,
        name: impl Into<String>,
        factory: impl FnMut(ReplaceContext) -> Option<Box<dyn ExtraObject>> + 'static,
    ) -> Self {
        self.insert(name, factory);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        factory: impl FnMut(ReplaceContext) -> Option<Box<dyn ExtraObject>> + 'static,
    ) {
        let name = name.into();
        let factory: TagFactory = Box::new(factory);
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = factory,
            None => self.entries.push_back((name, factory)),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut TagFactory)> {
        self.entries.iter_mut().map(|(n, f)| (n.as_str(), f))
    }
}

impl IntoIterator for OverrideTags {
    type Item = (String, TagFactory);
    type IntoIter = std::collections::vec_deque::IntoIter<(String, TagFactory)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ManualAssetLoader;
    use crate::headless::headless_root_scene;
    use std::cell::RefCell;

    struct Probe {
        core: ExtraObjectCore,
        reactions: Rc<RefCell<Vec<StateValue>>>,
    }

    impl ExtraObject for Probe {
        fn core(&self) -> &ExtraObjectCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut ExtraObjectCore {
            &mut self.core
        }

        fn on_state_changed(&mut self, state: &StateValue) {
            self.reactions.borrow_mut().push(state.clone());
        }
    }

    fn parameter() -> ExtraObjectParameter {
        ExtraObjectParameter {
            root_scene: headless_root_scene("root"),
            name: "Probe".to_string(),
            breadcrumb: Vec::new(),
            anchor: AnchorComponent::default(),
            transform: Transform::default(),
            parent: None,
            assets: Rc::new(ManualAssetLoader::new()),
            config: Rc::new(ControllerConfig::default()),
        }
    }

    fn probe() -> (Probe, Rc<RefCell<Vec<StateValue>>>) {
        let reactions = Rc::new(RefCell::new(Vec::new()));
        let core = ExtraObjectCore::new(parameter(), ObjectKind::Empty, &ModelParameterBase::default());
        (
            Probe {
                core,
                reactions: reactions.clone(),
            },
            reactions,
        )
    }

    fn counter(object: &mut Probe, kind: EventKind) -> Rc<RefCell<usize>> {
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        object
            .core_mut()
            .notifier_mut()
            .observe(kind, move |_| *c.borrow_mut() += 1);
        count
    }

    #[test]
    fn test_state_gated_until_loaded() {
        let (mut object, reactions) = probe();
        let updates = counter(&mut object, EventKind::UpdateState);

        assert_eq!(object.state_change("running".into()), StateTransition::Ignored);
        assert_eq!(object.state(), &StateValue::default());

        assert_eq!(object.state_change(StateValue::init()), StateTransition::Seeded);
        assert!(object.state().is_init());
        assert!(reactions.borrow().is_empty());

        object.core_mut().mark_loaded();
        assert_eq!(object.state_change("running".into()), StateTransition::Applied);
        assert_eq!(*reactions.borrow(), vec![StateValue::from("running")]);
        assert_eq!(*updates.borrow(), 1);
    }

    #[test]
    fn test_repeated_state_reacts_once() {
        let (mut object, reactions) = probe();
        object.core_mut().mark_loaded();
        object.state_change(42.into());
        object.state_change(42.into());
        assert_eq!(reactions.borrow().len(), 1);
    }

    #[test]
    fn test_failed_load_drops_states() {
        let (mut object, reactions) = probe();
        let failures = counter(&mut object, EventKind::LoadFailed);
        object.fail_load("404");
        object.core_mut().mark_loaded();

        assert!(object.load_status().is_failed());
        assert_eq!(object.state_change("running".into()), StateTransition::Ignored);
        assert!(reactions.borrow().is_empty());
        assert_eq!(*failures.borrow(), 1);
    }

    #[test]
    fn test_awake_without_gate_emits_load_once() {
        let (mut object, _) = probe();
        let loads = counter(&mut object, EventKind::Load);
        object.awake();
        object.awake();
        assert_eq!(*loads.borrow(), 1);
    }

    #[test]
    fn test_gate_completing_after_awake() {
        let (mut object, _) = probe();
        object
            .core_mut()
            .install_load_gate(LoadGate::new(["model", "walk"]));
        let loads = counter(&mut object, EventKind::Load);

        object.awake();
        assert_eq!(*loads.borrow(), 0);
        object.core_mut().complete_asset("model");
        assert!(!object.is_loaded());
        object.core_mut().complete_asset("walk");
        assert!(object.is_loaded());
        assert_eq!(*loads.borrow(), 1);
        object.core_mut().complete_asset("walk");
        assert_eq!(*loads.borrow(), 1);
    }

    #[test]
    fn test_gate_completing_before_awake() {
        let (mut object, _) = probe();
        object.core_mut().install_load_gate(LoadGate::new(["model"]));
        let loads = counter(&mut object, EventKind::Load);

        object.core_mut().complete_asset("model");
        assert!(object.is_loaded());
        assert_eq!(*loads.borrow(), 0);
        object.awake();
        assert_eq!(*loads.borrow(), 1);
    }

    #[test]
    fn test_camera_watch_uses_first_frame_as_baseline() {
        let (mut object, _) = probe();
        assert!(!object.core_mut().camera_changed("abc"));
        assert!(!object.core_mut().camera_changed("abc"));
        assert!(object.core_mut().camera_changed("abd"));
        assert!(!object.core_mut().camera_changed("abd"));
    }

    #[test]
    fn test_set_visible_notifies_on_change_only() {
        let (mut object, _) = probe();
        let hides = counter(&mut object, EventKind::Hide);
        let shows = counter(&mut object, EventKind::Visible);
        assert!(!object.set_visible(true));
        assert!(object.set_visible(false));
        assert!(!object.set_visible(false));
        assert!(object.set_visible(true));
        assert_eq!(*hides.borrow(), 1);
        assert_eq!(*shows.borrow(), 1);
    }

    #[test]
    fn test_model_parameter_base_composes() {
        let tag = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::splat(2.0),
        };
        let base = ModelParameterBase {
            position: Some([0.0, 1.0, 0.0]),
            rotation: None,
            scale: Some([0.5, 0.5, 0.5]),
        };
        let result = base.apply_to(&tag);
        assert_eq!(result.position, Vec3::new(1.0, 3.0, 3.0));
        assert_eq!(result.scale, Vec3::ONE);
    }

    #[test]
    fn test_downcast_boxed_object() {
        let (object, _) = probe();
        let mut boxed: Box<dyn ExtraObject> = Box::new(object);
        assert!(boxed.downcast_ref::<Probe>().is_some());
        assert!(boxed.downcast_mut::<Probe>().is_some());
    }

    #[test]
    fn test_override_tags_keep_order() {
        let tags = OverrideTags::new()
            .with("B", |_| None)
            .with("A", |_| None)
            .with("B", |_| None);
        assert_eq!(tags.names(), vec!["B", "A"]);
    }
}
