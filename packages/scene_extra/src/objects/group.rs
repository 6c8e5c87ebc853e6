//! Composite widget holding named members.
//!
//! Exactly the members in the group's visible set have a visible sub-tree
//! root. Members reach their group through a [`GroupHandle`]; requests made
//! through the handle are queued and run at the start of the group's next
//! frame, so member callbacks never re-enter the group that is driving them.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::animation::ScaleAnimation;
use crate::data::ValueMap;
use crate::extra_object::{
    AnimationParameter, ExtraObject, ExtraObjectCore, ExtraObjectParameter, ModelParameterBase,
};
use crate::input::Raycaster;
use crate::replace::ReplaceContext;
use crate::scene_graph::{Object3D, ObjectKind};
use crate::state::{StateTransition, StateValue};

/// Builds one group member from its context.
pub type ChildFactory = Box<dyn FnOnce(ReplaceContext) -> Option<Box<dyn ExtraObject>>>;

type GroupCallback = Box<dyn FnMut(&mut GroupObject)>;
type DeferredRequest = Box<dyn FnOnce(&mut GroupObject)>;

/// Burst requested but not yet sized; sized from the next frame's rate.
struct PendingBurst {
    duration: f32,
    looping: bool,
    handler: GroupCallback,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupParameter {
    #[serde(flatten)]
    pub base: ModelParameterBase,
}

#[derive(Default)]
struct GroupShared {
    visible: BTreeSet<String>,
    animating: bool,
    deferred: VecDeque<DeferredRequest>,
}

/// Shared view of a group for its members.
#[derive(Clone, Default)]
pub struct GroupHandle(Rc<RefCell<GroupShared>>);

impl GroupHandle {
    pub fn is_show(&self, name: &str) -> bool {
        self.0.borrow().visible.contains(name)
    }

    pub fn is_scale_animating(&self) -> bool {
        self.0.borrow().animating
    }

    /// Run `request` against the group at the start of its next frame.
    pub fn defer(&self, request: impl FnOnce(&mut GroupObject) + 'static) {
        self.0.borrow_mut().deferred.push_back(Box::new(request));
    }

    pub fn show_single_child(&self, name: impl Into<String>) {
        let name = name.into();
        self.defer(move |group| {
            group.show_single_child(&name);
        });
    }

    pub fn show_all_child(&self) {
        self.defer(|group| group.show_all_child());
    }

    /// Queue a scale burst. Counts as animating from this call on.
    pub fn start_scale_animation(
        &self,
        handler: impl FnMut(&mut GroupObject) + 'static,
        duration: Option<f32>,
        looping: bool,
    ) {
        self.0.borrow_mut().animating = true;
        self.defer(move |group| group.start_scale_animation(handler, duration, looping));
    }

    fn take_deferred(&self) -> VecDeque<DeferredRequest> {
        std::mem::take(&mut self.0.borrow_mut().deferred)
    }

    fn sync(&self, visible: BTreeSet<String>, animating: bool) {
        let mut shared = self.0.borrow_mut();
        shared.visible = visible;
        shared.animating = animating;
    }
}

impl std::fmt::Debug for GroupHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.0.borrow();
        f.debug_struct("GroupHandle")
            .field("visible", &shared.visible)
            .field("animating", &shared.animating)
            .field("deferred", &shared.deferred.len())
            .finish()
    }
}

/// Switches a loading group over to its contents.
#[derive(Debug, Clone)]
pub struct LoadingTicket {
    handle: GroupHandle,
    contents: String,
}

impl LoadingTicket {
    pub fn new(handle: GroupHandle, contents: impl Into<String>) -> Self {
        Self {
            handle,
            contents: contents.into(),
        }
    }

    /// Show the contents from the group's next frame on.
    pub fn complete(&self) {
        self.handle.show_single_child(self.contents.clone());
    }
}

pub struct GroupObject {
    core: ExtraObjectCore,
    /// Node scaled by the burst animation; members hang below it.
    container: Object3D,
    children: Vec<(String, Box<dyn ExtraObject>)>,
    visible: BTreeSet<String>,
    handle: GroupHandle,
    animation: ScaleAnimation,
    pending: Option<PendingBurst>,
    on_midpoint: Option<GroupCallback>,
    on_move_camera: Option<GroupCallback>,
}

impl GroupObject {
    pub fn new(param: ExtraObjectParameter, parameter: GroupParameter) -> Self {
        let mut core = ExtraObjectCore::new(param, ObjectKind::Empty, &parameter.base);
        core.mark_loaded();
        let container = Object3D::new(format!("{}Container", core.name()), ObjectKind::Empty);
        core.object().add(&container);

        Self {
            core,
            container,
            children: Vec::new(),
            visible: BTreeSet::new(),
            handle: GroupHandle::default(),
            animation: ScaleAnimation::idle(),
            pending: None,
            on_midpoint: None,
            on_move_camera: None,
        }
    }

    /// Node member widgets attach to.
    pub fn container(&self) -> Object3D {
        self.container.clone()
    }

    pub fn handle(&self) -> GroupHandle {
        self.handle.clone()
    }

    /// Add a member. Members start visible. A member with a name already in
    /// use replaces the earlier one in place.
    pub fn push_child(&mut self, name: impl Into<String>, mut child: Box<dyn ExtraObject>) {
        let name = name.into();
        child.set_visible(true);
        match self.children.iter_mut().find(|(n, _)| *n == name) {
            Some((_, previous)) => {
                log::warn!("Group '{}' replaces member '{}'", self.core.name(), name);
                let stale = previous.object();
                if let Some(parent) = stale.parent() {
                    parent.remove(&stale);
                }
                *previous = child;
            }
            None => self.children.push((name.clone(), child)),
        }
        self.visible.insert(name);
        self.sync_handle();
    }

    pub fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn get_child(&self, name: &str) -> Option<&(dyn ExtraObject + 'static)> {
        self.children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, child)| child.as_ref())
    }

    pub fn get_child_mut(&mut self, name: &str) -> Option<&mut Box<dyn ExtraObject>> {
        self.children
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, child)| child)
    }

    pub fn is_show(&self, name: &str) -> bool {
        self.visible.contains(name)
    }

    /// Show `name` and hide every other member. False if there is no such member.
    pub fn show_single_child(&mut self, name: &str) -> bool {
        if self.get_child(name).is_none() {
            log::warn!("Group '{}' has no member '{}'", self.core.name(), name);
            return false;
        }
        self.visible.clear();
        for (child_name, child) in &mut self.children {
            let show = child_name == name;
            child.set_visible(show);
            if show {
                self.visible.insert(child_name.clone());
            }
        }
        self.sync_handle();
        true
    }

    pub fn show_all_child(&mut self) {
        for (name, child) in &mut self.children {
            child.set_visible(true);
            self.visible.insert(name.clone());
        }
        self.sync_handle();
    }

    /// Start a scale burst over the members, calling `handler` at the midpoint.
    ///
    /// The burst runs from the next frame on and its length in frames is
    /// taken from that frame's rate.
    pub fn start_scale_animation(
        &mut self,
        handler: impl FnMut(&mut GroupObject) + 'static,
        duration: Option<f32>,
        looping: bool,
    ) {
        self.pending = Some(PendingBurst {
            duration: duration.unwrap_or(self.core.config().switch_duration),
            looping,
            handler: Box::new(handler),
        });
        self.sync_handle();
    }

    pub fn is_scale_animating(&self) -> bool {
        self.pending.is_some() || self.animation.is_running()
    }

    /// Run `callback` on every frame the camera moved.
    pub fn on_move_camera(mut self, callback: impl FnMut(&mut GroupObject) + 'static) -> Self {
        self.on_move_camera = Some(Box::new(callback));
        self
    }

    fn sync_handle(&self) {
        self.handle
            .sync(self.visible.clone(), self.is_scale_animating());
    }

    fn begin_pending(&mut self, frame_rate: f32) {
        let Some(burst) = self.pending.take() else {
            return;
        };
        let frame_rate = if frame_rate > 0.0 {
            frame_rate
        } else {
            self.core.config().frame_rate
        };
        self.animation = ScaleAnimation::start(burst.duration, frame_rate, burst.looping);
        self.on_midpoint = Some(burst.handler);
    }

    fn run_deferred(&mut self) {
        for request in self.handle.take_deferred() {
            request(self);
        }
        self.sync_handle();
    }

    fn step_animation(&mut self) {
        let step = self.animation.advance();
        self.container.set_uniform_scale(step.value);
        if step.fire {
            if let Some(mut handler) = self.on_midpoint.take() {
                handler(self);
                if self.on_midpoint.is_none() && self.animation.is_running() {
                    self.on_midpoint = Some(handler);
                }
            }
        }
        if !self.animation.is_running() {
            self.on_midpoint = None;
        }
        self.sync_handle();
    }
}

impl ExtraObject for GroupObject {
    fn core(&self) -> &ExtraObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ExtraObjectCore {
        &mut self.core
    }

    fn on_values_updated(&mut self, values: &ValueMap) {
        for (_, child) in &mut self.children {
            child.update_values(values.clone());
        }
    }

    fn permit_input_passthrough(&self, ray: &Raycaster) -> bool {
        self.children
            .iter()
            .filter(|(name, _)| self.visible.contains(name))
            .all(|(_, child)| child.permit_input_passthrough(ray))
    }

    fn state_change(&mut self, new_state: StateValue) -> StateTransition {
        let transition = self.core.apply_state(&new_state);
        for (_, child) in &mut self.children {
            child.state_change(new_state.clone());
        }
        transition
    }

    fn call_animation_loop(&mut self, parameter: &AnimationParameter) {
        self.run_deferred();
        self.on_frame(parameter);
        self.begin_pending(parameter.frame_rate);
        self.step_animation();

        for (_, child) in &mut self.children {
            child.call_animation_loop(parameter);
        }

        if self.core.finish_frame(parameter) {
            if let Some(mut callback) = self.on_move_camera.take() {
                callback(self);
                if self.on_move_camera.is_none() {
                    self.on_move_camera = Some(callback);
                }
            }
        }
    }

    fn awake(&mut self) {
        self.core.awake();
        for (_, child) in &mut self.children {
            child.awake();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::headless_parameter;
    use crate::host::CameraSnapshot;
    use crate::input::PointerSnapshot;
    use crate::notifier::EventKind;
    use crate::objects::text::{TextObject, TextParameter};
    use glam::{Mat4, Vec3};

    type Log = Rc<RefCell<Vec<String>>>;

    fn member(name: &str, log: &Log) -> Box<dyn ExtraObject> {
        member_under(None, name, log)
    }

    fn member_under(parent: Option<Object3D>, name: &str, log: &Log) -> Box<dyn ExtraObject> {
        let mut param = headless_parameter(name);
        param.parent = parent;
        let mut child = Box::new(TextObject::new(param, TextParameter::default()))
            as Box<dyn ExtraObject>;
        for (kind, label) in [(EventKind::Hide, "hide"), (EventKind::Visible, "visible")] {
            let log = log.clone();
            let entry = format!("{}:{}", label, name);
            child.observe(
                kind,
                Box::new(move |_: &crate::notifier::EventContext| log.borrow_mut().push(entry.clone())),
            );
        }
        child
    }

    fn group(log: &Log) -> GroupObject {
        let mut group = GroupObject::new(headless_parameter("Group"), GroupParameter::default());
        for name in ["A", "B", "C"] {
            group.push_child(name, member(name, log));
        }
        group
    }

    fn frame(group: &mut GroupObject, camera: &CameraSnapshot) {
        frame_at(group, camera, 60.0);
    }

    fn frame_at(group: &mut GroupObject, camera: &CameraSnapshot, frame_rate: f32) {
        group.call_animation_loop(&AnimationParameter {
            pointer: PointerSnapshot::default(),
            camera,
            delta: 1.0 / frame_rate,
            frame_rate,
        });
    }

    #[test]
    fn test_show_single_child_is_exclusive() {
        let log = Log::default();
        let mut group = group(&log);
        assert!(group.show_single_child("B"));

        assert!(group.is_show("B"));
        assert!(!group.is_show("A"));
        assert!(!group.is_show("C"));
        assert!(group.get_child("B").unwrap().object().visible());
        assert!(!group.get_child("A").unwrap().object().visible());
        assert_eq!(*log.borrow(), vec!["hide:A", "hide:C"]);

        group.show_all_child();
        assert!(group.is_show("A") && group.is_show("C"));
        assert_eq!(log.borrow().len(), 4);
    }

    #[test]
    fn test_duplicate_member_replaces_earlier() {
        let log = Log::default();
        let mut group = GroupObject::new(headless_parameter("Group"), GroupParameter::default());
        for name in ["A", "B", "A"] {
            let child = member_under(Some(group.container()), name, &log);
            group.push_child(name, child);
        }
        assert_eq!(group.child_names(), vec!["A", "B"]);
        assert_eq!(group.container().children().len(), 2);

        assert!(group.show_single_child("B"));
        let visible: Vec<String> = group
            .container()
            .children()
            .iter()
            .filter(|node| node.visible())
            .map(|node| node.name())
            .collect();
        assert_eq!(visible, vec!["B"]);
    }

    #[test]
    fn test_unknown_member_changes_nothing() {
        let log = Log::default();
        let mut group = group(&log);
        assert!(!group.show_single_child("Z"));
        assert!(group.is_show("A"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_scale_burst_switches_at_midpoint() {
        let log = Log::default();
        let mut group = group(&log);
        let camera = CameraSnapshot::default();
        // 0.1 s at 60 fps: 6 frames, handler on frame 3
        group.start_scale_animation(|g| {
            g.show_single_child("C");
        }, Some(0.1), false);
        assert!(group.is_scale_animating());

        for _ in 0..2 {
            frame(&mut group, &camera);
        }
        assert!(group.is_show("A"));
        frame(&mut group, &camera);
        assert!(!group.is_show("A"));
        assert!(group.is_show("C"));

        for _ in 0..3 {
            frame(&mut group, &camera);
        }
        assert!(!group.is_scale_animating());
        assert_eq!(group.container().scale(), Vec3::ONE);
    }

    #[test]
    fn test_scale_burst_follows_frame_rate() {
        let log = Log::default();
        let mut group = group(&log);
        let camera = CameraSnapshot::default();
        // 0.4 s at 30 fps: 12 frames, handler on frame 6
        group.start_scale_animation(|g| {
            g.show_single_child("C");
        }, Some(0.4), false);

        for _ in 0..5 {
            frame_at(&mut group, &camera, 30.0);
        }
        assert!(group.is_show("A"));
        frame_at(&mut group, &camera, 30.0);
        assert!(group.is_show("C") && !group.is_show("A"));

        for _ in 0..5 {
            frame_at(&mut group, &camera, 30.0);
        }
        assert!(group.is_scale_animating());
        frame_at(&mut group, &camera, 30.0);
        assert!(!group.is_scale_animating());
    }

    #[test]
    fn test_handle_requests_run_next_frame() {
        let log = Log::default();
        let mut group = group(&log);
        let handle = group.handle();
        handle.show_single_child("A");
        assert!(handle.is_show("B"));

        frame(&mut group, &CameraSnapshot::default());
        assert!(handle.is_show("A"));
        assert!(!handle.is_show("B"));
    }

    #[test]
    fn test_state_forwarded_to_members() {
        let log = Log::default();
        let mut group = group(&log);
        group.state_change("alarm".into());
        for name in ["A", "B", "C"] {
            assert_eq!(group.get_child(name).unwrap().state(), &StateValue::from("alarm"));
        }
    }

    #[test]
    fn test_move_camera_callback() {
        let log = Log::default();
        let moves = Rc::new(RefCell::new(0));
        let m = moves.clone();
        let mut group = group(&log).on_move_camera(move |_| *m.borrow_mut() += 1);

        let still = CameraSnapshot::new(Some(Mat4::IDENTITY), Mat4::IDENTITY, 3);
        let moved = CameraSnapshot::new(
            Some(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0))),
            Mat4::IDENTITY,
            3,
        );
        frame(&mut group, &still);
        frame(&mut group, &still);
        frame(&mut group, &moved);
        assert_eq!(*moves.borrow(), 1);
    }
}
