//! Per-object event notifier.
//!
//! Receivers are registered per event kind and invoked synchronously in
//! registration order. A panicking receiver is logged and skipped; the
//! remaining receivers of the same emit still run.

use std::collections::HashMap;

use crate::data::ValueMap;
use crate::fault;
use crate::host::{CameraSnapshot, RootScene};
use crate::scene_graph::Object3D;
use crate::state::StateValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Load,
    LoadFailed,
    Tick,
    Visible,
    Hide,
    UpdateState,
    UpdateValue,
    UpdateCameraAngle,
    Click,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Load => "load",
            EventKind::LoadFailed => "loadFailed",
            EventKind::Tick => "tick",
            EventKind::Visible => "visible",
            EventKind::Hide => "hide",
            EventKind::UpdateState => "updateState",
            EventKind::UpdateValue => "updateValue",
            EventKind::UpdateCameraAngle => "updateCameraAngle",
            EventKind::Click => "click",
        }
    }
}

/// Kind-specific data attached to an emit.
#[derive(Debug, Clone, Default)]
pub enum EventPayload {
    #[default]
    None,
    State(StateValue),
    Values(ValueMap),
    Camera(CameraSnapshot),
    Failure(String),
}

/// What a receiver sees when it is invoked.
pub struct EventContext<'a> {
    pub kind: EventKind,
    pub tag_name: &'a str,
    pub breadcrumb: &'a [String],
    pub root_scene: &'a RootScene,
    /// Top of the emitting object's sub-tree.
    pub object: &'a Object3D,
    pub state: &'a StateValue,
    pub payload: &'a EventPayload,
}

impl EventContext<'_> {
    pub fn new_state(&self) -> Option<&StateValue> {
        match self.payload {
            EventPayload::State(state) => Some(state),
            _ => None,
        }
    }

    pub fn values(&self) -> Option<&ValueMap> {
        match self.payload {
            EventPayload::Values(values) => Some(values),
            _ => None,
        }
    }

    pub fn camera(&self) -> Option<&CameraSnapshot> {
        match self.payload {
            EventPayload::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self.payload {
            EventPayload::Failure(reason) => Some(reason),
            _ => None,
        }
    }
}

pub type Receiver = Box<dyn FnMut(&EventContext)>;

#[derive(Default)]
pub struct EventNotifier {
    receivers: HashMap<EventKind, Vec<Receiver>>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, kind: EventKind, receiver: impl FnMut(&EventContext) + 'static) {
        self.receivers.entry(kind).or_default().push(Box::new(receiver));
    }

    pub fn receiver_count(&self, kind: EventKind) -> usize {
        self.receivers.get(&kind).map_or(0, Vec::len)
    }

    /// Invoke every receiver registered for `context.kind`.
    pub fn emit(&mut self, context: &EventContext) {
        let Some(receivers) = self.receivers.get_mut(&context.kind) else {
            return;
        };
        for (index, receiver) in receivers.iter_mut().enumerate() {
            fault::isolate(
                || {
                    format!(
                        "{} receiver #{} of '{}'",
                        context.kind.name(),
                        index,
                        context.tag_name
                    )
                },
                || receiver(context),
            );
        }
    }
}

impl std::fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .receivers
            .iter()
            .map(|(kind, list)| (kind.name(), list.len()))
            .collect();
        f.debug_struct("EventNotifier").field("receivers", &counts).finish()
    }
}
