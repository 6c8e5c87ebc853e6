//! Pointer input: a windowed per-frame event record plus ray hit testing.
//!
//! Raw pointer and touch events arrive through a [`PointerQueue`] fed by an
//! injected [`PointerSource`]. The controller drains the queue once per frame
//! into [`PointerInput`], reads one [`PointerSnapshot`] for all objects, then
//! calls [`PointerInput::next`] to retire the window it just consumed.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use glam::{Vec2, Vec3};

use crate::host::{CameraSnapshot, CanvasRect};
use crate::scene_graph::{Object3D, ObjectKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEventKind {
    Move,
    Down,
    Up,
    TouchStart,
    TouchEnd,
}

/// A raw pointer event in client (page) coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    pub client: Option<Vec2>,
}

impl PointerEvent {
    pub fn new(kind: PointerEventKind, x: f32, y: f32) -> Self {
        Self {
            kind,
            client: Some(Vec2::new(x, y)),
        }
    }

    /// An event without coordinates (pointer up, touch end).
    pub fn bare(kind: PointerEventKind) -> Self {
        Self { kind, client: None }
    }
}

/// Map client coordinates to normalised device coordinates of the canvas.
pub fn to_ndc(client: Vec2, rect: &CanvasRect) -> Vec2 {
    let x = client.x - rect.left;
    let y = client.y - rect.top;
    Vec2::new(x / rect.width * 2.0 - 1.0, -(y / rect.height) * 2.0 + 1.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PointerWindow {
    active: bool,
    pointer: Option<Vec2>,
}

impl PointerWindow {
    fn open(pointer: Vec2) -> Self {
        Self {
            active: true,
            pointer: Some(pointer),
        }
    }
}

/// Which window a snapshot was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    PressStart,
    DragEnd,
    Release,
    /// No one-shot window pending: hover or drag.
    Move,
}

/// Pointer state for one frame, shared by every object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSnapshot {
    pub pointer: Option<Vec2>,
    pub is_select: bool,
    pub phase: PointerPhase,
}

impl Default for PointerSnapshot {
    fn default() -> Self {
        Self {
            pointer: None,
            is_select: false,
            phase: PointerPhase::Move,
        }
    }
}

/// Press-start, drag, drag-end and release windows, consumed one per frame.
#[derive(Debug, Clone, Default)]
pub struct PointerInput {
    start: PointerWindow,
    drag: PointerWindow,
    drag_end: PointerWindow,
    release: PointerWindow,
    pressing: bool,
    rect: CanvasRect,
}

impl PointerInput {
    pub fn new(rect: CanvasRect) -> Self {
        Self {
            rect,
            ..Self::default()
        }
    }

    pub fn set_canvas_rect(&mut self, rect: CanvasRect) {
        self.rect = rect;
    }

    pub fn canvas_rect(&self) -> CanvasRect {
        self.rect
    }

    pub fn is_pressing(&self) -> bool {
        self.pressing
    }

    pub fn put_event(&mut self, event: PointerEvent) {
        let ndc = to_ndc(event.client.unwrap_or(Vec2::ZERO), &self.rect);
        let last = self.drag.pointer.unwrap_or(Vec2::ZERO);

        match event.kind {
            PointerEventKind::Down | PointerEventKind::TouchStart => {
                self.pressing = true;
                self.start = PointerWindow::open(ndc);
            }
            PointerEventKind::Up | PointerEventKind::TouchEnd => {
                self.pressing = false;
                self.drag_end = PointerWindow::open(last);
                self.release = PointerWindow::open(last);
            }
            PointerEventKind::Move => {}
        }

        self.drag.active = self.pressing;
        if event.client.is_some() {
            self.drag.pointer = Some(ndc);
        }
    }

    /// The highest-priority pending window.
    pub fn current_event(&self) -> PointerSnapshot {
        if self.start.active {
            return PointerSnapshot {
                pointer: self.start.pointer,
                is_select: true,
                phase: PointerPhase::PressStart,
            };
        }
        if self.drag_end.active {
            return PointerSnapshot {
                pointer: self.drag_end.pointer,
                is_select: true,
                phase: PointerPhase::DragEnd,
            };
        }
        if self.release.active {
            return PointerSnapshot {
                pointer: self.release.pointer,
                is_select: false,
                phase: PointerPhase::Release,
            };
        }
        PointerSnapshot {
            pointer: self.drag.pointer,
            is_select: self.drag.active,
            phase: PointerPhase::Move,
        }
    }

    /// Retire the window returned by the last `current_event`.
    pub fn next(&mut self) {
        if self.start.active {
            self.start = PointerWindow::default();
        } else if self.drag_end.active {
            self.drag_end = PointerWindow::default();
        } else if self.release.active {
            self.release = PointerWindow::default();
        }
    }
}

/// Shared buffer of raw events written by a [`PointerSource`].
#[derive(Debug, Clone, Default)]
pub struct PointerQueue(Rc<RefCell<VecDeque<PointerEvent>>>);

impl PointerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: PointerEvent) {
        self.0.borrow_mut().push_back(event);
    }

    pub fn drain(&self) -> Vec<PointerEvent> {
        self.0.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Input device injected into the controller. Attached once the scene is
/// ready and detached on shutdown.
pub trait PointerSource {
    fn attach(&mut self, queue: PointerQueue);
    fn detach(&mut self);
}

/// A ray from the camera through the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Raycaster {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Raycaster {
    /// Ray through `ndc` for the given camera. `None` without a camera.
    pub fn from_camera(ndc: Vec2, camera: &CameraSnapshot) -> Option<Self> {
        let world = camera.matrix?;
        let origin = world.transform_point3(Vec3::ZERO);
        let view_point = camera
            .projection
            .inverse()
            .project_point3(Vec3::new(ndc.x, ndc.y, 0.5));
        let target = world.transform_point3(view_point);
        let direction = (target - origin).try_normalize()?;
        Some(Self { origin, direction })
    }

    /// Distance along the ray to an axis-aligned box, if it is hit in front.
    pub fn intersects_box(&self, min: Vec3, max: Vec3) -> Option<f32> {
        let inv = self.direction.recip();
        let t1 = (min - self.origin) * inv;
        let t2 = (max - self.origin) * inv;
        let t_near = t1.min(t2).max_element();
        let t_far = t1.max(t2).min_element();
        if t_far < 0.0 || t_near > t_far {
            None
        } else {
            Some(t_near.max(0.0))
        }
    }

    /// Hit test against a visible object's local box of `half_extents`.
    pub fn intersects_object(&self, object: &Object3D, half_extents: Vec3) -> Option<f32> {
        if !object.visible_in_tree() {
            return None;
        }
        let to_local = object.world_matrix().inverse();
        let local = Raycaster {
            origin: to_local.transform_point3(self.origin),
            direction: to_local.transform_vector3(self.direction),
        };
        local.intersects_box(-half_extents, half_extents)
    }

    /// Hit test against the node's own panel size.
    pub fn intersects_panel(&self, object: &Object3D) -> Option<f32> {
        match object.kind() {
            ObjectKind::Panel { width, height } => {
                self.intersects_object(object, Vec3::new(width / 2.0, height / 2.0, 0.01))
            }
            _ => None,
        }
    }
}

type InterceptCheck = Box<dyn Fn(Vec2, bool) -> bool>;

/// Decides whether a pointer event on the canvas should be stopped before it
/// reaches the host viewer's own handlers.
pub struct MouseEventInterceptor {
    rect: CanvasRect,
    enable_propagation: bool,
    check: InterceptCheck,
}

impl MouseEventInterceptor {
    pub fn new() -> Self {
        Self {
            rect: CanvasRect::default(),
            enable_propagation: true,
            check: Box::new(|_, enable_propagation| !enable_propagation),
        }
    }

    pub fn set_enable_propagation(&mut self, enable_propagation: bool) {
        self.enable_propagation = enable_propagation;
    }

    /// Replace the check run on each event with the pointer in NDC.
    pub fn on_check_intercept(&mut self, check: impl Fn(Vec2, bool) -> bool + 'static) {
        self.check = Box::new(check);
    }

    pub fn sync(&mut self, rect: CanvasRect) {
        self.rect = rect;
    }

    /// True if the event should be stopped. Events without coordinates pass.
    pub fn should_intercept(&self, event: &PointerEvent) -> bool {
        match event.client {
            Some(client) => (self.check)(to_ndc(client, &self.rect), self.enable_propagation),
            None => false,
        }
    }
}

impl Default for MouseEventInterceptor {
    fn default() -> Self {
        Self::new()
    }
}
