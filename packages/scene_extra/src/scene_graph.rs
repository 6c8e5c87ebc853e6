//! Scene graph handles for replaced tags.
//!
//! `Object3D` is a reference-counted node in the host's 3D scene. The host
//! owns the tree; widgets built by this crate attach their own sub-trees to it
//! and flip visibility flags. Parents are held weakly so dropping the root
//! releases the whole tree.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::host::SharedViewport;

/// What a scene node represents. Purely descriptive; rendering belongs to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    /// Plain transform node.
    Empty,
    /// Top-level scene.
    Scene,
    /// Placeholder geometry drawn by the host for a tag.
    TagMarker,
    AmbientLight { color: u32, intensity: f32 },
    /// Loaded model referenced by asset path.
    Mesh { asset: String },
    /// Flat UI block with a size in scene units.
    Panel { width: f32, height: f32 },
    /// Element rendered by the CSS overlay layer.
    Css { markup: String },
}

/// Position, rotation and scale of a node relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    /// Build a transform from XYZ Euler angles in radians.
    pub fn from_euler(position: Vec3, euler: [f32; 3], scale: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::from_euler(EulerRot::XYZ, euler[0], euler[1], euler[2]),
            scale,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

struct Node {
    name: String,
    kind: ObjectKind,
    transform: Transform,
    visible: bool,
    parent: Weak<RefCell<Node>>,
    children: Vec<Object3D>,
    viewport: Option<SharedViewport>,
}

/// Shared handle to a scene node. Cloning the handle does not clone the node.
#[derive(Clone)]
pub struct Object3D(Rc<RefCell<Node>>);

impl Object3D {
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self(Rc::new(RefCell::new(Node {
            name: name.into(),
            kind,
            transform: Transform::default(),
            visible: true,
            parent: Weak::new(),
            children: Vec::new(),
            viewport: None,
        })))
    }

    /// Create an empty top-level scene node.
    pub fn scene(name: impl Into<String>) -> Self {
        Self::new(name, ObjectKind::Scene)
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn kind(&self) -> ObjectKind {
        self.0.borrow().kind.clone()
    }

    pub fn set_kind(&self, kind: ObjectKind) {
        self.0.borrow_mut().kind = kind;
    }

    pub fn transform(&self) -> Transform {
        self.0.borrow().transform
    }

    pub fn set_transform(&self, transform: Transform) {
        self.0.borrow_mut().transform = transform;
    }

    pub fn position(&self) -> Vec3 {
        self.0.borrow().transform.position
    }

    pub fn set_position(&self, position: Vec3) {
        self.0.borrow_mut().transform.position = position;
    }

    pub fn rotation(&self) -> Quat {
        self.0.borrow().transform.rotation
    }

    pub fn set_rotation(&self, rotation: Quat) {
        self.0.borrow_mut().transform.rotation = rotation;
    }

    pub fn scale(&self) -> Vec3 {
        self.0.borrow().transform.scale
    }

    pub fn set_scale(&self, scale: Vec3) {
        self.0.borrow_mut().transform.scale = scale;
    }

    pub fn set_uniform_scale(&self, value: f32) {
        self.set_scale(Vec3::splat(value));
    }

    pub fn visible(&self) -> bool {
        self.0.borrow().visible
    }

    /// Set the visibility flag. Returns true if the flag changed.
    pub fn set_visible(&self, visible: bool) -> bool {
        let mut node = self.0.borrow_mut();
        let changed = node.visible != visible;
        node.visible = visible;
        changed
    }

    /// Visible only if this node and every ancestor are visible.
    pub fn visible_in_tree(&self) -> bool {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if !node.visible() {
                return false;
            }
            current = node.parent();
        }
        true
    }

    /// Attach `child` under this node, detaching it from any previous parent.
    pub fn add(&self, child: &Object3D) {
        if self.ptr_eq(child) {
            return;
        }
        if let Some(old_parent) = child.parent() {
            old_parent.remove(child);
        }
        child.0.borrow_mut().parent = Rc::downgrade(&self.0);
        self.0.borrow_mut().children.push(child.clone());
    }

    /// Detach `child` from this node. Returns false if it was not a child.
    pub fn remove(&self, child: &Object3D) -> bool {
        let mut node = self.0.borrow_mut();
        if let Some(pos) = node.children.iter().position(|c| c.ptr_eq(child)) {
            node.children.remove(pos);
            drop(node);
            child.0.borrow_mut().parent = Weak::new();
            true
        } else {
            false
        }
    }

    pub fn parent(&self) -> Option<Object3D> {
        self.0.borrow().parent.upgrade().map(Object3D)
    }

    pub fn children(&self) -> Vec<Object3D> {
        self.0.borrow().children.clone()
    }

    /// Walk parents up to the top of the tree.
    pub fn root(&self) -> Object3D {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Depth-first search of this node and its descendants by name.
    pub fn find_by_name(&self, name: &str) -> Option<Object3D> {
        if self.0.borrow().name == name {
            return Some(self.clone());
        }
        self.children()
            .iter()
            .find_map(|child| child.find_by_name(name))
    }

    /// Visit this node and every descendant, parents first.
    pub fn traverse(&self, visit: &mut dyn FnMut(&Object3D)) {
        visit(self);
        for child in self.children() {
            child.traverse(visit);
        }
    }

    pub fn world_matrix(&self) -> Mat4 {
        let local = self.transform().matrix();
        match self.parent() {
            Some(parent) => parent.world_matrix() * local,
            None => local,
        }
    }

    pub fn world_rotation(&self) -> Quat {
        let (_, rotation, _) = self.world_matrix().to_scale_rotation_translation();
        rotation
    }

    /// Attach the renderer/camera context. Only meaningful on a root node.
    pub fn attach_viewport(&self, viewport: SharedViewport) {
        self.0.borrow_mut().viewport = Some(viewport);
    }

    pub fn viewport(&self) -> Option<SharedViewport> {
        self.0.borrow().viewport.clone()
    }

    pub fn ptr_eq(&self, other: &Object3D) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Object3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.0.borrow();
        f.debug_struct("Object3D")
            .field("name", &node.name)
            .field("kind", &node.kind)
            .field("visible", &node.visible)
            .field("children", &node.children.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_sets_parent() {
        let scene = Object3D::scene("root");
        let child = Object3D::new("child", ObjectKind::Empty);
        scene.add(&child);

        assert!(child.parent().unwrap().ptr_eq(&scene));
        assert_eq!(scene.children().len(), 1);
    }

    #[test]
    fn test_add_moves_between_parents() {
        let a = Object3D::new("a", ObjectKind::Empty);
        let b = Object3D::new("b", ObjectKind::Empty);
        let child = Object3D::new("child", ObjectKind::Empty);

        a.add(&child);
        b.add(&child);

        assert!(a.children().is_empty());
        assert!(child.parent().unwrap().ptr_eq(&b));
    }

    #[test]
    fn test_root_walks_ancestors() {
        let scene = Object3D::scene("root");
        let mid = Object3D::new("mid", ObjectKind::Empty);
        let leaf = Object3D::new("leaf", ObjectKind::Empty);
        scene.add(&mid);
        mid.add(&leaf);

        assert!(leaf.root().ptr_eq(&scene));
        assert_eq!(scene.find_by_name("leaf").unwrap().name(), "leaf");
    }

    #[test]
    fn test_set_visible_reports_change() {
        let node = Object3D::new("n", ObjectKind::Empty);
        assert!(!node.set_visible(true));
        assert!(node.set_visible(false));
        assert!(!node.set_visible(false));
    }

    #[test]
    fn test_visible_in_tree() {
        let scene = Object3D::scene("root");
        let child = Object3D::new("child", ObjectKind::Empty);
        scene.add(&child);
        scene.set_visible(false);

        assert!(child.visible());
        assert!(!child.visible_in_tree());
    }

    #[test]
    fn test_world_matrix_composes_parents() {
        let scene = Object3D::scene("root");
        let parent = Object3D::new("parent", ObjectKind::Empty);
        let child = Object3D::new("child", ObjectKind::Empty);
        parent.set_position(Vec3::new(1.0, 0.0, 0.0));
        parent.set_uniform_scale(2.0);
        child.set_position(Vec3::new(0.0, 1.0, 0.0));
        scene.add(&parent);
        parent.add(&child);

        let world = child.world_matrix().transform_point3(Vec3::ZERO);
        assert!((world - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-5);
    }
}
