//! Boundary types consumed from the host viewer.
//!
//! The host owns the node map (the scene document), the 3D object graph and
//! the renderer. This module describes the read-only view the controller
//! needs: tag nodes with their anchor component, reference resolution, and
//! the viewport reachable from a loaded root scene.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use glam::{Mat4, Quat};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::RendererSettings;
use crate::data::ValueDataBinding;
use crate::scene_graph::Object3D;

/// Reference id of a node in the host document.
pub type RefId = String;

/// Component type name that marks a node as a tag.
pub const TAG_COMPONENT_TYPE: &str = "Tag";

/// Metadata carried by a tag: icon, color, link and data binding configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorComponent {
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub nav_link: Option<NavLink>,
    #[serde(default)]
    pub value_data_binding: Option<ValueDataBinding>,
    #[serde(default)]
    pub rule_based_map_id: Option<String>,
    #[serde(default)]
    pub offset: Option<[f32; 3]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavLink {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// One entry of a node's component list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawComponent", into = "RawComponent")]
pub enum NodeComponent {
    Tag(AnchorComponent),
    /// Any other component, kept only by its type name.
    Other(String),
}

impl NodeComponent {
    pub fn component_type(&self) -> &str {
        match self {
            NodeComponent::Tag(_) => TAG_COMPONENT_TYPE,
            NodeComponent::Other(kind) => kind,
        }
    }

    pub fn as_anchor(&self) -> Option<&AnchorComponent> {
        match self {
            NodeComponent::Tag(anchor) => Some(anchor),
            NodeComponent::Other(_) => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawComponent {
    #[serde(rename = "type")]
    component_type: String,
    #[serde(flatten)]
    fields: serde_json::Map<String, serde_json::Value>,
}

impl TryFrom<RawComponent> for NodeComponent {
    type Error = serde_json::Error;

    fn try_from(raw: RawComponent) -> Result<Self, Self::Error> {
        if raw.component_type == TAG_COMPONENT_TYPE {
            let anchor = serde_json::from_value(serde_json::Value::Object(raw.fields))?;
            Ok(NodeComponent::Tag(anchor))
        } else {
            Ok(NodeComponent::Other(raw.component_type))
        }
    }
}

impl From<NodeComponent> for RawComponent {
    fn from(component: NodeComponent) -> Self {
        match component {
            NodeComponent::Tag(anchor) => {
                let fields = match serde_json::to_value(anchor) {
                    Ok(serde_json::Value::Object(map)) => map,
                    _ => serde_json::Map::new(),
                };
                RawComponent {
                    component_type: TAG_COMPONENT_TYPE.to_string(),
                    fields,
                }
            }
            NodeComponent::Other(component_type) => RawComponent {
                component_type,
                fields: serde_json::Map::new(),
            },
        }
    }
}

/// A node of the host document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagNode {
    pub name: String,
    #[serde(default)]
    pub components: Vec<NodeComponent>,
}

impl TagNode {
    pub fn new(name: impl Into<String>, components: Vec<NodeComponent>) -> Self {
        Self {
            name: name.into(),
            components,
        }
    }

    /// First tag component, if any.
    pub fn anchor(&self) -> Option<&AnchorComponent> {
        self.components.iter().find_map(NodeComponent::as_anchor)
    }
}

/// Node map keyed by reference id. Iteration follows insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMap {
    entries: Vec<(RefId, TagNode)>,
}

impl NodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node. A replaced node keeps its position.
    pub fn insert(&mut self, reference: impl Into<RefId>, node: TagNode) {
        let reference = reference.into();
        match self.entries.iter_mut().find(|(r, _)| *r == reference) {
            Some(entry) => entry.1 = node,
            None => self.entries.push((reference, node)),
        }
    }

    pub fn get(&self, reference: &str) -> Option<&TagNode> {
        self.entries
            .iter()
            .find(|(r, _)| r == reference)
            .map(|(_, node)| node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagNode)> {
        self.entries.iter().map(|(r, node)| (r.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(RefId, TagNode)> for NodeMap {
    fn from_iter<I: IntoIterator<Item = (RefId, TagNode)>>(iter: I) -> Self {
        let mut map = NodeMap::new();
        for (reference, node) in iter {
            map.insert(reference, node);
        }
        map
    }
}

impl<'de> Deserialize<'de> for NodeMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NodeMapVisitor;

        impl<'de> Visitor<'de> for NodeMapVisitor {
            type Value = NodeMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of reference id to node")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<NodeMap, A::Error> {
                let mut map = NodeMap::new();
                while let Some((reference, node)) = access.next_entry::<RefId, TagNode>()? {
                    map.insert(reference, node);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(NodeMapVisitor)
    }
}

/// Resolves a node reference to its live 3D object.
pub trait ObjectResolver {
    fn resolve(&self, reference: Option<&str>) -> Option<Object3D>;
}

impl<F> ObjectResolver for F
where
    F: Fn(Option<&str>) -> Option<Object3D>,
{
    fn resolve(&self, reference: Option<&str>) -> Option<Object3D> {
        self(reference)
    }
}

/// Screen-space rectangle of the 3D canvas, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for CanvasRect {
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }
}

/// Renderer, camera and canvas reachable from a loaded root scene.
pub trait Viewport {
    /// World matrix of the active camera, if the camera is available.
    fn camera_matrix(&self) -> Option<Mat4>;

    fn projection_matrix(&self) -> Mat4;

    fn canvas_rect(&self) -> CanvasRect;

    fn frame_rate(&self) -> f32 {
        60.0
    }

    /// Apply renderer tuning once the scene is ready.
    fn configure_renderer(&mut self, _settings: &RendererSettings) {}

    /// Set up or resize the CSS overlay layer.
    fn resize_overlay(&mut self, _rect: CanvasRect) {}

    /// Draw the CSS overlay layer for the current frame.
    fn render_overlay(&mut self, _scene: &Object3D) {}

    /// Advance the UI library's internal animations.
    fn update_ui(&mut self) {}
}

pub type SharedViewport = Rc<RefCell<dyn Viewport>>;

/// A loaded root scene: the top node plus its viewport.
#[derive(Clone)]
pub struct RootScene {
    scene: Object3D,
    viewport: SharedViewport,
}

impl RootScene {
    /// Walk to the top of `object`'s tree. Resolvable only when the top node
    /// carries a viewport.
    pub fn from_object(object: &Object3D) -> Option<Self> {
        let scene = object.root();
        let viewport = scene.viewport()?;
        Some(Self { scene, viewport })
    }

    /// Attach `viewport` to `scene`, making it a loaded root scene.
    pub fn attach(scene: Object3D, viewport: SharedViewport) -> Self {
        scene.attach_viewport(viewport.clone());
        Self { scene, viewport }
    }

    pub fn scene(&self) -> &Object3D {
        &self.scene
    }

    pub fn viewport(&self) -> &SharedViewport {
        &self.viewport
    }

    pub fn add(&self, object: &Object3D) {
        self.scene.add(object);
    }

    /// Capture the camera state for this frame.
    pub fn camera_snapshot(&self, precision: usize) -> CameraSnapshot {
        let viewport = self.viewport.borrow();
        CameraSnapshot::new(viewport.camera_matrix(), viewport.projection_matrix(), precision)
    }
}

impl fmt::Debug for RootScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootScene").field("scene", &self.scene).finish()
    }
}

/// Top of the tree containing `target`, if any.
pub fn find_root_scene(target: Option<&Object3D>) -> Option<Object3D> {
    target.map(Object3D::root)
}

/// Find the loaded root scene by resolving each node of the map in turn.
pub fn search_root_scene(node_map: &NodeMap, resolver: &dyn ObjectResolver) -> Option<RootScene> {
    node_map.iter().find_map(|(reference, _)| {
        let object = resolver.resolve(Some(reference))?;
        RootScene::from_object(&object)
    })
}

/// Camera state for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSnapshot {
    /// Coarse textual fingerprint of the camera transform, used as a change detector.
    pub fingerprint: String,
    pub matrix: Option<Mat4>,
    pub projection: Mat4,
}

impl CameraSnapshot {
    pub fn new(matrix: Option<Mat4>, projection: Mat4, precision: usize) -> Self {
        Self {
            fingerprint: camera_fingerprint(matrix.as_ref(), precision),
            matrix,
            projection,
        }
    }

    /// Camera world rotation, identity when the camera is unavailable.
    pub fn rotation(&self) -> Quat {
        self.matrix
            .map(|m| m.to_scale_rotation_translation().1)
            .unwrap_or(Quat::IDENTITY)
    }
}

impl Default for CameraSnapshot {
    fn default() -> Self {
        Self::new(None, Mat4::IDENTITY, 3)
    }
}

/// Fixed-precision digits of every matrix element with signs and points removed.
/// `"-"` when there is no camera.
pub fn camera_fingerprint(matrix: Option<&Mat4>, precision: usize) -> String {
    match matrix {
        Some(m) => m
            .to_cols_array()
            .iter()
            .map(|e| format!("{:.*}", precision, e))
            .collect::<String>()
            .replace(['-', '.'], ""),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_map_keeps_document_order() {
        let json = r#"{
            "z": {"name": "Zeta", "components": []},
            "a": {"name": "Alpha", "components": [{"type": "Tag", "icon": "Info"}]}
        }"#;
        let map: NodeMap = serde_json::from_str(json).unwrap();
        let names: Vec<_> = map.iter().map(|(r, _)| r).collect();
        assert_eq!(names, vec!["z", "a"]);
        assert_eq!(map.get("a").unwrap().anchor().unwrap().icon.as_deref(), Some("Info"));
    }

    #[test]
    fn test_component_parsing() {
        let json = r#"[
            {"type": "ModelRef", "uri": "x.glb"},
            {"type": "Tag", "ruleBasedMapId": "rule1", "valueDataBinding": {"dataBindingContext": {"entityId": "e"}}}
        ]"#;
        let components: Vec<NodeComponent> = serde_json::from_str(json).unwrap();
        assert_eq!(components[0].component_type(), "ModelRef");
        let anchor = components[1].as_anchor().unwrap();
        assert_eq!(anchor.rule_based_map_id.as_deref(), Some("rule1"));
        assert!(anchor.value_data_binding.is_some());
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut map = NodeMap::new();
        map.insert("a", TagNode::new("A", vec![]));
        map.insert("b", TagNode::new("B", vec![]));
        map.insert("a", TagNode::new("A2", vec![]));

        let names: Vec<_> = map.iter().map(|(_, n)| n.name.clone()).collect();
        assert_eq!(names, vec!["A2", "B"]);
    }

    #[test]
    fn test_camera_fingerprint() {
        assert_eq!(camera_fingerprint(None, 3), "-");
        let fp = camera_fingerprint(Some(&Mat4::IDENTITY), 3);
        assert_eq!(fp, "1000000000000000000010000000000000000000100000000000000000001000");
        let moved = Mat4::from_translation(glam::Vec3::new(-1.5, 0.0, 0.0));
        assert_ne!(camera_fingerprint(Some(&moved), 3), fp);
    }

    #[test]
    fn test_find_root_scene() {
        assert!(find_root_scene(None).is_none());
        let scene = Object3D::scene("root");
        let child = Object3D::new("c", crate::scene_graph::ObjectKind::Empty);
        scene.add(&child);
        assert!(find_root_scene(Some(&child)).unwrap().ptr_eq(&scene));
        // No viewport attached yet
        assert!(RootScene::from_object(&child).is_none());
    }
}
