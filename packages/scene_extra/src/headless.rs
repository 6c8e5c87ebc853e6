//! Headless host: a scene document loaded from JSON, a recording viewport
//! and a scripted pointer, standing in for the 3D viewer.
//!
//! The CLI `simulate` command and the integration tests drive a
//! [`SceneController`] against this host exactly as the viewer would: poll
//! steps until the scene finishes loading, data refreshes, and frames.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assets::{AssetLoader, FileAssetLoader, ManualAssetLoader};
use crate::config::{ConfigError, ControllerConfig, RendererSettings, SimulationSpec};
use crate::controller::{PollSchedule, SceneController, SceneControllerState};
use crate::data::{DataError, SnapshotDataSource};
use crate::extra_object::{ExtraObject, ExtraObjectParameter, Observe, OverrideTags, TagFactory};
use crate::host::{
    AnchorComponent, CanvasRect, NodeComponent, NodeMap, ObjectResolver, RefId, RootScene, TagNode,
    Viewport,
};
use crate::input::{PointerEvent, PointerQueue, PointerSource};
use crate::notifier::{EventContext, EventKind};
use crate::objects::button::ButtonParameter;
use crate::objects::chart::ChartParameter;
use crate::objects::html::HtmlParameter;
use crate::objects::image::ImageParameter;
use crate::objects::loading::LoadingParameter;
use crate::objects::model::ModelParameter;
use crate::objects::text::TextParameter;
use crate::objects::video_atlas::VideoAtlasParameter;
use crate::replace::ReplaceContext;
use crate::rules::RhaiRuleEvaluator;
use crate::scene_graph::{Object3D, ObjectKind, Transform};
use crate::state::{LoadStatus, StateValue};

const CANVAS_WIDTH: f32 = 800.0;
const CANVAS_HEIGHT: f32 = 600.0;

#[derive(Debug, Error)]
pub enum HeadlessError {
    #[error("Failed to read scene document {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse scene document {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Viewport that records what the controller asked of it.
#[derive(Debug, Clone)]
pub struct HeadlessViewport {
    camera: Option<Mat4>,
    projection: Mat4,
    rect: CanvasRect,
    frame_rate: f32,
    renderer: Option<RendererSettings>,
    renderer_configured: usize,
    overlay_rect: Option<CanvasRect>,
    overlay_renders: usize,
    ui_updates: usize,
}

impl HeadlessViewport {
    /// Camera five units back on +Z looking at the origin, 800x600 canvas.
    pub fn new() -> Self {
        Self {
            camera: Some(Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0))),
            projection: Mat4::perspective_rh_gl(
                std::f32::consts::FRAC_PI_4,
                CANVAS_WIDTH / CANVAS_HEIGHT,
                0.1,
                100.0,
            ),
            rect: CanvasRect {
                left: 0.0,
                top: 0.0,
                width: CANVAS_WIDTH,
                height: CANVAS_HEIGHT,
            },
            frame_rate: 60.0,
            renderer: None,
            renderer_configured: 0,
            overlay_rect: None,
            overlay_renders: 0,
            ui_updates: 0,
        }
    }

    pub fn set_camera(&mut self, camera: Option<Mat4>) {
        self.camera = camera;
    }

    pub fn set_canvas_rect(&mut self, rect: CanvasRect) {
        self.rect = rect;
    }

    pub fn set_frame_rate(&mut self, frame_rate: f32) {
        self.frame_rate = frame_rate;
    }

    pub fn renderer(&self) -> Option<&RendererSettings> {
        self.renderer.as_ref()
    }

    pub fn renderer_configured(&self) -> usize {
        self.renderer_configured
    }

    pub fn overlay_rect(&self) -> Option<CanvasRect> {
        self.overlay_rect
    }

    pub fn overlay_renders(&self) -> usize {
        self.overlay_renders
    }

    pub fn ui_updates(&self) -> usize {
        self.ui_updates
    }
}

impl Default for HeadlessViewport {
    fn default() -> Self {
        Self::new()
    }
}

impl Viewport for HeadlessViewport {
    fn camera_matrix(&self) -> Option<Mat4> {
        self.camera
    }

    fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    fn canvas_rect(&self) -> CanvasRect {
        self.rect
    }

    fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    fn configure_renderer(&mut self, settings: &RendererSettings) {
        self.renderer = Some(settings.clone());
        self.renderer_configured += 1;
    }

    fn resize_overlay(&mut self, rect: CanvasRect) {
        self.overlay_rect = Some(rect);
    }

    fn render_overlay(&mut self, _scene: &Object3D) {
        self.overlay_renders += 1;
    }

    fn update_ui(&mut self) {
        self.ui_updates += 1;
    }
}

/// A loaded root scene backed by a fresh headless viewport.
pub fn headless_root_scene(name: &str) -> RootScene {
    RootScene::attach(
        Object3D::scene(name),
        Rc::new(RefCell::new(HeadlessViewport::new())),
    )
}

/// Widget construction parameters on a fresh headless scene.
pub fn headless_parameter(name: &str) -> ExtraObjectParameter {
    headless_parameter_with_assets(name, Rc::new(ManualAssetLoader::new()))
}

pub fn headless_parameter_with_assets(name: &str, assets: Rc<dyn AssetLoader>) -> ExtraObjectParameter {
    ExtraObjectParameter {
        root_scene: headless_root_scene("root"),
        name: name.to_string(),
        breadcrumb: Vec::new(),
        anchor: AnchorComponent::default(),
        transform: Transform::default(),
        parent: None,
        assets,
        config: Rc::new(ControllerConfig::default()),
    }
}

/// Scripted pointer device. Clones share the same attachment.
#[derive(Debug, Clone, Default)]
pub struct HeadlessPointer {
    queue: Rc<RefCell<Option<PointerQueue>>>,
}

impl HeadlessPointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to the attached controller. Dropped when detached.
    pub fn push(&self, event: PointerEvent) {
        match self.queue.borrow().as_ref() {
            Some(queue) => queue.push(event),
            None => log::debug!("Pointer detached, dropping {:?}", event.kind),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.queue.borrow().is_some()
    }

    /// True when every delivered event has been consumed.
    pub fn queue_is_empty(&self) -> bool {
        self.queue.borrow().as_ref().map_or(true, PointerQueue::is_empty)
    }
}

impl PointerSource for HeadlessPointer {
    fn attach(&mut self, queue: PointerQueue) {
        *self.queue.borrow_mut() = Some(queue);
    }

    fn detach(&mut self) {
        *self.queue.borrow_mut() = None;
    }
}

fn default_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

/// One node of a scene document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentNode {
    #[serde(rename = "ref")]
    pub reference: RefId,
    pub name: String,

    /// Reference of the parent node. Top-level when absent.
    #[serde(default)]
    pub parent: Option<RefId>,

    #[serde(default)]
    pub position: [f32; 3],

    /// XYZ Euler angles in radians.
    #[serde(default)]
    pub rotation: [f32; 3],

    #[serde(default = "default_scale")]
    pub scale: [f32; 3],

    #[serde(default)]
    pub components: Vec<NodeComponent>,
}

impl DocumentNode {
    fn transform(&self) -> Transform {
        Transform::from_euler(Vec3::from(self.position), self.rotation, Vec3::from(self.scale))
    }
}

/// Scene document: nodes in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default)]
    pub nodes: Vec<DocumentNode>,
}

impl SceneDocument {
    pub fn from_file(path: &Path) -> Result<Self, HeadlessError> {
        let content = std::fs::read_to_string(path).map_err(|source| HeadlessError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| HeadlessError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// The viewer side of a simulation: node map, object tree and viewport.
///
/// References resolve from the start, but the root scene only becomes
/// resolvable once [`HeadlessHost::finish_loading`] attaches the viewport.
pub struct HeadlessHost {
    scene: Object3D,
    node_map: NodeMap,
    objects: HashMap<RefId, Object3D>,
    viewport: Rc<RefCell<HeadlessViewport>>,
    loaded: bool,
}

impl HeadlessHost {
    pub fn from_document(document: &SceneDocument) -> Self {
        let scene = Object3D::scene("Scene");
        let mut objects = HashMap::new();
        let mut node_map = NodeMap::new();

        for node in &document.nodes {
            let is_tag = node
                .components
                .iter()
                .any(|c| matches!(c, NodeComponent::Tag(_)));
            let kind = if is_tag {
                ObjectKind::TagMarker
            } else {
                ObjectKind::Empty
            };
            let object = Object3D::new(node.name.clone(), kind);
            object.set_transform(node.transform());
            objects.insert(node.reference.clone(), object);
            node_map.insert(
                node.reference.clone(),
                TagNode::new(node.name.clone(), node.components.clone()),
            );
        }

        for node in &document.nodes {
            let Some(object) = objects.get(&node.reference) else {
                continue;
            };
            match node.parent.as_ref().and_then(|p| objects.get(p)) {
                Some(parent) => parent.add(object),
                None => {
                    if let Some(parent) = &node.parent {
                        log::warn!("Node '{}' has unknown parent '{}'", node.reference, parent);
                    }
                    scene.add(object)
                }
            }
        }

        log::debug!("Scene document with {} nodes", node_map.len());
        Self {
            scene,
            node_map,
            objects,
            viewport: Rc::new(RefCell::new(HeadlessViewport::new())),
            loaded: false,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, HeadlessError> {
        Ok(Self::from_document(&SceneDocument::from_file(path)?))
    }

    pub fn node_map(&self) -> &NodeMap {
        &self.node_map
    }

    pub fn scene(&self) -> &Object3D {
        &self.scene
    }

    pub fn viewport(&self) -> &Rc<RefCell<HeadlessViewport>> {
        &self.viewport
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Attach the viewport, making the root scene resolvable.
    pub fn finish_loading(&mut self) {
        if !self.loaded {
            self.scene.attach_viewport(self.viewport.clone());
            self.loaded = true;
            log::info!("Headless scene finished loading");
        }
    }
}

impl ObjectResolver for HeadlessHost {
    fn resolve(&self, reference: Option<&str>) -> Option<Object3D> {
        self.objects.get(reference?).cloned()
    }
}

/// Widget a tag is replaced with, as written in a simulation spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WidgetSpec {
    Text(TextParameter),
    Button(ButtonParameter),
    Chart(ChartParameter),
    Html(HtmlParameter),
    Model(ModelParameter),
    VideoAtlas(VideoAtlasParameter),
    Image(ImageParameter),
    Loading(LoadingParameter),
    /// A button that reveals `contents` when clicked.
    SwitchGroup {
        button: Box<WidgetSpec>,
        contents: Box<WidgetSpec>,
        #[serde(default)]
        duration: Option<f32>,
    },
}

impl WidgetSpec {
    /// Convert the tag behind `ctx` into this widget.
    pub fn build(&self, ctx: ReplaceContext) -> Option<Box<dyn ExtraObject>> {
        let object = match self.clone() {
            WidgetSpec::Text(p) => ctx.to_text(p)?.boxed(),
            WidgetSpec::Button(p) => ctx.to_button(p)?.boxed(),
            WidgetSpec::Chart(p) => ctx.to_chart(p)?.boxed(),
            WidgetSpec::Html(p) => ctx.to_html(p)?.boxed(),
            WidgetSpec::Model(p) => ctx.to_model(p)?.boxed(),
            WidgetSpec::VideoAtlas(p) => ctx.to_video_atlas(p)?.boxed(),
            WidgetSpec::Image(p) => ctx.to_image(p)?.boxed(),
            WidgetSpec::Loading(p) => ctx.to_loading_view(p)?.boxed(),
            WidgetSpec::SwitchGroup {
                button,
                contents,
                duration,
            } => {
                ctx.with_switch_group(
                    move |ctx: ReplaceContext| button.build(ctx),
                    move |ctx: ReplaceContext| contents.build(ctx),
                    duration,
                )?
                .boxed()
            }
        };
        Some(with_event_logging(object))
    }
}

fn with_event_logging(mut object: Box<dyn ExtraObject>) -> Box<dyn ExtraObject> {
    for kind in [
        EventKind::Load,
        EventKind::LoadFailed,
        EventKind::UpdateState,
        EventKind::Click,
    ] {
        object.observe(
            kind,
            Box::new(move |ctx: &EventContext| match ctx.failure() {
                Some(reason) => log::warn!("[{}] {}: {}", ctx.tag_name, kind.name(), reason),
                None => log::info!("[{}] {} (state '{}')", ctx.tag_name, kind.name(), ctx.state),
            }),
        );
    }
    object
}

/// A tag name and the widget replacing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSpec {
    pub name: String,
    pub widget: WidgetSpec,
}

impl TagSpec {
    pub fn factory(&self) -> TagFactory {
        let widget = self.widget.clone();
        Box::new(move |ctx: ReplaceContext| widget.build(ctx))
    }
}

/// Outcome of one installed object after a simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectReport {
    pub name: String,
    pub load_status: LoadStatus,
    pub state: StateValue,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub state: SceneControllerState,
    /// Poll at which the controller became active.
    pub activated_at: Option<u32>,
    pub frames: u32,
    pub objects: Vec<ObjectReport>,
}

/// Run the poll/frame schedule described by `spec` against a headless host.
pub fn simulate(spec: &SimulationSpec) -> Result<SimulationReport, HeadlessError> {
    spec.validate()
        .map_err(|e| HeadlessError::Config(ConfigError::Invalid(e)))?;

    let mut host = HeadlessHost::from_file(&spec.scene_path)?;
    let data = spec
        .data_path
        .as_deref()
        .map(SnapshotDataSource::from_file)
        .transpose()?;
    let rules = RhaiRuleEvaluator::new();

    let mut tags = OverrideTags::new();
    for tag in &spec.tags {
        tags.insert(tag.name.clone(), tag.factory());
    }
    let assets: Rc<dyn AssetLoader> = Rc::new(FileAssetLoader::new(spec.effective_asset_root()));
    let mut controller = SceneController::new(
        tags,
        spec.controller.clone(),
        Box::new(HeadlessPointer::new()),
        assets,
    );

    let delta = 1.0 / spec.controller.frame_rate;
    let mut schedule = PollSchedule::new(spec.controller.poll_interval_ms);
    let mut state = SceneControllerState::Initialize;
    let mut activated_at = None;
    let mut poll = 0;
    let mut frames = 0;

    while poll < spec.polls {
        if schedule.advance(delta) {
            if poll >= spec.ready_after_polls {
                host.finish_loading();
            }
            state = controller.exec(state, host.node_map(), &host);
            if state == SceneControllerState::Active && activated_at.is_none() {
                activated_at = Some(poll);
            }
            if let Some(data) = &data {
                controller.exec_data(data, &rules);
            }
            poll += 1;
            log::debug!("Poll {} done, state {:?}", poll, state);
        }
        controller.animate(delta);
        frames += 1;
    }

    let objects = controller
        .object_names()
        .into_iter()
        .filter_map(|name| controller.get_object(name))
        .map(|object| ObjectReport {
            name: object.name().to_string(),
            load_status: object.load_status(),
            state: object.state().clone(),
            visible: object.object().visible(),
        })
        .collect();
    controller.shutdown();

    Ok(SimulationReport {
        state,
        activated_at,
        frames,
        objects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "nodes": [
            {"ref": "floor", "name": "Floor", "position": [0, -1, 0]},
            {"ref": "tag-1", "name": "Pump", "parent": "floor", "position": [1, 0, 0],
             "components": [{"type": "Tag", "icon": "Info"}]}
        ]
    }"#;

    fn host() -> HeadlessHost {
        HeadlessHost::from_document(&serde_json::from_str(DOCUMENT).unwrap())
    }

    #[test]
    fn test_document_builds_tree() {
        let host = host();
        assert_eq!(host.node_map().len(), 2);
        let tag = host.resolve(Some("tag-1")).unwrap();
        assert_eq!(tag.kind(), ObjectKind::TagMarker);
        assert_eq!(tag.parent().unwrap().name(), "Floor");
        let world = tag.world_matrix().transform_point3(Vec3::ZERO);
        assert!((world - Vec3::new(1.0, -1.0, 0.0)).length() < 1e-5);
        assert!(host.resolve(None).is_none());
        assert!(host.resolve(Some("missing")).is_none());
    }

    #[test]
    fn test_root_scene_needs_finished_loading() {
        let mut host = host();
        assert!(crate::host::search_root_scene(host.node_map(), &host).is_none());
        host.finish_loading();
        let root = crate::host::search_root_scene(host.node_map(), &host).unwrap();
        assert!(root.scene().ptr_eq(host.scene()));
    }

    #[test]
    fn test_pointer_attach_and_detach() {
        let mut pointer = HeadlessPointer::new();
        let handle = pointer.clone();
        handle.push(PointerEvent::bare(crate::input::PointerEventKind::Up));

        let queue = PointerQueue::new();
        pointer.attach(queue.clone());
        assert!(handle.is_attached());
        handle.push(PointerEvent::bare(crate::input::PointerEventKind::Up));
        assert_eq!(queue.len(), 1);
        assert!(!handle.queue_is_empty());

        pointer.detach();
        assert!(!handle.is_attached());
        assert!(handle.queue_is_empty());
    }

    #[test]
    fn test_widget_spec_parsing() {
        let json = r#"[
            {"name": "A", "widget": {"type": "text", "content": "hi", "position": [0, 1, 0]}},
            {"name": "B", "widget": {"type": "videoAtlas", "imagePath": "f.png", "width": 1, "height": 1, "fps": 12}},
            {"name": "C", "widget": {"type": "switchGroup", "duration": 0.2,
                "button": {"type": "button"},
                "contents": {"type": "html", "markup": "<b>{state}</b>"}}}
        ]"#;
        let tags: Vec<TagSpec> = serde_json::from_str(json).unwrap();
        match &tags[0].widget {
            WidgetSpec::Text(p) => {
                assert_eq!(p.content, "hi");
                assert_eq!(p.base.position, Some([0.0, 1.0, 0.0]));
            }
            other => panic!("unexpected widget {:?}", other),
        }
        assert!(matches!(&tags[1].widget, WidgetSpec::VideoAtlas(p) if p.fps == 12.0));
        assert!(matches!(
            &tags[2].widget,
            WidgetSpec::SwitchGroup { duration: Some(d), .. } if *d == 0.2
        ));
    }

    #[test]
    fn test_tag_spec_factory_builds_switch_group() {
        let mut host = host();
        host.finish_loading();
        let spec: TagSpec = serde_json::from_str(
            r#"{"name": "Pump", "widget": {"type": "switchGroup",
                "button": {"type": "button"}, "contents": {"type": "text", "content": "open"}}}"#,
        )
        .unwrap();

        let root = crate::host::search_root_scene(host.node_map(), &host).unwrap();
        let anchor = host.node_map().get("tag-1").unwrap().anchor().cloned().unwrap();
        let ctx = ReplaceContext::new(
            root,
            "Pump",
            anchor,
            host.resolve(Some("tag-1")),
            Rc::new(ManualAssetLoader::new()),
            Rc::new(ControllerConfig::default()),
        );
        let mut factory = spec.factory();
        let object = factory(ctx).unwrap();
        let group = object
            .downcast_ref::<crate::objects::group::GroupObject>()
            .unwrap();
        assert_eq!(group.child_names(), vec!["Button", "Contents"]);
        assert!(group.is_show("Button"));
        assert!(!group.is_show("Contents"));
    }
}
