//! Tag replacement: turning a tag into a widget.
//!
//! A [`ReplaceContext`] is handed to each tag factory. Every conversion
//! consumes the context, hides the tag and places the new widget where the
//! tag was. When the tag object could not be resolved every conversion
//! returns `None` and nothing is built.

use std::rc::Rc;

use crate::assets::AssetLoader;
use crate::config::ControllerConfig;
use crate::extra_object::{ExtraObject, ExtraObjectParameter};
use crate::host::{AnchorComponent, RootScene};
use crate::objects::button::{ButtonObject, ButtonParameter};
use crate::objects::chart::{ChartObject, ChartParameter};
use crate::objects::group::{ChildFactory, GroupHandle, GroupObject, GroupParameter, LoadingTicket};
use crate::objects::html::{HtmlObject, HtmlParameter};
use crate::objects::image::{ImageObject, ImageParameter};
use crate::objects::loading::{LoadingParameter, LoadingViewObject};
use crate::objects::model::{ModelObject, ModelParameter};
use crate::objects::text::{TextObject, TextParameter};
use crate::objects::video_atlas::{VideoAtlasObject, VideoAtlasParameter};
use crate::scene_graph::{Object3D, ObjectKind, Transform};

/// Child names used by the switch group.
pub const SWITCH_BUTTON: &str = "Button";
pub const SWITCH_CONTENTS: &str = "Contents";

/// Child names used by the loading group.
pub const LOADING_VIEW: &str = "Loading";
pub const LOADING_CONTENTS: &str = "Contents";

/// Everything needed to replace one tag.
pub struct ReplaceContext {
    root_scene: RootScene,
    anchor: AnchorComponent,
    tag: Option<Object3D>,
    parent: Option<Object3D>,
    name: String,
    breadcrumb: Vec<String>,
    group: Option<GroupHandle>,
    assets: Rc<dyn AssetLoader>,
    config: Rc<ControllerConfig>,
}

impl ReplaceContext {
    pub fn new(
        root_scene: RootScene,
        name: impl Into<String>,
        anchor: AnchorComponent,
        tag: Option<Object3D>,
        assets: Rc<dyn AssetLoader>,
        config: Rc<ControllerConfig>,
    ) -> Self {
        Self {
            root_scene,
            anchor,
            tag,
            parent: None,
            name: name.into(),
            breadcrumb: Vec::new(),
            group: None,
            assets,
            config,
        }
    }

    /// Context for a group member. The member is placed relative to `parent`
    /// through a stand-in tag with an identity transform.
    fn for_group_member(&self, name: &str, parent: Object3D, group: GroupHandle) -> Self {
        let mut breadcrumb = self.breadcrumb.clone();
        breadcrumb.push(self.name.clone());
        Self {
            root_scene: self.root_scene.clone(),
            anchor: self.anchor.clone(),
            tag: Some(Object3D::new(format!("{}Tag", name), ObjectKind::TagMarker)),
            parent: Some(parent),
            name: name.to_string(),
            breadcrumb,
            group: Some(group),
            assets: self.assets.clone(),
            config: self.config.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn anchor(&self) -> &AnchorComponent {
        &self.anchor
    }

    pub fn breadcrumb(&self) -> &[String] {
        &self.breadcrumb
    }

    pub fn root_scene(&self) -> &RootScene {
        &self.root_scene
    }

    pub fn tag(&self) -> Option<&Object3D> {
        self.tag.as_ref()
    }

    /// The enclosing group, when this context builds a group member.
    pub fn group_handle(&self) -> Option<&GroupHandle> {
        self.group.as_ref()
    }

    pub fn config(&self) -> &Rc<ControllerConfig> {
        &self.config
    }

    /// Hide the tag and capture its absolute transform.
    fn take_parameter(self) -> Option<ExtraObjectParameter> {
        let Some(tag) = self.tag else {
            log::debug!("Tag object for '{}' is not resolved", self.name);
            return None;
        };
        tag.set_visible(false);

        let (scale, rotation, position) = tag.world_matrix().to_scale_rotation_translation();
        Some(ExtraObjectParameter {
            root_scene: self.root_scene,
            name: self.name,
            breadcrumb: self.breadcrumb,
            anchor: self.anchor,
            transform: Transform {
                position,
                rotation,
                scale,
            },
            parent: self.parent,
            assets: self.assets,
            config: self.config,
        })
    }

    pub fn to_button(self, parameter: ButtonParameter) -> Option<ButtonObject> {
        Some(ButtonObject::new(self.take_parameter()?, parameter))
    }

    pub fn to_text(self, parameter: TextParameter) -> Option<TextObject> {
        Some(TextObject::new(self.take_parameter()?, parameter))
    }

    pub fn to_model(self, parameter: ModelParameter) -> Option<ModelObject> {
        Some(ModelObject::new(self.take_parameter()?, parameter))
    }

    pub fn to_chart(self, parameter: ChartParameter) -> Option<ChartObject> {
        Some(ChartObject::new(self.take_parameter()?, parameter))
    }

    pub fn to_video_atlas(self, parameter: VideoAtlasParameter) -> Option<VideoAtlasObject> {
        Some(VideoAtlasObject::new(self.take_parameter()?, parameter))
    }

    pub fn to_html(self, parameter: HtmlParameter) -> Option<HtmlObject> {
        Some(HtmlObject::new(self.take_parameter()?, parameter))
    }

    pub fn to_image(self, parameter: ImageParameter) -> Option<ImageObject> {
        Some(ImageObject::new(self.take_parameter()?, parameter))
    }

    pub fn to_loading_view(self, parameter: LoadingParameter) -> Option<LoadingViewObject> {
        Some(LoadingViewObject::new(self.take_parameter()?, parameter))
    }

    /// Build a group whose members are produced by `children`, in order.
    /// A member whose factory returns `None` is left out.
    pub fn to_group(
        self,
        parameter: GroupParameter,
        children: Vec<(String, ChildFactory)>,
    ) -> Option<GroupObject> {
        let template = ReplaceContext {
            tag: None,
            parent: None,
            group: None,
            root_scene: self.root_scene.clone(),
            anchor: self.anchor.clone(),
            name: self.name.clone(),
            breadcrumb: self.breadcrumb.clone(),
            assets: self.assets.clone(),
            config: self.config.clone(),
        };
        let mut group = GroupObject::new(self.take_parameter()?, parameter);

        for (name, factory) in children {
            let context = template.for_group_member(&name, group.container(), group.handle());
            match factory(context) {
                Some(child) => group.push_child(name, child),
                None => log::warn!("Group '{}' member '{}' was not built", template.name, name),
            }
        }
        Some(group)
    }

    /// Group that starts on a "Button" member and switches to "Contents" with
    /// a scale burst when the button is clicked. Moving the camera while the
    /// contents are shown switches back.
    pub fn with_switch_group(
        self,
        button: impl FnOnce(ReplaceContext) -> Option<Box<dyn ExtraObject>> + 'static,
        contents: impl FnOnce(ReplaceContext) -> Option<Box<dyn ExtraObject>> + 'static,
        duration: Option<f32>,
    ) -> Option<GroupObject> {
        let duration = duration.unwrap_or(self.config.switch_duration);
        let children: Vec<(String, ChildFactory)> = vec![
            (SWITCH_BUTTON.to_string(), Box::new(button) as ChildFactory),
            (SWITCH_CONTENTS.to_string(), Box::new(contents) as ChildFactory),
        ];
        let mut group = self.to_group(GroupParameter::default(), children)?;

        let handle = group.handle();
        if let Some(button) = group.get_child_mut(SWITCH_BUTTON) {
            button.observe(
                crate::notifier::EventKind::Click,
                Box::new(move |_: &crate::notifier::EventContext| {
                    if handle.is_show(SWITCH_CONTENTS) || handle.is_scale_animating() {
                        return;
                    }
                    handle.start_scale_animation(
                        |group| {
                            group.show_single_child(SWITCH_CONTENTS);
                        },
                        Some(duration),
                        false,
                    );
                }),
            );
        }
        group.show_single_child(SWITCH_BUTTON);

        Some(group.on_move_camera(move |group| {
            if group.is_show(SWITCH_CONTENTS) && !group.is_scale_animating() {
                group.start_scale_animation(
                    |group| {
                        group.show_single_child(SWITCH_BUTTON);
                    },
                    Some(duration),
                    false,
                );
            }
        }))
    }

    /// Group that shows a "Loading" member until the returned ticket is completed.
    pub fn with_loading_group(
        self,
        loading: impl FnOnce(ReplaceContext) -> Option<Box<dyn ExtraObject>> + 'static,
        contents: impl FnOnce(ReplaceContext) -> Option<Box<dyn ExtraObject>> + 'static,
    ) -> Option<(GroupObject, LoadingTicket)> {
        let children: Vec<(String, ChildFactory)> = vec![
            (LOADING_VIEW.to_string(), Box::new(loading) as ChildFactory),
            (LOADING_CONTENTS.to_string(), Box::new(contents) as ChildFactory),
        ];
        let mut group = self.to_group(GroupParameter::default(), children)?;
        group.show_single_child(LOADING_VIEW);
        let ticket = LoadingTicket::new(group.handle(), LOADING_CONTENTS);
        Some((group, ticket))
    }
}

impl std::fmt::Debug for ReplaceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaceContext")
            .field("name", &self.name)
            .field("breadcrumb", &self.breadcrumb)
            .field("resolved", &self.tag.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ManualAssetLoader;
    use crate::extra_object::Observe;
    use crate::headless::headless_root_scene;
    use glam::Vec3;

    fn context(tag: Option<Object3D>) -> ReplaceContext {
        ReplaceContext::new(
            headless_root_scene("root"),
            "Pump",
            AnchorComponent::default(),
            tag,
            Rc::new(ManualAssetLoader::new()),
            Rc::new(ControllerConfig::default()),
        )
    }

    fn placed_tag(context_root: &RootScene) -> Object3D {
        let tag = Object3D::new("PumpTag", ObjectKind::TagMarker);
        tag.set_position(Vec3::new(1.0, 2.0, 3.0));
        context_root.add(&tag);
        tag
    }

    #[test]
    fn test_unresolved_tag_builds_nothing() {
        let ctx = context(None);
        let root = ctx.root_scene().clone();
        assert!(ctx.to_text(TextParameter::default()).is_none());
        assert!(root.scene().children().is_empty());
    }

    #[test]
    fn test_conversion_hides_tag_and_takes_its_place() {
        let mut ctx = context(None);
        let tag = placed_tag(ctx.root_scene());
        ctx.tag = Some(tag.clone());

        let text = ctx.to_text(TextParameter::default()).unwrap();
        assert!(!tag.visible());
        assert_eq!(text.object().position(), Vec3::new(1.0, 2.0, 3.0));
        assert!(text.object().parent().is_some());
    }

    #[test]
    fn test_group_members_get_breadcrumb_and_handle() {
        let mut ctx = context(None);
        ctx.tag = Some(placed_tag(ctx.root_scene()));

        let children: Vec<(String, ChildFactory)> = vec![
            (
                "A".to_string(),
                Box::new(|c: ReplaceContext| {
                    assert_eq!(c.breadcrumb(), &["Pump".to_string()]);
                    assert!(c.group_handle().is_some());
                    c.to_text(TextParameter::default()).map(Observe::boxed)
                }) as ChildFactory,
            ),
            ("B".to_string(), Box::new(|_: ReplaceContext| None) as ChildFactory),
        ];
        let group = ctx.to_group(GroupParameter::default(), children).unwrap();
        assert!(group.get_child("A").is_some());
        assert!(group.get_child("B").is_none());
        // Members sit at the group's origin
        assert_eq!(group.get_child("A").unwrap().object().position(), Vec3::ZERO);
    }

    #[test]
    fn test_switch_group_starts_on_button() {
        let mut ctx = context(None);
        ctx.tag = Some(placed_tag(ctx.root_scene()));
        let group = ctx
            .with_switch_group(
                |c| c.to_button(ButtonParameter::default()).map(Observe::boxed),
                |c| c.to_text(TextParameter::default()).map(Observe::boxed),
                None,
            )
            .unwrap();
        assert!(group.is_show(SWITCH_BUTTON));
        assert!(!group.is_show(SWITCH_CONTENTS));
    }
}
