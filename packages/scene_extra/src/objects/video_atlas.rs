//! Flip-book playback of sub-rectangles of one texture.

use serde::{Deserialize, Serialize};

use crate::assets::AssetTicket;
use crate::extra_object::{
    AnimationParameter, ExtraObject, ExtraObjectCore, ExtraObjectParameter, ModelParameterBase,
};
use crate::load_gate::LoadGate;
use crate::scene_graph::ObjectKind;

const TEXTURE_KEY: &str = "texture";

/// UV rectangle of one frame, in texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtlasRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl AtlasRect {
    /// Corner UVs: left-top, left-bottom, right-top, right-bottom.
    pub fn uv_corners(&self) -> [[f32; 2]; 4] {
        [
            [self.x, self.y + self.h],
            [self.x, self.y],
            [self.x + self.w, self.y + self.h],
            [self.x + self.w, self.y],
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAtlasParameter {
    #[serde(flatten)]
    pub base: ModelParameterBase,

    pub image_path: String,

    #[serde(default)]
    pub atlas: Vec<AtlasRect>,

    pub width: f32,
    pub height: f32,

    /// Playback rate. Below 1 the first frame is shown still.
    #[serde(default)]
    pub fps: f32,
}

/// Build a row-major grid of `columns` x `rows` frames covering the texture,
/// starting at the top-left cell.
pub fn grid_atlas(columns: u32, rows: u32) -> Vec<AtlasRect> {
    let (columns, rows) = (columns.max(1), rows.max(1));
    let (w, h) = (1.0 / columns as f32, 1.0 / rows as f32);
    (0..rows)
        .rev()
        .flat_map(|row| {
            (0..columns).map(move |column| AtlasRect {
                x: column as f32 * w,
                y: row as f32 * h,
                w,
                h,
            })
        })
        .collect()
}

pub struct VideoAtlasObject {
    core: ExtraObjectCore,
    parameter: VideoAtlasParameter,
    index: usize,
    elapsed: f32,
    texture: Option<AssetTicket>,
}

impl VideoAtlasObject {
    pub fn new(param: ExtraObjectParameter, parameter: VideoAtlasParameter) -> Self {
        let kind = ObjectKind::Panel {
            width: parameter.width,
            height: parameter.height,
        };
        let mut core = ExtraObjectCore::new(param, kind, &parameter.base);
        core.install_load_gate(LoadGate::new([TEXTURE_KEY]));
        let texture = Some(core.assets().load(&parameter.image_path));

        Self {
            core,
            parameter,
            index: 0,
            elapsed: 0.0,
            texture,
        }
    }

    pub fn atlas_index(&self) -> usize {
        self.index
    }

    pub fn atlas_len(&self) -> usize {
        self.parameter.atlas.len()
    }

    /// Jump to `index`, clamped to the available frames.
    pub fn set_atlas_index(&mut self, index: usize) {
        self.index = index.min(self.atlas_len().saturating_sub(1));
    }

    pub fn current_rect(&self) -> Option<&AtlasRect> {
        self.parameter.atlas.get(self.index)
    }

    fn poll_texture(&mut self) {
        let Some(result) = self.texture.as_mut().and_then(AssetTicket::poll) else {
            return;
        };
        match result {
            Ok(_) => self.core.complete_asset(TEXTURE_KEY),
            Err(e) => self.core.fail_load(e.to_string()),
        }
    }

    fn advance(&mut self, delta: f32) {
        if self.parameter.fps < 1.0 {
            return;
        }
        self.elapsed += delta;
        let threshold = 1.0 / self.parameter.fps;
        if self.elapsed < threshold {
            return;
        }

        let previous = self.index;
        let steps = (self.elapsed / threshold).floor() as usize;
        self.set_atlas_index(previous.saturating_add(steps));
        if previous == self.index {
            // Held on the last frame: restart
            self.set_atlas_index(0);
        }
        self.elapsed = 0.0;
    }
}

impl ExtraObject for VideoAtlasObject {
    fn core(&self) -> &ExtraObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ExtraObjectCore {
        &mut self.core
    }

    fn on_frame(&mut self, parameter: &AnimationParameter) {
        self.poll_texture();
        self.advance(parameter.delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ManualAssetLoader;
    use crate::headless::headless_parameter_with_assets;
    use std::rc::Rc;

    fn atlas(fps: f32) -> (VideoAtlasObject, Rc<ManualAssetLoader>) {
        let assets = Rc::new(ManualAssetLoader::new());
        let parameter = VideoAtlasParameter {
            base: ModelParameterBase::default(),
            image_path: "flames.png".to_string(),
            atlas: grid_atlas(2, 2),
            width: 1.0,
            height: 1.0,
            fps,
        };
        let object = VideoAtlasObject::new(
            headless_parameter_with_assets("Flames", assets.clone()),
            parameter,
        );
        (object, assets)
    }

    #[test]
    fn test_grid_atlas_starts_top_left() {
        let rects = grid_atlas(2, 2);
        assert_eq!(rects.len(), 4);
        assert_eq!(rects[0], AtlasRect { x: 0.0, y: 0.5, w: 0.5, h: 0.5 });
        assert_eq!(rects[3], AtlasRect { x: 0.5, y: 0.0, w: 0.5, h: 0.5 });
    }

    #[test]
    fn test_frames_advance_and_wrap() {
        let (mut video, _) = atlas(10.0);
        video.advance(0.05);
        assert_eq!(video.atlas_index(), 0);
        video.advance(0.05);
        assert_eq!(video.atlas_index(), 1);
        video.advance(0.25);
        assert_eq!(video.atlas_index(), 3);
        video.advance(0.1);
        assert_eq!(video.atlas_index(), 0);
    }

    #[test]
    fn test_huge_fps_clamps_to_last_frame() {
        let (mut video, _) = atlas(10.0);
        video.advance(0.1);
        assert_eq!(video.atlas_index(), 1);

        video.parameter.fps = f32::MAX;
        video.advance(0.1);
        assert_eq!(video.atlas_index(), 3);
    }

    #[test]
    fn test_still_below_one_fps() {
        let (mut video, _) = atlas(0.0);
        video.advance(10.0);
        assert_eq!(video.atlas_index(), 0);
    }

    #[test]
    fn test_texture_failure_fails_load() {
        let (mut video, assets) = atlas(10.0);
        video.awake();
        assert!(assets.fail("flames.png", "404"));
        video.poll_texture();
        assert!(video.load_status().is_failed());
    }
}
