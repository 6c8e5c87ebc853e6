//! MSDF font assets used by text-bearing widgets.

use serde::{Deserialize, Serialize};

pub const DEFAULT_FONT_JSON: &str =
    "https://raw.githubusercontent.com/felixmariotto/three-mesh-ui/master/examples/assets/Roboto-msdf.json";

pub const DEFAULT_FONT_TEXTURE: &str =
    "https://raw.githubusercontent.com/felixmariotto/three-mesh-ui/master/examples/assets/Roboto-msdf.png";

fn default_font_json() -> String {
    DEFAULT_FONT_JSON.to_string()
}

fn default_font_texture() -> String {
    DEFAULT_FONT_TEXTURE.to_string()
}

/// Glyph metrics and atlas texture locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontData {
    #[serde(default = "default_font_json")]
    pub json_url: String,
    #[serde(default = "default_font_texture")]
    pub image_url: String,
}

impl Default for FontData {
    fn default() -> Self {
        Self {
            json_url: default_font_json(),
            image_url: default_font_texture(),
        }
    }
}

impl FontData {
    /// Route both URLs through `rewrite`, e.g. the development relay.
    pub fn map_urls(&self, mut rewrite: impl FnMut(&str) -> String) -> Self {
        Self {
            json_url: rewrite(&self.json_url),
            image_url: rewrite(&self.image_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_font_uses_defaults() {
        let font: FontData = serde_json::from_str(r#"{"jsonUrl": "/fonts/a.json"}"#).unwrap();
        assert_eq!(font.json_url, "/fonts/a.json");
        assert_eq!(font.image_url, DEFAULT_FONT_TEXTURE);
    }

    #[test]
    fn test_map_urls() {
        let font = FontData::default().map_urls(|url| format!("relay:{}", url.len()));
        assert!(font.json_url.starts_with("relay:"));
    }
}
