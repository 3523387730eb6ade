use crate::error::BadgePressError;
use crate::types::{Color, Size};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One badge/token to render: a flat field → value map. Field order
/// never influences rendering (fields are read by key; draw order
/// follows the `text_elements` table), so a sorted map keeps the
/// output deterministic.
pub type Record = BTreeMap<String, String>;

/// Word-wrap settings for one text element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapSpec {
    /// Maximum line length in characters (greedy wrap, no hyphenation).
    pub width: usize,
    /// Extra vertical pixels between lines.
    #[serde(default = "default_line_spacing")]
    pub spacing: i32,
    /// Draw a padded rectangular outline around the wrapped block.
    #[serde(default)]
    pub boxed: bool,
}

fn default_line_spacing() -> i32 {
    4
}

/// Placement and styling for one record field drawn onto the template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextElement {
    /// Pixel coordinates of the text anchor (top-left) on the template.
    pub x: i32,
    pub y: i32,
    /// Font size in template pixels.
    pub size: f32,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub color: Color,
    #[serde(default)]
    pub wrap: Option<WrapSpec>,
}

/// One photo paste box. `key_field` names the record field holding the
/// blob-store key; `variant` (if set) restricts the box to records of
/// that template variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub key_field: String,
    #[serde(default)]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PageFormat {
    A4,
    Custom { width_mm: f32, height_mm: f32 },
}

/// Physical page grid, all lengths in millimeters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub orientation: Orientation,
    pub format: PageFormat,
    pub badge_width_mm: f32,
    pub badge_height_mm: f32,
    pub margin_mm: f32,
    #[serde(default)]
    pub gap_mm: f32,
}

impl PageLayout {
    /// Page size in portrait-or-landscape millimeters.
    pub fn page_mm(&self) -> (f32, f32) {
        let (w, h) = match self.format {
            PageFormat::A4 => (210.0, 297.0),
            PageFormat::Custom {
                width_mm,
                height_mm,
            } => (width_mm, height_mm),
        };
        match self.orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }

    pub fn page_size_pt(&self) -> Size {
        let (w, h) = self.page_mm();
        Size::from_mm(w, h)
    }
}

/// Complete per-request layout description. Constructed by the caller
/// (or parsed from JSON) and handed to [`crate::BadgePress::new`];
/// never cached across requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Variant name → template image reference (filesystem path or
    /// `data:` URI). The `"default"` entry is mandatory.
    pub templates: BTreeMap<String, String>,
    /// Record field → drawing spec.
    pub text_elements: BTreeMap<String, TextElement>,
    #[serde(default)]
    pub photos: Vec<PhotoBox>,
    pub page: PageLayout,
    pub font_path: PathBuf,
    pub font_bold_path: PathBuf,
    /// Blob-store bucket holding record photos.
    #[serde(default)]
    pub photo_bucket: String,
    /// Record field selecting the template variant.
    #[serde(default = "default_variant_field")]
    pub variant_field: String,
}

fn default_variant_field() -> String {
    "attendant_type".to_string()
}

pub const DEFAULT_TEMPLATE_KEY: &str = "default";

impl LayoutConfig {
    pub fn from_json_str(json: &str) -> Result<Self, BadgePressError> {
        serde_json::from_str(json)
            .map_err(|err| BadgePressError::InvalidConfiguration(format!("bad layout json: {err}")))
    }

    /// Distinct font sizes required by the text elements, keyed in
    /// milli-pixels for exact hashing.
    pub(crate) fn required_sizes_milli(&self) -> Vec<i64> {
        let mut sizes: Vec<i64> = self
            .text_elements
            .values()
            .map(|el| size_milli(el.size))
            .collect();
        sizes.sort_unstable();
        sizes.dedup();
        sizes
    }

    pub(crate) fn needs_bold(&self) -> bool {
        self.text_elements.values().any(|el| el.bold)
    }
}

pub(crate) fn size_milli(size: f32) -> i64 {
    (size as f64 * 1000.0).round() as i64
}
