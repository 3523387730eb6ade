mod blob;
mod config;
mod error;
mod font;
mod layout;
mod pdf;
mod photo;
mod template;
mod text;
mod types;

pub use blob::{BlobError, BlobStore, DEFAULT_FETCH_TIMEOUT, HttpBlobStore, MemoryBlobStore};
pub use config::{
    DEFAULT_TEMPLATE_KEY, LayoutConfig, Orientation, PageFormat, PageLayout, PhotoBox, Record,
    TextElement, WrapSpec,
};
pub use error::BadgePressError;
pub use font::{FontHandle, FontLibrary};
pub use layout::{Placement, capacity, place};
pub use template::TemplateRegistry;
pub use types::{Color, Pt, Size};

use log::{info, warn};
use pdf::PdfAssembler;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tiny_skia::Pixmap;

/// Cooperative cancellation for one render request, checked between
/// records. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One badge render request: owns the per-request font and template
/// caches, composes one tile per record on the rayon pool, and
/// assembles the placed tiles into a single PDF.
///
/// Construction resolves fonts and templates eagerly; an unusable
/// default template or regular font fails here, before any record is
/// touched. After construction both caches are read-only, so record
/// composition needs no locking.
pub struct BadgePress {
    config: LayoutConfig,
    fonts: FontLibrary,
    templates: TemplateRegistry,
    blob: Arc<dyn BlobStore>,
    cancel: CancelToken,
}

impl std::fmt::Debug for BadgePress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BadgePress").finish_non_exhaustive()
    }
}

impl BadgePress {
    pub fn new(config: LayoutConfig, blob: Arc<dyn BlobStore>) -> Result<Self, BadgePressError> {
        let fonts = FontLibrary::load(&config)?;
        let templates = TemplateRegistry::load(&config.templates)?;
        Ok(Self {
            config,
            fonts,
            templates,
            blob,
            cancel: CancelToken::new(),
        })
    }

    /// Token shared with callers that may need to abort the run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Render every record into one multi-page PDF. Records that fail
    /// individually are logged and omitted; the grid is filled by the
    /// badges that did render, in input order.
    pub fn render(&self, records: &[Record]) -> Result<Vec<u8>, BadgePressError> {
        let tiles: Vec<Option<Pixmap>> = records
            .par_iter()
            .map(|record| {
                if self.cancel.is_cancelled() {
                    return None;
                }
                self.compose_tile(record)
            })
            .collect();

        if self.cancel.is_cancelled() {
            return Err(BadgePressError::Cancelled);
        }

        let (per_row, per_col) = layout::capacity(&self.config.page);
        let mut assembler = PdfAssembler::new(&self.config.page);
        let mut rendered = 0usize;
        for tile in tiles.into_iter().flatten() {
            assembler.append(&tile, layout::place(rendered, per_row, per_col));
            rendered += 1;
        }
        let bytes = assembler.finish()?;
        info!(
            "rendered {} of {} badge(s) ({}x{} per page)",
            rendered,
            records.len(),
            per_row,
            per_col
        );
        Ok(bytes)
    }

    fn compose_tile(&self, record: &Record) -> Option<Pixmap> {
        let variant = record
            .get(&self.config.variant_field)
            .map(String::as_str)
            .filter(|value| !value.is_empty());
        let template = self.templates.resolve(variant);
        let mut tile = Pixmap::clone(template);

        for photo_box in &self.config.photos {
            if let Some(required) = &photo_box.variant {
                if !variant.is_some_and(|v| v.eq_ignore_ascii_case(required)) {
                    continue;
                }
            }
            if let Some(photo) = photo::fetch_photo(
                self.blob.as_ref(),
                &self.config.photo_bucket,
                record,
                photo_box,
            ) {
                photo::paste_photo(&mut tile, &photo, photo_box);
            }
        }

        for (field, spec) in &self.config.text_elements {
            let Some(value) = record.get(field) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            let Some(font) = self.fonts.resolve(spec.size, spec.bold) else {
                warn!(
                    "no font handle for size {} (bold={}) on field '{}'",
                    spec.size, spec.bold, field
                );
                continue;
            };
            // Badge house style: all printed text is upper-cased.
            let value = value.to_uppercase();
            if let Err(reason) = text::draw_field(&mut tile, font, spec, &value) {
                warn!(
                    "skipped field '{}' for record {}: {}",
                    field,
                    record_label(record),
                    reason
                );
            }
        }

        Some(tile)
    }
}

/// Best identifying field for log lines, mirroring the id conventions
/// of the surrounding application.
fn record_label(record: &Record) -> String {
    record
        .get("badge_id")
        .or_else(|| record.get("token_id"))
        .cloned()
        .unwrap_or_else(|| "N/A".to_string())
}
