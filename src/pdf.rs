use crate::config::PageLayout;
use crate::error::BadgePressError;
use crate::layout::Placement;
use crate::types::{Pt, Size};
use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream, dictionary};
use std::io::Write;
use tiny_skia::Pixmap;

/// Accumulates rendered tiles into a multi-page PDF. Pages are created
/// on demand from each placement's page index; geometry is converted
/// from the layout's millimeters to PDF points once at construction.
/// `finish` consumes the assembler, so a document can only be
/// serialized once.
pub(crate) struct PdfAssembler {
    doc: LoDocument,
    pages_id: LoObjectId,
    page_size: Size,
    badge_w: Pt,
    badge_h: Pt,
    margin: Pt,
    gap: Pt,
    pages: Vec<PageAccum>,
    image_count: usize,
}

#[derive(Default)]
struct PageAccum {
    content: String,
    xobjects: Vec<(String, LoObjectId)>,
}

impl PdfAssembler {
    pub(crate) fn new(page: &PageLayout) -> Self {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            page_size: page.page_size_pt(),
            badge_w: Pt::from_mm(page.badge_width_mm),
            badge_h: Pt::from_mm(page.badge_height_mm),
            margin: Pt::from_mm(page.margin_mm),
            gap: Pt::from_mm(page.gap_mm),
            pages: Vec::new(),
            image_count: 0,
        }
    }

    /// Embed one tile as an image XObject and place it at its grid
    /// slot on the placement's page.
    pub(crate) fn append(&mut self, tile: &Pixmap, placement: Placement) {
        while self.pages.len() <= placement.page {
            self.pages.push(PageAccum::default());
        }

        let (rgb, alpha) = split_tile_channels(tile);
        let smask_id = alpha.map(|mask| {
            self.doc.add_object(image_smask_stream(
                tile.width(),
                tile.height(),
                &mask,
            ))
        });
        let image_id = self
            .doc
            .add_object(image_stream(tile.width(), tile.height(), &rgb, smask_id));

        self.image_count += 1;
        let name = format!("Im{}", self.image_count);

        let x = self.margin + (self.badge_w + self.gap) * placement.col as i32;
        let y_top = self.margin + (self.badge_h + self.gap) * placement.row as i32;
        // PDF user space has a bottom-left origin; the grid is laid
        // out from the top.
        let y = self.page_size.height - y_top - self.badge_h;

        let page = &mut self.pages[placement.page];
        page.content.push_str(&format!(
            "q {} 0 0 {} {} {} cm /{} Do Q\n",
            fmt_pt(self.badge_w),
            fmt_pt(self.badge_h),
            fmt_pt(x),
            fmt_pt(y),
            name
        ));
        page.xobjects.push((name, image_id));
    }

    /// Serialize the accumulated document to an in-memory buffer. An
    /// empty render still produces a single blank page.
    pub(crate) fn finish(mut self) -> Result<Vec<u8>, BadgePressError> {
        if self.pages.is_empty() {
            self.pages.push(PageAccum::default());
        }

        let width = self.page_size.width.to_f32();
        let height = self.page_size.height.to_f32();
        let mut kids: Vec<LoObject> = Vec::with_capacity(self.pages.len());
        let count = self.pages.len();
        for accum in std::mem::take(&mut self.pages) {
            let content_id = self
                .doc
                .add_object(LoStream::new(dictionary! {}, accum.content.into_bytes()));
            let mut xobjects = lopdf::Dictionary::new();
            for (name, id) in accum.xobjects {
                xobjects.set(name.into_bytes(), LoObject::Reference(id));
            }
            let page_id = self.doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => self.pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "XObject" => LoObject::Dictionary(xobjects),
                },
                "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            });
            kids.push(page_id.into());
        }

        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
        };
        self.doc
            .objects
            .insert(self.pages_id, LoObject::Dictionary(pages_dict));
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|err| BadgePressError::Pdf(err.to_string()))?;
        Ok(buffer)
    }
}

/// Demultiply the tile into an RGB stream plus a DeviceGray soft mask
/// when any pixel is non-opaque.
fn split_tile_channels(tile: &Pixmap) -> (Vec<u8>, Option<Vec<u8>>) {
    let pixel_count = (tile.width() * tile.height()) as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);
    let mut alpha = Vec::with_capacity(pixel_count);
    let mut has_alpha = false;
    for premultiplied in tile.pixels() {
        let px = premultiplied.demultiply();
        if px.alpha() != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[px.red(), px.green(), px.blue()]);
        alpha.push(px.alpha());
    }
    (rgb, has_alpha.then_some(alpha))
}

fn image_stream(width: u32, height: u32, rgb: &[u8], smask_id: Option<LoObjectId>) -> LoStream {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    if let Some(id) = smask_id {
        dict.set("SMask", LoObject::Reference(id));
    }
    LoStream::new(dict, flate_compress(rgb))
}

fn image_smask_stream(width: u32, height: u32, alpha: &[u8]) -> LoStream {
    LoStream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        flate_compress(alpha),
    )
}

fn flate_compress(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

fn fmt_pt(value: Pt) -> String {
    // Millipoint precision, fixed width, locale-independent.
    let milli = value.to_milli_i64();
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    format!("{}{}.{:03}", sign, abs / 1000, abs % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Orientation, PageFormat};

    fn layout() -> PageLayout {
        PageLayout {
            orientation: Orientation::Landscape,
            format: PageFormat::A4,
            badge_width_mm: 90.0,
            badge_height_mm: 140.0,
            margin_mm: 10.0,
            gap_mm: 0.0,
        }
    }

    fn opaque_tile() -> Pixmap {
        let mut tile = Pixmap::new(8, 8).expect("tile");
        tile.fill(tiny_skia::Color::from_rgba8(200, 10, 10, 255));
        tile
    }

    #[test]
    fn fmt_pt_is_locale_independent_millipoints() {
        assert_eq!(fmt_pt(Pt::from_f32(12.5)), "12.500");
        assert_eq!(fmt_pt(Pt::from_f32(-0.25)), "-0.250");
        assert_eq!(fmt_pt(Pt::ZERO), "0.000");
    }

    #[test]
    fn opaque_tile_has_no_soft_mask() {
        let (rgb, alpha) = split_tile_channels(&opaque_tile());
        assert_eq!(rgb.len(), 8 * 8 * 3);
        assert!(alpha.is_none());
    }

    #[test]
    fn transparent_pixels_produce_soft_mask() {
        let tile = Pixmap::new(4, 4).expect("tile");
        let (_, alpha) = split_tile_channels(&tile);
        assert_eq!(alpha.expect("mask").len(), 16);
    }

    #[test]
    fn finish_emits_parseable_pdf_with_expected_pages() {
        let mut assembler = PdfAssembler::new(&layout());
        assembler.append(&opaque_tile(), Placement { page: 0, col: 0, row: 0 });
        assembler.append(&opaque_tile(), Placement { page: 0, col: 1, row: 0 });
        assembler.append(&opaque_tile(), Placement { page: 1, col: 0, row: 0 });
        let bytes = assembler.finish().expect("finish");
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = LoDocument::load_mem(&bytes).expect("reload");
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn empty_render_still_yields_one_page() {
        let bytes = PdfAssembler::new(&layout()).finish().expect("finish");
        let doc = LoDocument::load_mem(&bytes).expect("reload");
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn identical_appends_yield_identical_bytes() {
        let build = || {
            let mut assembler = PdfAssembler::new(&layout());
            assembler.append(&opaque_tile(), Placement { page: 0, col: 0, row: 0 });
            assembler.finish().expect("finish")
        };
        assert_eq!(build(), build());
    }
}
