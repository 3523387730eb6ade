use crate::config::TextElement;
use crate::font::FontHandle;
use crate::types::Color;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use tiny_skia::{
    FillRule, Paint, Path, PathBuilder, Pixmap, Rect as SkRect, Stroke, Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

/// Outline padding around boxed multi-line blocks, in template pixels.
const BOX_PADDING: f32 = 10.0;

/// Draw one configured field onto the tile. The value arrives already
/// upper-cased by the engine. Returns a reason string on failure so
/// the caller can log it with record context; a failed field never
/// aborts the rest of the badge.
pub(crate) fn draw_field(
    tile: &mut Pixmap,
    font: &FontHandle,
    spec: &TextElement,
    value: &str,
) -> Result<(), String> {
    let face =
        ttf_parser::Face::parse(&font.data, 0).map_err(|_| "font parse failed".to_string())?;
    let units_per_em = face.units_per_em().max(1) as f32;
    let scale = font.size / units_per_em;
    let ascent = face.ascender() as f32 * scale;

    let lines: Vec<String> = match &spec.wrap {
        Some(wrap) => wrap_text(value, wrap.width),
        None => vec![value.to_string()],
    };
    if lines.is_empty() {
        return Ok(());
    }

    let spacing = spec.wrap.as_ref().map(|w| w.spacing).unwrap_or(0) as f32;
    let line_advance = font.size + spacing;
    let x = spec.x as f32;
    let top = spec.y as f32;

    let mut drawn = 0usize;
    let mut max_width = 0.0f32;
    for (line_index, line) in lines.iter().enumerate() {
        let baseline_y = top + line_index as f32 * line_advance + ascent;
        let (placements, advance) = layout_line(&font.data, line, font.size, x, baseline_y);
        max_width = max_width.max(advance);
        for placement in placements {
            let mut builder =
                GlyphPathBuilder::new(placement.origin_x, placement.origin_y, placement.scale);
            if face
                .outline_glyph(GlyphId(placement.glyph_id), &mut builder)
                .is_none()
            {
                continue;
            }
            let Some(path) = builder.finish() else {
                continue;
            };
            tile.fill_path(
                &path,
                &fill_paint(spec.color),
                FillRule::Winding,
                Transform::identity(),
                None,
            );
            drawn += 1;
        }
    }

    if drawn == 0 && value.chars().any(|ch| !ch.is_whitespace()) {
        return Err("no drawable glyphs".to_string());
    }

    if spec.wrap.as_ref().is_some_and(|w| w.boxed) {
        let block_height = lines.len() as f32 * font.size + (lines.len() - 1) as f32 * spacing;
        draw_outline_box(tile, spec.color, x, top, max_width, block_height);
    }

    Ok(())
}

/// Greedy word wrap to a maximum line length in characters. Words
/// longer than the limit stay unbroken on their own line; no
/// hyphenation.
pub(crate) fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;
    for word in text.split_whitespace() {
        let word_chars = word.chars().count();
        if current.is_empty() {
            current.push_str(word);
            current_chars = word_chars;
        } else if current_chars + 1 + word_chars <= width {
            current.push(' ');
            current.push_str(word);
            current_chars += 1 + word_chars;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_chars = word_chars;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[derive(Clone, Copy)]
struct GlyphPlacement {
    glyph_id: u16,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

/// Shape one line with rustybuzz and place its glyphs along the
/// baseline. Returns the placements plus the total advance, which is
/// the measured line width used for boxed outlines. Falls back to
/// unshaped cmap lookup when shaping fails.
fn layout_line(
    font_data: &[u8],
    text: &str,
    font_size: f32,
    baseline_x: f32,
    baseline_y: f32,
) -> (Vec<GlyphPlacement>, f32) {
    let Some(face) = HbFace::from_slice(font_data, 0) else {
        return layout_line_unshaped(font_data, text, font_size, baseline_x, baseline_y);
    };
    let units_per_em = face.units_per_em().max(1) as f32;
    let scale = font_size / units_per_em;
    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let infos = output.glyph_infos();
    let positions = output.glyph_positions();
    if infos.is_empty() || infos.len() != positions.len() {
        return layout_line_unshaped(font_data, text, font_size, baseline_x, baseline_y);
    }

    let mut out = Vec::with_capacity(infos.len());
    let mut pen_x = 0.0f32;
    for (info, pos) in infos.iter().zip(positions.iter()) {
        let gid = info.glyph_id as u16;
        if gid == 0 {
            pen_x += (pos.x_advance as f32 / units_per_em) * font_size;
            continue;
        }
        let x_off = (pos.x_offset as f32 / units_per_em) * font_size;
        let y_off = (pos.y_offset as f32 / units_per_em) * font_size;
        out.push(GlyphPlacement {
            glyph_id: gid,
            origin_x: baseline_x + pen_x + x_off,
            origin_y: baseline_y - y_off,
            scale,
        });
        pen_x += (pos.x_advance as f32 / units_per_em) * font_size;
    }
    (out, pen_x)
}

fn layout_line_unshaped(
    font_data: &[u8],
    text: &str,
    font_size: f32,
    baseline_x: f32,
    baseline_y: f32,
) -> (Vec<GlyphPlacement>, f32) {
    let Ok(face) = ttf_parser::Face::parse(font_data, 0) else {
        return (Vec::new(), 0.0);
    };
    let units_per_em = face.units_per_em().max(1) as f32;
    let scale = font_size / units_per_em;

    let mut out = Vec::new();
    let mut pen_x = 0.0f32;
    for ch in text.chars() {
        let gid = face.glyph_index(ch).map(|id| id.0).unwrap_or(0);
        if gid == 0 {
            pen_x += font_size * 0.5;
            continue;
        }
        out.push(GlyphPlacement {
            glyph_id: gid,
            origin_x: baseline_x + pen_x,
            origin_y: baseline_y,
            scale,
        });
        let advance_units = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0) as f32;
        let mut adv = (advance_units / units_per_em) * font_size;
        if adv <= 0.0 {
            adv = font_size * 0.5;
        }
        pen_x += adv;
    }
    (out, pen_x)
}

fn detect_direction(text: &str) -> HbDirection {
    for ch in text.chars() {
        let code = ch as u32;
        let rtl = matches!(
            code,
            0x0590..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF | 0x1EE00..=0x1EEFF
        );
        if rtl {
            return HbDirection::RightToLeft;
        }
    }
    HbDirection::LeftToRight
}

fn draw_outline_box(tile: &mut Pixmap, color: Color, x: f32, top: f32, width: f32, height: f32) {
    let Some(rect) = SkRect::from_xywh(
        x - BOX_PADDING,
        top - BOX_PADDING,
        width + 2.0 * BOX_PADDING,
        height + 2.0 * BOX_PADDING,
    ) else {
        return;
    };
    let path = PathBuilder::from_rect(rect);
    let stroke = Stroke {
        width: 1.0,
        ..Stroke::default()
    };
    tile.stroke_path(
        &path,
        &fill_paint(color),
        &stroke,
        Transform::identity(),
        None,
    );
}

fn fill_paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, 255);
    paint.anti_alias = true;
    paint
}

/// Glyph outlines arrive in font units with y pointing up; the tile is
/// a y-down pixel surface, so outline points are flipped around the
/// baseline while scaling.
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quad_to(
            self.origin_x + x1 * self.scale,
            self.origin_y - y1 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(
            self.origin_x + x1 * self.scale,
            self.origin_y - y1 * self.scale,
            self.origin_x + x2 * self.scale,
            self.origin_y - y2 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WrapSpec;
    use std::sync::Arc;

    fn test_font(size: f32) -> FontHandle {
        let data = std::fs::read("tests/fonts/DejaVuSans.ttf").expect("test font");
        FontHandle {
            data: Arc::new(data),
            size,
        }
    }

    fn element(wrap: Option<WrapSpec>) -> TextElement {
        TextElement {
            x: 10,
            y: 10,
            size: 24.0,
            bold: false,
            color: Color::BLACK,
            wrap,
        }
    }

    #[test]
    fn greedy_wrap_respects_width() {
        // 45 characters, width 20 -> exactly 3 lines, none over 20.
        let value = "12 GANDHI MARG NEW DELHI DELHI 110001 INDIA 9";
        assert_eq!(value.chars().count(), 45);
        let lines = wrap_text(value, 20);
        assert_eq!(lines.len(), 3);
        for line in &lines {
            assert!(line.chars().count() <= 20, "line too long: {line}");
        }
    }

    #[test]
    fn overlong_word_stays_on_its_own_line() {
        let lines = wrap_text("SUPERCALIFRAGILISTICEXPIALIDOCIOUS RD", 20);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "SUPERCALIFRAGILISTICEXPIALIDOCIOUS");
        assert_eq!(lines[1], "RD");
    }

    #[test]
    fn wrap_collapses_runs_of_whitespace() {
        let lines = wrap_text("A  B\tC", 10);
        assert_eq!(lines, vec!["A B C".to_string()]);
    }

    #[test]
    fn single_line_draw_marks_pixels() {
        let mut tile = Pixmap::new(400, 80).expect("tile");
        tile.fill(tiny_skia::Color::WHITE);
        draw_field(&mut tile, &test_font(40.0), &element(None), "BADGE").expect("draw");
        let dark = tile
            .pixels()
            .iter()
            .filter(|px| px.red() < 128 && px.alpha() == 255)
            .count();
        assert!(dark > 0, "expected ink on the tile");
    }

    #[test]
    fn wrapped_draw_extends_further_down_than_single_line() {
        let spec_wrapped = element(Some(WrapSpec {
            width: 8,
            spacing: 6,
            boxed: false,
        }));
        let mut wrapped = Pixmap::new(300, 300).expect("tile");
        wrapped.fill(tiny_skia::Color::WHITE);
        draw_field(&mut wrapped, &test_font(24.0), &spec_wrapped, "FIRST SECOND THIRD")
            .expect("draw");

        let lowest_ink = |pixmap: &Pixmap| {
            let mut lowest = 0u32;
            for y in 0..pixmap.height() {
                for x in 0..pixmap.width() {
                    let px = pixmap.pixel(x, y).expect("pixel");
                    if px.red() < 128 {
                        lowest = y;
                    }
                }
            }
            lowest
        };

        let mut single = Pixmap::new(300, 300).expect("tile");
        single.fill(tiny_skia::Color::WHITE);
        draw_field(&mut single, &test_font(24.0), &element(None), "FIRST SECOND THIRD")
            .expect("draw");

        assert!(lowest_ink(&wrapped) > lowest_ink(&single));
    }

    #[test]
    fn whitespace_only_value_is_not_an_error() {
        let mut tile = Pixmap::new(100, 50).expect("tile");
        draw_field(&mut tile, &test_font(24.0), &element(None), "   ").expect("draw");
    }

    #[test]
    fn garbage_font_data_reports_failure() {
        let mut tile = Pixmap::new(100, 50).expect("tile");
        let bad = FontHandle {
            data: Arc::new(vec![0u8; 16]),
            size: 24.0,
        };
        assert!(draw_field(&mut tile, &bad, &element(None), "X").is_err());
    }
}
