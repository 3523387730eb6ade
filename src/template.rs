use crate::config::DEFAULT_TEMPLATE_KEY;
use crate::error::BadgePressError;
use base64::Engine;
use log::{info, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tiny_skia::Pixmap;

/// Decode-once cache of badge background templates, keyed by variant
/// name. Every configured entry is opened and decoded during
/// construction; per-record resolution is a plain map lookup.
#[derive(Debug)]
pub struct TemplateRegistry {
    by_variant: HashMap<String, Arc<Pixmap>>,
}

impl TemplateRegistry {
    pub fn load(templates: &BTreeMap<String, String>) -> Result<Self, BadgePressError> {
        let mut by_variant = HashMap::with_capacity(templates.len());
        for (variant, source) in templates {
            let key = variant.to_ascii_lowercase();
            match load_image_pixmap(source) {
                Some(pixmap) => {
                    info!(
                        "loaded template '{}' ({}x{})",
                        key,
                        pixmap.width(),
                        pixmap.height()
                    );
                    by_variant.insert(key, Arc::new(pixmap));
                }
                None if key == DEFAULT_TEMPLATE_KEY => {
                    return Err(BadgePressError::TemplateLoad(format!(
                        "default template '{}' could not be decoded",
                        source
                    )));
                }
                None => {
                    warn!("skipping template '{}': '{}' could not be decoded", key, source);
                }
            }
        }
        if !by_variant.contains_key(DEFAULT_TEMPLATE_KEY) {
            return Err(BadgePressError::TemplateLoad(
                "no 'default' template configured".to_string(),
            ));
        }
        Ok(Self { by_variant })
    }

    /// Template for a record's variant. Unknown or absent variants
    /// fall back to the default silently; records without a variant
    /// are the common case, not a misconfiguration.
    pub fn resolve(&self, variant: Option<&str>) -> &Arc<Pixmap> {
        variant
            .map(|v| v.to_ascii_lowercase())
            .and_then(|key| self.by_variant.get(&key))
            .unwrap_or_else(|| &self.by_variant[DEFAULT_TEMPLATE_KEY])
    }
}

/// Decode an image reference (filesystem path or `data:` URI) into a
/// premultiplied RGBA pixmap suitable for alpha compositing.
pub(crate) fn load_image_pixmap(source: &str) -> Option<Pixmap> {
    if let Some((mime, data)) = parse_data_uri(source) {
        return decode_image_to_pixmap(&data, Some(&mime));
    }
    let bytes = std::fs::read(Path::new(source)).ok()?;
    decode_image_to_pixmap(&bytes, None)
}

pub(crate) fn decode_image_to_pixmap(data: &[u8], mime: Option<&str>) -> Option<Pixmap> {
    let format = if let Some(mime) = mime {
        if mime.contains("png") {
            Some(image::ImageFormat::Png)
        } else if mime.contains("jpeg") || mime.contains("jpg") {
            Some(image::ImageFormat::Jpeg)
        } else {
            None
        }
    } else {
        image::guess_format(data).ok()
    };

    let decoded = if let Some(fmt) = format {
        image::load_from_memory_with_format(data, fmt).ok()?
    } else {
        image::load_from_memory(data).ok()?
    };
    rgba_to_pixmap(&decoded.to_rgba8())
}

pub(crate) fn rgba_to_pixmap(rgba: &image::RgbaImage) -> Option<Pixmap> {
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    let src = rgba.as_raw();
    let dst = pixmap.data_mut();
    for (src_px, dst_px) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let a = src_px[3];
        dst_px[0] = premul_u8(src_px[0], a);
        dst_px[1] = premul_u8(src_px[1], a);
        dst_px[2] = premul_u8(src_px[2], a);
        dst_px[3] = a;
    }
    Some(pixmap)
}

fn premul_u8(value: u8, alpha: u8) -> u8 {
    ((value as u16 * alpha as u16 + 127) / 255) as u8
}

pub(crate) fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    if !uri.starts_with("data:") {
        return None;
    }
    let parts: Vec<&str> = uri.splitn(2, ',').collect();
    if parts.len() != 2 {
        return None;
    }
    let header = parts[0];
    let data_part = parts[1];
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains("base64") {
        base64::engine::general_purpose::STANDARD
            .decode(data_part)
            .ok()?
    } else {
        data_part.as_bytes().to_vec()
    };
    Some((mime, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_data_uri(width: u32, height: u32, rgba: [u8; 4]) -> String {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        )
    }

    fn templates(entries: &[(&str, String)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn missing_default_fails_before_any_rendering() {
        let err = TemplateRegistry::load(&templates(&[(
            "staff",
            png_data_uri(4, 4, [255, 0, 0, 255]),
        )]))
        .expect_err("must fail");
        assert!(matches!(err, BadgePressError::TemplateLoad(_)));
    }

    #[test]
    fn undecodable_default_fails() {
        let err = TemplateRegistry::load(&templates(&[(
            "default",
            "data:image/png;base64,AAAA".to_string(),
        )]))
        .expect_err("must fail");
        assert!(matches!(err, BadgePressError::TemplateLoad(_)));
    }

    #[test]
    fn broken_non_default_variant_is_skipped() {
        let registry = TemplateRegistry::load(&templates(&[
            ("default", png_data_uri(4, 4, [255, 255, 255, 255])),
            ("staff", "/no/such/file.png".to_string()),
        ]))
        .expect("load");
        let staff = registry.resolve(Some("staff"));
        let default = registry.resolve(None);
        assert!(Arc::ptr_eq(staff, default));
    }

    #[test]
    fn variant_lookup_is_case_insensitive_with_silent_fallback() {
        let registry = TemplateRegistry::load(&templates(&[
            ("default", png_data_uri(4, 4, [255, 255, 255, 255])),
            ("family", png_data_uri(8, 8, [0, 255, 0, 255])),
        ]))
        .expect("load");
        assert_eq!(registry.resolve(Some("FAMILY")).width(), 8);
        assert_eq!(registry.resolve(Some("visitor")).width(), 4);
        assert_eq!(registry.resolve(None).width(), 4);
    }

    #[test]
    fn data_uri_and_file_decode_identically() {
        let img = image::RgbaImage::from_pixel(6, 3, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tpl.png");
        std::fs::write(&path, &bytes).expect("write");

        let from_file = load_image_pixmap(path.to_str().expect("utf8 path")).expect("file decode");
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );
        let from_uri = load_image_pixmap(&uri).expect("uri decode");
        assert_eq!(from_file.data(), from_uri.data());
    }
}
