use crate::config::{LayoutConfig, size_milli};
use crate::error::BadgePressError;
use log::{info, warn};
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

/// One sized, weighted font ready for glyph layout. Faces are
/// re-parsed from the shared bytes at draw time; the handle itself is
/// cheap to clone.
#[derive(Debug, Clone)]
pub struct FontHandle {
    pub(crate) data: Arc<Vec<u8>>,
    pub(crate) size: f32,
}

/// Per-request font cache: one regular handle per distinct text
/// element size (hard requirement), one bold handle per size where the
/// bold file was usable, regular substituted otherwise. Both maps are
/// populated before rendering starts and read-only afterwards.
#[derive(Debug)]
pub struct FontLibrary {
    regular: HashMap<i64, FontHandle>,
    bold: HashMap<i64, FontHandle>,
}

impl FontLibrary {
    pub fn load(config: &LayoutConfig) -> Result<Self, BadgePressError> {
        let regular_data = read_face(&config.font_path).map_err(BadgePressError::FontLoad)?;

        let sizes = config.required_sizes_milli();
        let mut regular = HashMap::with_capacity(sizes.len());
        for &milli in &sizes {
            regular.insert(
                milli,
                FontHandle {
                    data: Arc::clone(&regular_data),
                    size: milli as f32 / 1000.0,
                },
            );
        }
        info!(
            "loaded regular font {:?} for {} size(s)",
            config.font_path,
            regular.len()
        );

        let mut bold = HashMap::new();
        if config.needs_bold() {
            match read_face(&config.font_bold_path) {
                Ok(bold_data) => {
                    for &milli in &sizes {
                        bold.insert(
                            milli,
                            FontHandle {
                                data: Arc::clone(&bold_data),
                                size: milli as f32 / 1000.0,
                            },
                        );
                    }
                }
                Err(reason) => {
                    // Bold is best-effort: substitute regular, one
                    // warning per required size.
                    for &milli in &sizes {
                        warn!(
                            "bold font {:?} unavailable for size {}: {}; falling back to regular",
                            config.font_bold_path,
                            milli as f32 / 1000.0,
                            reason
                        );
                        bold.insert(milli, regular[&milli].clone());
                    }
                }
            }
        }

        Ok(Self { regular, bold })
    }

    /// Look up the handle for a text element. Returns `None` only for
    /// sizes that were never declared in the configuration.
    pub fn resolve(&self, size: f32, bold: bool) -> Option<&FontHandle> {
        let key = size_milli(size);
        if bold {
            self.bold.get(&key).or_else(|| self.regular.get(&key))
        } else {
            self.regular.get(&key)
        }
    }
}

fn read_face(path: &std::path::Path) -> Result<Arc<Vec<u8>>, String> {
    let data = fs::read(path).map_err(|err| format!("{}: {err}", path.display()))?;
    if ttf_parser::Face::parse(&data, 0).is_err() {
        return Err(format!("{}: not a parseable font face", path.display()));
    }
    Ok(Arc::new(data))
}
