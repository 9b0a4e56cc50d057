use std::path::Path;

use crate::common::{SOURCE_IMAGE_EXTENSIONS, TARGET_EXTENSION};

pub trait PathExt {
    fn ext_lower(&self) -> String;
    fn is_source_image(&self) -> bool;
    fn is_target_image(&self) -> bool;
}

impl PathExt for Path {
    fn ext_lower(&self) -> String {
        self.extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn is_source_image(&self) -> bool {
        SOURCE_IMAGE_EXTENSIONS.contains(&self.ext_lower().as_str())
    }

    fn is_target_image(&self) -> bool {
        self.ext_lower() == TARGET_EXTENSION
    }
}

/// Reduce a client-supplied filename to its last path segment.
///
/// Browsers on Windows may send `C:\photos\a.png`, so both separators count.
/// Returns `None` when nothing usable is left.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    match name {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}
