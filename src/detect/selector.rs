use std::cmp::Reverse;

use crate::config::{DEFAULT_CONTENT_TYPE, MEDIA_EXTENSIONS, PREFERRED_EXTENSIONS};
use crate::source::traits::FileEntry;

/// Whether the file name ends with one of the playable media suffixes.
pub fn is_media_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    MEDIA_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn is_preferred(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Pick the primary playable file and return its index into `files`.
///
/// mp4/mkv outrank every other media suffix, then larger files win. Equal keys
/// keep list order, so the result is deterministic for identical input.
pub fn select_media_file(files: &[FileEntry]) -> Option<usize> {
    files
        .iter()
        .enumerate()
        .filter(|(_, f)| is_media_file(&f.name))
        // min_by_key keeps the first of equal elements.
        .min_by_key(|(_, f)| (!is_preferred(&f.name), Reverse(f.size)))
        .map(|(index, _)| index)
}

/// MIME type for a file name, falling back to `video/mp4`.
pub fn content_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}
