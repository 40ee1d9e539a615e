// Magnet URI inspection.

const BTIH_MARKER: &str = "xt=urn:btih:";

/// Whether the string looks like a magnet URI at all.
pub fn is_magnet_uri(uri: &str) -> bool {
    uri.starts_with("magnet:")
}

/// Extract the info-hash from the `xt=urn:btih:` parameter, lowercased.
///
/// Accepts 40 hex digits, or 32 when fewer than 40 follow the marker.
pub fn extract_info_hash(uri: &str) -> Option<String> {
    let lower = uri.to_ascii_lowercase();
    let start = lower.find(BTIH_MARKER)? + BTIH_MARKER.len();
    let hex_len = lower[start..]
        .bytes()
        .take_while(u8::is_ascii_hexdigit)
        .count();

    let take = if hex_len >= 40 {
        40
    } else if hex_len >= 32 {
        32
    } else {
        return None;
    };
    Some(lower[start..start + take].to_string())
}

/// Canonical form of an info-hash used as the registry key.
pub fn canonical_info_hash(info_hash: &str) -> String {
    info_hash.trim().to_ascii_lowercase()
}
