//! Identifier generation and slugs
//!
//! Entry identifiers are ULIDs: 26 Crockford-base32 characters, the first 10
//! encoding wall-clock milliseconds (most-significant first), the remaining 16
//! random. Lexicographic order approximates creation order; monotonicity
//! within a millisecond is not guaranteed.

/// Maximum slug length used for entry file names.
pub const SLUG_MAX: usize = 60;

/// Generate a new entry identifier.
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

/// The lowercased tail of an id used as a file-name suffix.
pub fn id_suffix(id: &str) -> String {
    let tail = if id.len() > 8 { &id[id.len() - 8..] } else { id };
    tail.to_lowercase()
}

/// Build a URL/filesystem-safe slug from free text.
///
/// Lowercases, collapses every run of non-alphanumeric characters into a
/// single `-`, trims leading/trailing `-`, and truncates to `max` characters
/// preferring to cut at a `-` boundary.
pub fn slug_with_max(text: &str, max: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max));
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if out.len() <= max {
        return out;
    }

    // Cut at the last dash inside the window when one exists
    let window = &out[..max];
    match window.rfind('-') {
        Some(pos) if pos > 0 => window[..pos].to_string(),
        _ => window.to_string(),
    }
}

/// [`slug_with_max`] with the default length cap.
pub fn slug(text: &str) -> String {
    slug_with_max(text, SLUG_MAX)
}
