//! Path templating: collapse identifier-like segments to `{id}`

use std::sync::LazyLock;

use regex::Regex;

pub const PLACEHOLDER: &str = "{id}";

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("UUID_RE should compile")
});

static HEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{8,}$").expect("HEX_RE should compile"));

static OPAQUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{16,}$").expect("OPAQUE_RE should compile"));

/// Whether a single path segment looks like an identifier rather than a
/// resource name.
pub fn is_dynamic_segment(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    let has_digit = segment.bytes().any(|b| b.is_ascii_digit());
    let has_alpha = segment.bytes().any(|b| b.is_ascii_alphabetic());

    segment.bytes().all(|b| b.is_ascii_digit())
        || UUID_RE.is_match(segment)
        || (HEX_RE.is_match(segment) && has_digit)
        || (OPAQUE_RE.is_match(segment) && has_digit && has_alpha)
}

/// Template for a raw path. Separators (including a trailing slash) are kept.
pub fn path_template(path: &str) -> String {
    path.split('/')
        .map(|seg| if is_dynamic_segment(seg) { PLACEHOLDER } else { seg })
        .collect::<Vec<_>>()
        .join("/")
}
