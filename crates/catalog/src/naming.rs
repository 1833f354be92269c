//! Tool names for endpoint descriptors (`list_items`, `get_item`, ...)

use std::sync::LazyLock;

use regex::Regex;

use crate::template::PLACEHOLDER;

/// Protocol boilerplate segments that never name a resource.
const GENERIC_SEGMENTS: &[&str] = &["api", "rest", "rpc", "services", "public", "internal"];

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^v\d+(?:\.\d+)*$").expect("VERSION_RE should compile"));

fn is_generic(segment: &str) -> bool {
    GENERIC_SEGMENTS
        .iter()
        .any(|g| g.eq_ignore_ascii_case(segment))
        || VERSION_RE.is_match(segment)
}

/// Verb for a method. GET is `list` unless the template ends in a placeholder.
fn verb(method: &str, template: &str) -> String {
    match method.to_ascii_uppercase().as_str() {
        "GET" => {
            let last = template.trim_end_matches('/').rsplit('/').next().unwrap_or("");
            let verb = if last == PLACEHOLDER { "get" } else { "list" };
            verb.to_string()
        }
        "POST" => "create".to_string(),
        "PUT" | "PATCH" => "update".to_string(),
        "DELETE" => "delete".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

/// `camelCase`, `kebab-case` and dotted segments to `snake_case`.
pub fn snake_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() + 4);
    let mut prev_lower_or_digit = false;
    for ch in segment.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower_or_digit = false;
        } else if ch.is_ascii_alphanumeric() {
            out.push(ch);
            prev_lower_or_digit = true;
        } else {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower_or_digit = false;
        }
    }
    out.trim_matches('_').to_string()
}

/// English plural to singular for the common suffixes. Unknown forms are
/// returned unchanged.
pub fn singularize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if lower.ends_with("ies") && word.len() > 3 {
        return format!("{}y", &word[..word.len() - 3]);
    }
    for suffix in ["sses", "shes", "ches", "xes", "zzes"] {
        if lower.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if lower.ends_with('s') && !lower.ends_with("ss") && !lower.ends_with("us") && word.len() > 1 {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Tool name for a (method, template) pair.
pub fn tool_name(method: &str, template: &str) -> String {
    let verb = verb(method, template);
    let noun = template
        .split('/')
        .filter(|s| !s.is_empty() && *s != PLACEHOLDER && !is_generic(s))
        .map(snake_case)
        .filter(|s| !s.is_empty())
        .last();

    let noun = match noun {
        None => "root".to_string(),
        Some(n) if verb == "list" => n,
        Some(n) => singularize(&n),
    };
    format!("{verb}_{noun}")
}
