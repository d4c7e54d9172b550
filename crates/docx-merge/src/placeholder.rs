//! `{{Name}}` token scanning

use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;

lazy_static! {
    /// Mail-merge token, whitespace allowed inside the braces
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").unwrap();
}

/// One placeholder occurrence inside a text string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    /// Byte span of the whole token, braces included
    pub span: Range<usize>,
}

/// Find every placeholder token in `text`, in order
pub fn find_placeholders(text: &str) -> Vec<Placeholder> {
    PLACEHOLDER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            Some(Placeholder {
                name: name.as_str().to_string(),
                span: whole.range(),
            })
        })
        .collect()
}

/// Name of the placeholder if the trimmed text is exactly one token
pub fn sole_placeholder(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let caps = PLACEHOLDER.captures(trimmed)?;
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == trimmed.len() {
        caps.get(1).map(|name| name.as_str().to_string())
    } else {
        None
    }
}

/// Cheap pre-check used to skip parts without any token
pub fn contains_placeholder(text: &str) -> bool {
    PLACEHOLDER.is_match(text)
}
