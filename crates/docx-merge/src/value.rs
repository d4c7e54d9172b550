//! Replacement values bound to placeholder names

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value substituted for a placeholder.
///
/// Deserializes untagged: a JSON string becomes `Scalar`, an array of strings
/// becomes `List` (rendered as bullet paragraphs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplacementValue {
    Scalar(String),
    List(Vec<String>),
}

impl ReplacementValue {
    /// Render as a single run of text (lists are joined with `separator`)
    pub fn as_inline(&self, separator: &str) -> String {
        match self {
            ReplacementValue::Scalar(value) => value.clone(),
            ReplacementValue::List(items) => items.join(separator),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ReplacementValue::List(_))
    }

    fn sanitized(self) -> Self {
        match self {
            ReplacementValue::Scalar(value) => ReplacementValue::Scalar(sanitize_text(&value)),
            ReplacementValue::List(items) => {
                ReplacementValue::List(items.iter().map(|item| sanitize_text(item)).collect())
            }
        }
    }
}

impl From<&str> for ReplacementValue {
    fn from(value: &str) -> Self {
        ReplacementValue::Scalar(value.to_string())
    }
}

impl From<String> for ReplacementValue {
    fn from(value: String) -> Self {
        ReplacementValue::Scalar(value)
    }
}

impl From<Vec<String>> for ReplacementValue {
    fn from(items: Vec<String>) -> Self {
        ReplacementValue::List(items)
    }
}

impl From<Vec<&str>> for ReplacementValue {
    fn from(items: Vec<&str>) -> Self {
        ReplacementValue::List(items.into_iter().map(str::to_string).collect())
    }
}

/// Placeholder name → value map for one merge request.
///
/// Keys and values are normalized on insertion, so every value that reaches the
/// XML layer is already sanitized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, ReplacementValue>", into = "BTreeMap<String, ReplacementValue>")]
pub struct Replacements {
    values: BTreeMap<String, ReplacementValue>,
}

impl Replacements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<ReplacementValue>) -> &mut Self {
        let name = normalize_name(name);
        if !name.is_empty() {
            self.values.insert(name, value.into().sanitized());
        }
        self
    }

    pub fn insert_scalar(&mut self, name: &str, value: &str) -> &mut Self {
        self.insert(name, ReplacementValue::Scalar(value.to_string()))
    }

    pub fn insert_list<I, S>(&mut self, name: &str, items: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = items.into_iter().map(Into::into).collect();
        self.insert(name, ReplacementValue::List(items))
    }

    pub fn get(&self, name: &str) -> Option<&ReplacementValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether any placeholder is bound to a list (pass 2 is skipped otherwise)
    pub fn has_lists(&self) -> bool {
        self.values.values().any(ReplacementValue::is_list)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReplacementValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<BTreeMap<String, ReplacementValue>> for Replacements {
    fn from(map: BTreeMap<String, ReplacementValue>) -> Self {
        map.into_iter().collect()
    }
}

impl From<Replacements> for BTreeMap<String, ReplacementValue> {
    fn from(replacements: Replacements) -> Self {
        replacements.values
    }
}

impl<K: AsRef<str>> FromIterator<(K, ReplacementValue)> for Replacements {
    fn from_iter<T: IntoIterator<Item = (K, ReplacementValue)>>(iter: T) -> Self {
        let mut replacements = Replacements::new();
        for (name, value) in iter {
            replacements.insert(name.as_ref(), value);
        }
        replacements
    }
}

/// Accept `Name`, ` Name ` and `{{Name}}` as the same key
fn normalize_name(name: &str) -> String {
    let name = name.trim();
    let name = name
        .strip_prefix("{{")
        .and_then(|n| n.strip_suffix("}}"))
        .unwrap_or(name);
    name.trim().to_string()
}

/// Strip control characters that are illegal in WordprocessingML text.
///
/// Tabs and newlines survive; `\r\n` and lone `\r` collapse to `\n`.
pub fn sanitize_text(value: &str) -> String {
    let normalized = value.replace("\r\n", "\n").replace('\r', "\n");
    normalized
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_text("Jane\u{0}Roe\u{7}"), "JaneRoe");
        assert_eq!(sanitize_text("line1\r\nline2\rline3"), "line1\nline2\nline3");
        assert_eq!(sanitize_text("tab\there"), "tab\there");
    }

    #[test]
    fn test_sanitize_keeps_markup_literal() {
        // Escaping happens once, in the XML writer
        assert_eq!(sanitize_text("Smith & Sons <LLC>"), "Smith & Sons <LLC>");
    }

    #[test]
    fn test_keys_are_normalized() {
        let mut replacements = Replacements::new();
        replacements.insert_scalar(" {{ClientName}} ", "Jane Roe");
        replacements.insert_scalar("   ", "ignored");

        assert_eq!(replacements.len(), 1);
        assert_eq!(
            replacements.get("ClientName"),
            Some(&ReplacementValue::Scalar("Jane Roe".to_string()))
        );
    }

    #[test]
    fn test_deserialize_mixed_values() {
        let json = r#"{"ClientName":"Jane Roe","Requests":["Item A","Item B\u0000"]}"#;
        let replacements: Replacements = serde_json::from_str(json).unwrap();

        assert!(replacements.has_lists());
        assert_eq!(
            replacements.get("Requests"),
            Some(&ReplacementValue::List(vec![
                "Item A".to_string(),
                "Item B".to_string()
            ]))
        );
    }

    #[test]
    fn test_inline_list_rendering() {
        let value = ReplacementValue::from(vec!["a", "b", "c"]);
        assert_eq!(value.as_inline(", "), "a, b, c");
        assert_eq!(ReplacementValue::from("x").as_inline(", "), "x");
    }
}
