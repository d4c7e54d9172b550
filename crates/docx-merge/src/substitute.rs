//! Pass 1: scalar substitution over `w:t` text nodes
//!
//! Tokens are located over the concatenated text of each paragraph so that a
//! placeholder Word split across several runs is still found. The replacement
//! goes into the node where the token starts; the rest of the token is removed
//! from the nodes it spans. The number of nodes never changes.

use crate::placeholder::{find_placeholders, sole_placeholder};
use crate::value::{ReplacementValue, Replacements};
use crate::xml::PartXml;

/// Outcome of pass 1 over one part
#[derive(Debug, Default)]
pub(crate) struct Substitution {
    pub replaced: usize,
    /// Paragraphs whose template text is exactly one list-bound placeholder,
    /// with that placeholder's name. Left untouched for pass 2.
    pub list_paragraphs: Vec<(usize, String)>,
}

pub(crate) fn substitute_part(
    part: &mut PartXml<'_>,
    replacements: &Replacements,
    list_separator: &str,
) -> Substitution {
    let mut result = Substitution::default();

    for p in 0..part.paragraphs.len() {
        let group = part.paragraphs[p].nodes.clone();
        if let Some(name) = sole_list_placeholder(part, &group, replacements) {
            result.list_paragraphs.push((p, name));
            continue;
        }
        result.replaced += substitute_group(part, &group, replacements, list_separator);
    }
    for n in part.orphan_nodes.clone() {
        result.replaced += substitute_group(part, &[n], replacements, list_separator);
    }

    result
}

fn sole_list_placeholder(
    part: &PartXml<'_>,
    group: &[usize],
    replacements: &Replacements,
) -> Option<String> {
    let full: String = group.iter().map(|&n| part.nodes[n].text.as_str()).collect();
    let name = sole_placeholder(&full)?;
    match replacements.get(&name) {
        Some(ReplacementValue::List(_)) => Some(name),
        _ => None,
    }
}

/// Rewrite the text nodes of one paragraph; returns the number of tokens handled
fn substitute_group(
    part: &mut PartXml<'_>,
    group: &[usize],
    replacements: &Replacements,
    list_separator: &str,
) -> usize {
    if group.is_empty() {
        return 0;
    }

    let texts: Vec<&str> = group.iter().map(|&n| part.nodes[n].text.as_str()).collect();
    let full: String = texts.concat();
    let tokens = find_placeholders(&full);
    if tokens.is_empty() {
        return 0;
    }

    let mut bounds = Vec::with_capacity(texts.len());
    let mut offset = 0;
    for text in &texts {
        bounds.push(offset..offset + text.len());
        offset += text.len();
    }

    let mut rewritten = vec![String::new(); texts.len()];
    let mut cursor = 0;
    for token in &tokens {
        copy_range(&full, &bounds, cursor..token.span.start, &mut rewritten);

        let value = replacements
            .get(&token.name)
            .map(|v| v.as_inline(list_separator))
            .unwrap_or_default();
        if let Some(owner) = bounds.iter().position(|b| b.contains(&token.span.start)) {
            rewritten[owner].push_str(&value);
        }
        cursor = token.span.end;
    }
    copy_range(&full, &bounds, cursor..full.len(), &mut rewritten);

    let handled = tokens.len();
    for (&node, text) in group.iter().zip(rewritten) {
        part.set_text(node, text);
    }
    handled
}

/// Append `full[range]` to the nodes it overlaps
fn copy_range(
    full: &str,
    bounds: &[std::ops::Range<usize>],
    range: std::ops::Range<usize>,
    rewritten: &mut [String],
) {
    if range.start >= range.end {
        return;
    }
    for (i, bound) in bounds.iter().enumerate() {
        let start = bound.start.max(range.start);
        let end = bound.end.min(range.end);
        if start < end {
            rewritten[i].push_str(&full[start..end]);
        }
    }
}
