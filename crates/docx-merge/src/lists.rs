//! Pass 2: expand list-valued placeholders into bullet paragraphs
//!
//! Works on the same part model as pass 1, over the paragraphs pass 1 found to
//! hold exactly one list-bound placeholder in the template text. Each gets one
//! new bulleted paragraph per item inserted before it, and its own text is
//! cleared. Text produced by substitution is never scanned here.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::value::{ReplacementValue, Replacements};
use crate::xml::PartXml;

/// Expand the given `(paragraph, placeholder)` pairs; returns how many were expanded
pub(crate) fn expand_lists(
    part: &mut PartXml<'_>,
    list_paragraphs: &[(usize, String)],
    replacements: &Replacements,
    bullet_style: &str,
) -> Result<usize, String> {
    let mut expanded = 0;

    for (p, name) in list_paragraphs {
        let Some(ReplacementValue::List(items)) = replacements.get(name) else {
            continue;
        };

        let run_props = match part.paragraphs[*p].run_props.clone() {
            Some(range) => part.events_markup(range)?,
            None => Vec::new(),
        };

        let mut markup = Vec::new();
        for item in items {
            markup.extend(bullet_paragraph(item, bullet_style, &run_props)?);
        }
        let at = part.paragraphs[*p].start;
        part.insert_before(at, markup);

        let nodes = part.paragraphs[*p].nodes.clone();
        for node in nodes {
            part.set_text(node, String::new());
        }
        expanded += 1;
    }

    Ok(expanded)
}

/// `<w:p><w:pPr><w:pStyle w:val=".."/></w:pPr><w:r>rPr<w:t>item</w:t></w:r></w:p>`
fn bullet_paragraph(item: &str, style: &str, run_props: &[u8]) -> Result<Vec<u8>, String> {
    let mut writer = Writer::new(Vec::new());

    emit(&mut writer, Event::Start(BytesStart::new("w:p")))?;
    emit(&mut writer, Event::Start(BytesStart::new("w:pPr")))?;
    let mut style_el = BytesStart::new("w:pStyle");
    style_el.push_attribute(("w:val", style));
    emit(&mut writer, Event::Empty(style_el))?;
    emit(&mut writer, Event::End(BytesEnd::new("w:pPr")))?;
    emit(&mut writer, Event::Start(BytesStart::new("w:r")))?;
    writer.get_mut().extend_from_slice(run_props);

    let mut text_el = BytesStart::new("w:t");
    text_el.push_attribute(("xml:space", "preserve"));
    emit(&mut writer, Event::Start(text_el))?;
    if !item.is_empty() {
        emit(&mut writer, Event::Text(BytesText::new(item)))?;
    }
    emit(&mut writer, Event::End(BytesEnd::new("w:t")))?;
    emit(&mut writer, Event::End(BytesEnd::new("w:r")))?;
    emit(&mut writer, Event::End(BytesEnd::new("w:p")))?;

    Ok(writer.into_inner())
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), String> {
    writer.write_event(event).map_err(|e| e.to_string())
}
