//! Event-level model of one WordprocessingML part.
//!
//! The part is kept as the flat list of `quick_xml` events it was read from, so
//! everything that is not touched is written back exactly as parsed. On top of
//! the events we index the `w:t` text nodes and the `w:p` paragraphs that own
//! them; both passes edit through that index.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

const W_P: &[u8] = b"w:p";
const W_R: &[u8] = b"w:r";
const W_T: &[u8] = b"w:t";
const W_RPR: &[u8] = b"w:rPr";
const XML_SPACE: &[u8] = b"xml:space";

/// A `w:t` element and its decoded text
#[derive(Debug, Clone)]
pub(crate) struct TextNode {
    /// Index of the `Start`/`Empty` event
    pub start: usize,
    /// Index of the matching `End` event (equal to `start` for `<w:t/>`)
    pub end: usize,
    pub text: String,
    modified: bool,
}

/// A `w:p` element. Only text nodes whose innermost paragraph is this one are
/// listed, so a paragraph hosting a textbox does not absorb the textbox text.
#[derive(Debug, Clone)]
pub(crate) struct Paragraph {
    pub start: usize,
    pub nodes: Vec<usize>,
    /// Event range of the first run's `w:rPr`, if any
    pub run_props: Option<Range<usize>>,
}

pub(crate) struct PartXml<'a> {
    events: Vec<Event<'a>>,
    pub nodes: Vec<TextNode>,
    pub paragraphs: Vec<Paragraph>,
    /// Loose text nodes (outside any paragraph)
    pub orphan_nodes: Vec<usize>,
    insertions: BTreeMap<usize, Vec<u8>>,
}

impl<'a> PartXml<'a> {
    pub fn parse(xml: &'a [u8]) -> Result<Self, String> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(false);

        let mut events = Vec::new();
        let mut nodes: Vec<TextNode> = Vec::new();
        let mut paragraphs: Vec<Paragraph> = Vec::new();
        let mut orphan_nodes = Vec::new();

        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut open_paragraphs: Vec<usize> = Vec::new();
        let mut open_text: Option<usize> = None;
        // (paragraph, start event, stack depth) of a w:rPr being captured
        let mut open_run_props: Option<(usize, usize, usize)> = None;
        let mut saw_element = false;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| format!("at byte {}: {}", reader.buffer_position(), e))?;
            let idx = events.len();

            match &event {
                Event::Start(e) => {
                    saw_element = true;
                    let name = e.name().as_ref().to_vec();
                    if name == W_P {
                        paragraphs.push(Paragraph {
                            start: idx,
                            nodes: Vec::new(),
                            run_props: None,
                        });
                        open_paragraphs.push(paragraphs.len() - 1);
                    } else if name == W_T {
                        let node = nodes.len();
                        nodes.push(TextNode {
                            start: idx,
                            end: idx,
                            text: String::new(),
                            modified: false,
                        });
                        attach_node(node, &open_paragraphs, &mut paragraphs, &mut orphan_nodes);
                        open_text = Some(node);
                    } else if name == W_RPR && open_run_props.is_none() {
                        if let Some(p) = first_run_props_target(&stack, &open_paragraphs, &paragraphs)
                        {
                            open_run_props = Some((p, idx, stack.len()));
                        }
                    }
                    stack.push(name);
                }
                Event::End(e) => {
                    let name = e.name().as_ref().to_vec();
                    if stack.pop().as_deref() != Some(name.as_slice()) {
                        return Err(format!(
                            "unexpected closing tag </{}>",
                            String::from_utf8_lossy(&name)
                        ));
                    }
                    if name == W_P {
                        open_paragraphs.pop();
                    } else if name == W_T {
                        if let Some(node) = open_text.take() {
                            nodes[node].end = idx;
                        }
                    } else if name == W_RPR {
                        if let Some((p, start, depth)) = open_run_props {
                            if depth == stack.len() {
                                paragraphs[p].run_props = Some(start..idx + 1);
                                open_run_props = None;
                            }
                        }
                    }
                }
                Event::Empty(e) => {
                    saw_element = true;
                    let qname = e.name();
                    let name = qname.as_ref();
                    if name == W_T {
                        let node = nodes.len();
                        nodes.push(TextNode {
                            start: idx,
                            end: idx,
                            text: String::new(),
                            modified: false,
                        });
                        attach_node(node, &open_paragraphs, &mut paragraphs, &mut orphan_nodes);
                    } else if name == W_RPR && open_run_props.is_none() {
                        if let Some(p) = first_run_props_target(&stack, &open_paragraphs, &paragraphs)
                        {
                            paragraphs[p].run_props = Some(idx..idx + 1);
                        }
                    }
                }
                Event::Text(t) => {
                    if let Some(node) = open_text {
                        let text = t.unescape().map_err(|e| e.to_string())?;
                        nodes[node].text.push_str(&text);
                    }
                }
                Event::CData(c) => {
                    if let Some(node) = open_text {
                        let text = std::str::from_utf8(c).map_err(|e| e.to_string())?;
                        nodes[node].text.push_str(text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }

            events.push(event);
        }

        if !saw_element {
            return Err("no root element".to_string());
        }
        if let Some(name) = stack.last() {
            return Err(format!(
                "unclosed element <{}>",
                String::from_utf8_lossy(name)
            ));
        }

        Ok(Self {
            events,
            nodes,
            paragraphs,
            orphan_nodes,
            insertions: BTreeMap::new(),
        })
    }

    /// Concatenated text of a paragraph's own nodes
    pub fn paragraph_text(&self, paragraph: usize) -> String {
        self.paragraphs[paragraph]
            .nodes
            .iter()
            .map(|&n| self.nodes[n].text.as_str())
            .collect()
    }

    pub fn set_text(&mut self, node: usize, text: String) {
        let node = &mut self.nodes[node];
        if node.text != text {
            node.text = text;
            node.modified = true;
        }
    }

    pub fn is_modified(&self) -> bool {
        !self.insertions.is_empty() || self.nodes.iter().any(|n| n.modified)
    }

    /// Queue serialized markup to be emitted right before event `at`
    pub fn insert_before(&mut self, at: usize, markup: Vec<u8>) {
        self.insertions.entry(at).or_default().extend(markup);
    }

    /// Serialize a slice of the original events (used to copy run formatting)
    pub fn events_markup(&self, range: Range<usize>) -> Result<Vec<u8>, String> {
        let mut writer = Writer::new(Vec::new());
        for event in &self.events[range] {
            writer
                .write_event(event.clone())
                .map_err(|e| e.to_string())?;
        }
        Ok(writer.into_inner())
    }

    pub fn write(&self) -> Result<Vec<u8>, String> {
        let rewritten: HashMap<usize, usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.modified)
            .map(|(i, node)| (node.start, i))
            .collect();

        let mut writer = Writer::new(Vec::with_capacity(self.events.len() * 16));
        let mut i = 0;
        while i < self.events.len() {
            if let Some(markup) = self.insertions.get(&i) {
                writer.get_mut().extend_from_slice(markup);
            }
            if let Some(&node) = rewritten.get(&i) {
                let node = &self.nodes[node];
                write_text_node(&mut writer, &self.events[node.start], &node.text)?;
                i = node.end + 1;
                continue;
            }
            writer
                .write_event(self.events[i].clone())
                .map_err(|e| e.to_string())?;
            i += 1;
        }

        Ok(writer.into_inner())
    }
}

fn attach_node(
    node: usize,
    open_paragraphs: &[usize],
    paragraphs: &mut [Paragraph],
    orphan_nodes: &mut Vec<usize>,
) {
    match open_paragraphs.last() {
        Some(&p) => paragraphs[p].nodes.push(node),
        None => orphan_nodes.push(node),
    }
}

/// The paragraph whose first run owns a `w:rPr` opening at the current depth.
///
/// Matches `w:p > w:r > w:rPr` only, and only until the paragraph has one.
fn first_run_props_target(
    stack: &[Vec<u8>],
    open_paragraphs: &[usize],
    paragraphs: &[Paragraph],
) -> Option<usize> {
    let p = *open_paragraphs.last()?;
    let n = stack.len();
    if n < 2 || stack[n - 1] != W_R || stack[n - 2] != W_P {
        return None;
    }
    if paragraphs[p].run_props.is_some() {
        return None;
    }
    Some(p)
}

/// Write `<w:t xml:space="preserve">text</w:t>` keeping the original attributes
fn write_text_node(
    writer: &mut Writer<Vec<u8>>,
    original: &Event<'_>,
    text: &str,
) -> Result<(), String> {
    let source = match original {
        Event::Start(e) | Event::Empty(e) => e,
        _ => return Err("text node does not start with an element".to_string()),
    };

    let name = String::from_utf8_lossy(source.name().as_ref()).into_owned();
    let mut start = BytesStart::new(name.clone());
    for attr in source.attributes().with_checks(false) {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.as_ref() == XML_SPACE {
            continue;
        }
        start.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    start.push_attribute(("xml:space", "preserve"));

    writer
        .write_event(Event::Start(start))
        .map_err(|e| e.to_string())?;
    if !text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(|e| e.to_string())?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| e.to_string())?;
    Ok(())
}
