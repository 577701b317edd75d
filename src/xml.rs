use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Jp2Error, Result};

/// An XML element with optional text content and child elements.
///
/// Covers what the metadata box needs: elements, text and nesting.
/// Attributes, comments and processing instructions are skipped when parsing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub text: Option<String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Leaf element holding `text`.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Some(text.into()),
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    /// First direct child named `name`.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Parse a document or fragment with a single root element.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    return Err(Jp2Error::Xml(format!(
                        "parse error at byte {}: {e}",
                        reader.buffer_position()
                    )));
                }
            };
            match event {
                Event::Start(e) => {
                    stack.push(XmlElement::new(String::from_utf8_lossy(e.name().as_ref())));
                }
                Event::Empty(e) => {
                    let element = XmlElement::new(String::from_utf8_lossy(e.name().as_ref()));
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Jp2Error::Xml("unexpected closing tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        let text = t.unescape().map_err(xml_err)?;
                        top.text.get_or_insert_with(String::new).push_str(&text);
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut() {
                        top.text
                            .get_or_insert_with(String::new)
                            .push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(Jp2Error::Xml(format!("unclosed element <{}>", open.name)));
        }
        root.ok_or_else(|| Jp2Error::Xml("document has no root element".into()))
    }

    /// Serialize without an XML declaration.
    pub fn to_xml(&self) -> Result<String> {
        self.serialize(false)
    }

    /// Serialize as a standalone document with an XML declaration.
    pub fn to_document(&self) -> Result<String> {
        self.serialize(true)
    }

    fn serialize(&self, declaration: bool) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        if declaration {
            writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
                .map_err(xml_err)?;
        }
        write_element(&mut writer, self)?;
        String::from_utf8(writer.into_inner()).map_err(xml_err)
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(Jp2Error::Xml("document has more than one root element".into())),
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<()> {
    let name = element.name.as_str();
    if element.text.is_none() && element.children.is_empty() {
        writer
            .write_event(Event::Empty(BytesStart::new(name)))
            .map_err(xml_err)?;
        return Ok(());
    }
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)?;
    // Indentation between child elements is not content
    let text = element
        .text
        .as_deref()
        .filter(|t| element.children.is_empty() || !t.trim().is_empty());
    if let Some(text) = text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_err)?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}

fn xml_err(e: impl std::fmt::Display) -> Jp2Error {
    Jp2Error::Xml(e.to_string())
}

/// Whether `name` can be written as an element name without escaping.
///
/// Deliberately narrower than the XML grammar: ASCII letters or `_` first,
/// then letters, digits, `_`, `-` or `.`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Flatten an element whose children are leaves into `(tag, text)` pairs.
///
/// Missing text becomes an empty string; order follows the document.
pub fn xml_to_dict(fragment: &XmlElement) -> Vec<(String, String)> {
    fragment
        .children
        .iter()
        .map(|child| (child.name.clone(), child.text.clone().unwrap_or_default()))
        .collect()
}
