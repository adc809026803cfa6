// src/template/xml.rs
//! Minimal owned element tree over `quick_xml` events.
//!
//! Parts are parsed once per template and cloned per merge. Everything that is
//! not an element or text is kept verbatim, so a part round-trips unchanged
//! apart from the edits made to it.

use anyhow::Result;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(BytesText<'static>),
    Other(Event<'static>),
}

#[derive(Debug, Clone)]
pub struct Element {
    pub start: BytesStart<'static>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone)]
pub struct XmlDocument {
    pub nodes: Vec<Node>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            start: BytesStart::new(name.to_string()),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.start.push_attribute((key, value));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children
            .push(Node::Text(BytesText::new(text).into_owned()));
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.start.name().as_ref() == name.as_bytes()
    }

    /// Unescaped value of attribute `key`, if present and well-formed.
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.start
            .attributes()
            .flatten()
            .find(|a| a.key.as_ref() == key.as_bytes())
            .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn first_child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.is(name))
    }

    /// Concatenated, unescaped text of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => t.unescape().ok().map(|s| s.into_owned()),
                _ => None,
            })
            .collect()
    }
}

impl XmlDocument {
    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, quick_xml::Error> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();

        let mut top: Vec<Node> = Vec::new();
        let mut stack: Vec<Element> = Vec::new();

        loop {
            let event = reader.read_event_into(&mut buf)?.into_owned();
            buf.clear();
            let node = match event {
                Event::Start(start) => {
                    stack.push(Element {
                        start,
                        children: Vec::new(),
                    });
                    continue;
                }
                // quick_xml rejects unmatched end tags before they get here
                Event::End(_) => match stack.pop() {
                    Some(el) => Node::Element(el),
                    None => continue,
                },
                Event::Empty(start) => Node::Element(Element {
                    start,
                    children: Vec::new(),
                }),
                Event::Text(t) => Node::Text(t),
                Event::Eof => break,
                other => Node::Other(other),
            };
            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => top.push(node),
            }
        }

        // unclosed elements at EOF
        if let Some(open) = stack.pop() {
            let name = String::from_utf8_lossy(open.start.name().as_ref()).into_owned();
            return Err(quick_xml::Error::IllFormed(
                quick_xml::errors::IllFormedError::MissingEndTag(name),
            ));
        }

        Ok(Self { nodes: top })
    }

    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn root_mut(&mut self) -> Option<&mut Element> {
        self.nodes.iter_mut().find_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        for node in &self.nodes {
            write_node(&mut writer, node)?;
        }
        Ok(writer.into_inner())
    }
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<()> {
    match node {
        Node::Element(el) if el.children.is_empty() => {
            writer.write_event(Event::Empty(el.start.borrow()))?;
        }
        Node::Element(el) => {
            writer.write_event(Event::Start(el.start.borrow()))?;
            for child in &el.children {
                write_node(writer, child)?;
            }
            writer.write_event(Event::End(el.start.to_end()))?;
        }
        Node::Text(t) => writer.write_event(Event::Text(t.clone()))?,
        Node::Other(ev) => writer.write_event(ev.clone())?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_structure_and_text() {
        let src = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t xml:space="preserve">a &amp; b </w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#;
        let doc = XmlDocument::parse(src.as_bytes()).unwrap();
        let out = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn reads_attributes_and_text() {
        let doc = XmlDocument::parse(br#"<a k="x &lt; y"><b>one</b><b>two</b></a>"#).unwrap();
        let root = doc.root().unwrap();
        assert!(root.is("a"));
        assert_eq!(root.attribute("k").as_deref(), Some("x < y"));
        assert_eq!(root.attribute("missing"), None);
        assert_eq!(root.child_elements().count(), 2);
        assert_eq!(root.first_child("b").unwrap().text(), "one");
    }

    #[test]
    fn builds_escaped_elements() {
        let el = Element::new("w:t")
            .with_attribute("xml:space", "preserve")
            .with_text("<Tom & Jerry>");
        let doc = XmlDocument {
            nodes: vec![Node::Element(el)],
        };
        let out = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert_eq!(
            out,
            r#"<w:t xml:space="preserve">&lt;Tom &amp; Jerry&gt;</w:t>"#
        );
    }

    #[test]
    fn rejects_malformed_xml() {
        assert!(XmlDocument::parse(b"<a><b></a>").is_err());
        assert!(XmlDocument::parse(b"<a><b>").is_err());
    }
}
