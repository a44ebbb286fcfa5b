//! Minimal owned XML element tree
//!
//! The document merger needs random access into parsed documents (descendant
//! lookup, item extraction, re-assembly into a fresh root), so streaming
//! events are collected into a small owned tree. Parsing and serialization
//! go through quick-xml.

use std::fmt;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

/// Standard declaration prepended to every emitted document
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Malformed(String),

    #[error("document has no root element")]
    NoRoot,
}

/// A child of an element: either a nested element or a run of text
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Build an element with a single text child
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut element = Element::new(name);
        element.children.push(Node::Text(text.into()));
        element
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Direct child elements, in document order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Direct child elements with the given tag name (case-insensitive)
    pub fn children_named<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a Element> + use<'a, 'n> {
        self.elements()
            .filter(move |e| e.name.eq_ignore_ascii_case(name))
    }

    /// First direct child element with the given tag name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children_named(name).next()
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        let index = self.children.iter().position(
            |node| matches!(node, Node::Element(e) if e.name.eq_ignore_ascii_case(name)),
        )?;
        match self.children.get_mut(index) {
            Some(Node::Element(e)) => Some(e),
            _ => None,
        }
    }

    /// First descendant element with the given tag name (depth-first,
    /// excluding `self`)
    pub fn find(&self, name: &str) -> Option<&Element> {
        for child in self.elements() {
            if child.name.eq_ignore_ascii_case(name) {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Mutable variant of [`find`](Self::find); locates the element by index
    /// path first so only one mutable borrow is ever live
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Element> {
        let mut path = Vec::new();
        if !self.locate(name, &mut path) {
            return None;
        }
        let mut current = self;
        for index in path {
            match current.children.get_mut(index) {
                Some(Node::Element(e)) => current = e,
                _ => return None,
            }
        }
        Some(current)
    }

    fn locate(&self, name: &str, path: &mut Vec<usize>) -> bool {
        for (index, node) in self.children.iter().enumerate() {
            if let Node::Element(e) = node {
                path.push(index);
                if e.name.eq_ignore_ascii_case(name) {
                    return true;
                }
                if e.locate(name, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    /// Concatenated direct text content, trimmed
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(t) = node {
                out.push_str(t);
            }
        }
        out.trim().to_string()
    }

    /// Text content of the first direct child with the given name
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(Element::text)
    }

    /// Parse a document into its root element
    pub fn parse(bytes: &[u8]) -> Result<Element, XmlError> {
        let text = String::from_utf8_lossy(bytes);
        let mut reader = Reader::from_str(&text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event().map_err(emap)? {
                Event::Start(start) => {
                    stack.push(element_from_start(&start)?);
                }
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::Malformed("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(t) => {
                    let value = t.unescape().map_err(emap)?;
                    if !value.is_empty() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(Node::Text(value.into_owned()));
                        }
                    }
                }
                Event::CData(c) => {
                    if let Some(parent) = stack.last_mut() {
                        let value = String::from_utf8_lossy(&c.into_inner()).into_owned();
                        parent.children.push(Node::Text(value));
                    }
                }
                Event::Eof => break,
                // declarations, comments, processing instructions
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::Malformed("unclosed element".to_string()));
        }
        root.ok_or(XmlError::NoRoot)
    }

    /// Serialize with the standard declaration and two-space indentation
    pub fn to_bytes(&self) -> Result<Vec<u8>, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(emap)?;
        write_element(&mut writer, self)?;
        let mut out = writer.into_inner();
        out.push(b'\n');
        Ok(out)
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => {
            if root.is_some() {
                return Err(XmlError::Malformed("multiple root elements".to_string()));
            }
            *root = Some(element);
        }
    }
    Ok(())
}

fn element_from_start(start: &BytesStart) -> Result<Element, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(emap)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(emap)?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), XmlError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(emap)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(emap)?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(t) => writer
                .write_event(Event::Text(BytesText::new(t)))
                .map_err(emap)?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(emap)?;
    Ok(())
}

fn emap<E: fmt::Display>(e: E) -> XmlError {
    XmlError::Malformed(e.to_string())
}

/// Prepend the standard declaration to a document that lacks one
pub fn ensure_declaration(bytes: Vec<u8>) -> Vec<u8> {
    let has_declaration = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|i| bytes[i..].starts_with(b"<?xml"))
        .unwrap_or(false);

    if has_declaration {
        bytes
    } else {
        let mut out = Vec::with_capacity(bytes.len() + XML_DECLARATION.len() + 1);
        out.extend_from_slice(XML_DECLARATION.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(&bytes);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_document() {
        let doc = b"<root><child attr=\"v\">text</child><empty /></root>";
        let root = Element::parse(doc).unwrap();

        assert_eq!(root.name, "root");
        assert_eq!(root.elements().count(), 2);

        let child = root.child("child").unwrap();
        assert_eq!(child.text(), "text");
        assert_eq!(child.attr("attr"), Some("v"));

        assert!(root.child("empty").unwrap().children.is_empty());
    }

    #[test]
    fn test_parse_skips_declaration_and_comments() {
        let doc = b"<?xml version=\"1.0\"?><!-- note --><root><a/></root>";
        let root = Element::parse(doc).unwrap();
        assert_eq!(root.name, "root");
        assert!(root.child("a").is_some());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Element::parse(b"not xml at all").is_err());
        assert!(Element::parse(b"<root><open></root>").is_err());
        assert!(Element::parse(b"").is_err());
    }

    #[test]
    fn test_find_nested_descendant() {
        let doc = b"<root><outer><inner><Target>x</Target></inner></outer></root>";
        let root = Element::parse(doc).unwrap();

        let target = root.find("Target").unwrap();
        assert_eq!(target.text(), "x");

        // direct children are found before deeper matches
        assert!(root.find("outer").is_some());
        assert!(root.find("missing").is_none());
    }

    #[test]
    fn test_find_mut_allows_appending() {
        let doc = b"<root><container><Item>a</Item></container></root>";
        let mut root = Element::parse(doc).unwrap();

        let container = root.find_mut("container").unwrap();
        container.push(Element::with_text("Item", "b"));

        assert_eq!(root.find("container").unwrap().elements().count(), 2);
    }

    #[test]
    fn test_serialize_round_trip() {
        let doc = b"<root><child attr=\"v\">text</child><flag value=\"true\"/></root>";
        let root = Element::parse(doc).unwrap();

        let bytes = root.to_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with(XML_DECLARATION));

        let reparsed = Element::parse(&bytes).unwrap();
        assert_eq!(reparsed, root);
    }

    #[test]
    fn test_serialize_escapes_text() {
        let root = Element::with_text("root", "a < b & c");
        let bytes = root.to_bytes().unwrap();
        let reparsed = Element::parse(&bytes).unwrap();
        assert_eq!(reparsed.text(), "a < b & c");
    }

    #[test]
    fn test_ensure_declaration() {
        let with = ensure_declaration(b"<?xml version=\"1.0\"?><r/>".to_vec());
        assert!(with.starts_with(b"<?xml version=\"1.0\"?>"));

        let without = ensure_declaration(b"<r/>".to_vec());
        assert!(without.starts_with(XML_DECLARATION.as_bytes()));

        let empty = ensure_declaration(Vec::new());
        assert!(empty.starts_with(XML_DECLARATION.as_bytes()));
    }

    #[test]
    fn test_child_text_and_value_attr() {
        let doc = b"<Item><modelName>adder</modelName><order value=\"20\"/></Item>";
        let item = Element::parse(doc).unwrap();

        assert_eq!(item.child_text("modelName").as_deref(), Some("adder"));
        assert_eq!(item.child("order").unwrap().attr("value"), Some("20"));
        assert_eq!(item.child_text("missing"), None);
    }
}
