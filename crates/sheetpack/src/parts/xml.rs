//! Owned XML tree shared by the part codecs.
//!
//! Parts that only need light-touch access (styles, theme, drawings) keep their whole document
//! as an [`XmlElement`]; the structured models keep the elements they do not interpret as
//! [`XmlNode`] lists so a decode/encode cycle preserves them.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

pub const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

pub const SPREADSHEETML_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub const OFFICE_REL_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("document has no root element")]
    MissingRoot,
    #[error("unexpected root element <{found}> (expected <{expected}>)")]
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },
    #[error("missing required attribute {attr} on <{element}>")]
    MissingAttr {
        element: &'static str,
        attr: &'static str,
    },
    #[error("invalid value {value:?} for {attr}")]
    InvalidValue { attr: &'static str, value: String },
    #[error("invalid part: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlNode {
    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut XmlElement> {
        match self {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        }
    }

    pub(crate) fn write_xml(&self, out: &mut String) {
        match self {
            XmlNode::Element(el) => el.write_xml(out),
            XmlNode::Text(text) => out.push_str(&escape_text(text)),
        }
    }
}

/// An element with its attributes in document order.
///
/// Names are kept qualified (`x:row`); lookups by name compare local names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    /// Attribute value by exact (qualified) name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let idx = self.attrs.iter().position(|(k, _)| k == name)?;
        Some(self.attrs.remove(idx).1)
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(XmlNode::as_element_mut)
    }

    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |el| el.local_name() == local)
    }

    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.local_name() == local)
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|el| el.local_name() == local)
    }

    pub fn descendants_named<'a>(&'a self, local: &'a str) -> Vec<&'a XmlElement> {
        let mut out = Vec::new();
        let mut stack: Vec<&XmlElement> = self.elements().collect();
        stack.reverse();
        while let Some(el) = stack.pop() {
            if el.local_name() == local {
                out.push(el);
            }
            let mut kids: Vec<&XmlElement> = el.elements().collect();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Concatenated text of this element and all of its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    pub fn has_element_children(&self) -> bool {
        self.children
            .iter()
            .any(|child| matches!(child, XmlNode::Element(_)))
    }

    /// Parse a complete XML document and return its root element.
    pub fn parse(bytes: &[u8]) -> Result<XmlElement, XmlError> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);

        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => stack.push(element_from_start(&e)?),
                Event::Empty(e) => {
                    let el = element_from_start(&e)?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::End(e) => {
                    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
                    let mut el = stack
                        .pop()
                        .ok_or_else(|| XmlError::Invalid(format!("unbalanced </{name}>")))?;
                    if el.name != name {
                        return Err(XmlError::Invalid(format!(
                            "mismatched </{name}> for <{}>",
                            el.name
                        )));
                    }
                    if el.has_element_children() {
                        el.children.retain(|child| match child {
                            XmlNode::Text(text) => !text.trim().is_empty(),
                            XmlNode::Element(_) => true,
                        });
                    }
                    attach(&mut stack, &mut root, el)?;
                }
                Event::Text(e) => {
                    let text = e.unescape()?;
                    push_text(&mut stack, &text);
                }
                Event::CData(e) => {
                    let text = std::str::from_utf8(e.as_ref())?;
                    push_text(&mut stack, text);
                }
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::Invalid(format!("unclosed <{}>", open.name)));
        }
        root.ok_or(XmlError::MissingRoot)
    }

    pub(crate) fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        write_attrs(out, &self.attrs);
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write_xml(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    /// Serialize as a standalone document with the standard declaration.
    pub fn to_document_bytes(&self) -> Vec<u8> {
        let mut out = String::from(XML_HEADER);
        out.push('\n');
        self.write_xml(&mut out);
        out.into_bytes()
    }
}

fn collect_text(el: &XmlElement, out: &mut String) {
    for child in &el.children {
        match child {
            XmlNode::Text(text) => out.push_str(text),
            XmlNode::Element(inner) => collect_text(inner, out),
        }
    }
}

fn element_from_start(e: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }
    Ok(XmlElement {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    el: XmlElement,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlNode::Element(el));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(el);
            Ok(())
        }
        None => Err(XmlError::Invalid(format!(
            "second root element <{}>",
            el.name
        ))),
    }
}

fn push_text(stack: &mut [XmlElement], text: &str) {
    if text.is_empty() {
        return;
    }
    // Text outside the root (whitespace between prolog and root) is dropped.
    let Some(parent) = stack.last_mut() else {
        return;
    };
    match parent.children.last_mut() {
        Some(XmlNode::Text(existing)) => existing.push_str(text),
        _ => parent.children.push(XmlNode::Text(text.to_string())),
    }
}

pub(crate) fn write_attrs(out: &mut String, attrs: &[(String, String)]) {
    for (key, value) in attrs {
        write_attr(out, key, value);
    }
}

pub(crate) fn write_attr(out: &mut String, key: &str, value: &str) {
    out.push(' ');
    out.push_str(key);
    out.push_str("=\"");
    out.push_str(&escape_attr(value));
    out.push('"');
}

/// `x:row` -> `row`.
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

pub(crate) fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub(crate) fn escape_attr(s: &str) -> String {
    escape_text(s)
        .replace('\"', "&quot;")
        .replace('\'', "&apos;")
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
        .replace('\t', "&#9;")
}

pub(crate) fn needs_space_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace)
}

/// Check the root element's local name.
pub(crate) fn expect_root(root: &XmlElement, expected: &'static str) -> Result<(), XmlError> {
    if root.local_name() == expected {
        Ok(())
    } else {
        Err(XmlError::UnexpectedRoot {
            expected,
            found: root.name.clone(),
        })
    }
}

pub(crate) fn required_attr<'a>(
    el: &'a XmlElement,
    element: &'static str,
    attr: &'static str,
) -> Result<&'a str, XmlError> {
    el.attr(attr).ok_or(XmlError::MissingAttr { element, attr })
}

pub(crate) fn parse_u32_attr(attr: &'static str, value: &str) -> Result<u32, XmlError> {
    value.trim().parse().map_err(|_| XmlError::InvalidValue {
        attr,
        value: value.to_string(),
    })
}

pub(crate) fn write_nodes(out: &mut String, nodes: &[XmlNode]) {
    for node in nodes {
        node.write_xml(out);
    }
}
