use std::collections::HashMap;

use super::xml::{
    expect_root, needs_space_preserve, write_attrs, write_nodes, XmlElement, XmlError, XmlNode,
    SPREADSHEETML_NS, XML_HEADER,
};
use super::{PartCodec, PartKind};

/// `xl/sharedStrings.xml`.
///
/// Each `<si>` is kept as an element so rich-text runs survive a save; [`SharedStrings::text`]
/// flattens them. The root keeps its own name and attributes, so a table written with a namespace
/// prefix (`<x:sst>`) comes back out the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedStrings {
    root_name: String,
    root_attrs: Vec<(String, String)>,
    /// Namespace prefix of the root, `x:` or empty; new items are written with it.
    prefix: String,
    items: Vec<XmlElement>,
    /// Children other than `<si>` (`extLst`), written after the items.
    trailing: Vec<XmlNode>,
    /// Plain text -> index of its first plain item.
    plain: HashMap<String, u32>,
}

impl Default for SharedStrings {
    fn default() -> Self {
        Self {
            root_name: "sst".to_string(),
            root_attrs: vec![("xmlns".to_string(), SPREADSHEETML_NS.to_string())],
            prefix: String::new(),
            items: Vec::new(),
            trailing: Vec::new(),
            plain: HashMap::new(),
        }
    }
}

impl SharedStrings {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Plain text of item `index` (runs concatenated, phonetic runs skipped).
    pub fn text(&self, index: u32) -> Option<String> {
        let si = self.items.get(index as usize)?;
        let mut out = String::new();
        for el in si.elements() {
            match el.local_name() {
                "t" => out.push_str(&el.text_content()),
                "r" => {
                    if let Some(t) = el.child("t") {
                        out.push_str(&t.text_content());
                    }
                }
                _ => {}
            }
        }
        Some(out)
    }

    /// Index of a plain item equal to `text`, appending one when missing.
    pub fn push(&mut self, text: &str) -> u32 {
        if let Some(&idx) = self.plain.get(text) {
            return idx;
        }
        let mut t = XmlElement::new(format!("{}t", self.prefix));
        if !text.is_empty() {
            t.children.push(XmlNode::Text(text.to_string()));
        }
        if needs_space_preserve(text) {
            t.set_attr("xml:space", "preserve");
        }
        let idx = self.items.len() as u32;
        self.items
            .push(XmlElement::new(format!("{}si", self.prefix)).with_child(t));
        self.plain.insert(text.to_string(), idx);
        idx
    }
}

/// Text of `si` when it is a single `<t>` with no runs.
fn plain_text(si: &XmlElement) -> Option<String> {
    let mut elements = si.elements();
    match (elements.next(), elements.next()) {
        (Some(t), None) if t.local_name() == "t" => Some(t.text_content()),
        _ => None,
    }
}

impl PartCodec for SharedStrings {
    const KIND: PartKind = PartKind::SharedStrings;

    fn decode(bytes: &[u8]) -> Result<Self, XmlError> {
        let root = XmlElement::parse(bytes)?;
        expect_root(&root, "sst")?;

        let prefix = root
            .name
            .strip_suffix("sst")
            .unwrap_or_default()
            .to_string();
        let mut out = Self {
            root_name: root.name,
            root_attrs: root.attrs,
            prefix,
            ..Self::default()
        };
        for node in root.children {
            match node {
                XmlNode::Element(si) if si.local_name() == "si" => {
                    if let Some(text) = plain_text(&si) {
                        out.plain.entry(text).or_insert(out.items.len() as u32);
                    }
                    out.items.push(si);
                }
                other => out.trailing.push(other),
            }
        }
        Ok(out)
    }

    fn encode(&self) -> Result<Vec<u8>, XmlError> {
        let count = self.items.len().to_string();
        let mut attrs = self.root_attrs.clone();
        for key in ["count", "uniqueCount"] {
            match attrs.iter_mut().find(|(k, _)| k == key) {
                Some((_, value)) => value.clone_from(&count),
                None => attrs.push((key.to_string(), count.clone())),
            }
        }

        let mut xml = String::from(XML_HEADER);
        xml.push('\n');
        xml.push('<');
        xml.push_str(&self.root_name);
        write_attrs(&mut xml, &attrs);
        xml.push('>');
        for si in &self.items {
            si.write_xml(&mut xml);
        }
        write_nodes(&mut xml, &self.trailing);
        xml.push_str("</");
        xml.push_str(&self.root_name);
        xml.push('>');
        Ok(xml.into_bytes())
    }

    fn is_omitted(&self) -> bool {
        self.items.is_empty()
    }
}
