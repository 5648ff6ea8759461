use super::xml::{expect_root, XmlElement, XmlError};
use super::{PartCodec, PartKind};

pub const SPREADSHEET_DRAWING_NS: &str =
    "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";

const ANCHORS: [&str; 3] = ["twoCellAnchor", "oneCellAnchor", "absoluteAnchor"];

/// `xl/drawings/drawingN.xml`. Anchors are kept verbatim; only their count is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drawing {
    root: XmlElement,
}

impl Default for Drawing {
    fn default() -> Self {
        Self {
            root: XmlElement::new("xdr:wsDr")
                .with_attr("xmlns:xdr", SPREADSHEET_DRAWING_NS)
                .with_attr("xmlns:a", super::theme::DRAWINGML_NS),
        }
    }
}

impl Drawing {
    pub fn anchor_count(&self) -> usize {
        self.root
            .elements()
            .filter(|el| ANCHORS.contains(&el.local_name()))
            .count()
    }

    /// Remove the anchor at `index` (document order among anchors).
    pub fn remove_anchor(&mut self, index: usize) -> Option<XmlElement> {
        let position = self
            .root
            .children
            .iter()
            .enumerate()
            .filter(|(_, node)| {
                node.as_element()
                    .is_some_and(|el| ANCHORS.contains(&el.local_name()))
            })
            .nth(index)
            .map(|(pos, _)| pos)?;
        match self.root.children.remove(position) {
            super::XmlNode::Element(el) => Some(el),
            super::XmlNode::Text(_) => None,
        }
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }
}

impl PartCodec for Drawing {
    const KIND: PartKind = PartKind::Drawing;

    fn decode(bytes: &[u8]) -> Result<Self, XmlError> {
        let root = XmlElement::parse(bytes)?;
        expect_root(&root, "wsDr")?;
        Ok(Self { root })
    }

    fn encode(&self) -> Result<Vec<u8>, XmlError> {
        Ok(self.root.to_document_bytes())
    }

    fn is_omitted(&self) -> bool {
        self.anchor_count() == 0
    }
}
