use super::xml::{expect_root, XmlElement, XmlError, SPREADSHEETML_NS};
use super::{PartCodec, PartKind};

/// `xl/styles.xml`, kept as a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSheet {
    root: XmlElement,
}

impl Default for StyleSheet {
    fn default() -> Self {
        let fonts = XmlElement::new("fonts").with_attr("count", "1").with_child(
            XmlElement::new("font")
                .with_child(XmlElement::new("sz").with_attr("val", "11"))
                .with_child(XmlElement::new("name").with_attr("val", "Calibri")),
        );
        let fills = XmlElement::new("fills").with_attr("count", "1").with_child(
            XmlElement::new("fill")
                .with_child(XmlElement::new("patternFill").with_attr("patternType", "none")),
        );
        let borders = XmlElement::new("borders").with_attr("count", "1").with_child(
            XmlElement::new("border")
                .with_child(XmlElement::new("left"))
                .with_child(XmlElement::new("right"))
                .with_child(XmlElement::new("top"))
                .with_child(XmlElement::new("bottom"))
                .with_child(XmlElement::new("diagonal")),
        );
        let xf = || {
            XmlElement::new("xf")
                .with_attr("numFmtId", "0")
                .with_attr("fontId", "0")
                .with_attr("fillId", "0")
                .with_attr("borderId", "0")
        };
        let cell_style_xfs = XmlElement::new("cellStyleXfs")
            .with_attr("count", "1")
            .with_child(xf());
        let cell_xfs = XmlElement::new("cellXfs")
            .with_attr("count", "1")
            .with_child(xf().with_attr("xfId", "0"));

        Self {
            root: XmlElement::new("styleSheet")
                .with_attr("xmlns", SPREADSHEETML_NS)
                .with_child(fonts)
                .with_child(fills)
                .with_child(borders)
                .with_child(cell_style_xfs)
                .with_child(cell_xfs),
        }
    }
}

impl StyleSheet {
    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }

    /// Number of cell formats (`cellXfs/xf`), i.e. valid `s` indices for cells.
    pub fn cell_xfs_count(&self) -> usize {
        self.root
            .child("cellXfs")
            .map(|xfs| xfs.children_named("xf").count())
            .unwrap_or(0)
    }
}

impl PartCodec for StyleSheet {
    const KIND: PartKind = PartKind::Styles;

    fn decode(bytes: &[u8]) -> Result<Self, XmlError> {
        let root = XmlElement::parse(bytes)?;
        expect_root(&root, "styleSheet")?;
        Ok(Self { root })
    }

    fn encode(&self) -> Result<Vec<u8>, XmlError> {
        Ok(self.root.to_document_bytes())
    }
}
