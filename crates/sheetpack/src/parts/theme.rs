use super::xml::{expect_root, XmlElement, XmlError};
use super::{PartCodec, PartKind};

pub const DRAWINGML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

/// `xl/theme/theme1.xml`, kept as a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    root: XmlElement,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            root: XmlElement::new("a:theme")
                .with_attr("xmlns:a", DRAWINGML_NS)
                .with_attr("name", "Office Theme")
                .with_child(XmlElement::new("a:themeElements")),
        }
    }
}

impl Theme {
    pub fn name(&self) -> Option<&str> {
        self.root.attr("name")
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }

    /// `srgbClr`/`sysClr` value of a scheme color slot (`dk1`, `accent1`, ...).
    pub fn scheme_color(&self, slot: &str) -> Option<&str> {
        let scheme = self.root.child("themeElements")?.child("clrScheme")?;
        let color = scheme.child(slot)?.elements().next()?;
        match color.local_name() {
            "srgbClr" => color.attr("val"),
            "sysClr" => color.attr("lastClr").or_else(|| color.attr("val")),
            _ => None,
        }
    }
}

impl PartCodec for Theme {
    const KIND: PartKind = PartKind::Theme;

    fn decode(bytes: &[u8]) -> Result<Self, XmlError> {
        let root = XmlElement::parse(bytes)?;
        expect_root(&root, "theme")?;
        Ok(Self { root })
    }

    fn encode(&self) -> Result<Vec<u8>, XmlError> {
        Ok(self.root.to_document_bytes())
    }
}
