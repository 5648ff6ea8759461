use super::xml::{expect_root, XmlElement, XmlError, XmlNode};
use super::{PartCodec, PartKind};

/// Legacy VML drawing (`xl/drawings/vmlDrawingN.vml`) backing comment boxes.
///
/// Written without an XML declaration, the way Excel emits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmlDrawing {
    root: XmlElement,
}

impl Default for VmlDrawing {
    fn default() -> Self {
        Self {
            root: XmlElement::new("xml")
                .with_attr("xmlns:v", "urn:schemas-microsoft-com:vml")
                .with_attr("xmlns:o", "urn:schemas-microsoft-com:office:office")
                .with_attr("xmlns:x", "urn:schemas-microsoft-com:office:excel"),
        }
    }
}

impl VmlDrawing {
    pub fn shape_count(&self) -> usize {
        self.root
            .elements()
            .filter(|el| el.name == "v:shape")
            .count()
    }

    /// Remove the comment shape anchored at 0-based `(row, col)`.
    pub fn remove_comment_shape(&mut self, row: u32, col: u32) -> bool {
        let before = self.root.children.len();
        self.root.children.retain(|node| match node {
            XmlNode::Element(el) if el.name == "v:shape" => !is_note_at(el, row, col),
            _ => true,
        });
        self.root.children.len() != before
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }
}

fn is_note_at(shape: &XmlElement, row: u32, col: u32) -> bool {
    let Some(data) = shape.child("ClientData") else {
        return false;
    };
    let field = |name: &str| {
        data.child(name)
            .and_then(|el| el.text_content().trim().parse::<u32>().ok())
    };
    field("Row") == Some(row) && field("Column") == Some(col)
}

impl PartCodec for VmlDrawing {
    const KIND: PartKind = PartKind::VmlDrawing;

    fn decode(bytes: &[u8]) -> Result<Self, XmlError> {
        let root = XmlElement::parse(bytes)?;
        expect_root(&root, "xml")?;
        Ok(Self { root })
    }

    fn encode(&self) -> Result<Vec<u8>, XmlError> {
        let mut out = String::new();
        self.root.write_xml(&mut out);
        Ok(out.into_bytes())
    }

    fn is_omitted(&self) -> bool {
        self.shape_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"<xml xmlns:v="urn:schemas-microsoft-com:vml" xmlns:o="urn:schemas-microsoft-com:office:office" xmlns:x="urn:schemas-microsoft-com:office:excel">
 <o:shapelayout v:ext="edit"><o:idmap v:ext="edit" data="1"/></o:shapelayout>
 <v:shapetype id="_x0000_t202" coordsize="21600,21600" o:spt="202" path="m,l,21600r21600,l21600,xe"/>
 <v:shape id="_x0000_s1025" type="#_x0000_t202" style="visibility:hidden">
  <x:ClientData ObjectType="Note"><x:Row>1</x:Row><x:Column>2</x:Column></x:ClientData>
 </v:shape>
</xml>"##;

    #[test]
    fn counts_and_removes_note_shapes() {
        let mut vml = VmlDrawing::decode(SAMPLE.as_bytes()).unwrap();
        assert_eq!(vml.shape_count(), 1);
        assert!(!vml.remove_comment_shape(0, 0));
        assert!(vml.remove_comment_shape(1, 2));
        assert!(vml.is_omitted());
    }

    #[test]
    fn encodes_without_declaration() {
        let vml = VmlDrawing::decode(SAMPLE.as_bytes()).unwrap();
        let encoded = vml.encode().unwrap();
        assert!(encoded.starts_with(b"<xml "));
        assert_eq!(VmlDrawing::decode(&encoded).unwrap(), vml);
    }
}
