use super::xml::{expect_root, required_attr, write_attr, XmlElement, XmlError, XML_HEADER};
use super::{PartCodec, PartKind};

pub const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

/// Content types for the parts this crate knows how to produce.
pub mod content_type {
    pub const RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
    pub const XML: &str = "application/xml";
    pub const VML: &str = "application/vnd.openxmlformats-officedocument.vmlDrawing";
    pub const WORKBOOK: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
    pub const WORKSHEET: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
    pub const STYLES: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
    pub const SHARED_STRINGS: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
    pub const CALC_CHAIN: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml";
    pub const COMMENTS: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.comments+xml";
    pub const DRAWING: &str = "application/vnd.openxmlformats-officedocument.drawing+xml";
    pub const THEME: &str = "application/vnd.openxmlformats-officedocument.theme+xml";
    pub const CORE_PROPERTIES: &str = "application/vnd.openxmlformats-package.core-properties+xml";
    pub const EXTENDED_PROPERTIES: &str =
        "application/vnd.openxmlformats-officedocument.extended-properties+xml";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultType {
    pub extension: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideType {
    /// Absolute part name (`/xl/workbook.xml`).
    pub part_name: String,
    pub content_type: String,
}

/// `[Content_Types].xml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypes {
    pub defaults: Vec<DefaultType>,
    pub overrides: Vec<OverrideType>,
}

fn absolute(part: &str) -> String {
    format!("/{}", part.trim_start_matches('/'))
}

impl ContentTypes {
    /// Insert or replace the override for `part` (leading `/` optional).
    pub fn add_override(&mut self, part: &str, content_type: &str) {
        let part_name = absolute(part);
        match self
            .overrides
            .iter_mut()
            .find(|o| o.part_name.eq_ignore_ascii_case(&part_name))
        {
            Some(existing) => existing.content_type = content_type.to_string(),
            None => self.overrides.push(OverrideType {
                part_name,
                content_type: content_type.to_string(),
            }),
        }
    }

    pub fn remove_override(&mut self, part: &str) -> bool {
        let part_name = absolute(part);
        let before = self.overrides.len();
        self.overrides
            .retain(|o| !o.part_name.eq_ignore_ascii_case(&part_name));
        self.overrides.len() != before
    }

    pub fn add_default(&mut self, extension: &str, content_type: &str) {
        if self
            .defaults
            .iter()
            .any(|d| d.extension.eq_ignore_ascii_case(extension))
        {
            return;
        }
        self.defaults.push(DefaultType {
            extension: extension.to_string(),
            content_type: content_type.to_string(),
        });
    }

    /// Effective content type of `part`: its override, else the default for its extension.
    pub fn content_type_for(&self, part: &str) -> Option<&str> {
        let part_name = absolute(part);
        if let Some(o) = self
            .overrides
            .iter()
            .find(|o| o.part_name.eq_ignore_ascii_case(&part_name))
        {
            return Some(&o.content_type);
        }
        let (_, ext) = part_name.rsplit_once('.')?;
        self.defaults
            .iter()
            .find(|d| d.extension.eq_ignore_ascii_case(ext))
            .map(|d| d.content_type.as_str())
    }
}

impl PartCodec for ContentTypes {
    const KIND: PartKind = PartKind::ContentTypes;

    fn decode(bytes: &[u8]) -> Result<Self, XmlError> {
        let root = XmlElement::parse(bytes)?;
        expect_root(&root, "Types")?;

        let mut out = ContentTypes::default();
        for el in root.elements() {
            match el.local_name() {
                "Default" => out.defaults.push(DefaultType {
                    extension: required_attr(el, "Default", "Extension")?.to_string(),
                    content_type: required_attr(el, "Default", "ContentType")?.to_string(),
                }),
                "Override" => out.overrides.push(OverrideType {
                    part_name: required_attr(el, "Override", "PartName")?.to_string(),
                    content_type: required_attr(el, "Override", "ContentType")?.to_string(),
                }),
                _ => {}
            }
        }
        Ok(out)
    }

    fn encode(&self) -> Result<Vec<u8>, XmlError> {
        let mut xml = String::from(XML_HEADER);
        xml.push('\n');
        xml.push_str(&format!(r#"<Types xmlns="{CONTENT_TYPES_NS}">"#));
        for d in &self.defaults {
            xml.push_str("<Default");
            write_attr(&mut xml, "Extension", &d.extension);
            write_attr(&mut xml, "ContentType", &d.content_type);
            xml.push_str("/>");
        }
        for o in &self.overrides {
            if !o.part_name.starts_with('/') {
                return Err(XmlError::Invalid(format!(
                    "override part name {:?} must be absolute",
                    o.part_name
                )));
            }
            xml.push_str("<Override");
            write_attr(&mut xml, "PartName", &o.part_name);
            write_attr(&mut xml, "ContentType", &o.content_type);
            xml.push_str("/>");
        }
        xml.push_str("</Types>");
        Ok(xml.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
</Types>"#;

    #[test]
    fn resolves_overrides_before_defaults() {
        let ct = ContentTypes::decode(SAMPLE.as_bytes()).unwrap();
        assert_eq!(ct.content_type_for("xl/workbook.xml"), Some(content_type::WORKBOOK));
        assert_eq!(ct.content_type_for("/docProps/app.xml"), Some(content_type::XML));
        assert_eq!(
            ct.content_type_for("_rels/.rels"),
            Some(content_type::RELATIONSHIPS)
        );
        assert_eq!(ct.content_type_for("xl/media/image1.png"), None);
    }

    #[test]
    fn add_and_remove_override() {
        let mut ct = ContentTypes::decode(SAMPLE.as_bytes()).unwrap();
        ct.add_override("xl/sharedStrings.xml", content_type::SHARED_STRINGS);
        ct.add_override("/xl/sharedStrings.xml", content_type::SHARED_STRINGS);
        assert_eq!(ct.overrides.len(), 2);
        assert!(ct.remove_override("xl/sharedStrings.xml"));
        assert!(!ct.remove_override("xl/sharedStrings.xml"));
    }

    #[test]
    fn encode_round_trips() {
        let ct = ContentTypes::decode(SAMPLE.as_bytes()).unwrap();
        let encoded = ct.encode().unwrap();
        assert_eq!(ContentTypes::decode(&encoded).unwrap(), ct);
    }

    #[test]
    fn relative_override_names_fail_to_encode() {
        let ct = ContentTypes {
            defaults: Vec::new(),
            overrides: vec![OverrideType {
                part_name: "xl/workbook.xml".to_string(),
                content_type: content_type::WORKBOOK.to_string(),
            }],
        };
        assert!(matches!(ct.encode(), Err(XmlError::Invalid(_))));
    }

    #[test]
    fn rejects_wrong_root() {
        let err = ContentTypes::decode(b"<Relationships/>").unwrap_err();
        assert!(matches!(err, XmlError::UnexpectedRoot { .. }));
    }
}
