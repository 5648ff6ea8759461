use super::xml::{expect_root, required_attr, write_attr, XmlElement, XmlError, XML_HEADER};
use super::{PartCodec, PartKind};

pub const PACKAGE_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Relationship type URIs.
pub mod rel_type {
    pub const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub const CORE_PROPERTIES: &str =
        "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
    pub const EXTENDED_PROPERTIES: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties";
    pub const WORKSHEET: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
    pub const STYLES: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
    pub const THEME: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme";
    pub const SHARED_STRINGS: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
    pub const CALC_CHAIN: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";
    pub const COMMENTS: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
    pub const VML_DRAWING: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/vmlDrawing";
    pub const DRAWING: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
    /// `External` for targets outside the package.
    pub target_mode: Option<String>,
}

impl Relationship {
    pub fn is_external(&self) -> bool {
        self.target_mode
            .as_deref()
            .is_some_and(|mode| mode.eq_ignore_ascii_case("External"))
    }
}

/// A `.rels` part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    pub items: Vec<Relationship>,
}

impl Relationships {
    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| r.id == id)
    }

    pub fn find_by_type<'a>(&'a self, type_uri: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.items.iter().filter(move |r| r.type_uri == type_uri)
    }

    /// Append a relationship and return its new `rIdN`.
    pub fn add(&mut self, type_uri: &str, target: &str) -> String {
        let next = self
            .items
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId")?.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let id = format!("rId{next}");
        self.items.push(Relationship {
            id: id.clone(),
            type_uri: type_uri.to_string(),
            target: target.to_string(),
            target_mode: None,
        });
        id
    }

    pub fn remove(&mut self, id: &str) -> Option<Relationship> {
        let idx = self.items.iter().position(|r| r.id == id)?;
        Some(self.items.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl PartCodec for Relationships {
    const KIND: PartKind = PartKind::Relationships;

    fn decode(bytes: &[u8]) -> Result<Self, XmlError> {
        let root = XmlElement::parse(bytes)?;
        expect_root(&root, "Relationships")?;

        let mut items = Vec::new();
        for el in root.children_named("Relationship") {
            items.push(Relationship {
                id: required_attr(el, "Relationship", "Id")?.to_string(),
                type_uri: required_attr(el, "Relationship", "Type")?.to_string(),
                target: required_attr(el, "Relationship", "Target")?.to_string(),
                target_mode: el.attr("TargetMode").map(str::to_string),
            });
        }
        Ok(Self { items })
    }

    fn encode(&self) -> Result<Vec<u8>, XmlError> {
        let mut xml = String::from(XML_HEADER);
        xml.push('\n');
        xml.push_str(&format!(r#"<Relationships xmlns="{PACKAGE_REL_NS}">"#));
        for (idx, rel) in self.items.iter().enumerate() {
            if self.items[..idx].iter().any(|prev| prev.id == rel.id) {
                return Err(XmlError::Invalid(format!(
                    "duplicate relationship id {}",
                    rel.id
                )));
            }
            xml.push_str("<Relationship");
            write_attr(&mut xml, "Id", &rel.id);
            write_attr(&mut xml, "Type", &rel.type_uri);
            write_attr(&mut xml, "Target", &rel.target);
            if let Some(mode) = &rel.target_mode {
                write_attr(&mut xml, "TargetMode", mode);
            }
            xml.push_str("/>");
        }
        xml.push_str("</Relationships>");
        Ok(xml.into_bytes())
    }

    fn is_omitted(&self) -> bool {
        self.items.is_empty()
    }
}

/// `.rels` part name for `part`: `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`.
///
/// The empty string names the package itself (`_rels/.rels`).
pub fn rels_part_name(part: &str) -> String {
    let part = part.trim_start_matches('/');
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship `target` relative to the part that owns the `.rels` file.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.replace('\\', "/");
    if let Some(absolute) = target.strip_prefix('/') {
        return normalize_segments(absolute.split('/'));
    }

    let source_part = source_part.trim_start_matches('/');
    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize_segments(base_dir.split('/').chain(target.split('/')))
}

fn normalize_segments<'a>(segments: impl Iterator<Item = &'a str>) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in segments {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}
