use super::xml::{
    expect_root, parse_u32_attr, required_attr, write_attr, write_attrs, write_nodes, XmlElement,
    XmlError, XmlNode, OFFICE_REL_NS, SPREADSHEETML_NS, XML_HEADER,
};
use super::{PartCodec, PartKind};

const R_ID: &str = "r:id";
const XMLNS_R: &str = "xmlns:r";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub sheet_id: u32,
    /// Relationship id into `xl/_rels/workbook.xml.rels`.
    pub rel_id: String,
    /// `hidden` / `veryHidden`; `None` means visible.
    pub state: Option<String>,
}

/// `xl/workbook.xml`.
///
/// Only `<sheets>` is interpreted; the elements around it are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workbook {
    root_name: String,
    root_attrs: Vec<(String, String)>,
    before_sheets: Vec<XmlNode>,
    pub sheets: Vec<SheetEntry>,
    after_sheets: Vec<XmlNode>,
}

impl Default for Workbook {
    fn default() -> Self {
        Self {
            root_name: "workbook".to_string(),
            root_attrs: vec![
                ("xmlns".to_string(), SPREADSHEETML_NS.to_string()),
                (XMLNS_R.to_string(), OFFICE_REL_NS.to_string()),
            ],
            before_sheets: Vec::new(),
            sheets: Vec::new(),
            after_sheets: Vec::new(),
        }
    }
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&SheetEntry> {
        self.sheets
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// Append a sheet entry and return its `sheetId`.
    pub fn add_sheet(&mut self, name: &str, rel_id: &str) -> u32 {
        let sheet_id = self.sheets.iter().map(|s| s.sheet_id).max().unwrap_or(0) + 1;
        self.sheets.push(SheetEntry {
            name: name.to_string(),
            sheet_id,
            rel_id: rel_id.to_string(),
            state: None,
        });
        sheet_id
    }

    /// Namespace prefix of the root element (`x:` for `<x:workbook>`).
    fn prefix(&self) -> &str {
        self.root_name.strip_suffix("workbook").unwrap_or_default()
    }

    pub fn remove_sheet(&mut self, name: &str) -> Option<SheetEntry> {
        let idx = self
            .sheets
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))?;
        Some(self.sheets.remove(idx))
    }
}

fn rel_id_attr(el: &XmlElement) -> Option<&str> {
    el.attr(R_ID).or_else(|| {
        el.attrs
            .iter()
            .find(|(k, _)| k.ends_with(":id"))
            .map(|(_, v)| v.as_str())
    })
}

impl PartCodec for Workbook {
    const KIND: PartKind = PartKind::Workbook;

    fn decode(bytes: &[u8]) -> Result<Self, XmlError> {
        let root = XmlElement::parse(bytes)?;
        expect_root(&root, "workbook")?;

        let mut out = Workbook {
            root_name: root.name,
            root_attrs: root.attrs,
            before_sheets: Vec::new(),
            sheets: Vec::new(),
            after_sheets: Vec::new(),
        };
        if !out.root_attrs.iter().any(|(k, _)| k == XMLNS_R) {
            out.root_attrs
                .push((XMLNS_R.to_string(), OFFICE_REL_NS.to_string()));
        }

        let mut seen_sheets = false;
        for node in root.children {
            match node {
                XmlNode::Element(el) if !seen_sheets && el.local_name() == "sheets" => {
                    seen_sheets = true;
                    for sheet in el.children_named("sheet") {
                        out.sheets.push(SheetEntry {
                            name: required_attr(sheet, "sheet", "name")?.to_string(),
                            sheet_id: parse_u32_attr(
                                "sheetId",
                                required_attr(sheet, "sheet", "sheetId")?,
                            )?,
                            rel_id: rel_id_attr(sheet)
                                .ok_or(XmlError::MissingAttr {
                                    element: "sheet",
                                    attr: R_ID,
                                })?
                                .to_string(),
                            state: sheet.attr("state").map(str::to_string),
                        });
                    }
                }
                other if seen_sheets => out.after_sheets.push(other),
                other => out.before_sheets.push(other),
            }
        }
        Ok(out)
    }

    fn encode(&self) -> Result<Vec<u8>, XmlError> {
        for (idx, sheet) in self.sheets.iter().enumerate() {
            if sheet.name.is_empty() {
                return Err(XmlError::Invalid("sheet name must not be empty".to_string()));
            }
            if self.sheets[..idx]
                .iter()
                .any(|prev| prev.name.eq_ignore_ascii_case(&sheet.name))
            {
                return Err(XmlError::Invalid(format!(
                    "duplicate sheet name {:?}",
                    sheet.name
                )));
            }
        }

        let mut xml = String::from(XML_HEADER);
        xml.push('\n');
        xml.push('<');
        xml.push_str(&self.root_name);
        write_attrs(&mut xml, &self.root_attrs);
        xml.push('>');
        write_nodes(&mut xml, &self.before_sheets);
        let prefix = self.prefix();
        xml.push('<');
        xml.push_str(prefix);
        xml.push_str("sheets>");
        for sheet in &self.sheets {
            xml.push('<');
            xml.push_str(prefix);
            xml.push_str("sheet");
            write_attr(&mut xml, "name", &sheet.name);
            write_attr(&mut xml, "sheetId", &sheet.sheet_id.to_string());
            if let Some(state) = &sheet.state {
                write_attr(&mut xml, "state", state);
            }
            write_attr(&mut xml, R_ID, &sheet.rel_id);
            xml.push_str("/>");
        }
        xml.push_str("</");
        xml.push_str(prefix);
        xml.push_str("sheets>");
        write_nodes(&mut xml, &self.after_sheets);
        xml.push_str("</");
        xml.push_str(&self.root_name);
        xml.push('>');
        Ok(xml.into_bytes())
    }
}
