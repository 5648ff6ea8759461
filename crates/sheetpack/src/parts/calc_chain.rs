use super::xml::{
    expect_root, parse_u32_attr, required_attr, write_attr, write_attrs, XmlElement, XmlError,
    SPREADSHEETML_NS, XML_HEADER,
};
use super::{PartCodec, PartKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalcCell {
    pub reference: String,
    /// `i`: sheet id. Omitted entries inherit the previous entry's sheet.
    pub sheet_id: Option<u32>,
    attrs: Vec<(String, String)>,
}

impl CalcCell {
    pub fn new(reference: &str, sheet_id: u32) -> Self {
        Self {
            reference: reference.to_string(),
            sheet_id: Some(sheet_id),
            attrs: Vec::new(),
        }
    }
}

/// `xl/calcChain.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalcChain {
    root_name: String,
    root_attrs: Vec<(String, String)>,
    pub cells: Vec<CalcCell>,
}

impl Default for CalcChain {
    fn default() -> Self {
        Self {
            root_name: "calcChain".to_string(),
            root_attrs: vec![("xmlns".to_string(), SPREADSHEETML_NS.to_string())],
            cells: Vec::new(),
        }
    }
}

impl CalcChain {
    /// Sheet id each entry applies to, resolving inherited `i` values.
    pub fn effective_sheet_ids(&self) -> Vec<u32> {
        let mut current = 0;
        self.cells
            .iter()
            .map(|c| {
                if let Some(id) = c.sheet_id {
                    current = id;
                }
                current
            })
            .collect()
    }

    /// Remove the entry for `reference` on `sheet_id`; returns whether one was removed.
    pub fn remove_cell(&mut self, sheet_id: u32, reference: &str) -> bool {
        self.remove_where(|id, cell| id == sheet_id && cell.reference.eq_ignore_ascii_case(reference))
    }

    /// Remove every entry for `sheet_id`.
    pub fn remove_sheet(&mut self, sheet_id: u32) -> bool {
        self.remove_where(|id, _| id == sheet_id)
    }

    fn remove_where(&mut self, mut pred: impl FnMut(u32, &CalcCell) -> bool) -> bool {
        let ids = self.effective_sheet_ids();
        let before = self.cells.len();
        let mut kept = Vec::with_capacity(before);
        let mut last_kept_id = None;
        for (cell, id) in std::mem::take(&mut self.cells).into_iter().zip(ids) {
            if pred(id, &cell) {
                continue;
            }
            let mut cell = cell;
            // The inherited id may have come from a removed entry.
            cell.sheet_id = if last_kept_id == Some(id) { cell.sheet_id } else { Some(id) };
            last_kept_id = Some(id);
            kept.push(cell);
        }
        self.cells = kept;
        self.cells.len() != before
    }
}

impl PartCodec for CalcChain {
    const KIND: PartKind = PartKind::CalcChain;

    fn decode(bytes: &[u8]) -> Result<Self, XmlError> {
        let root = XmlElement::parse(bytes)?;
        expect_root(&root, "calcChain")?;

        let mut cells = Vec::new();
        for c in root.children_named("c") {
            cells.push(CalcCell {
                reference: required_attr(c, "c", "r")?.to_string(),
                sheet_id: c.attr("i").map(|i| parse_u32_attr("i", i)).transpose()?,
                attrs: c
                    .attrs
                    .iter()
                    .filter(|(k, _)| k != "r" && k != "i")
                    .cloned()
                    .collect(),
            });
        }
        Ok(Self {
            root_name: root.name,
            root_attrs: root.attrs,
            cells,
        })
    }

    fn encode(&self) -> Result<Vec<u8>, XmlError> {
        let prefix = self.root_name.strip_suffix("calcChain").unwrap_or_default();
        let mut xml = String::from(XML_HEADER);
        xml.push('\n');
        xml.push('<');
        xml.push_str(&self.root_name);
        write_attrs(&mut xml, &self.root_attrs);
        xml.push('>');
        for cell in &self.cells {
            xml.push('<');
            xml.push_str(prefix);
            xml.push('c');
            write_attr(&mut xml, "r", &cell.reference);
            if let Some(id) = cell.sheet_id {
                write_attr(&mut xml, "i", &id.to_string());
            }
            write_attrs(&mut xml, &cell.attrs);
            xml.push_str("/>");
        }
        xml.push_str("</");
        xml.push_str(&self.root_name);
        xml.push('>');
        Ok(xml.into_bytes())
    }

    fn is_omitted(&self) -> bool {
        self.cells.is_empty()
    }
}
