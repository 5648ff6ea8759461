use std::collections::BTreeMap;

use thiserror::Error;

use super::xml::{
    escape_text, expect_root, needs_space_preserve, parse_u32_attr, write_attr, write_attrs,
    write_nodes, XmlElement, XmlError, XmlNode, OFFICE_REL_NS, SPREADSHEETML_NS, XML_HEADER,
};
use super::{PartCodec, PartKind};

pub const MAX_ROWS: u32 = 1_048_576;
pub const MAX_COLUMNS: u32 = 16_384;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid cell reference: {0:?}")]
pub struct InvalidCellReference(pub String);

/// Parse an A1 reference (`$` markers allowed) into 1-based `(row, col)`.
pub fn parse_a1(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.trim();
    let split = reference
        .char_indices()
        .find(|(_, c)| c.is_ascii_digit())
        .map(|(i, _)| i)?;
    let (letters, digits) = reference.split_at(split);
    let letters = letters.strip_prefix('$').unwrap_or(letters);
    let letters = letters.strip_suffix('$').unwrap_or(letters);
    if letters.is_empty() || letters.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut col: u32 = 0;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + u32::from(b.to_ascii_uppercase() - b'A' + 1);
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 || row > MAX_ROWS || col > MAX_COLUMNS {
        return None;
    }
    Some((row, col))
}

/// Format 1-based `(row, col)` as an A1 reference.
pub fn format_a1(row: u32, col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col;
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    letters.reverse();
    format!("{}{row}", String::from_utf8_lossy(&letters))
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// A cell element with no value (typically styled).
    Blank,
    Number(f64),
    Bool(bool),
    /// Index into `xl/sharedStrings.xml`.
    SharedString(u32),
    InlineString(String),
    Error(String),
    /// ISO 8601 date stored with `t="d"`.
    Date(String),
    Formula {
        formula: String,
        cached: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    /// Index into `cellXfs`.
    pub style: Option<u32>,
    extra_attrs: Vec<(String, String)>,
    formula_attrs: Vec<(String, String)>,
    /// Original `t` of a formula cell (`str`, `b`, `e`).
    formula_type: Option<String>,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            style: None,
            extra_attrs: Vec::new(),
            formula_attrs: Vec::new(),
            formula_type: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Row attributes other than `r`.
    pub attrs: Vec<(String, String)>,
    pub cells: BTreeMap<u32, Cell>,
}

/// `xl/worksheets/sheetN.xml`.
///
/// `<sheetData>` is decoded into rows and cells; every other element is carried through.
#[derive(Debug, Clone, PartialEq)]
pub struct Worksheet {
    root_name: String,
    root_attrs: Vec<(String, String)>,
    /// Namespace prefix used inside `<sheetData>` (`""` or `"x:"`).
    prefix: String,
    before_data: Vec<XmlNode>,
    pub rows: BTreeMap<u32, Row>,
    after_data: Vec<XmlNode>,
}

impl Default for Worksheet {
    fn default() -> Self {
        Self {
            root_name: "worksheet".to_string(),
            root_attrs: vec![
                ("xmlns".to_string(), SPREADSHEETML_NS.to_string()),
                ("xmlns:r".to_string(), OFFICE_REL_NS.to_string()),
            ],
            prefix: String::new(),
            before_data: Vec::new(),
            rows: BTreeMap::new(),
            after_data: Vec::new(),
        }
    }
}

impl Worksheet {
    pub fn cell(&self, reference: &str) -> Option<&Cell> {
        let (row, col) = parse_a1(reference)?;
        self.rows.get(&row)?.cells.get(&col)
    }

    /// Set a cell's value, keeping its style. Updates `<dimension>`.
    pub fn set_cell(
        &mut self,
        reference: &str,
        value: CellValue,
    ) -> Result<(), InvalidCellReference> {
        let (row, col) =
            parse_a1(reference).ok_or_else(|| InvalidCellReference(reference.to_string()))?;
        let row_entry = self.rows.entry(row).or_default();
        // Cached spans would no longer cover the row.
        row_entry.attrs.retain(|(k, _)| k != "spans");
        match row_entry.cells.get_mut(&col) {
            Some(cell) => {
                cell.value = value;
                cell.formula_attrs.clear();
                cell.formula_type = None;
            }
            None => {
                row_entry.cells.insert(col, Cell::new(value));
            }
        }
        self.update_dimension();
        Ok(())
    }

    pub fn remove_cell(&mut self, reference: &str) -> Option<Cell> {
        let (row, col) = parse_a1(reference)?;
        let row_entry = self.rows.get_mut(&row)?;
        let cell = row_entry.cells.remove(&col)?;
        if row_entry.cells.is_empty() && row_entry.attrs.is_empty() {
            self.rows.remove(&row);
        }
        self.update_dimension();
        Some(cell)
    }

    /// The used range (`A1:C5`), or `A1` for an empty sheet.
    pub fn used_range(&self) -> String {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (&row, entry) in &self.rows {
            for &col in entry.cells.keys() {
                bounds = Some(match bounds {
                    None => (row, col, row, col),
                    Some((r0, c0, r1, c1)) => (r0.min(row), c0.min(col), r1.max(row), c1.max(col)),
                });
            }
        }
        match bounds {
            None => "A1".to_string(),
            Some((r0, c0, r1, c1)) if (r0, c0) == (r1, c1) => format_a1(r0, c0),
            Some((r0, c0, r1, c1)) => format!("{}:{}", format_a1(r0, c0), format_a1(r1, c1)),
        }
    }

    fn update_dimension(&mut self) {
        let range = self.used_range();
        let existing = self
            .before_data
            .iter_mut()
            .filter_map(XmlNode::as_element_mut)
            .find(|el| el.local_name() == "dimension");
        if let Some(dimension) = existing {
            dimension.set_attr("ref", range);
            return;
        }

        let dimension = XmlElement::new(format!("{}dimension", self.prefix)).with_attr("ref", range);
        let at = self
            .before_data
            .iter()
            .position(|node| {
                node.as_element()
                    .is_some_and(|el| el.local_name() == "sheetPr")
            })
            .map(|idx| idx + 1)
            .unwrap_or(0);
        self.before_data.insert(at, XmlNode::Element(dimension));
    }

    /// The document split around `<sheetData>` for row-at-a-time writers.
    ///
    /// `<dimension>` is dropped since the streamed rows are not known up front.
    pub(crate) fn stream_envelope(&self) -> (String, String) {
        self.envelope(true)
    }

    fn envelope(&self, skip_dimension: bool) -> (String, String) {
        let mut head = String::from(XML_HEADER);
        head.push('\n');
        head.push('<');
        head.push_str(&self.root_name);
        write_attrs(&mut head, &self.root_attrs);
        head.push('>');
        for node in &self.before_data {
            if skip_dimension
                && node
                    .as_element()
                    .is_some_and(|el| el.local_name() == "dimension")
            {
                continue;
            }
            node.write_xml(&mut head);
        }
        head.push('<');
        head.push_str(&self.prefix);
        head.push_str("sheetData>");

        let mut tail = String::from("</");
        tail.push_str(&self.prefix);
        tail.push_str("sheetData>");
        write_nodes(&mut tail, &self.after_data);
        tail.push_str("</");
        tail.push_str(&self.root_name);
        tail.push('>');
        (head, tail)
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.prefix
    }
}

fn parse_row(el: &XmlElement, fallback_row: u32) -> Result<(u32, Row), XmlError> {
    let row_num = match el.attr("r") {
        Some(r) => parse_u32_attr("r", r)?,
        None => fallback_row,
    };
    if row_num == 0 || row_num > MAX_ROWS {
        return Err(XmlError::InvalidValue {
            attr: "r",
            value: row_num.to_string(),
        });
    }
    let mut row = Row {
        attrs: el
            .attrs
            .iter()
            .filter(|(k, _)| k != "r")
            .cloned()
            .collect(),
        cells: BTreeMap::new(),
    };

    let mut next_col = 1;
    for c in el.children_named("c") {
        let col = match c.attr("r") {
            Some(r) => {
                let (cell_row, col) = parse_a1(r).ok_or_else(|| XmlError::InvalidValue {
                    attr: "r",
                    value: r.to_string(),
                })?;
                if cell_row != row_num {
                    return Err(XmlError::Invalid(format!(
                        "cell {r} is inside row {row_num}"
                    )));
                }
                col
            }
            None if next_col <= MAX_COLUMNS => next_col,
            None => {
                return Err(XmlError::Invalid(format!(
                    "row {row_num} has more than {MAX_COLUMNS} cells"
                )))
            }
        };
        next_col = col + 1;
        row.cells.insert(col, parse_cell(c)?);
    }
    Ok((row_num, row))
}

fn parse_cell(c: &XmlElement) -> Result<Cell, XmlError> {
    let cell_type = c.attr("t");
    let style = c.attr("s").map(|s| parse_u32_attr("s", s)).transpose()?;
    let extra_attrs = c
        .attrs
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), "r" | "t" | "s"))
        .cloned()
        .collect();
    let v = c.child("v").map(XmlElement::text_content);

    let mut formula_attrs = Vec::new();
    let mut formula_type = None;
    let value = if let Some(f) = c.child("f") {
        formula_attrs = f.attrs.clone();
        formula_type = cell_type.map(str::to_string);
        CellValue::Formula {
            formula: f.text_content(),
            cached: v,
        }
    } else {
        match (cell_type, v) {
            (Some("s"), Some(v)) => CellValue::SharedString(parse_u32_attr("v", &v)?),
            (Some("b"), Some(v)) => CellValue::Bool(matches!(v.trim(), "1" | "true")),
            (Some("e"), Some(v)) => CellValue::Error(v),
            (Some("d"), Some(v)) => CellValue::Date(v),
            (Some("str"), Some(v)) => CellValue::InlineString(v),
            (Some("inlineStr"), _) => CellValue::InlineString(
                c.child("is").map(XmlElement::text_content).unwrap_or_default(),
            ),
            (None | Some("n"), Some(v)) => {
                CellValue::Number(v.trim().parse().map_err(|_| XmlError::InvalidValue {
                    attr: "v",
                    value: v.clone(),
                })?)
            }
            (None | Some("n" | "s" | "b" | "e" | "d" | "str"), None) => CellValue::Blank,
            (Some(other), _) => {
                return Err(XmlError::InvalidValue {
                    attr: "t",
                    value: other.to_string(),
                })
            }
        }
    };

    Ok(Cell {
        value,
        style,
        extra_attrs,
        formula_attrs,
        formula_type,
    })
}

fn format_number(value: f64) -> String {
    let plain = format!("{value}");
    if plain.len() > 20 {
        format!("{value:e}")
    } else {
        plain
    }
}

fn write_element(out: &mut String, prefix: &str, name: &str, text: &str) {
    out.push('<');
    out.push_str(prefix);
    out.push_str(name);
    out.push('>');
    out.push_str(&escape_text(text));
    out.push_str("</");
    out.push_str(prefix);
    out.push_str(name);
    out.push('>');
}

/// Append one `<c>` element.
pub(crate) fn write_cell(
    out: &mut String,
    prefix: &str,
    row: u32,
    col: u32,
    cell: &Cell,
) -> Result<(), XmlError> {
    let reference = format_a1(row, col);
    let cell_type = match &cell.value {
        CellValue::Blank | CellValue::Number(_) => None,
        CellValue::Bool(_) => Some("b"),
        CellValue::SharedString(_) => Some("s"),
        CellValue::InlineString(_) => Some("inlineStr"),
        CellValue::Error(_) => Some("e"),
        CellValue::Date(_) => Some("d"),
        CellValue::Formula { cached, .. } => match (&cell.formula_type, cached) {
            (Some(t), _) => Some(t.as_str()),
            (None, Some(v)) if v.trim().parse::<f64>().is_err() => Some("str"),
            (None, _) => None,
        },
    };

    out.push('<');
    out.push_str(prefix);
    out.push('c');
    write_attr(out, "r", &reference);
    if let Some(style) = cell.style {
        write_attr(out, "s", &style.to_string());
    }
    if let Some(t) = cell_type {
        write_attr(out, "t", t);
    }
    write_attrs(out, &cell.extra_attrs);

    if cell.value == CellValue::Blank {
        out.push_str("/>");
        return Ok(());
    }
    out.push('>');
    match &cell.value {
        CellValue::Blank => {}
        CellValue::Number(n) => {
            if !n.is_finite() {
                return Err(XmlError::Invalid(format!(
                    "cell {reference} holds a non-finite number"
                )));
            }
            write_element(out, prefix, "v", &format_number(*n));
        }
        CellValue::Bool(b) => write_element(out, prefix, "v", if *b { "1" } else { "0" }),
        CellValue::SharedString(idx) => write_element(out, prefix, "v", &idx.to_string()),
        CellValue::Error(text) | CellValue::Date(text) => write_element(out, prefix, "v", text),
        CellValue::InlineString(text) => {
            out.push('<');
            out.push_str(prefix);
            out.push_str("is><");
            out.push_str(prefix);
            out.push('t');
            if needs_space_preserve(text) {
                write_attr(out, "xml:space", "preserve");
            }
            out.push('>');
            out.push_str(&escape_text(text));
            out.push_str("</");
            out.push_str(prefix);
            out.push_str("t></");
            out.push_str(prefix);
            out.push_str("is>");
        }
        CellValue::Formula { formula, cached } => {
            out.push('<');
            out.push_str(prefix);
            out.push('f');
            write_attrs(out, &cell.formula_attrs);
            if formula.is_empty() {
                out.push_str("/>");
            } else {
                out.push('>');
                out.push_str(&escape_text(formula));
                out.push_str("</");
                out.push_str(prefix);
                out.push_str("f>");
            }
            if let Some(v) = cached {
                write_element(out, prefix, "v", v);
            }
        }
    }
    out.push_str("</");
    out.push_str(prefix);
    out.push_str("c>");
    Ok(())
}

pub(crate) fn write_row(
    out: &mut String,
    prefix: &str,
    row_num: u32,
    row: &Row,
) -> Result<(), XmlError> {
    out.push('<');
    out.push_str(prefix);
    out.push_str("row");
    write_attr(out, "r", &row_num.to_string());
    write_attrs(out, &row.attrs);
    if row.cells.is_empty() {
        out.push_str("/>");
        return Ok(());
    }
    out.push('>');
    for (&col, cell) in &row.cells {
        write_cell(out, prefix, row_num, col, cell)?;
    }
    out.push_str("</");
    out.push_str(prefix);
    out.push_str("row>");
    Ok(())
}

impl PartCodec for Worksheet {
    const KIND: PartKind = PartKind::Worksheet;

    fn decode(bytes: &[u8]) -> Result<Self, XmlError> {
        let root = XmlElement::parse(bytes)?;
        expect_root(&root, "worksheet")?;

        let mut out = Worksheet {
            root_name: root.name,
            root_attrs: root.attrs,
            prefix: String::new(),
            before_data: Vec::new(),
            rows: BTreeMap::new(),
            after_data: Vec::new(),
        };

        let mut seen_data = false;
        for node in root.children {
            match node {
                XmlNode::Element(el) if !seen_data && el.local_name() == "sheetData" => {
                    seen_data = true;
                    out.prefix = el
                        .name
                        .strip_suffix("sheetData")
                        .unwrap_or_default()
                        .to_string();
                    let mut next_row = 1;
                    for row_el in el.children_named("row") {
                        let (row_num, row) = parse_row(row_el, next_row)?;
                        // `parse_row` caps rows at MAX_ROWS, so this can't wrap.
                        next_row = row_num + 1;
                        out.rows.insert(row_num, row);
                    }
                }
                other if seen_data => out.after_data.push(other),
                other => out.before_data.push(other),
            }
        }
        Ok(out)
    }

    fn encode(&self) -> Result<Vec<u8>, XmlError> {
        let (head, tail) = self.envelope(false);
        let mut xml = head;
        for (&row_num, row) in &self.rows {
            write_row(&mut xml, &self.prefix, row_num, row)?;
        }
        xml.push_str(&tail);
        Ok(xml.into_bytes())
    }
}
