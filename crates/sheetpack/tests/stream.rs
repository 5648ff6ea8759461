use std::io::{Cursor, Read};

use pretty_assertions::assert_eq;
use sheetpack::{Cell, CellValue, Document, Options, PackageError, SpillBuffer};

fn sheet_xml(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut out)
        .unwrap();
    out
}

#[test]
fn streamed_rows_replace_the_stored_sheet() {
    let doc = Document::new();
    let mut writer = doc.stream_writer("Sheet1").unwrap();
    assert_eq!(writer.path(), "xl/worksheets/sheet1.xml");
    writer
        .write_row(
            1,
            &[
                CellValue::InlineString("name".into()),
                CellValue::InlineString("score".into()),
            ],
        )
        .unwrap();
    writer
        .write_row(2, &[CellValue::InlineString("a".into()), CellValue::Number(1.5)])
        .unwrap();
    writer
        .write_row(5, &[CellValue::Blank, CellValue::Bool(false)])
        .unwrap();
    writer.flush().unwrap();
    assert!(doc.has_spill("xl/worksheets/sheet1.xml"));

    let bytes = doc.write_to_buffer(&Options::default()).unwrap();
    let xml = sheet_xml(&bytes, "xl/worksheets/sheet1.xml");
    assert!(xml.contains(r#"<row r="5"><c r="B5" t="b"><v>0</v></c></row>"#), "{xml}");
    assert!(!xml.contains("<dimension"));

    let reopened = Document::from_bytes(&bytes, &Options::default()).unwrap();
    let sheet = reopened.worksheet_by_name("Sheet1").unwrap();
    let sheet = sheet.read();
    assert_eq!(
        sheet.cell("B1").unwrap().value,
        CellValue::InlineString("score".into())
    );
    assert_eq!(sheet.cell("B2").unwrap().value, CellValue::Number(1.5));
    assert!(sheet.cell("A5").is_none());
    assert_eq!(sheet.cell("B5").unwrap().value, CellValue::Bool(false));
}

#[test]
fn rows_must_ascend() {
    let doc = Document::new();
    let mut writer = doc.stream_writer("Sheet1").unwrap();
    writer.write_row(3, &[CellValue::Number(1.0)]).unwrap();

    let err = writer.write_row(3, &[CellValue::Number(2.0)]).unwrap_err();
    assert!(matches!(err, PackageError::StreamRowOrder { row: 3, last: 3 }));
    let err = writer.write_row(2, &[CellValue::Number(2.0)]).unwrap_err();
    assert!(matches!(err, PackageError::StreamRowOrder { row: 2, last: 3 }));
    assert!(matches!(
        writer.write_row(0, &[]),
        Err(PackageError::InvalidCellReference(_))
    ));

    writer.write_row(4, &[CellValue::Number(4.0)]).unwrap();
}

#[test]
fn unknown_sheet_is_rejected() {
    let doc = Document::new();
    assert!(matches!(
        doc.stream_writer("Missing"),
        Err(PackageError::UnknownSheet(name)) if name == "Missing"
    ));
}

#[test]
fn large_sheets_spill_to_disk() {
    let doc = Document::new();
    let mut writer = doc
        .stream_writer_with_buffer("Sheet1", SpillBuffer::with_chunk_size(4 * 1024))
        .unwrap();
    for row in 1..=2_000u32 {
        let mut label = Cell::new(CellValue::InlineString(format!("row {row}")));
        label.style = Some(0);
        writer
            .write_cells(row, &[Cell::new(CellValue::Number(f64::from(row))), label])
            .unwrap();
    }
    writer.flush().unwrap();

    let bytes = doc.write_to_buffer(&Options::default()).unwrap();
    let reopened = Document::from_bytes(&bytes, &Options::default()).unwrap();
    let sheet = reopened.worksheet_by_name("Sheet1").unwrap();
    let sheet = sheet.read();
    assert_eq!(sheet.rows.len(), 2_000);
    assert_eq!(sheet.cell("A1999").unwrap().value, CellValue::Number(1999.0));
    let b = sheet.cell("B2000").unwrap();
    assert_eq!(b.value, CellValue::InlineString("row 2000".into()));
    assert_eq!(b.style, Some(0));
}

#[test]
fn streaming_a_second_sheet_leaves_the_first_alone() {
    let doc = Document::new();
    doc.worksheet_by_name("Sheet1")
        .unwrap()
        .write()
        .set_cell("A1", CellValue::Number(9.0))
        .unwrap();
    doc.add_sheet("Stream").unwrap();

    let mut writer = doc.stream_writer("Stream").unwrap();
    writer.write_row(1, &[CellValue::Number(1.0)]).unwrap();
    writer.flush().unwrap();

    let bytes = doc.write_to_buffer(&Options::default()).unwrap();
    let reopened = Document::from_bytes(&bytes, &Options::default()).unwrap();
    assert_eq!(
        reopened
            .worksheet_by_name("Sheet1")
            .unwrap()
            .read()
            .cell("A1")
            .unwrap()
            .value,
        CellValue::Number(9.0)
    );
    assert_eq!(
        reopened
            .worksheet_by_name("Stream")
            .unwrap()
            .read()
            .cell("A1")
            .unwrap()
            .value,
        CellValue::Number(1.0)
    );
}
