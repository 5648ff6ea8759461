use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use sheetpack::template::TEMPLATE_PARTS;
use sheetpack::{
    CellValue, Document, EncryptOptions, HashAlgorithm, Options, PackageError, SpillSource,
};
use zip::write::SimpleFileOptions;

fn entry_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("open zip");
    (0..archive.len())
        .map(|i| archive.by_index(i).expect("entry").name().to_string())
        .collect()
}

fn entry(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("open zip");
    let mut file = archive.by_name(name).expect("entry present");
    let mut out = Vec::new();
    file.read_to_end(&mut out).expect("read entry");
    out
}

fn fast_password(password: &str) -> Options {
    Options::default()
        .with_password(password)
        .with_encrypt_options(EncryptOptions {
            key_bits: 128,
            hash_algorithm: HashAlgorithm::Sha1,
            spin_count: 100,
        })
}

#[test]
fn new_document_writes_exactly_the_template_parts() {
    let bytes = Document::new()
        .write_to_buffer(&Options::default())
        .expect("write");

    let mut expected: Vec<String> = TEMPLATE_PARTS
        .iter()
        .map(|(path, _)| path.to_string())
        .collect();
    expected.sort();
    assert_eq!(entry_names(&bytes), expected);

    for (path, xml) in TEMPLATE_PARTS {
        assert_eq!(entry(&bytes, path), xml.as_bytes(), "{path} changed");
    }
}

#[test]
fn repeated_writes_are_byte_identical() {
    let doc = Document::new();
    doc.worksheet_by_name("Sheet1")
        .unwrap()
        .write()
        .set_cell("C3", CellValue::Bool(true))
        .unwrap();

    let first = doc.write_to_buffer(&Options::default()).unwrap();
    let second = doc.write_to_buffer(&Options::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn cell_mutations_survive_a_round_trip() {
    let doc = Document::new();
    {
        let sheet = doc.worksheet_by_name("Sheet1").unwrap();
        let mut sheet = sheet.write();
        sheet.set_cell("A1", CellValue::Number(3.25)).unwrap();
        sheet
            .set_cell("B2", CellValue::InlineString(" spaced ".into()))
            .unwrap();
    }
    let index = doc.add_shared_string("shared").unwrap();
    doc.worksheet_by_name("Sheet1")
        .unwrap()
        .write()
        .set_cell("C1", CellValue::SharedString(index))
        .unwrap();

    let bytes = doc.write_to_buffer(&Options::default()).unwrap();
    assert!(entry_names(&bytes).contains(&"xl/sharedStrings.xml".to_string()));

    let reopened = Document::from_bytes(&bytes, &Options::default()).unwrap();
    let sheet = reopened.worksheet_by_name("Sheet1").unwrap();
    let sheet = sheet.read();
    assert_eq!(sheet.cell("A1").unwrap().value, CellValue::Number(3.25));
    assert_eq!(
        sheet.cell("B2").unwrap().value,
        CellValue::InlineString(" spaced ".into())
    );
    assert_eq!(sheet.cell("C1").unwrap().value, CellValue::SharedString(0));
    assert_eq!(sheet.used_range(), "A1:C2");
    assert_eq!(
        reopened.shared_strings().unwrap().read().text(0).as_deref(),
        Some("shared")
    );
}

#[test]
fn only_the_mutated_part_changes() {
    const SHEET: &str = "xl/worksheets/sheet1.xml";
    let doc = Document::new();
    doc.worksheet(SHEET)
        .unwrap()
        .write()
        .set_cell("A1", CellValue::Number(1.0))
        .unwrap();
    let bytes = doc.write_to_buffer(&Options::default()).unwrap();

    for (path, xml) in TEMPLATE_PARTS {
        if path == SHEET {
            continue;
        }
        assert_eq!(entry(&bytes, path), xml.as_bytes(), "{path} changed");
    }
    let sheet = String::from_utf8(entry(&bytes, SHEET)).unwrap();
    assert!(sheet.contains(r#"<c r="A1"><v>1</v></c>"#), "{sheet}");
}

#[test]
fn emptied_calc_chain_is_dropped_from_the_container() {
    let mut base = Cursor::new(Vec::new());
    {
        let source = Document::new().write_to_buffer(&Options::default()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(source)).unwrap();
        let mut zip = zip::ZipWriter::new(&mut base);
        for i in 0..archive.len() {
            let file = archive.by_index(i).unwrap();
            zip.raw_copy_file(file).unwrap();
        }
        zip.start_file("xl/calcChain.xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(
            br#"<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="A1" i="1"/><c r="B1"/></calcChain>"#,
        )
        .unwrap();
        zip.finish().unwrap();
    }

    let doc = Document::from_bytes(base.get_ref(), &Options::default()).unwrap();
    let untouched = doc.write_to_buffer(&Options::default()).unwrap();
    assert!(entry_names(&untouched).contains(&"xl/calcChain.xml".to_string()));

    doc.calc_chain().unwrap().write().remove_sheet(1);
    let bytes = doc.write_to_buffer(&Options::default()).unwrap();
    assert!(!entry_names(&bytes).contains(&"xl/calcChain.xml".to_string()));
}

#[test]
fn prefixed_parts_keep_their_prefix_through_a_save() {
    const WORKBOOK: &str = r#"<x:workbook xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><x:sheets><x:sheet name="Sheet1" sheetId="1" r:id="rId1"/></x:sheets></x:workbook>"#;
    const SST: &str = r#"<x:sst xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="1" uniqueCount="1"><x:si><x:t>first</x:t></x:si></x:sst>"#;

    let mut base = Cursor::new(Vec::new());
    {
        let source = Document::new().write_to_buffer(&Options::default()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(source)).unwrap();
        let mut zip = zip::ZipWriter::new(&mut base);
        for i in 0..archive.len() {
            let file = archive.by_index(i).unwrap();
            if file.name() != "xl/workbook.xml" {
                zip.raw_copy_file(file).unwrap();
            }
        }
        for (name, xml) in [("xl/workbook.xml", WORKBOOK), ("xl/sharedStrings.xml", SST)] {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    let doc = Document::from_bytes(base.get_ref(), &Options::default()).unwrap();
    doc.add_sheet("Second").unwrap();
    assert_eq!(doc.add_shared_string("first").unwrap(), 0);
    assert_eq!(doc.add_shared_string("second").unwrap(), 1);
    let bytes = doc.write_to_buffer(&Options::default()).unwrap();

    let workbook = String::from_utf8(entry(&bytes, "xl/workbook.xml")).unwrap();
    assert!(workbook.contains(r#"<x:sheet name="Second" sheetId="2""#), "{workbook}");
    assert!(!workbook.contains("<sheets>"), "{workbook}");
    let sst = String::from_utf8(entry(&bytes, "xl/sharedStrings.xml")).unwrap();
    assert!(sst.contains("<x:si><x:t>second</x:t></x:si></x:sst>"), "{sst}");

    let reopened = Document::from_bytes(&bytes, &Options::default()).unwrap();
    assert_eq!(
        reopened.sheet_names().unwrap(),
        vec!["Sheet1".to_string(), "Second".to_string()]
    );
    assert_eq!(
        reopened.shared_strings().unwrap().read().text(1).as_deref(),
        Some("second")
    );
}

#[test]
fn empty_password_writes_a_plain_container() {
    let bytes = Document::new()
        .write_to_buffer(&fast_password(""))
        .unwrap();
    assert!(bytes.starts_with(b"PK"));
    assert!(!sheetpack_crypto::is_encrypted_ooxml_ole(&bytes));
    Document::from_bytes(&bytes, &fast_password("")).unwrap();
}

/// Spill source that counts how often it has been released.
struct Tracked {
    bytes: Vec<u8>,
    released: Arc<AtomicUsize>,
}

impl SpillSource for Tracked {
    fn reader(&mut self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.bytes.as_slice()))
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn spills_shadow_the_store_for_one_write() {
    let doc = Document::new();
    let released = Arc::new(AtomicUsize::new(0));
    doc.register_spill(
        "xl/worksheets/sheet1.xml",
        Box::new(Tracked {
            bytes: b"<worksheet/>".to_vec(),
            released: Arc::clone(&released),
        }),
    );
    assert!(doc.has_spill("xl/worksheets/sheet1.xml"));

    let first = doc.write_to_buffer(&Options::default()).unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert!(!doc.has_spill("xl/worksheets/sheet1.xml"));
    assert_eq!(entry(&first, "xl/worksheets/sheet1.xml"), b"<worksheet/>");
    let names = entry_names(&first);
    assert_eq!(
        names
            .iter()
            .filter(|n| n.as_str() == "xl/worksheets/sheet1.xml")
            .count(),
        1
    );

    let second = doc.write_to_buffer(&Options::default()).unwrap();
    assert_ne!(entry(&second, "xl/worksheets/sheet1.xml"), b"<worksheet/>");
}

#[test]
fn spills_are_released_when_the_write_fails() {
    struct FailingSink;
    impl Write for FailingSink {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let doc = Document::new();
    let released = Arc::new(AtomicUsize::new(0));
    for path in ["xl/a.xml", "xl/b.xml"] {
        doc.register_spill(
            path,
            Box::new(Tracked {
                bytes: vec![b'x'; 64 * 1024],
                released: Arc::clone(&released),
            }),
        );
    }

    let err = doc.write(FailingSink, &Options::default()).unwrap_err();
    assert!(matches!(err, PackageError::Io(_) | PackageError::Zip(_)));
    assert_eq!(released.load(Ordering::SeqCst), 2);

    let bytes = doc.write_to_buffer(&Options::default()).unwrap();
    assert!(!entry_names(&bytes).contains(&"xl/a.xml".to_string()));
}

#[test]
fn encrypted_buffers_decrypt_to_the_same_parts() {
    let doc = Document::new();
    doc.worksheet_by_name("Sheet1")
        .unwrap()
        .write()
        .set_cell("A1", CellValue::Number(7.0))
        .unwrap();

    let plain = doc.write_to_buffer(&Options::default()).unwrap();
    let encrypted = doc.write_to_buffer(&fast_password("s3cret")).unwrap();
    assert!(!encrypted.starts_with(b"PK"));
    assert!(sheetpack_crypto::is_encrypted_ooxml_ole(&encrypted));

    let zip = sheetpack_crypto::decrypt_encrypted_package_ole(&encrypted, "s3cret").unwrap();
    assert_eq!(entry_names(&zip), entry_names(&plain));

    let reopened = Document::from_bytes(&encrypted, &fast_password("s3cret")).unwrap();
    assert_eq!(
        reopened
            .worksheet_by_name("Sheet1")
            .unwrap()
            .read()
            .cell("A1")
            .unwrap()
            .value,
        CellValue::Number(7.0)
    );

    assert!(matches!(
        Document::from_bytes(&encrypted, &Options::default()),
        Err(PackageError::PasswordRequired)
    ));
    assert!(matches!(
        Document::from_bytes(&encrypted, &fast_password("wrong")),
        Err(PackageError::Encryption(_))
    ));
}

#[test]
fn encode_failures_abort_the_write() {
    let doc = Document::new();
    doc.worksheet_by_name("Sheet1")
        .unwrap()
        .write()
        .set_cell("A1", CellValue::Number(f64::INFINITY))
        .unwrap();
    let mut out = Vec::new();
    let err = doc.write(&mut out, &Options::default()).unwrap_err();
    assert!(matches!(err, PackageError::EncodePart { .. }));
    assert!(out.is_empty());
}

#[test]
fn concurrent_readers_share_models() {
    let doc = Document::new();
    let handles: Vec<_> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| doc.worksheet_by_name("Sheet1").unwrap()))
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });
    for handle in &handles[1..] {
        assert!(handle.ptr_eq(&handles[0]));
    }
}
