//! Decode-once access to structured parts.
//!
//! A part's raw bytes are decoded the first time any caller asks for its model. Decoding happens
//! while holding the store's entry lock for that path, so concurrent first readers see one decode
//! and share the resulting handle.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;

use crate::error::{PackageError, Result};
use crate::parts::{ModelSlot, PartHandle, PartModel};
use crate::store::{PackageStore, PartContent};

pub(crate) fn load<T: ModelSlot>(store: &PackageStore, path: &str) -> Result<PartHandle<T>> {
    // Fast path: already decoded. The shard guard is released before `entry` below.
    if let Some(existing) = store.parts().get(path) {
        if let PartContent::Decoded { model, .. } = existing.value() {
            return handle_of::<T>(path, model);
        }
    }

    match store.parts().entry(path.to_string()) {
        Entry::Occupied(mut occupied) => {
            let raw = match occupied.get() {
                PartContent::Decoded { model, .. } => return handle_of::<T>(path, model),
                PartContent::Raw(bytes) => Arc::clone(bytes),
            };
            let model = T::decode(&raw).map_err(|source| PackageError::MalformedPart {
                path: path.to_string(),
                kind: T::KIND,
                source,
            })?;
            log::trace!("decoded {} part {path} ({} bytes)", T::KIND, raw.len());

            let handle = PartHandle::new(model);
            occupied.insert(PartContent::Decoded {
                model: T::into_model(handle.clone()),
                encoded: Some(raw),
            });
            Ok(handle)
        }
        Entry::Vacant(vacant) => {
            log::trace!("creating empty {} part {path}", T::KIND);
            let handle = PartHandle::new(T::default());
            vacant.insert(PartContent::Decoded {
                model: T::into_model(handle.clone()),
                encoded: None,
            });
            Ok(handle)
        }
    }
}

fn handle_of<T: ModelSlot>(path: &str, model: &PartModel) -> Result<PartHandle<T>> {
    T::from_model(model).ok_or_else(|| PackageError::PartKindMismatch {
        path: path.to_string(),
        loaded: model.kind(),
        requested: T::KIND,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parts::{PartKind, SharedStrings, Workbook, Worksheet};

    const SST: &[u8] = br#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="1" uniqueCount="1"><si><t>hello</t></si></sst>"#;

    #[test]
    fn decodes_raw_bytes_once_and_memoizes() {
        let store = PackageStore::new();
        store.put_bytes("xl/sharedStrings.xml", SST);

        let first = load::<SharedStrings>(&store, "xl/sharedStrings.xml").unwrap();
        let second = load::<SharedStrings>(&store, "xl/sharedStrings.xml").unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(first.read().text(0).as_deref(), Some("hello"));

        // The decoded entry still carries the loaded bytes until the next commit.
        let content = store.get("xl/sharedStrings.xml").unwrap();
        assert_eq!(&content.emitted_bytes().unwrap()[..], SST);
    }

    #[test]
    fn missing_part_yields_memoized_default() {
        let store = PackageStore::new();
        let handle = load::<SharedStrings>(&store, "xl/sharedStrings.xml").unwrap();
        assert!(handle.read().is_empty());
        assert!(store.contains("xl/sharedStrings.xml"));
        assert!(store
            .get("xl/sharedStrings.xml")
            .unwrap()
            .emitted_bytes()
            .is_none());
        let again = load::<SharedStrings>(&store, "xl/sharedStrings.xml").unwrap();
        assert!(handle.ptr_eq(&again));
    }

    #[test]
    fn malformed_bytes_are_an_error_not_a_default() {
        let store = PackageStore::new();
        store.put_bytes("xl/workbook.xml", b"<workbook><sheets>".as_slice());
        let err = load::<Workbook>(&store, "xl/workbook.xml").unwrap_err();
        assert!(matches!(
            err,
            PackageError::MalformedPart { ref path, kind: PartKind::Workbook, .. } if path == "xl/workbook.xml"
        ));
        // The raw bytes are left in place.
        assert!(store.get("xl/workbook.xml").unwrap().model().is_none());
    }

    #[test]
    fn loading_a_path_as_another_kind_fails() {
        let store = PackageStore::new();
        load::<Worksheet>(&store, "xl/worksheets/sheet1.xml").unwrap();
        let err = load::<Workbook>(&store, "xl/worksheets/sheet1.xml").unwrap_err();
        assert!(matches!(
            err,
            PackageError::PartKindMismatch {
                loaded: PartKind::Worksheet,
                requested: PartKind::Workbook,
                ..
            }
        ));
    }

    #[test]
    fn concurrent_first_readers_share_one_model() {
        let store = PackageStore::new();
        store.put_bytes("xl/sharedStrings.xml", SST);

        let handles: Vec<PartHandle<SharedStrings>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| load::<SharedStrings>(&store, "xl/sharedStrings.xml")))
                .collect();
            workers
                .into_iter()
                .map(|w| w.join().unwrap().unwrap())
                .collect()
        });
        for handle in &handles[1..] {
            assert!(handle.ptr_eq(&handles[0]));
        }
    }
}
