//! Re-encodes loaded part models back into store bytes before a write.

use std::sync::Arc;

use crate::error::{PackageError, Result};
use crate::parts::{PartKind, PartModel};
use crate::store::{PackageStore, PartContent};

/// Run every per-kind writer in [`PartKind::COMMIT_ORDER`], stopping at the first failure.
pub(crate) fn commit(store: &PackageStore) -> Result<()> {
    let mut total = 0;
    for kind in PartKind::COMMIT_ORDER {
        total += commit_kind(store, kind)?;
    }
    log::debug!("committed {total} decoded parts");
    Ok(())
}

/// Re-encode every loaded model of `kind` and store the bytes beside it.
///
/// Optional parts whose model is empty store `None`, so stale bytes from the loaded container
/// are not emitted. Kinds with no loaded model are a no-op.
///
/// Models are encoded from a snapshot of their handles, so no store shard is locked while a
/// model's read lock is taken. A part replaced in the meantime keeps its new content.
pub(crate) fn commit_kind(store: &PackageStore, kind: PartKind) -> Result<usize> {
    let models: Vec<(String, PartModel)> = store
        .parts()
        .iter()
        .filter_map(|entry| match entry.value() {
            PartContent::Decoded { model, .. } if model.kind() == kind => {
                Some((entry.key().clone(), model.clone()))
            }
            _ => None,
        })
        .collect();

    let mut count = 0;
    for (path, model) in &models {
        let bytes = model.encode().map_err(|source| PackageError::EncodePart {
            path: path.clone(),
            kind,
            source,
        })?;
        log::trace!(
            "encoded {kind} part {path}: {}",
            bytes
                .as_ref()
                .map(|b| format!("{} bytes", b.len()))
                .unwrap_or_else(|| "omitted".to_string())
        );
        let Some(mut entry) = store.parts().get_mut(path) else {
            continue;
        };
        if let PartContent::Decoded {
            model: current,
            encoded,
        } = entry.value_mut()
        {
            if current.same_handle(model) {
                *encoded = bytes.map(Arc::from);
                count += 1;
            }
        }
    }
    Ok(count)
}
