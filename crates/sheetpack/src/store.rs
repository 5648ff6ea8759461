//! The virtual package: part path -> content.

use std::sync::Arc;

use dashmap::DashMap;

use crate::parts::PartModel;

/// What the store holds for one part path.
#[derive(Debug, Clone)]
pub enum PartContent {
    /// Bytes emitted verbatim.
    Raw(Arc<[u8]>),
    /// A decoded model plus the bytes produced by the last commit.
    ///
    /// `encoded` is `None` when nothing should be emitted: the model was created empty and never
    /// committed, or it is an optional part whose model is empty.
    Decoded {
        model: PartModel,
        encoded: Option<Arc<[u8]>>,
    },
}

impl PartContent {
    /// Bytes the assembler writes for this part, if any.
    pub fn emitted_bytes(&self) -> Option<&Arc<[u8]>> {
        match self {
            PartContent::Raw(bytes) => Some(bytes),
            PartContent::Decoded { encoded, .. } => encoded.as_ref(),
        }
    }

    pub fn model(&self) -> Option<&PartModel> {
        match self {
            PartContent::Raw(_) => None,
            PartContent::Decoded { model, .. } => Some(model),
        }
    }
}

/// Concurrent map from part path to [`PartContent`].
///
/// Paths are case-sensitive and carry no leading `/`. Writes to distinct paths do not contend;
/// writes to the same path are linearized by the owning shard.
#[derive(Debug, Default)]
pub struct PackageStore {
    parts: DashMap<String, PartContent>,
}

impl PackageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the content at `path`.
    pub fn put(&self, path: impl Into<String>, content: PartContent) {
        self.parts.insert(path.into(), content);
    }

    pub fn put_bytes(&self, path: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.put(path, PartContent::Raw(bytes.into()));
    }

    pub fn get(&self, path: &str) -> Option<PartContent> {
        self.parts.get(path).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, path: &str) -> Option<PartContent> {
        self.parts.remove(path).map(|(_, content)| content)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.parts.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Visit every entry in unspecified order.
    ///
    /// Each visit holds its shard's read lock, so `visit` must not write to the store.
    pub fn for_each(&self, mut visit: impl FnMut(&str, &PartContent)) {
        for entry in self.parts.iter() {
            visit(entry.key(), entry.value());
        }
    }

    /// All part paths, sorted.
    pub fn part_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.parts.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Sorted snapshot of every part that has bytes to emit.
    pub fn emitted_parts(&self) -> Vec<(String, Arc<[u8]>)> {
        let mut out: Vec<(String, Arc<[u8]>)> = self
            .parts
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .emitted_bytes()
                    .map(|bytes| (entry.key().clone(), Arc::clone(bytes)))
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub(crate) fn parts(&self) -> &DashMap<String, PartContent> {
        &self.parts
    }
}
