//! Immutable workspace snapshot.
//!
//! A snapshot is never mutated once built. Every content change produces a
//! new snapshot with a higher revision; requests that were admitted against
//! an older snapshot keep reading it undisturbed.

use crate::document::Document;
use lsp_types::Uri;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An immutable view of every tracked document.
#[derive(Debug, Clone, Default)]
#[allow(clippy::mutable_key_type)] // Uri hashes by its string form
pub struct Snapshot {
    /// Monotonic revision, bumped by every derived snapshot.
    revision: u64,
    /// Workspace root the documents were loaded from.
    root: Option<PathBuf>,
    /// Source documents by URI.
    documents: HashMap<Uri, Arc<Document>>,
    /// Synthetic documents produced by metadata decompilation.
    metadata: HashMap<Uri, Arc<Document>>,
}

impl Snapshot {
    /// Create an empty snapshot at revision zero.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The snapshot revision.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The workspace root, if a workspace has been loaded.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Look up a document, falling back to the metadata cache.
    pub fn document(&self, uri: &Uri) -> Option<&Arc<Document>> {
        self.documents
            .get(uri)
            .or_else(|| self.metadata.get(uri))
    }

    /// Look up a decompiled metadata document.
    pub fn metadata_document(&self, uri: &Uri) -> Option<&Arc<Document>> {
        self.metadata.get(uri)
    }

    /// Whether a source document with this URI is tracked.
    pub fn contains(&self, uri: &Uri) -> bool {
        self.documents.contains_key(uri)
    }

    /// Iterate over source documents, ordered by URI.
    pub fn documents(&self) -> impl Iterator<Item = (&Uri, &Arc<Document>)> {
        let mut documents: Vec<_> = self.documents.iter().collect();
        documents.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        documents.into_iter()
    }

    /// Number of source documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the snapshot tracks no source documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Derive a snapshot with `document` added or replaced.
    pub fn with_document(&self, uri: Uri, document: Document) -> Self {
        let mut next = self.successor();
        next.documents.insert(uri, Arc::new(document));
        next
    }

    /// Derive a snapshot without the given document.
    pub fn without_document(&self, uri: &Uri) -> Self {
        let mut next = self.successor();
        next.documents.remove(uri);
        next
    }

    /// Derive a snapshot with a decompiled metadata document cached.
    pub fn with_metadata(&self, uri: Uri, document: Document) -> Self {
        let mut next = self.successor();
        next.metadata.insert(uri, Arc::new(document));
        next
    }

    /// Derive a snapshot whose source documents are replaced wholesale.
    ///
    /// The metadata cache survives a workspace reload.
    #[allow(clippy::mutable_key_type)]
    pub fn with_workspace(&self, root: Option<PathBuf>, documents: HashMap<Uri, Document>) -> Self {
        let mut next = self.successor();
        next.root = root;
        next.documents = documents
            .into_iter()
            .map(|(uri, doc)| (uri, Arc::new(doc)))
            .collect();
        next
    }

    fn successor(&self) -> Self {
        Self {
            revision: self.revision + 1,
            root: self.root.clone(),
            documents: self.documents.clone(),
            metadata: self.metadata.clone(),
        }
    }
}
