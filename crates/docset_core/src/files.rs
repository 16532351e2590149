//! Keyed binary file storage.

use crate::entity::EntityKey;
use crate::error::{DalError, DalResult, Operation};
use docset_store::{canonical_key, DocumentStore};
use std::io::{Read, Write};
use std::sync::Arc;

/// Binary files stored under entity-style keys.
///
/// A file set is a thin veneer over the store's blob interface: content is
/// opaque, storing under an existing key replaces the previous content,
/// and no access observers apply.
#[derive(Clone)]
pub struct FileSet {
    store: Arc<dyn DocumentStore>,
    name: String,
}

impl FileSet {
    pub(crate) fn new(store: Arc<dyn DocumentStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// The file-set name, used to namespace blob keys.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn blob_key<K: EntityKey>(&self, id: &K) -> String {
        format!("{}/{}", self.name, canonical_key(&id.to_value()))
    }

    /// Stores `data` under `id`, replacing any previous content.
    pub fn store<K: EntityKey>(&self, id: &K, data: Vec<u8>) -> DalResult<()> {
        if id.is_unset() {
            return Err(DalError::null_identity(Operation::Add));
        }
        self.store
            .put_blob(&self.blob_key(id), data)
            .map_err(|e| DalError::from_store(Operation::Add, e))
    }

    /// Reads `reader` to its end and stores the content under `id`.
    pub fn store_from<K: EntityKey>(&self, id: &K, reader: &mut dyn Read) -> DalResult<()> {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| DalError::store_failure(Operation::Add, e.to_string()))?;
        self.store(id, data)
    }

    /// Retrieves the content stored under `id`.
    pub fn retrieve<K: EntityKey>(&self, id: &K) -> DalResult<Option<Vec<u8>>> {
        self.store
            .get_blob(&self.blob_key(id))
            .map_err(|e| DalError::from_store(Operation::Get, e))
    }

    /// Writes the content stored under `id` into `writer`.
    ///
    /// Returns false when no content is stored under `id`.
    pub fn retrieve_into<K: EntityKey>(&self, id: &K, writer: &mut dyn Write) -> DalResult<bool> {
        let Some(data) = self.retrieve(id)? else {
            return Ok(false);
        };
        writer
            .write_all(&data)
            .map_err(|e| DalError::store_failure(Operation::Get, e.to_string()))?;
        Ok(true)
    }

    /// Returns true if content is stored under `id`, without fetching it.
    pub fn exists<K: EntityKey>(&self, id: &K) -> DalResult<bool> {
        self.store
            .blob_exists(&self.blob_key(id))
            .map_err(|e| DalError::from_store(Operation::Get, e))
    }

    /// Deletes the content stored under `id`. Missing content is a no-op.
    pub fn delete<K: EntityKey>(&self, id: &K) -> DalResult<()> {
        self.store
            .delete_blob(&self.blob_key(id))
            .map_err(|e| DalError::from_store(Operation::Delete, e))
    }
}
