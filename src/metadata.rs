use crate::error::{Error, Result};
use crate::model::Metadata;
use crate::store::ObjectStore;
use crate::uri::StoreUri;
use tracing::debug;

/// Reads and writes the dataset's metadata document.
pub struct MetadataStore<'a> {
    store: &'a dyn ObjectStore,
    uri: &'a StoreUri,
}

impl<'a> MetadataStore<'a> {
    pub fn new(store: &'a dyn ObjectStore, uri: &'a StoreUri) -> Self {
        Self { store, uri }
    }

    /// `None` when the dataset has no metadata document.
    pub fn read(&self) -> Result<Option<Metadata>> {
        let key = self.uri.metadata_key();
        let Some(data) = self
            .store
            .get(&key)
            .map_err(|e| Error::Metadata(format!("cannot read {key}: {e}")))?
        else {
            return Ok(None);
        };
        let metadata = Metadata::from_json(&data)
            .map_err(|e| Error::Metadata(format!("{key} is not a valid metadata document: {e}")))?;
        debug!(key = %key, splits = metadata.splits.len(), "metadata loaded");
        Ok(Some(metadata))
    }

    /// Like [`read`](Self::read) but a missing document is an error.
    pub fn require(&self) -> Result<Metadata> {
        self.read()?.ok_or_else(|| {
            Error::Metadata(format!("metadata file not found at {}", self.uri))
        })
    }

    /// Overwrite the document; last writer wins.
    pub fn write(&self, metadata: &Metadata) -> Result<()> {
        let key = self.uri.metadata_key();
        let data = metadata.to_json()?;
        self.store
            .put(&key, &data)
            .map_err(|e| Error::Metadata(format!("metadata upload to {key} failed: {e}")))?;
        debug!(key = %key, bytes = data.len(), "metadata written");
        Ok(())
    }
}
