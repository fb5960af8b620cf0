//! Thread-safe cache store
//!
//! [`CacheStore`] seeks and reads shared file handles, so it can only serve
//! one read at a time. [`SharedCacheStore`] guards it with a mutex held
//! only for the block chain walk; decompression and table decoding happen
//! after the lock is released so several threads can decode in parallel.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use super::checksum::ChecksumTable;
use super::container::Container;
use super::reference_table::{Archive, ReferenceTable};
use super::{decode_archive, CacheStore, MASTER_CHANNEL};
use crate::config::CacheConfig;
use crate::error::{OpenError, ReadError, Result};

/// Cloneable, `Send + Sync` handle to a [`CacheStore`]
#[derive(Debug, Clone)]
pub struct SharedCacheStore {
    store: Arc<Mutex<CacheStore>>,
    config: Arc<CacheConfig>,
}

impl SharedCacheStore {
    /// Wrap an opened store
    pub fn new(store: CacheStore) -> Self {
        let config = Arc::new(store.config().clone());
        Self {
            store: Arc::new(Mutex::new(store)),
            config,
        }
    }

    /// Open the cache in `path` with the default file names
    pub fn open(path: impl AsRef<Path>) -> std::result::Result<Self, OpenError> {
        CacheStore::open(path).map(Self::new)
    }

    /// Open the cache described by `config`
    pub fn open_with(config: &CacheConfig) -> std::result::Result<Self, OpenError> {
        CacheStore::open_with(config).map(Self::new)
    }

    /// Read the complete logical file `file` of `channel`
    pub fn read(&self, channel: u8, file: u32) -> std::result::Result<Vec<u8>, ReadError> {
        self.store.lock().read(channel, file)
    }

    /// Read and decode the container for `file` of `channel`
    pub fn read_container(&self, channel: u8, file: u32) -> Result<Container> {
        let raw = self.read(channel, file)?;
        Ok(Container::decode_with_limit(&raw, self.config.max_container_size)?)
    }

    /// Read and decode the reference table describing `channel`
    pub fn reference_table(&self, channel: u8) -> Result<ReferenceTable> {
        let container = self.read_container(MASTER_CHANNEL, u32::from(channel))?;
        Ok(ReferenceTable::decode(&container.data)?)
    }

    /// Read and decode an archive, checking its CRC when configured to
    pub fn read_archive(&self, channel: u8, archive: &Archive) -> Result<Container> {
        let raw = self.read(channel, archive.id)?;
        decode_archive(&self.config, channel, archive, &raw)
    }

    /// Build the checksum table for every channel
    ///
    /// The lock is taken once per master record, so other readers can
    /// interleave with a long build.
    pub fn checksum_table(&self) -> ChecksumTable {
        let channel_count = self.channel_count();
        ChecksumTable::from_records(channel_count, self.config.max_container_size, |channel| {
            self.read(MASTER_CHANNEL, u32::from(channel))
        })
    }

    /// Get the number of channels named by the master index
    pub fn channel_count(&self) -> usize {
        self.store.lock().channel_count()
    }

    /// Ordinary channels with an index file, in ascending order
    pub fn channels(&self) -> Vec<u8> {
        self.store.lock().channels().collect()
    }

    /// Check if `channel` can be read
    pub fn has_channel(&self, channel: u8) -> bool {
        self.store.lock().has_channel(channel)
    }

    /// Number of records in `channel`'s index file
    pub fn file_count(&self, channel: u8) -> Option<u32> {
        self.store.lock().file_count(channel)
    }

    /// Get the configuration the store was opened with
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl From<CacheStore> for SharedCacheStore {
    fn from(store: CacheStore) -> Self {
        Self::new(store)
    }
}
