//! Cache module
//!
//! Reads the game cache: a single data file holding every logical file as
//! a chain of fixed-size blocks, plus one index file per channel mapping
//! file ids to chains. Retrieved files are wrapped in a compression
//! [`Container`], and channel 255 holds a [`ReferenceTable`] for every
//! other channel describing its archives.
//!
//! ## Cache File Structure
//!
//! The Jagex cache consists of:
//! - `main_file_cache.dat2` - The data file containing all block chains
//! - `main_file_cache.idx0` through `main_file_cache.idx254` - Index files for each channel
//! - `main_file_cache.idx255` - The master index holding the reference tables
//!
//! The number of usable channels is the number of records in the master
//! index. Ordinary index files may be missing; such channels are simply
//! unavailable.
//!
//! Reading is synchronous and needs exclusive access to the file handles,
//! so [`CacheStore::read`] takes `&mut self`. Use [`SharedCacheStore`] to
//! share one store between threads.

pub mod chain;
pub mod checksum;
pub mod container;
pub mod index;
pub mod reference_table;
pub mod shared;

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::{OpenError, ReadError, Result, RustscapeError};

pub use chain::{BlockChainReader, BlockHeader, BlockWidth, BLOCK_SIZE};
pub use checksum::ChecksumTable;
pub use container::{CompressionType, Container};
pub use index::{IndexEntry, IndexFile, INDEX_ENTRY_SIZE};
pub use reference_table::{Archive, ArchiveFile, ReferenceTable, TableFlags};
pub use shared::SharedCacheStore;

/// Default name of the data file
pub const DATA_FILE_NAME: &str = "main_file_cache.dat2";

/// Default prefix of the index file names
pub const INDEX_FILE_PREFIX: &str = "main_file_cache.idx";

/// Channel holding the reference tables
pub const MASTER_CHANNEL: u8 = 255;

/// Cache store reading files out of the data file
pub struct CacheStore {
    /// Configuration the store was opened with
    config: CacheConfig,
    /// Block chain walker over the data file
    data: BlockChainReader<File>,
    /// Master index (channel 255)
    master: IndexFile,
    /// Ordinary index files that exist on disk
    indices: BTreeMap<u8, IndexFile>,
    /// Number of channels named by the master index
    channel_count: usize,
}

impl CacheStore {
    /// Open the cache in `path` with the default file names
    pub fn open(path: impl AsRef<Path>) -> std::result::Result<Self, OpenError> {
        Self::open_with(&CacheConfig::for_path(path.as_ref()))
    }

    /// Open the cache described by `config`
    pub fn open_with(config: &CacheConfig) -> std::result::Result<Self, OpenError> {
        info!(path = %config.cache_path.display(), "Opening cache store");

        let data_file = open_file(&config.data_path())?;

        let master_path = config.index_path(MASTER_CHANNEL);
        let master = open_file(&master_path).and_then(|file| {
            IndexFile::from_file(MASTER_CHANNEL, file).map_err(|source| OpenError::Io {
                path: master_path.clone(),
                source,
            })
        })?;

        // Channel 255 is never an ordinary channel, whatever the master index says.
        let channel_count = (master.file_count() as usize).min(usize::from(MASTER_CHANNEL));
        debug!("Found {} channels in master index", channel_count);

        let mut indices = BTreeMap::new();
        for channel in 0..channel_count as u8 {
            let path = config.index_path(channel);
            if !path.is_file() {
                debug!("Channel {} has no index file", channel);
                continue;
            }

            let file = open_file(&path)?;
            let index = IndexFile::from_file(channel, file)
                .map_err(|source| OpenError::Io { path, source })?;
            indices.insert(channel, index);
        }

        if indices.len() < channel_count {
            warn!(
                "{} of {} channels have no index file",
                channel_count - indices.len(),
                channel_count
            );
        }

        info!(
            channels = channel_count,
            opened = indices.len(),
            "Cache store opened"
        );

        Ok(Self {
            config: config.clone(),
            data: BlockChainReader::new(data_file),
            master,
            indices,
            channel_count,
        })
    }

    /// Read the complete logical file `file` of `channel`
    pub fn read(&mut self, channel: u8, file: u32) -> std::result::Result<Vec<u8>, ReadError> {
        let entry = self.index_mut(channel)?.entry(file)?;
        debug!(
            channel,
            file,
            size = entry.size,
            start_block = entry.start_block,
            "Reading file"
        );
        self.data.read(channel, file, entry)
    }

    /// Read and decode the container for `file` of `channel`
    pub fn read_container(&mut self, channel: u8, file: u32) -> Result<Container> {
        let raw = self.read(channel, file)?;
        Ok(Container::decode_with_limit(&raw, self.config.max_container_size)?)
    }

    /// Read and decode the reference table describing `channel`
    pub fn reference_table(&mut self, channel: u8) -> Result<ReferenceTable> {
        let container = self.read_container(MASTER_CHANNEL, u32::from(channel))?;
        Ok(ReferenceTable::decode(&container.data)?)
    }

    /// Read and decode an archive listed in `channel`'s reference table,
    /// checking its CRC when the store is configured to
    pub fn read_archive(&mut self, channel: u8, archive: &Archive) -> Result<Container> {
        let raw = self.read(channel, archive.id)?;
        decode_archive(&self.config, channel, archive, &raw)
    }

    /// Build the checksum table for every channel
    pub fn checksum_table(&mut self) -> ChecksumTable {
        ChecksumTable::build(self)
    }

    /// Look up the index record for `file` of `channel` without reading data
    pub fn entry(&mut self, channel: u8, file: u32) -> std::result::Result<IndexEntry, ReadError> {
        self.index_mut(channel)?.entry(file)
    }

    /// Number of records in `channel`'s index file
    pub fn file_count(&self, channel: u8) -> Option<u32> {
        self.index(channel).map(IndexFile::file_count)
    }

    /// Get the index file for `channel`
    pub fn index(&self, channel: u8) -> Option<&IndexFile> {
        if channel == MASTER_CHANNEL {
            Some(&self.master)
        } else {
            self.indices.get(&channel)
        }
    }

    fn index_mut(&mut self, channel: u8) -> std::result::Result<&mut IndexFile, ReadError> {
        if channel == MASTER_CHANNEL {
            return Ok(&mut self.master);
        }
        self.indices
            .get_mut(&channel)
            .ok_or(ReadError::ChannelNotFound { channel })
    }

    /// Check if `channel` can be read
    pub fn has_channel(&self, channel: u8) -> bool {
        self.index(channel).is_some()
    }

    /// Ordinary channels with an index file, in ascending order
    pub fn channels(&self) -> impl Iterator<Item = u8> + '_ {
        self.indices.keys().copied()
    }

    /// Get the number of channels named by the master index
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Get the cache path
    pub fn path(&self) -> &Path {
        &self.config.cache_path
    }

    /// Get the configuration the store was opened with
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("path", &self.config.cache_path)
            .field("channel_count", &self.channel_count)
            .field("channels", &self.indices.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Open one cache file, distinguishing "missing" from other failures
fn open_file(path: &Path) -> std::result::Result<File, OpenError> {
    if !path.exists() {
        return Err(OpenError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    File::open(path).map_err(|source| OpenError::Io {
        path: PathBuf::from(path),
        source,
    })
}

/// Decode an archive's raw bytes, verifying its CRC if configured
pub(crate) fn decode_archive(
    config: &CacheConfig,
    channel: u8,
    archive: &Archive,
    raw: &[u8],
) -> Result<Container> {
    let container = Container::decode_with_limit(raw, config.max_container_size)?;

    if config.verify_checksums {
        let expected = archive.crc as u32;
        let actual = crc32fast::hash(&raw[..container.encoded_len]);
        if expected != actual {
            return Err(RustscapeError::ChecksumMismatch {
                channel,
                archive: archive.id,
                expected,
                actual,
            });
        }
    }

    Ok(container)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = CacheStore::open(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, OpenError::MissingFile { .. }));
    }

    #[test]
    fn test_open_missing_master_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DATA_FILE_NAME), b"").unwrap();

        match CacheStore::open(dir.path()).unwrap_err() {
            OpenError::MissingFile { path } => {
                assert!(path.ends_with("main_file_cache.idx255"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sparse_channels() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DATA_FILE_NAME), b"").unwrap();
        std::fs::write(dir.path().join("main_file_cache.idx255"), [0u8; 18]).unwrap();
        std::fs::write(dir.path().join("main_file_cache.idx2"), b"").unwrap();
        // Beyond the master index's record count, so never opened
        std::fs::write(dir.path().join("main_file_cache.idx3"), b"").unwrap();

        let mut store = CacheStore::open(dir.path()).unwrap();
        assert_eq!(store.channel_count(), 3);
        assert_eq!(store.channels().collect::<Vec<_>>(), vec![2]);
        assert!(store.has_channel(2));
        assert!(store.has_channel(MASTER_CHANNEL));
        assert!(!store.has_channel(0));
        assert!(!store.has_channel(3));

        assert!(matches!(
            store.read(0, 0).unwrap_err(),
            ReadError::ChannelNotFound { channel: 0 }
        ));
        assert!(matches!(
            store.read(2, 0).unwrap_err(),
            ReadError::EntryNotFound { channel: 2, file: 0 }
        ));
        assert_eq!(store.file_count(MASTER_CHANNEL), Some(3));
    }

    #[test]
    fn test_verify_checksum() {
        let mut raw = vec![0u8];
        raw.extend_from_slice(&3u32.to_be_bytes());
        raw.extend_from_slice(&[1, 2, 3]);
        let crc = crc32fast::hash(&raw) as i32;
        // Trailing version is not covered by the CRC
        raw.extend_from_slice(&[0, 9]);

        let mut config = CacheConfig::default();
        config.verify_checksums = true;

        let archive = Archive {
            id: 4,
            name_hash: None,
            crc,
            version: 0,
            whirlpool: None,
            files: Vec::new(),
        };
        let container = decode_archive(&config, 1, &archive, &raw).unwrap();
        assert_eq!(&container.data[..], &[1, 2, 3]);

        let bad = Archive {
            crc: crc.wrapping_add(1),
            ..archive
        };
        assert!(matches!(
            decode_archive(&config, 1, &bad, &raw).unwrap_err(),
            RustscapeError::ChecksumMismatch {
                channel: 1,
                archive: 4,
                ..
            }
        ));

        config.verify_checksums = false;
        assert!(decode_archive(&config, 1, &bad, &raw).is_ok());
    }
}
