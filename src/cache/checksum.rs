//! Checksum table
//!
//! Summarises every channel as a `(crc, version)` pair: the CRC-32 of the
//! channel's raw reference table record in the master channel, and the
//! version decoded from that table. Clients compare it against their own
//! copy to decide which reference tables to refetch.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, info};

use super::container::Container;
use super::reference_table::ReferenceTable;
use super::{CacheStore, MASTER_CHANNEL};
use crate::error::{ReadError, Result};

/// Checksum of one channel's reference table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelChecksum {
    pub crc: u32,
    pub version: u32,
}

/// Checksums for channels `0..channel_count`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumTable {
    pub entries: Vec<ChannelChecksum>,
}

impl ChecksumTable {
    /// Build the table from every reference table in `store`
    pub fn build(store: &mut CacheStore) -> Self {
        let channel_count = store.channel_count();
        let max_container_size = store.config().max_container_size;
        Self::from_records(channel_count, max_container_size, |channel| {
            store.read(MASTER_CHANNEL, u32::from(channel))
        })
    }

    /// Build the table from master records fetched one channel at a time
    ///
    /// Only `read_record` touches the store; decoding happens after it
    /// returns.
    pub(crate) fn from_records<F>(
        channel_count: usize,
        max_container_size: usize,
        mut read_record: F,
    ) -> Self
    where
        F: FnMut(u8) -> std::result::Result<Vec<u8>, ReadError>,
    {
        let mut entries = Vec::with_capacity(channel_count);

        for channel in 0..channel_count as u8 {
            let raw = match read_record(channel) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!("No reference table for channel {}: {}", channel, e);
                    entries.push(ChannelChecksum::default());
                    continue;
                }
            };

            entries.push(Self::checksum(channel, &raw, max_container_size));
        }

        info!("Generated checksum table with {} entries", entries.len());
        Self { entries }
    }

    /// Checksum one raw reference table record
    fn checksum(channel: u8, raw: &[u8], max_container_size: usize) -> ChannelChecksum {
        match decode_table(raw, max_container_size) {
            Ok(table) => ChannelChecksum {
                crc: crc32fast::hash(raw),
                version: table.version as u32,
            },
            Err(e) => {
                debug!("Undecodable reference table for channel {}: {}", channel, e);
                ChannelChecksum::default()
            }
        }
    }

    /// Get the checksum for `channel`
    pub fn get(&self, channel: u8) -> Option<&ChannelChecksum> {
        self.entries.get(usize::from(channel))
    }

    /// Number of channels in the table
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialise as `crc:u32 | version:u32` per channel, big-endian
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.entries.len() * 8);
        for entry in &self.entries {
            buf.put_u32(entry.crc);
            buf.put_u32(entry.version);
        }
        buf.freeze()
    }
}

fn decode_table(raw: &[u8], max_container_size: usize) -> Result<ReferenceTable> {
    let container = Container::decode_with_limit(raw, max_container_size)?;
    Ok(ReferenceTable::decode(&container.data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_of_valid_table() {
        // format 6, version 77, no flags, no archives
        let table = [6u8, 0, 0, 0, 77, 0, 0, 0];
        let mut raw = vec![0u8];
        raw.extend_from_slice(&(table.len() as u32).to_be_bytes());
        raw.extend_from_slice(&table);

        let checksum = ChecksumTable::checksum(0, &raw, 1024);
        assert_eq!(checksum.version, 77);
        assert_eq!(checksum.crc, crc32fast::hash(&raw));
    }

    #[test]
    fn test_checksum_of_garbage() {
        assert_eq!(
            ChecksumTable::checksum(0, &[9, 9, 9], 1024),
            ChannelChecksum::default()
        );
    }

    #[test]
    fn test_from_records() {
        let table = [6u8, 0, 0, 0, 12, 0, 0, 0];
        let mut raw = vec![0u8];
        raw.extend_from_slice(&(table.len() as u32).to_be_bytes());
        raw.extend_from_slice(&table);

        let mut requested = Vec::new();
        let checksums = ChecksumTable::from_records(3, 1024, |channel| {
            requested.push(channel);
            match channel {
                1 => Ok(raw.clone()),
                _ => Err(ReadError::EntryNotFound {
                    channel: MASTER_CHANNEL,
                    file: u32::from(channel),
                }),
            }
        });

        assert_eq!(requested, vec![0, 1, 2]);
        assert_eq!(checksums.len(), 3);
        assert_eq!(checksums.get(0), Some(&ChannelChecksum::default()));
        assert_eq!(checksums.get(1).unwrap().version, 12);
        assert_eq!(checksums.get(1).unwrap().crc, crc32fast::hash(&raw));
    }

    #[test]
    fn test_encode() {
        let table = ChecksumTable {
            entries: vec![
                ChannelChecksum {
                    crc: 0x0102_0304,
                    version: 5,
                },
                ChannelChecksum::default(),
            ],
        };
        assert_eq!(table.len(), 2);
        assert_eq!(
            &table.encode()[..],
            &[1, 2, 3, 4, 0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(table.get(0).unwrap().version, 5);
        assert!(table.get(2).is_none());
    }
}
