//! Index files
//!
//! Each channel has an index file of fixed 6-byte records, one per file id:
//! - Bytes 0-2: File size (24-bit big-endian)
//! - Bytes 3-5: Starting block (24-bit big-endian)

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use crate::error::ReadError;

/// Size of each index entry
pub const INDEX_ENTRY_SIZE: usize = 6;

/// One decoded index record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Logical file size in bytes
    pub size: u32,
    /// First block of the chain in the data file
    pub start_block: u32,
}

impl IndexEntry {
    /// Decode an entry from its 6-byte record
    pub fn decode(record: &[u8; INDEX_ENTRY_SIZE]) -> Self {
        let size = u32::from_be_bytes([0, record[0], record[1], record[2]]);
        let start_block = u32::from_be_bytes([0, record[3], record[4], record[5]]);
        Self { size, start_block }
    }
}

/// An open index file for one channel
#[derive(Debug)]
pub struct IndexFile<R = File> {
    channel: u8,
    reader: R,
    len: u64,
}

impl IndexFile<File> {
    /// Wrap an opened index file
    pub fn from_file(channel: u8, file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            channel,
            reader: file,
            len,
        })
    }
}

impl<R: Read + Seek> IndexFile<R> {
    /// Wrap any seekable reader, measuring its length
    pub fn new(channel: u8, mut reader: R) -> io::Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        Ok(Self {
            channel,
            reader,
            len,
        })
    }

    /// The channel this index belongs to
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Number of complete records in the file
    pub fn file_count(&self) -> u32 {
        (self.len / INDEX_ENTRY_SIZE as u64) as u32
    }

    /// Read the record for `file`
    pub fn entry(&mut self, file: u32) -> Result<IndexEntry, ReadError> {
        let offset = u64::from(file) * INDEX_ENTRY_SIZE as u64;
        let not_found = ReadError::EntryNotFound {
            channel: self.channel,
            file,
        };

        if offset + INDEX_ENTRY_SIZE as u64 > self.len {
            return Err(not_found);
        }

        self.reader.seek(SeekFrom::Start(offset))?;

        let mut record = [0u8; INDEX_ENTRY_SIZE];
        match self.reader.read_exact(&mut record) {
            Ok(()) => Ok(IndexEntry::decode(&record)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(not_found),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn index(records: &[(u32, u32)]) -> IndexFile<Cursor<Vec<u8>>> {
        let mut data = Vec::new();
        for &(size, block) in records {
            data.extend_from_slice(&size.to_be_bytes()[1..]);
            data.extend_from_slice(&block.to_be_bytes()[1..]);
        }
        IndexFile::new(3, Cursor::new(data)).unwrap()
    }

    #[test]
    fn test_decode_entry() {
        let entry = IndexEntry::decode(&[0x01, 0x02, 0x03, 0xFF, 0x00, 0x10]);
        assert_eq!(entry.size, 0x01_0203);
        assert_eq!(entry.start_block, 0xFF_0010);
    }

    #[test]
    fn test_entry_lookup() {
        let mut idx = index(&[(100, 1), (0, 0), (1024, 7)]);
        assert_eq!(idx.file_count(), 3);
        assert_eq!(
            idx.entry(2).unwrap(),
            IndexEntry {
                size: 1024,
                start_block: 7
            }
        );
        assert_eq!(idx.entry(1).unwrap().size, 0);
    }

    #[test]
    fn test_entry_out_of_range() {
        let mut idx = index(&[(100, 1)]);
        let err = idx.entry(1).unwrap_err();
        assert!(matches!(
            err,
            ReadError::EntryNotFound {
                channel: 3,
                file: 1
            }
        ));
    }

    #[test]
    fn test_partial_record_is_missing() {
        let mut idx = IndexFile::new(0, Cursor::new(vec![0u8; 9])).unwrap();
        assert_eq!(idx.file_count(), 1);
        assert!(idx.entry(0).is_ok());
        assert!(idx.entry(1).unwrap_err().is_not_found());
    }
}
