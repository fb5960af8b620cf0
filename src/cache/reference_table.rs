//! Reference tables
//!
//! Channel 255 holds one reference table per ordinary channel, describing
//! every archive in it. The table is laid out in parallel columns rather
//! than per-record, so every optional column has to be consumed in order
//! even when its contents are not interpreted:
//!
//! 1. Format (1 byte, 6 or 7), version (4 bytes), flags (1 byte)
//! 2. Archive count, then delta-coded archive ids
//! 3. Name hashes (if named)
//! 4. CRCs
//! 5. 4 bytes per archive (if flag `0x08`)
//! 6. Whirlpool digests, 64 bytes each (if flag `0x02`)
//! 7. 8 bytes per archive (if flag `0x04`)
//! 8. Versions
//! 9. Child file counts
//! 10. Delta-coded child file ids, per archive
//! 11. Child file name hashes (if named)
//!
//! Counts and ids are fixed 2-byte shorts in format 6 and smart ints in
//! format 7.

use bitflags::bitflags;
use serde::{Serialize, Serializer};

use crate::buffer::ByteCursor;
use crate::error::{BufferError, TableError};

/// First format carrying a table version
pub const FORMAT_VERSIONED: u8 = 6;

/// First format using smart ints for counts and ids
pub const FORMAT_SMART: u8 = 7;

/// Size of a whirlpool digest
pub const WHIRLPOOL_SIZE: usize = 64;

bitflags! {
    /// Optional columns present in a reference table
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct TableFlags: u8 {
        /// Archives and files carry name hashes
        const NAMED = 0x01;
        /// Archives carry whirlpool digests
        const WHIRLPOOL = 0x02;
        /// Uninterpreted column, 8 bytes per archive
        const UNKNOWN_A = 0x04;
        /// Uninterpreted column, 4 bytes per archive
        const UNKNOWN_B = 0x08;
    }
}

impl Default for TableFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// How counts and id deltas are encoded for a given format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdEncoding {
    /// Fixed 2-byte big-endian short
    Short,
    /// 2- or 4-byte smart int
    Smart,
}

impl IdEncoding {
    pub fn for_format(format: u8) -> Self {
        if format >= FORMAT_SMART {
            Self::Smart
        } else {
            Self::Short
        }
    }

    /// Read one count or id delta
    pub fn read(self, cursor: &mut ByteCursor<'_>) -> Result<u32, BufferError> {
        match self {
            Self::Short => cursor.read_u16().map(u32::from),
            Self::Smart => cursor.read_smart_u32(),
        }
    }
}

/// A file inside an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArchiveFile {
    /// File id within the archive
    pub id: u32,
    /// Name hash (if the table is named)
    pub name_hash: Option<i32>,
}

/// One archive described by a reference table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Archive {
    /// Archive id (file id within the channel)
    pub id: u32,
    /// Name hash (if the table is named)
    pub name_hash: Option<i32>,
    /// CRC32 of the encoded container
    pub crc: i32,
    /// Archive revision
    pub version: i32,
    /// Whirlpool digest (if the table carries them)
    #[serde(serialize_with = "serialize_digest")]
    pub whirlpool: Option<[u8; WHIRLPOOL_SIZE]>,
    /// Child files, ascending by id
    pub files: Vec<ArchiveFile>,
}

impl Archive {
    fn new(id: u32) -> Self {
        Self {
            id,
            name_hash: None,
            crc: 0,
            version: 0,
            whirlpool: None,
            files: Vec::new(),
        }
    }

    /// Look up a child file by id
    pub fn file(&self, id: u32) -> Option<&ArchiveFile> {
        self.files
            .binary_search_by_key(&id, |file| file.id)
            .ok()
            .map(|i| &self.files[i])
    }

    /// Child file ids in order
    pub fn file_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.files.iter().map(|file| file.id)
    }
}

/// Decoded reference table for one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceTable {
    pub format: u8,
    pub version: i32,
    pub flags: TableFlags,
    pub archives: Vec<Archive>,
}

impl ReferenceTable {
    /// Decode a reference table from a decompressed container payload
    pub fn decode(data: &[u8]) -> Result<Self, TableError> {
        let mut cursor = ByteCursor::new(data);

        let format = cursor.read_u8()?;
        if !(FORMAT_VERSIONED..=FORMAT_SMART).contains(&format) {
            return Err(TableError::UnsupportedFormat(format));
        }

        let version = cursor.read_i32()?;
        let flags = TableFlags::from_bits_retain(cursor.read_u8()?);
        let encoding = IdEncoding::for_format(format);

        let count = encoding.read(&mut cursor)? as usize;
        let ids = read_ids(&mut cursor, encoding, count)?;
        let mut archives: Vec<Archive> = ids.into_iter().map(Archive::new).collect();

        if flags.contains(TableFlags::NAMED) {
            for archive in &mut archives {
                archive.name_hash = Some(cursor.read_i32()?);
            }
        }

        for archive in &mut archives {
            archive.crc = cursor.read_i32()?;
        }

        if flags.contains(TableFlags::UNKNOWN_B) {
            cursor.skip(archives.len() * 4)?;
        }

        if flags.contains(TableFlags::WHIRLPOOL) {
            for archive in &mut archives {
                let mut digest = [0u8; WHIRLPOOL_SIZE];
                digest.copy_from_slice(cursor.read_slice(WHIRLPOOL_SIZE)?);
                archive.whirlpool = Some(digest);
            }
        }

        if flags.contains(TableFlags::UNKNOWN_A) {
            cursor.skip(archives.len() * 8)?;
        }

        for archive in &mut archives {
            archive.version = cursor.read_i32()?;
        }

        let mut file_counts = Vec::with_capacity(archives.len());
        for _ in 0..archives.len() {
            file_counts.push(encoding.read(&mut cursor)? as usize);
        }

        for (archive, &file_count) in archives.iter_mut().zip(&file_counts) {
            archive.files = read_ids(&mut cursor, encoding, file_count)?
                .into_iter()
                .map(|id| ArchiveFile { id, name_hash: None })
                .collect();
        }

        if flags.contains(TableFlags::NAMED) {
            for archive in &mut archives {
                for file in &mut archive.files {
                    file.name_hash = Some(cursor.read_i32()?);
                }
            }
        }

        Ok(Self {
            format,
            version,
            flags,
            archives,
        })
    }

    /// Number of archives
    pub fn len(&self) -> usize {
        self.archives.len()
    }

    /// Check if the table describes no archives
    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }

    /// Look up an archive by id
    pub fn archive(&self, id: u32) -> Option<&Archive> {
        self.archives
            .binary_search_by_key(&id, |archive| archive.id)
            .ok()
            .map(|i| &self.archives[i])
    }

    /// Archive ids in order
    pub fn archive_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.archives.iter().map(|archive| archive.id)
    }

    /// Total number of child files across all archives
    pub fn file_count(&self) -> usize {
        self.archives.iter().map(|archive| archive.files.len()).sum()
    }
}

/// Read `count` delta-coded ids, accumulating from zero
fn read_ids(
    cursor: &mut ByteCursor<'_>,
    encoding: IdEncoding,
    count: usize,
) -> Result<Vec<u32>, TableError> {
    // Every id takes at least two bytes, so a corrupt count cannot force a
    // huge allocation before the cursor runs dry.
    let mut ids = Vec::with_capacity(count.min(cursor.remaining() / 2));
    let mut id = 0u32;
    for index in 0..count {
        let delta = encoding.read(cursor)?;
        id = id
            .checked_add(delta)
            .ok_or(TableError::IdOverflow { index })?;
        ids.push(id);
    }
    Ok(ids)
}

fn serialize_digest<S: Serializer>(
    digest: &Option<[u8; WHIRLPOOL_SIZE]>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    digest.as_ref().map(|d| &d[..]).serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use pretty_assertions::assert_eq;

    /// Writes counts and ids the way a given format encodes them
    struct TableWriter {
        buf: BytesMut,
        format: u8,
    }

    impl TableWriter {
        fn new(format: u8, version: i32, flags: u8) -> Self {
            let mut buf = BytesMut::new();
            buf.put_u8(format);
            buf.put_i32(version);
            buf.put_u8(flags);
            Self { buf, format }
        }

        fn id(&mut self, value: u32) -> &mut Self {
            if self.format >= FORMAT_SMART {
                if value < 0x8000 {
                    self.buf.put_u16(value as u16);
                } else {
                    self.buf.put_u32(value | 0x8000_0000);
                }
            } else {
                self.buf.put_u16(value as u16);
            }
            self
        }

        fn int(&mut self, value: i32) -> &mut Self {
            self.buf.put_i32(value);
            self
        }

        fn bytes(&mut self, value: &[u8]) -> &mut Self {
            self.buf.put_slice(value);
            self
        }

        fn finish(&self) -> Vec<u8> {
            self.buf.to_vec()
        }
    }

    /// Two archives, ids 3 and 5, archive 5 holding file 7
    fn two_archive_table(format: u8) -> Vec<u8> {
        let mut w = TableWriter::new(format, 42, 0x00);
        w.id(2).id(3).id(2);
        w.int(111).int(222);
        w.int(1).int(2);
        w.id(0).id(1);
        w.id(7);
        w.finish()
    }

    #[test]
    fn test_format_6_minimal() {
        let table = ReferenceTable::decode(&two_archive_table(6)).unwrap();

        assert_eq!(table.format, 6);
        assert_eq!(table.version, 42);
        assert_eq!(table.flags, TableFlags::empty());
        assert_eq!(table.archive_ids().collect::<Vec<_>>(), vec![3, 5]);

        let first = &table.archives[0];
        assert_eq!(first.crc, 111);
        assert_eq!(first.version, 1);
        assert!(first.files.is_empty());
        assert_eq!(first.name_hash, None);
        assert_eq!(first.whirlpool, None);

        let second = table.archive(5).unwrap();
        assert_eq!(second.crc, 222);
        assert_eq!(second.version, 2);
        assert_eq!(
            second.files,
            vec![ArchiveFile {
                id: 7,
                name_hash: None
            }]
        );
        assert!(table.archive(4).is_none());
    }

    #[test]
    fn test_format_7_matches_format_6() {
        let six = ReferenceTable::decode(&two_archive_table(6)).unwrap();
        let seven = ReferenceTable::decode(&two_archive_table(7)).unwrap();

        assert_eq!(seven.format, 7);
        assert_eq!(six.archives, seven.archives);
        assert_eq!(six.file_count(), seven.file_count());
    }

    #[test]
    fn test_smart_ids_above_short_range() {
        let mut w = TableWriter::new(7, 1, 0x00);
        w.id(2).id(40_000).id(100_000);
        w.int(0).int(0);
        w.int(0).int(0);
        w.id(2).id(0);
        w.id(0).id(70_000);
        let table = ReferenceTable::decode(&w.finish()).unwrap();

        assert_eq!(table.archive_ids().collect::<Vec<_>>(), vec![40_000, 140_000]);
        assert_eq!(
            table.archives[0].file_ids().collect::<Vec<_>>(),
            vec![0, 70_000]
        );
    }

    #[test]
    fn test_all_optional_columns() {
        let digest_a = [0xAAu8; WHIRLPOOL_SIZE];
        let digest_b = [0xBBu8; WHIRLPOOL_SIZE];

        let mut w = TableWriter::new(6, 9, 0x0F);
        w.id(2).id(0).id(1);
        // names
        w.int(-10).int(-20);
        // crcs
        w.int(1000).int(2000);
        // 0x08 column
        w.int(0x1111_1111).int(0x2222_2222);
        // whirlpool
        w.bytes(&digest_a).bytes(&digest_b);
        // 0x04 column
        w.int(1).int(2).int(3).int(4);
        // versions
        w.int(5).int(6);
        // file counts and ids
        w.id(2).id(1);
        w.id(0).id(4);
        w.id(9);
        // file names
        w.int(100).int(101).int(102);

        let table = ReferenceTable::decode(&w.finish()).unwrap();
        assert!(table.flags.contains(TableFlags::NAMED | TableFlags::WHIRLPOOL));

        let a = &table.archives[0];
        assert_eq!(a.id, 0);
        assert_eq!(a.name_hash, Some(-10));
        assert_eq!(a.crc, 1000);
        assert_eq!(a.whirlpool, Some(digest_a));
        assert_eq!(a.version, 5);
        assert_eq!(
            a.files,
            vec![
                ArchiveFile {
                    id: 0,
                    name_hash: Some(100)
                },
                ArchiveFile {
                    id: 4,
                    name_hash: Some(101)
                },
            ]
        );

        let b = &table.archives[1];
        assert_eq!(b.id, 1);
        assert_eq!(b.name_hash, Some(-20));
        assert_eq!(b.crc, 2000);
        assert_eq!(b.whirlpool, Some(digest_b));
        assert_eq!(b.version, 6);
        assert_eq!(b.file(9).unwrap().name_hash, Some(102));
    }

    #[test]
    fn test_unsupported_format() {
        for format in [0u8, 5, 8, 255] {
            let data = [format, 0, 0, 0, 0, 0, 0, 0];
            assert!(matches!(
                ReferenceTable::decode(&data).unwrap_err(),
                TableError::UnsupportedFormat(f) if f == format
            ));
        }
    }

    #[test]
    fn test_truncated() {
        let data = two_archive_table(6);
        for len in [0, 1, 5, 7, 10, data.len() - 1] {
            assert!(
                matches!(
                    ReferenceTable::decode(&data[..len]).unwrap_err(),
                    TableError::TruncatedReferenceTable(_)
                ),
                "length {len} should be truncated"
            );
        }
    }

    #[test]
    fn test_missing_unknown_column_is_truncation() {
        // Same content, but flag 0x04 claims an extra 8 bytes per archive.
        let mut data = two_archive_table(6);
        data[5] = 0x04;
        assert!(ReferenceTable::decode(&data).is_err());
    }

    #[test]
    fn test_decode_is_deterministic() {
        let data = two_archive_table(7);
        let a = ReferenceTable::decode(&data).unwrap();
        let b = ReferenceTable::decode(&data).unwrap();
        assert_eq!(a, b);
        assert!(a.archives.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_huge_count_does_not_allocate() {
        let mut w = TableWriter::new(7, 0, 0x00);
        w.id(0x7FFF_FFFF);
        assert!(matches!(
            ReferenceTable::decode(&w.finish()).unwrap_err(),
            TableError::TruncatedReferenceTable(_)
        ));
    }

    #[test]
    fn test_id_overflow() {
        let mut w = TableWriter::new(7, 0, 0x00);
        // 0x7FFF_FFFF, then 0xFFFF_FFFE, then past u32::MAX
        w.id(3).id(0x7FFF_FFFF).id(0x7FFF_FFFF).id(2);
        assert!(matches!(
            ReferenceTable::decode(&w.finish()).unwrap_err(),
            TableError::IdOverflow { index: 2 }
        ));
    }

    #[test]
    fn test_empty_table() {
        let mut w = TableWriter::new(6, 3, 0x00);
        w.id(0);
        let table = ReferenceTable::decode(&w.finish()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.version, 3);
    }

    #[test]
    fn test_serialize_json() {
        let table = ReferenceTable::decode(&two_archive_table(6)).unwrap();
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["archives"][1]["id"], 5);
        assert_eq!(json["archives"][1]["files"][0]["id"], 7);
        assert!(json["archives"][0]["whirlpool"].is_null());
    }
}
