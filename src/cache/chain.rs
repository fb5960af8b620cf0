//! Block chains
//!
//! The data file is divided into 520-byte blocks. A logical file is stored
//! as a linked chain of blocks, each starting with a header that restates
//! which file, channel and position it belongs to:
//!
//! Standard header (file ids up to 65535), 8 bytes:
//! - Bytes 0-1: File ID (16-bit big-endian)
//! - Bytes 2-3: Sequence number (16-bit big-endian)
//! - Bytes 4-6: Next block (24-bit big-endian)
//! - Byte 7: Channel ID
//! - Bytes 8-519: Data (512 bytes)
//!
//! Extended header (file ids above 65535), 10 bytes:
//! - Bytes 0-3: File ID (32-bit big-endian)
//! - Bytes 4-5: Sequence number (16-bit big-endian)
//! - Bytes 6-8: Next block (24-bit big-endian)
//! - Byte 9: Channel ID
//! - Bytes 10-519: Data (510 bytes)

use std::io::{self, Read, Seek, SeekFrom};

use tracing::trace;

use super::index::IndexEntry;
use crate::buffer::ByteCursor;
use crate::error::{ChainCheck, ReadError};

/// Size of each block in the data file
pub const BLOCK_SIZE: usize = 520;

/// Header width selected by the file id being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockWidth {
    /// 8-byte header, 512-byte chunk
    Standard,
    /// 10-byte header, 510-byte chunk
    Extended,
}

impl BlockWidth {
    /// Pick the width used for `file`
    pub fn for_file(file: u32) -> Self {
        if file > u32::from(u16::MAX) {
            Self::Extended
        } else {
            Self::Standard
        }
    }

    /// Size of the header in bytes
    pub const fn header_size(self) -> usize {
        match self {
            Self::Standard => 8,
            Self::Extended => 10,
        }
    }

    /// Size of the data chunk in bytes
    pub const fn chunk_size(self) -> usize {
        BLOCK_SIZE - self.header_size()
    }
}

/// Decoded block header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// File id the block belongs to
    pub file: u32,
    /// Position of the block within its chain
    pub sequence: u16,
    /// Next block in the chain, 0 at the end
    pub next_block: u32,
    /// Channel the block belongs to
    pub channel: u8,
}

impl BlockHeader {
    /// Decode a header of the given width from the start of `data`
    pub fn decode(data: &[u8], width: BlockWidth) -> Option<Self> {
        let mut cursor = ByteCursor::new(data.get(..width.header_size())?);
        let file = match width {
            BlockWidth::Standard => u32::from(cursor.read_u16().ok()?),
            BlockWidth::Extended => cursor.read_u32().ok()?,
        };
        Some(Self {
            file,
            sequence: cursor.read_u16().ok()?,
            next_block: cursor.read_u24().ok()?,
            channel: cursor.read_u8().ok()?,
        })
    }

    /// Check this header against what the walker expects at `block`
    fn validate(&self, block: u32, channel: u8, file: u32, sequence: u16) -> Result<(), ReadError> {
        let mismatch = |check, expected: u32, actual: u32| ReadError::CorruptChain {
            block,
            check,
            expected,
            actual,
        };

        if self.file != file {
            return Err(mismatch(ChainCheck::FileId, file, self.file));
        }
        if self.sequence != sequence {
            return Err(mismatch(
                ChainCheck::Sequence,
                u32::from(sequence),
                u32::from(self.sequence),
            ));
        }
        if self.channel != channel {
            return Err(mismatch(
                ChainCheck::Channel,
                u32::from(channel),
                u32::from(self.channel),
            ));
        }
        Ok(())
    }
}

/// Walks block chains in a data file
#[derive(Debug)]
pub struct BlockChainReader<R> {
    data: R,
}

impl<R: Read + Seek> BlockChainReader<R> {
    pub fn new(data: R) -> Self {
        Self { data }
    }

    /// Get the underlying data reader
    pub fn get_ref(&self) -> &R {
        &self.data
    }

    /// Reassemble the logical file described by `entry`
    pub fn read(&mut self, channel: u8, file: u32, entry: IndexEntry) -> Result<Vec<u8>, ReadError> {
        let width = BlockWidth::for_file(file);
        let header_size = width.header_size();
        let size = entry.size as usize;

        let mut output = vec![0u8; size];
        let mut block_buffer = [0u8; BLOCK_SIZE];
        let mut written = 0;
        let mut block = entry.start_block;
        let mut sequence = 0u16;

        while written < size {
            let chunk = (size - written).min(width.chunk_size());

            // The final block of the data file is not always padded out to
            // a full 520 bytes, so only read what this chain needs.
            let wanted = &mut block_buffer[..header_size + chunk];
            self.data.seek(SeekFrom::Start(u64::from(block) * BLOCK_SIZE as u64))?;
            match self.data.read_exact(wanted) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(ReadError::UnexpectedEndOfData { block });
                }
                Err(e) => return Err(e.into()),
            }

            let header = BlockHeader::decode(wanted, width)
                .ok_or(ReadError::UnexpectedEndOfData { block })?;
            trace!(block, ?header, "Walking block");

            header.validate(block, channel, file, sequence)?;

            output[written..written + chunk].copy_from_slice(&wanted[header_size..]);
            written += chunk;

            if written < size && header.next_block == 0 {
                return Err(ReadError::CorruptChain {
                    block,
                    check: ChainCheck::NextBlock,
                    expected: u32::from(sequence) + 1,
                    actual: header.next_block,
                });
            }

            block = header.next_block;
            sequence = sequence.wrapping_add(1);
        }

        Ok(output)
    }
}
