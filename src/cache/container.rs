//! Containers
//!
//! Every file read out of the cache is wrapped in a compression envelope:
//! - Byte 0: Compression type
//! - Bytes 1-4: Compressed length (32-bit big-endian)
//! - Bytes 5-8: Uncompressed length (32-bit big-endian, compressed types only)
//! - Payload (compressed length bytes)
//! - Optional trailing version (16-bit big-endian)
//!
//! BZIP2 payloads are stored without their `BZh1` magic, which has to be
//! put back before handing the stream to the decompressor.

use std::io::Read;

use bytes::Bytes;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use serde::Serialize;
use tracing::trace;

use crate::buffer::ByteCursor;
use crate::error::ContainerError;

/// Header stripped from BZIP2 payloads by the cache encoder
const BZIP2_HEADER: &[u8] = b"BZh1";

/// Default upper bound on how much is preallocated for a decompressed payload
pub const MAX_PREALLOCATION: usize = 5_000_000;

/// Compression types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression
    None = 0,
    /// BZIP2 compression
    Bzip2 = 1,
    /// GZIP compression
    Gzip = 2,
}

impl CompressionType {
    /// Create from a byte value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Bzip2),
            2 => Some(Self::Gzip),
            _ => None,
        }
    }

    /// Get the byte value
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Size of the envelope header for this compression type
    pub fn header_size(self) -> usize {
        match self {
            Self::None => 5,
            Self::Bzip2 | Self::Gzip => 9,
        }
    }
}

/// A decoded container
#[derive(Debug, Clone)]
pub struct Container {
    /// Compression the payload was stored with
    pub compression: CompressionType,
    /// Decompressed payload
    pub data: Bytes,
    /// Trailing version, if the envelope carried one
    pub version: Option<u16>,
    /// Length of the envelope (header + payload), excluding any trailer
    pub encoded_len: usize,
}

impl Container {
    /// Decode a container envelope
    pub fn decode(data: &[u8]) -> Result<Self, ContainerError> {
        Self::decode_with_limit(data, MAX_PREALLOCATION)
    }

    /// Decode a container, preallocating at most `max_preallocation` bytes
    /// for the decompressed payload
    pub fn decode_with_limit(data: &[u8], max_preallocation: usize) -> Result<Self, ContainerError> {
        let mut cursor = ByteCursor::new(data);

        let raw_type = cursor.read_u8()?;
        let compression = CompressionType::from_u8(raw_type)
            .ok_or(ContainerError::UnknownCompressionType(raw_type))?;
        let compressed_len = cursor.read_u32()? as usize;
        let uncompressed_len = match compression {
            CompressionType::None => compressed_len,
            _ => cursor.read_u32()? as usize,
        };

        let payload = cursor.read_slice(compressed_len)?;
        let encoded_len = cursor.position();

        let version = if cursor.remaining() >= 2 {
            Some(cursor.read_u16()?)
        } else {
            None
        };

        trace!(
            ?compression,
            compressed_len,
            uncompressed_len,
            ?version,
            "Decoding container"
        );

        let data = match compression {
            CompressionType::None => Bytes::copy_from_slice(payload),
            CompressionType::Bzip2 => {
                let decoder = BzDecoder::new(BZIP2_HEADER.chain(payload));
                decompress(decoder, compression, uncompressed_len, max_preallocation)?
            }
            CompressionType::Gzip => {
                let decoder = GzDecoder::new(payload);
                decompress(decoder, compression, uncompressed_len, max_preallocation)?
            }
        };

        Ok(Self {
            compression,
            data,
            version,
            encoded_len,
        })
    }

    /// Decompressed payload length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Take the decompressed payload
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Run a decompressor to exactly `expected` bytes
fn decompress<D: Read>(
    decoder: D,
    compression: CompressionType,
    expected: usize,
    max_preallocation: usize,
) -> Result<Bytes, ContainerError> {
    let mut output = Vec::with_capacity(expected.min(max_preallocation));

    // One byte past the declared length is enough to detect an oversized stream.
    decoder
        .take(expected as u64 + 1)
        .read_to_end(&mut output)
        .map_err(|source| ContainerError::Decompression {
            compression,
            source,
        })?;

    if output.len() != expected {
        return Err(ContainerError::DecompressionLengthMismatch {
            expected,
            actual: output.len(),
        });
    }

    Ok(Bytes::from(output))
}
