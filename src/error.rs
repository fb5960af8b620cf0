//! Error handling module
//!
//! Defines the error types for the Rustscape cache library. Each layer of
//! the cache (byte cursor, store, container, reference table) has its own
//! error enum so callers can match on exactly what went wrong, and
//! [`RustscapeError`] wraps all of them for code that does not care.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::cache::container::CompressionType;

/// Main error type for the Rustscape cache
#[derive(Error, Debug)]
pub enum RustscapeError {
    /// The cache could not be opened
    #[error("Open error: {0}")]
    Open(#[from] OpenError),

    /// A block chain could not be read
    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    /// A container envelope could not be decoded
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// A reference table could not be decoded
    #[error("Reference table error: {0}")]
    Table(#[from] TableError),

    /// Archive data does not match the CRC recorded in its reference table
    #[error("Checksum mismatch for archive {archive} in channel {channel}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        channel: u8,
        archive: u32,
        expected: u32,
        actual: u32,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised by [`ByteCursor`](crate::buffer::ByteCursor)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("Unexpected end of data at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEndOfData {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
}

/// Errors raised while opening a cache directory
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("Cache file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("Failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The block header field that failed validation while walking a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainCheck {
    /// Header names a different file id
    FileId,
    /// Header sequence number is out of order
    Sequence,
    /// Header names a different channel
    Channel,
    /// Chain ends while data remains (expected is the missing sequence number)
    NextBlock,
}

impl fmt::Display for ChainCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainCheck::FileId => "file id",
            ChainCheck::Sequence => "sequence",
            ChainCheck::Channel => "channel",
            ChainCheck::NextBlock => "next block",
        };
        f.write_str(name)
    }
}

/// Errors raised while reading a logical file out of the data blob
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Channel {channel} not found")]
    ChannelNotFound { channel: u8 },

    #[error("File {file} not found in channel {channel}")]
    EntryNotFound { channel: u8, file: u32 },

    #[error("Corrupt block chain at block {block}: {check} mismatch (expected {expected}, got {actual})")]
    CorruptChain {
        block: u32,
        check: ChainCheck,
        expected: u32,
        actual: u32,
    },

    #[error("Unexpected end of data file at block {block}")]
    UnexpectedEndOfData { block: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ReadError {
    /// Whether this error means "not present" rather than corruption
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ReadError::ChannelNotFound { .. } | ReadError::EntryNotFound { .. }
        )
    }
}

/// Errors raised while decoding a container envelope
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Container truncated: {0}")]
    UnexpectedEndOfData(#[from] BufferError),

    #[error("Unknown compression type: {0}")]
    UnknownCompressionType(u8),

    #[error("Decompressed length mismatch: expected {expected}, got {actual}")]
    DecompressionLengthMismatch { expected: usize, actual: usize },

    #[error("{compression:?} decompression failed: {source}")]
    Decompression {
        compression: CompressionType,
        #[source]
        source: io::Error,
    },
}

/// Errors raised while decoding a reference table
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Unsupported reference table format: {0}")]
    UnsupportedFormat(u8),

    #[error("Truncated reference table: {0}")]
    TruncatedReferenceTable(#[from] BufferError),

    #[error("Id overflow while decoding entry {index}")]
    IdOverflow { index: usize },
}

/// Result type alias for Rustscape cache operations
pub type Result<T> = std::result::Result<T, RustscapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReadError::ChannelNotFound { channel: 7 };
        assert_eq!(err.to_string(), "Channel 7 not found");

        let err = ReadError::CorruptChain {
            block: 3,
            check: ChainCheck::Sequence,
            expected: 0,
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "Corrupt block chain at block 3: sequence mismatch (expected 0, got 1)"
        );

        let err = TableError::UnsupportedFormat(5);
        assert_eq!(err.to_string(), "Unsupported reference table format: 5");
    }

    #[test]
    fn test_not_found_classification() {
        assert!(ReadError::ChannelNotFound { channel: 1 }.is_not_found());
        assert!(ReadError::EntryNotFound { channel: 1, file: 2 }.is_not_found());
        assert!(!ReadError::UnexpectedEndOfData { block: 9 }.is_not_found());
    }

    #[test]
    fn test_wrapping() {
        let err: RustscapeError = ContainerError::UnknownCompressionType(9).into();
        assert!(matches!(
            err,
            RustscapeError::Container(ContainerError::UnknownCompressionType(9))
        ));
    }
}
