//! Byte cursor implementation
//!
//! Provides a sequential big-endian reader over an already-buffered byte
//! slice, with the cache-specific encodings:
//! - Standard integer types (byte, short, medium, int)
//! - Smart encoding for variable-width unsigned integers
//! - Zero-copy slicing
//!
//! Unlike a network buffer, reading past the end is never silently
//! truncated: every read returns [`BufferError::UnexpectedEndOfData`]
//! pointing at the first missing byte.

use crate::error::BufferError;

/// Sequential big-endian reader over a borrowed byte slice
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    /// Backing bytes
    data: &'a [u8],
    /// Current read position
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    // ============ Properties ============

    /// Get the current read position
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get the total length of the backing data
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the backing data is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Check if there are bytes remaining to read
    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Get the unread tail without advancing
    #[inline]
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    #[inline]
    fn ensure(&self, needed: usize) -> Result<(), BufferError> {
        if self.remaining() < needed {
            return Err(BufferError::UnexpectedEndOfData {
                offset: self.pos,
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    /// Read a fixed number of bytes as an array
    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    // ============ Reading Methods (Big-Endian) ============

    /// Read an unsigned byte
    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        let [value] = self.read_array::<1>()?;
        Ok(value)
    }

    /// Peek the next unsigned byte without advancing
    pub fn peek_u8(&self) -> Result<u8, BufferError> {
        self.ensure(1)?;
        Ok(self.data[self.pos])
    }

    /// Read a signed big-endian short (2 bytes)
    pub fn read_i16(&mut self) -> Result<i16, BufferError> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    /// Read an unsigned big-endian short (2 bytes)
    pub fn read_u16(&mut self) -> Result<u16, BufferError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Read an unsigned 24-bit integer (3 bytes, big-endian)
    pub fn read_u24(&mut self) -> Result<u32, BufferError> {
        let [b1, b2, b3] = self.read_array()?;
        Ok(u32::from_be_bytes([0, b1, b2, b3]))
    }

    /// Read a signed big-endian int (4 bytes)
    pub fn read_i32(&mut self) -> Result<i32, BufferError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    /// Read an unsigned big-endian int (4 bytes)
    pub fn read_u32(&mut self) -> Result<u32, BufferError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Read a "smart" unsigned int
    ///
    /// If the high bit of the next byte is clear the value is a 2-byte
    /// short (0-32767), otherwise a 4-byte int (0-2^31-1); the flag bit is
    /// masked out either way.
    pub fn read_smart_u32(&mut self) -> Result<u32, BufferError> {
        if self.peek_u8()? & 0x80 == 0 {
            Ok(u32::from(self.read_u16()? & 0x7FFF))
        } else {
            Ok(self.read_u32()? & 0x7FFF_FFFF)
        }
    }

    /// Read `len` bytes as a view into the backing data
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8], BufferError> {
        self.ensure(len)?;
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Skip `len` bytes
    pub fn skip(&mut self, len: usize) -> Result<(), BufferError> {
        self.ensure(len)?;
        self.pos += len;
        Ok(())
    }
}

impl<'a> From<&'a [u8]> for ByteCursor<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::new(data)
    }
}
