//! Composite container header and child walking.

use crate::error::{DecodeError, DecodeResult};
use crate::reader::{read_magic, read_u32_le};

/// Size in bytes of the composite header.
pub const HEADER_LEN: usize = 16;

/// Offset of the self-declared byte length inside every inner tile header.
pub const CHILD_BYTE_LENGTH_OFFSET: usize = 8;

/// Minimum size of an inner tile header (magic, version, byte length).
pub const CHILD_HEADER_LEN: usize = 12;

/// Parsed composite header.
///
/// # Format
///
/// All integers little-endian:
///
/// - Bytes 0-3: Magic
/// - Bytes 4-7: Version (must be 1)
/// - Bytes 8-11: Total byte length
/// - Bytes 12-15: Inner tile count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub byte_length: u32,
    pub tiles_length: u32,
}

impl CompositeHeader {
    /// Parse the header at `byte_offset`.
    pub fn parse(buffer: &[u8], byte_offset: usize) -> DecodeResult<Self> {
        let magic = read_magic(buffer, byte_offset)?;
        let version = read_u32_le(buffer, byte_offset + 4, "composite header")?;
        if version != 1 {
            return Err(DecodeError::UnsupportedVersion { version });
        }
        let byte_length = read_u32_le(buffer, byte_offset + 8, "composite header")?;
        let tiles_length = read_u32_le(buffer, byte_offset + 12, "composite header")?;
        Ok(Self {
            magic,
            version,
            byte_length,
            tiles_length,
        })
    }

    /// Iterate over the inner tiles that follow this header.
    #[must_use]
    pub fn children<'a>(&self, buffer: &'a [u8], byte_offset: usize) -> CompositeChildren<'a> {
        CompositeChildren {
            buffer,
            offset: byte_offset + HEADER_LEN,
            index: 0,
            count: self.tiles_length as usize,
            failed: false,
        }
    }
}

/// Location of one inner tile inside a composite buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSpan {
    /// Position among its siblings.
    pub index: usize,
    pub magic: [u8; 4],
    pub byte_offset: usize,
    pub byte_length: usize,
}

impl ChildSpan {
    /// Magic tag as text, with invalid bytes replaced.
    #[must_use]
    pub fn magic_str(&self) -> String {
        String::from_utf8_lossy(&self.magic).into_owned()
    }
}

/// Sequential walk over inner tiles.
///
/// Child `i + 1` can only be located once child `i`'s byte length is known,
/// so the walk is strictly ordered. It stops after the first error.
#[derive(Debug)]
pub struct CompositeChildren<'a> {
    buffer: &'a [u8],
    offset: usize,
    index: usize,
    count: usize,
    failed: bool,
}

impl CompositeChildren<'_> {
    fn read_child(&self) -> DecodeResult<ChildSpan> {
        let magic = read_magic(self.buffer, self.offset)?;
        let byte_length = read_u32_le(
            self.buffer,
            self.offset + CHILD_BYTE_LENGTH_OFFSET,
            "inner tile header",
        )?;
        if (byte_length as usize) < CHILD_HEADER_LEN {
            return Err(DecodeError::InvalidChildLength {
                index: self.index,
                byte_length,
            });
        }
        let end = self.offset + byte_length as usize;
        if end > self.buffer.len() {
            return Err(DecodeError::Truncated {
                what: "inner tile",
                needed: end,
                available: self.buffer.len(),
            });
        }
        Ok(ChildSpan {
            index: self.index,
            magic,
            byte_offset: self.offset,
            byte_length: byte_length as usize,
        })
    }
}

impl Iterator for CompositeChildren<'_> {
    type Item = DecodeResult<ChildSpan>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.index >= self.count {
            return None;
        }
        match self.read_child() {
            Ok(span) => {
                self.offset += span.byte_length;
                self.index += 1;
                Some(Ok(span))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (0, Some(self.count - self.index))
        }
    }
}
