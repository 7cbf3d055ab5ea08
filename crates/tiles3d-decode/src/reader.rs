//! Bounds-checked readers for little-endian headers and packed `f64` buffers.

use crate::error::{DecodeError, DecodeResult};

/// Read a little-endian `u32` at `offset`.
pub fn read_u32_le(buffer: &[u8], offset: usize, what: &'static str) -> DecodeResult<u32> {
    let bytes = buffer
        .get(offset..offset + 4)
        .ok_or(DecodeError::Truncated {
            what,
            needed: offset + 4,
            available: buffer.len(),
        })?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read a 4-byte magic tag at `offset`.
pub fn read_magic(buffer: &[u8], offset: usize) -> DecodeResult<[u8; 4]> {
    let bytes = buffer
        .get(offset..offset + 4)
        .ok_or(DecodeError::Truncated {
            what: "magic",
            needed: offset + 4,
            available: buffer.len(),
        })?;
    Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Sequential reader over a packed `f64` buffer.
///
/// Every read fails fast once the buffer is exhausted.
#[derive(Debug)]
pub struct PackedReader<'a> {
    buffer: &'a [f64],
    position: usize,
}

impl<'a> PackedReader<'a> {
    #[must_use]
    pub fn new(buffer: &'a [f64]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    pub fn read(&mut self, what: &'static str) -> DecodeResult<f64> {
        Ok(self.read_slice(1, what)?[0])
    }

    pub fn read_slice(&mut self, len: usize, what: &'static str) -> DecodeResult<&'a [f64]> {
        if len > self.remaining() {
            return Err(DecodeError::Truncated {
                what,
                needed: self.position + len,
                available: self.buffer.len(),
            });
        }
        let slice = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Read a slot holding a whole number in `0..=u32::MAX`.
    pub fn read_u32(&mut self, what: &'static str) -> DecodeResult<u32> {
        let value = self.read(what)?;
        if !(value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX)) {
            return Err(DecodeError::InvalidCount { what, value });
        }
        Ok(value as u32)
    }

    /// Read a count and check that at least `min_stride * count` slots follow it.
    pub fn read_count(&mut self, min_stride: usize, what: &'static str) -> DecodeResult<usize> {
        let count = self.read_u32(what)? as usize;
        let needed = count.saturating_mul(min_stride);
        if needed > self.remaining() {
            return Err(DecodeError::Truncated {
                what,
                needed: self.position.saturating_add(needed),
                available: self.buffer.len(),
            });
        }
        Ok(count)
    }
}
