//! Primitive block codec
//!
//! Every block payload is a plain byte stream built from four primitives:
//!
//! - bytes
//! - variable-length unsigned integers: 7-bit groups, most significant group
//!   first, high bit set on every byte except the last
//! - strings: integer length followed by the UTF-8 bytes
//! - jump offsets: 4-byte big-endian signed value relative to the address
//!   of the offset itself, so blocks stay relocatable
//!
//! Typed operands are layered on top of these by the VM crate.

use crate::error::CodeError;

/// Size of an encoded jump offset
pub const OFFSET_SIZE: usize = 4;

/// Maximum number of bytes a 64-bit integer can occupy
const MAX_INTEGER_BYTES: usize = 10;

/// Growable byte stream for one block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeBuffer {
    data: Vec<u8>,
}

impl CodeBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Current write address
    #[inline]
    pub fn address(&self) -> usize {
        self.data.len()
    }

    /// Emit a single byte and return its address
    pub fn emit_byte(&mut self, byte: u8) -> usize {
        let address = self.address();
        self.data.push(byte);
        address
    }

    /// Emit raw bytes without length prefix
    pub fn emit_data(&mut self, bytes: &[u8]) -> usize {
        let address = self.address();
        self.data.extend_from_slice(bytes);
        address
    }

    /// Emit a variable-length unsigned integer
    pub fn emit_integer(&mut self, value: u64) -> usize {
        let address = self.address();
        let mut groups = [0u8; MAX_INTEGER_BYTES];
        let mut count = 0;
        let mut rest = value;

        loop {
            groups[count] = (rest & 0x7f) as u8;
            count += 1;
            rest >>= 7;
            if rest == 0 {
                break;
            }
        }

        for i in (0..count).rev() {
            let byte = if i > 0 { groups[i] | 0x80 } else { groups[i] };
            self.data.push(byte);
        }

        address
    }

    /// Emit a length-prefixed string
    pub fn emit_string(&mut self, s: &str) -> usize {
        let address = self.emit_integer(s.len() as u64);
        self.data.extend_from_slice(s.as_bytes());
        address
    }

    /// Emit a jump offset and return its address for later patching
    pub fn emit_offset(&mut self, offset: i32) -> usize {
        let address = self.address();
        self.data.extend_from_slice(&offset.to_be_bytes());
        address
    }

    /// Patch the offset at `address` so that it points at `target`
    ///
    /// Returns false when `address` does not hold a complete offset or the
    /// distance does not fit in 32 bits.
    pub fn resolve_offset(&mut self, address: usize, target: usize) -> bool {
        if address + OFFSET_SIZE > self.data.len() {
            return false;
        }
        let distance = target as i64 - address as i64;
        let Ok(offset) = i32::try_from(distance) else {
            return false;
        };
        self.data[address..address + OFFSET_SIZE].copy_from_slice(&offset.to_be_bytes());
        true
    }

    /// Borrow the encoded bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for CodeBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// Read-only cursor helpers over a block payload
///
/// All readers take the address by mutable reference and advance it past
/// the item they decode, leaving it untouched on failure.
#[derive(Debug, Clone, Copy)]
pub struct CodeReader<'a> {
    data: &'a [u8],
}

impl<'a> CodeReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Size of the underlying block
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Underlying bytes
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Look at the byte at `address` without consuming it
    pub fn peek_byte(&self, address: usize) -> Option<u8> {
        self.data.get(address).copied()
    }

    pub fn read_byte(&self, address: &mut usize) -> Result<u8, CodeError> {
        let byte = self
            .data
            .get(*address)
            .copied()
            .ok_or(CodeError::UnexpectedEnd { address: *address })?;
        *address += 1;
        Ok(byte)
    }

    pub fn read_integer(&self, address: &mut usize) -> Result<u64, CodeError> {
        let start = *address;
        let mut pos = start;
        let mut value: u64 = 0;

        for _ in 0..MAX_INTEGER_BYTES {
            let byte = self
                .data
                .get(pos)
                .copied()
                .ok_or(CodeError::UnexpectedEnd { address: start })?;
            pos += 1;

            if value > (u64::MAX >> 7) {
                return Err(CodeError::IntegerOverflow { address: start });
            }
            value = (value << 7) | u64::from(byte & 0x7f);

            if byte & 0x80 == 0 {
                *address = pos;
                return Ok(value);
            }
        }

        Err(CodeError::IntegerOverflow { address: start })
    }

    /// Read an integer that must fit in `usize` and not exceed `limit`
    pub fn read_count(&self, address: &mut usize, limit: usize) -> Result<usize, CodeError> {
        let start = *address;
        let value = self.read_integer(address)?;
        match usize::try_from(value) {
            Ok(v) if v <= limit => Ok(v),
            _ => {
                *address = start;
                Err(CodeError::malformed(
                    start,
                    format!("count {} exceeds limit {}", value, limit),
                ))
            }
        }
    }

    pub fn read_str(&self, address: &mut usize) -> Result<&'a str, CodeError> {
        let start = *address;
        let mut pos = start;
        let len = self.read_count(&mut pos, self.data.len())?;
        let end = pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(CodeError::UnexpectedEnd { address: start })?;
        let s = std::str::from_utf8(&self.data[pos..end])
            .map_err(|_| CodeError::InvalidUtf8 { address: start })?;
        *address = end;
        Ok(s)
    }

    pub fn read_string(&self, address: &mut usize) -> Result<String, CodeError> {
        self.read_str(address).map(str::to_string)
    }

    /// Read a jump offset and return the absolute target address
    pub fn read_offset(&self, address: &mut usize) -> Result<usize, CodeError> {
        let start = *address;
        let bytes = self
            .data
            .get(start..start + OFFSET_SIZE)
            .ok_or(CodeError::UnexpectedEnd { address: start })?;
        let offset = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let target = start as i64 + i64::from(offset);
        if target < 0 {
            return Err(CodeError::malformed(
                start,
                format!("jump offset {} points before block start", offset),
            ));
        }
        *address = start + OFFSET_SIZE;
        Ok(target as usize)
    }
}
