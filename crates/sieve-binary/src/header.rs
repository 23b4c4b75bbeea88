//! File header and block index records
//!
//! All multi-byte fields in the container itself are little-endian. Block
//! payload contents use the codec in [`crate::code`].

use crate::error::BinaryError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Magic number at offset 0
pub const MAGIC: u32 = 0xcafe_babe;
/// Magic as seen when the file was written with the other byte order
pub const MAGIC_OTHER_ENDIAN: u32 = 0xbeba_feca;

pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

/// Size of the header written by this implementation
pub const HEADER_SIZE: u32 = 32;
/// Smallest header accepted on load (magic, version, block count, header size)
pub const MIN_HEADER_SIZE: u32 = 16;

/// Size of one block index record
pub const INDEX_RECORD_SIZE: u32 = 16;

/// Header flag: cumulative resource usage exceeded the configured limit
pub const FLAG_RESOURCE_LIMIT: u32 = 0x0000_0001;

/// Owning extension index for core blocks
pub const CORE_EXTENSION_INDEX: u32 = 0xffff_ffff;

/// Cumulative resource usage stored in the header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    /// Unix seconds of the last update, 0 when never updated
    pub update_time: u64,
    /// Accumulated execution time in milliseconds
    pub cpu_time_ms: u32,
}

/// Fixed-size file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version_major: u16,
    pub version_minor: u16,
    pub block_count: u32,
    pub header_size: u32,
    pub flags: u32,
    pub resource_usage: ResourceUsage,
}

impl Header {
    pub fn new(block_count: u32) -> Self {
        Self {
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            block_count,
            header_size: HEADER_SIZE,
            flags: 0,
            resource_usage: ResourceUsage::default(),
        }
    }

    pub fn resource_limit_exceeded(&self) -> bool {
        self.flags & FLAG_RESOURCE_LIMIT != 0
    }

    /// Offset of the first byte after the block index
    pub fn payload_start(&self) -> u64 {
        u64::from(self.header_size) + u64::from(self.block_count) * u64::from(INDEX_RECORD_SIZE)
    }

    /// Read and validate a header
    ///
    /// Headers smaller than [`HEADER_SIZE`] (but at least
    /// [`MIN_HEADER_SIZE`]) come from older writers; the missing fields are
    /// treated as zero. Bytes beyond [`HEADER_SIZE`] are skipped.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, BinaryError> {
        let mut fixed = [0u8; MIN_HEADER_SIZE as usize];
        read_exact_or_invalid(reader, &mut fixed, "header")?;
        let mut cursor = &fixed[..];

        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic == MAGIC_OTHER_ENDIAN {
            return Err(BinaryError::EndianMismatch);
        }
        if magic != MAGIC {
            return Err(BinaryError::NotValid(format!(
                "bad magic 0x{:08x}",
                magic
            )));
        }

        let version_major = cursor.read_u16::<LittleEndian>()?;
        let version_minor = cursor.read_u16::<LittleEndian>()?;
        if version_major != VERSION_MAJOR {
            return Err(BinaryError::NotValid(format!(
                "unsupported format version {}.{}",
                version_major, version_minor
            )));
        }

        let block_count = cursor.read_u32::<LittleEndian>()?;
        let header_size = cursor.read_u32::<LittleEndian>()?;
        if header_size < MIN_HEADER_SIZE {
            return Err(BinaryError::NotValid(format!(
                "header size {} is too small",
                header_size
            )));
        }

        // Zero-extend headers written by older versions
        let mut rest = [0u8; (HEADER_SIZE - MIN_HEADER_SIZE) as usize];
        let available = (header_size.min(HEADER_SIZE) - MIN_HEADER_SIZE) as usize;
        read_exact_or_invalid(reader, &mut rest[..available], "header")?;

        if header_size > HEADER_SIZE {
            let extra = u64::from(header_size - HEADER_SIZE);
            let skipped = io::copy(&mut reader.by_ref().take(extra), &mut io::sink())?;
            if skipped != extra {
                return Err(BinaryError::NotValid("truncated header".to_string()));
            }
        }

        let mut cursor = &rest[..];
        let flags = cursor.read_u32::<LittleEndian>()?;
        let update_time = cursor.read_u64::<LittleEndian>()?;
        let cpu_time_ms = cursor.read_u32::<LittleEndian>()?;

        Ok(Self {
            version_major,
            version_minor,
            block_count,
            header_size,
            flags,
            resource_usage: ResourceUsage {
                update_time,
                cpu_time_ms,
            },
        })
    }

    /// Write the header in the current layout
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(MAGIC)?;
        writer.write_u16::<LittleEndian>(self.version_major)?;
        writer.write_u16::<LittleEndian>(self.version_minor)?;
        writer.write_u32::<LittleEndian>(self.block_count)?;
        writer.write_u32::<LittleEndian>(HEADER_SIZE)?;
        self.write_mutable_fields(writer)
    }

    /// Write the fields that change after the file is created (flags and
    /// resource usage), in header order starting at offset 16
    pub fn write_mutable_fields<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.flags)?;
        writer.write_u64::<LittleEndian>(self.resource_usage.update_time)?;
        writer.write_u32::<LittleEndian>(self.resource_usage.cpu_time_ms)?;
        Ok(())
    }
}

/// One entry of the block index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockIndexRecord {
    pub id: u32,
    pub size: u32,
    pub offset: u32,
    pub ext_index: u32,
}

impl BlockIndexRecord {
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, BinaryError> {
        let mut raw = [0u8; INDEX_RECORD_SIZE as usize];
        read_exact_or_invalid(reader, &mut raw, "block index")?;
        let mut cursor = &raw[..];
        Ok(Self {
            id: cursor.read_u32::<LittleEndian>()?,
            size: cursor.read_u32::<LittleEndian>()?,
            offset: cursor.read_u32::<LittleEndian>()?,
            ext_index: cursor.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.id)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        writer.write_u32::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.ext_index)?;
        Ok(())
    }
}

/// Per-payload prefix: block id and payload size
pub(crate) fn read_block_prefix<R: Read>(reader: &mut R) -> Result<(u32, u32), BinaryError> {
    let mut raw = [0u8; 8];
    read_exact_or_invalid(reader, &mut raw, "block header")?;
    let mut cursor = &raw[..];
    let id = cursor.read_u32::<LittleEndian>()?;
    let size = cursor.read_u32::<LittleEndian>()?;
    Ok((id, size))
}

pub(crate) fn write_block_prefix<W: Write>(writer: &mut W, id: u32, size: u32) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(id)?;
    writer.write_u32::<LittleEndian>(size)
}

/// Truncated structures mean the file is not a usable binary, while other
/// read failures stay I/O errors.
pub(crate) fn read_exact_or_invalid<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &str,
) -> Result<(), BinaryError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            BinaryError::NotValid(format!("truncated {}", what))
        } else {
            BinaryError::Io(e)
        }
    })
}

/// Round `n` up to the next multiple of 4
pub(crate) fn align4(n: u64) -> u64 {
    (n + 3) & !3
}
