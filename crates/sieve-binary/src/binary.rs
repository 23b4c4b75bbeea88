//! Binary container
//!
//! A [`Binary`] owns an ordered set of blocks plus the table of extensions
//! it was linked against. Binaries are built in memory with a
//! [`BinaryBuilder`], shared behind an `Arc`, and optionally saved to and
//! loaded from a single file. Blocks of a loaded binary are read on first
//! access.
//!
//! File layout:
//!
//! ```text
//! header         32 bytes, see crate::header
//! block index    block_count x 16 bytes
//! payloads       [id u32][size u32][data], each 4-byte aligned;
//!                the extension block (id 1) is written first
//! ```

use crate::code::CodeBuffer;
use crate::error::BinaryError;
use crate::header::{
    align4, read_block_prefix, read_exact_or_invalid, write_block_prefix, BlockIndexRecord,
    Header, ResourceUsage, CORE_EXTENSION_INDEX, FLAG_RESOURCE_LIMIT, INDEX_RECORD_SIZE,
    MIN_HEADER_SIZE,
};
use crate::lock::lock_exclusive_timeout;
use crate::metadata::ScriptMetadata;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use std::fmt::{self, Write as _};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

// ===== Reserved blocks =====

/// Script metadata (name, source mtime, compile time)
pub const BLOCK_METADATA: u32 = 0;
/// Extension linkage table
pub const BLOCK_EXTENSIONS: u32 = 1;
/// Main program
pub const BLOCK_MAIN_PROGRAM: u32 = 2;
/// Number of reserved blocks every binary has
pub const RESERVED_BLOCKS: u32 = 3;

/// Marker for "extension owns no block" in the extension table
pub const NO_BLOCK: u32 = 0xffff_ffff;

/// An extension entry in the linkage table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedExtension {
    pub name: String,
    pub version: u32,
    /// Block owned by this extension, if any
    pub block: Option<u32>,
}

/// Decides whether a linked extension can be used by this process
pub trait ExtensionCheck {
    fn is_available(&self, name: &str, version: u32) -> bool;
}

/// Callbacks run around [`Binary::save`]
pub trait SaveHooks {
    /// Called before anything is written; an error vetoes the save
    fn pre_save(&mut self, _binary: &Binary) -> Result<(), String> {
        Ok(())
    }

    /// Called after the file has been renamed into place
    fn post_save(&mut self, _binary: &Binary, _path: &Path) {}
}

/// Save without extension callbacks
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl SaveHooks for NoHooks {}

/// Parameters of a cumulative resource usage update
#[derive(Debug, Clone, Copy)]
pub struct UsageUpdate {
    /// Current wall clock time (unix seconds)
    pub now: u64,
    /// Time spent by the run being recorded
    pub cpu_time_ms: u32,
    /// Usage last updated longer ago than this is discarded first
    pub reset_after_secs: u64,
    /// Cumulative limit; exceeding it sets the resource limit flag
    pub limit_ms: Option<u32>,
    /// Bound on waiting for the file lock
    pub lock_timeout: Duration,
}

#[derive(Debug)]
struct Block {
    ext_index: u32,
    /// File offset of the block prefix, for lazy loading
    offset: u64,
    size: u32,
    data: OnceLock<Arc<[u8]>>,
}

impl Block {
    fn loaded(ext_index: u32, data: Vec<u8>) -> Self {
        let size = data.len() as u32;
        let cell: OnceLock<Arc<[u8]>> = OnceLock::new();
        let _ = cell.set(Arc::from(data));
        Self {
            ext_index,
            offset: 0,
            size,
            data: cell,
        }
    }
}

/// A compiled program
#[derive(Debug)]
pub struct Binary {
    path: Mutex<Option<PathBuf>>,
    file: Mutex<Option<File>>,
    header: Mutex<Header>,
    blocks: Vec<Block>,
    extensions: Vec<LinkedExtension>,
}

// ===== Building =====

/// Accumulates blocks and extension links for a new binary
#[derive(Debug)]
pub struct BinaryBuilder {
    blocks: Vec<(u32, CodeBuffer)>,
    extensions: Vec<LinkedExtension>,
}

impl Default for BinaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryBuilder {
    /// Create a builder holding the reserved blocks
    pub fn new() -> Self {
        let blocks = (0..RESERVED_BLOCKS)
            .map(|_| (CORE_EXTENSION_INDEX, CodeBuffer::new()))
            .collect();
        Self {
            blocks,
            extensions: Vec::new(),
        }
    }

    /// Link an extension, returning its index in the linkage table
    ///
    /// Linking the same extension twice returns the existing index.
    pub fn link_extension(&mut self, name: &str, version: u32) -> u32 {
        if let Some(index) = self.extension_index(name) {
            return index;
        }
        self.extensions.push(LinkedExtension {
            name: name.to_string(),
            version,
            block: None,
        });
        (self.extensions.len() - 1) as u32
    }

    pub fn extension_index(&self, name: &str) -> Option<u32> {
        self.extensions
            .iter()
            .position(|e| e.name == name)
            .map(|i| i as u32)
    }

    pub fn extensions(&self) -> &[LinkedExtension] {
        &self.extensions
    }

    /// Append a new block owned by the given extension index
    pub fn create_block(&mut self, ext_index: u32) -> u32 {
        self.blocks.push((ext_index, CodeBuffer::new()));
        (self.blocks.len() - 1) as u32
    }

    /// Record `block` as the block owned by extension `ext_index`
    pub fn set_extension_block(&mut self, ext_index: u32, block: u32) -> bool {
        match self.extensions.get_mut(ext_index as usize) {
            Some(ext) if (block as usize) < self.blocks.len() => {
                ext.block = Some(block);
                true
            }
            _ => false,
        }
    }

    pub fn block_mut(&mut self, id: u32) -> Option<&mut CodeBuffer> {
        self.blocks.get_mut(id as usize).map(|(_, buf)| buf)
    }

    pub fn main_program(&mut self) -> &mut CodeBuffer {
        &mut self.blocks[BLOCK_MAIN_PROGRAM as usize].1
    }

    pub fn set_metadata(&mut self, metadata: &ScriptMetadata) {
        self.blocks[BLOCK_METADATA as usize].1 = CodeBuffer::from(metadata.encode());
    }

    /// Freeze the builder into an in-memory binary
    pub fn finish(mut self) -> Arc<Binary> {
        self.blocks[BLOCK_EXTENSIONS as usize].1 =
            CodeBuffer::from(encode_extension_table(&self.extensions));

        let blocks: Vec<Block> = self
            .blocks
            .into_iter()
            .map(|(ext, buf)| Block::loaded(ext, buf.into_vec()))
            .collect();

        Arc::new(Binary {
            path: Mutex::new(None),
            file: Mutex::new(None),
            header: Mutex::new(Header::new(blocks.len() as u32)),
            blocks,
            extensions: self.extensions,
        })
    }
}

fn encode_extension_table(extensions: &[LinkedExtension]) -> Vec<u8> {
    let mut out = Vec::new();
    // Writes into a Vec cannot fail
    let _ = write_extension_table(&mut out, extensions);
    out
}

fn write_extension_table<W: Write>(out: &mut W, extensions: &[LinkedExtension]) -> io::Result<()> {
    out.write_u32::<LittleEndian>(extensions.len() as u32)?;
    for ext in extensions {
        out.write_u32::<LittleEndian>(ext.name.len() as u32)?;
        out.write_all(ext.name.as_bytes())?;
        out.write_u32::<LittleEndian>(ext.version)?;
        out.write_u32::<LittleEndian>(ext.block.unwrap_or(NO_BLOCK))?;
    }
    Ok(())
}

fn decode_extension_table(data: &[u8], block_count: u32) -> Result<Vec<LinkedExtension>, BinaryError> {
    let corrupt = |what: &str| BinaryError::Corrupt(format!("extension table: {}", what));
    let mut cursor = data;

    let count = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| corrupt("missing count"))?;
    let mut extensions = Vec::new();

    for _ in 0..count {
        let len = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| corrupt("truncated entry"))? as usize;
        if len > cursor.len() {
            return Err(corrupt("name exceeds block"));
        }
        let (name, rest) = cursor.split_at(len);
        let name = std::str::from_utf8(name)
            .map_err(|_| corrupt("name is not UTF-8"))?
            .to_string();
        cursor = rest;
        let version = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| corrupt("truncated entry"))?;
        let block = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| corrupt("truncated entry"))?;
        let block = match block {
            NO_BLOCK => None,
            id if id < block_count => Some(id),
            id => return Err(corrupt(&format!("extension `{}` owns unknown block {}", name, id))),
        };
        extensions.push(LinkedExtension {
            name,
            version,
            block,
        });
    }

    Ok(extensions)
}

// ===== Access =====

impl Binary {
    /// Path of the file backing this binary, if any
    pub fn path(&self) -> Option<PathBuf> {
        self.path.lock().clone()
    }

    pub fn header(&self) -> Header {
        *self.header.lock()
    }

    pub fn block_count(&self) -> u32 {
        self.blocks.len() as u32
    }

    /// Owning extension index of a block, `None` for core blocks
    pub fn block_extension(&self, id: u32) -> Option<u32> {
        self.blocks
            .get(id as usize)
            .map(|b| b.ext_index)
            .filter(|&e| e != CORE_EXTENSION_INDEX)
    }

    pub fn block_size(&self, id: u32) -> Option<u32> {
        self.blocks.get(id as usize).map(|b| b.size)
    }

    pub fn extensions(&self) -> &[LinkedExtension] {
        &self.extensions
    }

    pub fn extension_index(&self, name: &str) -> Option<u32> {
        self.extensions
            .iter()
            .position(|e| e.name == name)
            .map(|i| i as u32)
    }

    pub fn extension_block(&self, name: &str) -> Option<u32> {
        self.extensions
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.block)
    }

    /// Contents of a block, reading it from the file on first access
    pub fn block_data(&self, id: u32) -> Result<Arc<[u8]>, BinaryError> {
        let block = self
            .blocks
            .get(id as usize)
            .ok_or(BinaryError::NoSuchBlock(id))?;

        if let Some(data) = block.data.get() {
            return Ok(Arc::clone(data));
        }

        let data = self.read_block(id, block)?;
        Ok(Arc::clone(block.data.get_or_init(|| data)))
    }

    pub fn main_program(&self) -> Result<Arc<[u8]>, BinaryError> {
        self.block_data(BLOCK_MAIN_PROGRAM)
    }

    pub fn metadata(&self) -> Result<ScriptMetadata, BinaryError> {
        let data = self.block_data(BLOCK_METADATA)?;
        Ok(ScriptMetadata::decode(&data)?)
    }

    /// Whether this binary was compiled from a source at least as new as
    /// `script_mtime`
    pub fn is_up_to_date(&self, script_mtime: u64) -> Result<bool, BinaryError> {
        Ok(!self.metadata()?.is_stale(script_mtime))
    }

    fn read_block(&self, id: u32, block: &Block) -> Result<Arc<[u8]>, BinaryError> {
        let mut file_guard = self.file.lock();
        if file_guard.is_none() {
            let path = self
                .path()
                .ok_or_else(|| BinaryError::Corrupt(format!("block {} was never loaded", id)))?;
            *file_guard = Some(File::open(&path)?);
        }
        let file = match file_guard.as_mut() {
            Some(file) => file,
            None => return Err(BinaryError::Corrupt(format!("block {} has no backing file", id))),
        };

        tracing::trace!(block = id, offset = block.offset, size = block.size, "loading block");

        file.seek(SeekFrom::Start(block.offset))?;
        let (found_id, size) = read_block_prefix(file)?;
        if found_id != id || size != block.size {
            return Err(BinaryError::Corrupt(format!(
                "block {} prefix says id {} size {}, index says size {}",
                id, found_id, size, block.size
            )));
        }

        let mut data = vec![0u8; size as usize];
        read_exact_or_invalid(file, &mut data, "block payload")?;
        Ok(Arc::from(data))
    }
}

// ===== Saving =====

impl Binary {
    /// Write the binary to `path` atomically
    ///
    /// The file is written to a temporary sibling and renamed into place.
    /// After a successful save the binary is backed by `path`.
    pub fn save(&self, path: &Path, hooks: &mut dyn SaveHooks) -> Result<(), BinaryError> {
        hooks.pre_save(self).map_err(BinaryError::SaveVetoed)?;

        // Every block must be in memory before the old file can be replaced
        let blocks = (0..self.block_count())
            .map(|id| self.block_data(id))
            .collect::<Result<Vec<_>, _>>()?;

        let tmp_path = temp_path_for(path);
        let result = self.write_file(&tmp_path, &blocks).and_then(|()| {
            fs::rename(&tmp_path, path)?;
            Ok(())
        });
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            tracing::warn!(path = %path.display(), error = %e, "failed to save binary");
            return Err(e);
        }

        *self.file.lock() = None;
        *self.path.lock() = Some(path.to_path_buf());

        tracing::debug!(
            path = %path.display(),
            blocks = self.block_count(),
            extensions = self.extensions.len(),
            "saved binary"
        );

        hooks.post_save(self, path);
        Ok(())
    }

    fn write_file(&self, tmp_path: &Path, blocks: &[Arc<[u8]>]) -> Result<(), BinaryError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(tmp_path)?;
        let mut out = BufWriter::new(file);

        let header = self.header();
        let mut fresh = Header::new(self.block_count());
        fresh.flags = header.flags;
        fresh.resource_usage = header.resource_usage;
        fresh.write_to(&mut out)?;

        // Reserve the block index
        let index_size = u64::from(self.block_count()) * u64::from(INDEX_RECORD_SIZE);
        io::copy(&mut io::repeat(0).take(index_size), &mut out)?;
        let mut position = fresh.payload_start();

        let order = std::iter::once(BLOCK_EXTENSIONS)
            .chain((0..self.block_count()).filter(|&id| id != BLOCK_EXTENSIONS));
        let mut records = vec![None; blocks.len()];

        for id in order {
            let data = &blocks[id as usize];
            let aligned = align4(position);
            io::copy(&mut io::repeat(0).take(aligned - position), &mut out)?;

            let offset = u32::try_from(aligned)
                .map_err(|_| BinaryError::Corrupt("binary exceeds 4 GiB".to_string()))?;
            let size = data.len() as u32;
            write_block_prefix(&mut out, id, size)?;
            out.write_all(data)?;
            position = aligned + 8 + u64::from(size);

            records[id as usize] = Some(BlockIndexRecord {
                id,
                size,
                offset,
                ext_index: self.blocks[id as usize].ext_index,
            });
        }

        out.seek(SeekFrom::Start(u64::from(fresh.header_size)))?;
        for record in records.into_iter().flatten() {
            record.write_to(&mut out)?;
        }

        let file = out.into_inner().map_err(|e| BinaryError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "binary".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

// ===== Loading =====

impl Binary {
    /// Open a saved binary
    ///
    /// The header, block index and extension table are read immediately;
    /// every linked extension must pass `check`. Other blocks are read when
    /// first accessed.
    pub fn load(path: &Path, check: &dyn ExtensionCheck) -> Result<Arc<Binary>, BinaryError> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let header = Header::read_from(&mut file)?;
        if header.block_count < RESERVED_BLOCKS {
            return Err(BinaryError::NotValid(format!(
                "binary has {} blocks, at least {} required",
                header.block_count, RESERVED_BLOCKS
            )));
        }
        if header.payload_start() > file_len {
            return Err(BinaryError::NotValid("block index exceeds file".to_string()));
        }

        let mut records = Vec::with_capacity(header.block_count as usize);
        for expected in 0..header.block_count {
            let record = BlockIndexRecord::read_from(&mut file)?;
            if record.id != expected {
                return Err(BinaryError::Corrupt(format!(
                    "block index entry {} has id {}",
                    expected, record.id
                )));
            }
            if u64::from(record.offset) < header.payload_start()
                || u64::from(record.offset) + 8 + u64::from(record.size) > file_len
            {
                return Err(BinaryError::Corrupt(format!(
                    "block {} lies outside the file",
                    record.id
                )));
            }
            records.push(record);
        }

        // The extension table is needed before anything else is trusted
        let ext_record = records[BLOCK_EXTENSIONS as usize];
        file.seek(SeekFrom::Start(u64::from(ext_record.offset)))?;
        let (id, size) = read_block_prefix(&mut file)?;
        if id != BLOCK_EXTENSIONS || size != ext_record.size {
            return Err(BinaryError::Corrupt("extension block header mismatch".to_string()));
        }
        let mut ext_data = vec![0u8; size as usize];
        read_exact_or_invalid(&mut file, &mut ext_data, "extension block")?;
        let extensions = decode_extension_table(&ext_data, header.block_count)?;

        for ext in &extensions {
            if !check.is_available(&ext.name, ext.version) {
                tracing::debug!(
                    path = %path.display(),
                    extension = %ext.name,
                    version = ext.version,
                    "binary links unavailable extension"
                );
                return Err(BinaryError::IncompatibleExtension {
                    name: ext.name.clone(),
                    version: ext.version,
                });
            }
        }

        let mut blocks = Vec::with_capacity(records.len());
        for record in &records {
            if record.ext_index != CORE_EXTENSION_INDEX
                && record.ext_index as usize >= extensions.len()
            {
                return Err(BinaryError::Corrupt(format!(
                    "block {} owned by unknown extension {}",
                    record.id, record.ext_index
                )));
            }
            let data: OnceLock<Arc<[u8]>> = OnceLock::new();
            if record.id == BLOCK_EXTENSIONS {
                let _ = data.set(Arc::from(std::mem::take(&mut ext_data)));
            }
            blocks.push(Block {
                ext_index: record.ext_index,
                offset: u64::from(record.offset),
                size: record.size,
                data,
            });
        }

        tracing::debug!(
            path = %path.display(),
            blocks = blocks.len(),
            extensions = extensions.len(),
            "loaded binary"
        );

        Ok(Arc::new(Binary {
            path: Mutex::new(Some(path.to_path_buf())),
            file: Mutex::new(Some(file)),
            header: Mutex::new(header),
            blocks,
            extensions,
        }))
    }
}

// ===== Resource usage =====

impl Binary {
    pub fn resource_usage(&self) -> ResourceUsage {
        self.header.lock().resource_usage
    }

    pub fn resource_limit_exceeded(&self) -> bool {
        self.header.lock().resource_limit_exceeded()
    }

    /// Add the usage of one run to the cumulative record
    ///
    /// For file-backed binaries the on-disk header is re-read and updated
    /// under an exclusive lock, so concurrent runs accumulate. If the lock
    /// cannot be taken within the timeout the file is left alone. Returns
    /// whether the resource limit flag is now set.
    pub fn update_resource_usage(&self, update: UsageUpdate) -> Result<bool, BinaryError> {
        let apply = |header: &mut Header| {
            let usage = &mut header.resource_usage;
            if update.now.saturating_sub(usage.update_time) > update.reset_after_secs {
                usage.cpu_time_ms = 0;
            }
            usage.cpu_time_ms = usage.cpu_time_ms.saturating_add(update.cpu_time_ms);
            usage.update_time = update.now;
            if let Some(limit) = update.limit_ms {
                if usage.cpu_time_ms > limit {
                    header.flags |= FLAG_RESOURCE_LIMIT;
                }
            }
        };

        let persisted = self.modify_header_on_disk(update.lock_timeout, &apply)?;
        let mut header = self.header.lock();
        match persisted {
            Some(on_disk) => {
                header.flags = on_disk.flags;
                header.resource_usage = on_disk.resource_usage;
            }
            None => apply(&mut *header),
        }
        Ok(header.resource_limit_exceeded())
    }

    /// Clear cumulative usage and the resource limit flag
    pub fn reset_resource_usage(&self, lock_timeout: Duration) -> Result<(), BinaryError> {
        let apply = |header: &mut Header| {
            header.flags &= !FLAG_RESOURCE_LIMIT;
            header.resource_usage = ResourceUsage::default();
        };
        self.modify_header_on_disk(lock_timeout, &apply)?;
        apply(&mut *self.header.lock());
        Ok(())
    }

    /// Apply `apply` to the header stored in the backing file
    ///
    /// Returns the updated header, or `None` when there is no backing file,
    /// the lock timed out, or the stored header predates the usage fields.
    fn modify_header_on_disk(
        &self,
        lock_timeout: Duration,
        apply: &dyn Fn(&mut Header),
    ) -> Result<Option<Header>, BinaryError> {
        let Some(path) = self.path() else {
            return Ok(None);
        };

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let Some(_lock) = lock_exclusive_timeout(&file, lock_timeout)? else {
            tracing::warn!(
                path = %path.display(),
                timeout_ms = lock_timeout.as_millis() as u64,
                "timed out locking binary, skipping resource usage update"
            );
            return Ok(None);
        };

        let mut handle = &file;
        let mut header = Header::read_from(&mut handle)?;
        if header.header_size < crate::header::HEADER_SIZE {
            tracing::debug!(path = %path.display(), "binary header too old for usage update");
            return Ok(None);
        }
        apply(&mut header);

        handle.seek(SeekFrom::Start(u64::from(MIN_HEADER_SIZE)))?;
        header.write_mutable_fields(&mut handle)?;
        handle.flush()?;

        tracing::trace!(
            path = %path.display(),
            cpu_time_ms = header.resource_usage.cpu_time_ms,
            limit_exceeded = header.resource_limit_exceeded(),
            "updated resource usage"
        );
        Ok(Some(header))
    }
}

// ===== Dump =====

impl Binary {
    /// Write a listing of the header, block table and extension table
    pub fn write_summary(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let header = self.header();
        writeln!(
            out,
            "Binary format {}.{}, {} blocks",
            header.version_major, header.version_minor, header.block_count
        )?;
        writeln!(
            out,
            "  flags: 0x{:08x}{}",
            header.flags,
            if header.resource_limit_exceeded() {
                " (resource limit exceeded)"
            } else {
                ""
            }
        )?;
        writeln!(
            out,
            "  resource usage: {} ms, updated at {}",
            header.resource_usage.cpu_time_ms, header.resource_usage.update_time
        )?;

        if let Ok(meta) = self.metadata() {
            writeln!(
                out,
                "  script: {} (source mtime {}, compiled at {})",
                meta.name,
                meta.source_mtime,
                meta.compiled_at_utc()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| meta.compiled_at.to_string())
            )?;
        }

        writeln!(out, "Extensions:")?;
        for (index, ext) in self.extensions.iter().enumerate() {
            let mut line = format!("  {}: {} (version {})", index, ext.name, ext.version);
            if let Some(block) = ext.block {
                let _ = write!(line, ", block {}", block);
            }
            writeln!(out, "{}", line)?;
        }

        writeln!(out, "Blocks:")?;
        for (id, block) in self.blocks.iter().enumerate() {
            let owner = match block.ext_index {
                CORE_EXTENSION_INDEX => "core".to_string(),
                index => self
                    .extensions
                    .get(index as usize)
                    .map(|e| e.name.clone())
                    .unwrap_or_else(|| format!("#{}", index)),
            };
            writeln!(out, "  {}: {} bytes, owner {}", id, block.size, owner)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HEADER_SIZE;
    use chrono::{TimeZone, Utc};

    struct AllowAll;

    impl ExtensionCheck for AllowAll {
        fn is_available(&self, _name: &str, _version: u32) -> bool {
            true
        }
    }

    struct Only(&'static str, u32);

    impl ExtensionCheck for Only {
        fn is_available(&self, name: &str, version: u32) -> bool {
            name == self.0 && version == self.1
        }
    }

    fn sample() -> Arc<Binary> {
        let mut builder = BinaryBuilder::new();
        builder.set_metadata(&ScriptMetadata::new(
            "sample",
            1_000,
            Utc.timestamp_opt(2_000, 0).unwrap(),
        ));
        let ext = builder.link_extension("fileinto", 1);
        let ext2 = builder.link_extension("variables", 1);
        assert_eq!(builder.link_extension("fileinto", 1), ext);

        builder.main_program().emit_data(&[5, 4, 1, 2, 3]);
        let block = builder.create_block(ext2);
        builder.block_mut(block).unwrap().emit_string("scope");
        assert!(builder.set_extension_block(ext2, block));
        builder.finish()
    }

    #[test]
    fn test_in_memory_binary() {
        let bin = sample();
        assert_eq!(bin.block_count(), 4);
        assert_eq!(&*bin.main_program().unwrap(), &[5, 4, 1, 2, 3]);
        assert_eq!(bin.extension_block("variables"), Some(3));
        assert_eq!(bin.block_extension(3), Some(1));
        assert_eq!(bin.block_extension(2), None);
        assert_eq!(bin.metadata().unwrap().name, "sample");
        assert!(matches!(bin.block_data(9), Err(BinaryError::NoSuchBlock(9))));
        assert!(bin.path().is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.svbin");
        let bin = sample();
        bin.save(&path, &mut NoHooks).unwrap();
        assert_eq!(bin.path().as_deref(), Some(path.as_path()));

        let loaded = Binary::load(&path, &AllowAll).unwrap();
        assert_eq!(loaded.block_count(), bin.block_count());
        assert_eq!(loaded.extensions(), bin.extensions());
        for id in 0..bin.block_count() {
            assert_eq!(loaded.block_data(id).unwrap(), bin.block_data(id).unwrap());
        }
        assert!(loaded.is_up_to_date(1_000).unwrap());
        assert!(!loaded.is_up_to_date(1_001).unwrap());
    }

    #[test]
    fn test_payloads_are_aligned_and_extension_block_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aligned.svbin");
        sample().save(&path, &mut NoHooks).unwrap();

        let bytes = fs::read(&path).unwrap();
        let index_start = HEADER_SIZE as usize;
        let mut offsets = Vec::new();
        for i in 0..4 {
            let rec = &bytes[index_start + i * 16..index_start + (i + 1) * 16];
            let mut cursor = rec;
            let id = cursor.read_u32::<LittleEndian>().unwrap();
            let _size = cursor.read_u32::<LittleEndian>().unwrap();
            let offset = cursor.read_u32::<LittleEndian>().unwrap();
            assert_eq!(id as usize, i);
            assert_eq!(offset % 4, 0);
            offsets.push(offset);
        }
        assert!(offsets[1] < offsets[0]);
        assert_eq!(offsets[1] as usize, index_start + 4 * 16);
    }

    #[test]
    fn test_missing_extension_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ext.svbin");
        sample().save(&path, &mut NoHooks).unwrap();

        let err = Binary::load(&path, &Only("fileinto", 1)).unwrap_err();
        assert!(matches!(
            err,
            BinaryError::IncompatibleExtension { ref name, version: 1 } if name == "variables"
        ));
        assert!(err.invalidates());
    }

    #[test]
    fn test_corrupt_magic_not_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("magic.svbin");
        sample().save(&path, &mut NoHooks).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[0] = 0;
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            Binary::load(&path, &AllowAll),
            Err(BinaryError::NotValid(_))
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Binary::load(&dir.path().join("nope"), &AllowAll).unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.invalidates());
    }

    #[test]
    fn test_lazy_block_detects_prefix_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lazy.svbin");
        sample().save(&path, &mut NoHooks).unwrap();

        // Rewrite the id in the main program's payload prefix
        let mut bytes = fs::read(&path).unwrap();
        let rec = HEADER_SIZE as usize + 2 * 16;
        let offset = u32::from_le_bytes(bytes[rec + 8..rec + 12].try_into().unwrap()) as usize;
        bytes[offset] = 7;
        fs::write(&path, &bytes).unwrap();

        let loaded = Binary::load(&path, &AllowAll).unwrap();
        assert!(loaded.block_data(BLOCK_METADATA).is_ok());
        assert!(matches!(
            loaded.block_data(BLOCK_MAIN_PROGRAM),
            Err(BinaryError::Corrupt(_))
        ));
    }

    struct Veto;

    impl SaveHooks for Veto {
        fn pre_save(&mut self, _binary: &Binary) -> Result<(), String> {
            Err("not today".to_string())
        }
    }

    #[derive(Default)]
    struct Counting {
        saved: Vec<PathBuf>,
    }

    impl SaveHooks for Counting {
        fn post_save(&mut self, _binary: &Binary, path: &Path) {
            self.saved.push(path.to_path_buf());
        }
    }

    #[test]
    fn test_save_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hooks.svbin");
        let bin = sample();

        assert!(matches!(
            bin.save(&path, &mut Veto),
            Err(BinaryError::SaveVetoed(ref m)) if m == "not today"
        ));
        assert!(!path.exists());

        let mut hooks = Counting::default();
        bin.save(&path, &mut hooks).unwrap();
        assert_eq!(hooks.saved, vec![path.clone()]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    fn usage(now: u64, cpu: u32, limit: Option<u32>) -> UsageUpdate {
        UsageUpdate {
            now,
            cpu_time_ms: cpu,
            reset_after_secs: 60,
            limit_ms: limit,
            lock_timeout: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_resource_usage_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.svbin");
        let bin = sample();
        bin.save(&path, &mut NoHooks).unwrap();

        assert!(!bin.update_resource_usage(usage(100, 40, Some(100))).unwrap());
        assert!(!bin.update_resource_usage(usage(110, 40, Some(100))).unwrap());
        assert!(bin.update_resource_usage(usage(120, 40, Some(100))).unwrap());

        let loaded = Binary::load(&path, &AllowAll).unwrap();
        assert!(loaded.resource_limit_exceeded());
        assert_eq!(
            loaded.resource_usage(),
            ResourceUsage {
                update_time: 120,
                cpu_time_ms: 120
            }
        );

        loaded.reset_resource_usage(Duration::from_millis(100)).unwrap();
        let reloaded = Binary::load(&path, &AllowAll).unwrap();
        assert!(!reloaded.resource_limit_exceeded());
        assert_eq!(reloaded.resource_usage(), ResourceUsage::default());
    }

    #[test]
    fn test_stale_usage_is_reset() {
        let bin = sample();
        bin.update_resource_usage(usage(100, 90, None)).unwrap();
        bin.update_resource_usage(usage(1_000, 5, None)).unwrap();
        assert_eq!(bin.resource_usage().cpu_time_ms, 5);
    }

    #[test]
    fn test_locked_file_skips_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.svbin");
        let bin = sample();
        bin.save(&path, &mut NoHooks).unwrap();

        let holder = File::open(&path).unwrap();
        let _lock = lock_exclusive_timeout(&holder, Duration::from_millis(50))
            .unwrap()
            .unwrap();

        let mut update = usage(100, 40, None);
        update.lock_timeout = Duration::from_millis(20);
        bin.update_resource_usage(update).unwrap();
        assert_eq!(bin.resource_usage().cpu_time_ms, 40);

        drop(_lock);
        let loaded = Binary::load(&path, &AllowAll).unwrap();
        assert_eq!(loaded.resource_usage().cpu_time_ms, 0);
    }

    #[test]
    fn test_summary_lists_blocks_and_extensions() {
        let mut out = String::new();
        sample().write_summary(&mut out).unwrap();
        assert!(out.contains("Binary format 1.0, 4 blocks"));
        assert!(out.contains("1: variables (version 1), block 3"));
        assert!(out.contains("3: 6 bytes, owner variables"));
        assert!(out.contains("script: sample"));
    }
}
