//! Script metadata stored in block 0

use crate::code::{CodeBuffer, CodeReader};
use crate::error::CodeError;
use chrono::{DateTime, TimeZone, Utc};

/// Where the binary came from and when it was produced
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScriptMetadata {
    /// Script name as given to the compiler
    pub name: String,
    /// Modification time of the script source (unix seconds)
    pub source_mtime: u64,
    /// Compile time (unix seconds)
    pub compiled_at: u64,
}

impl ScriptMetadata {
    pub fn new(name: impl Into<String>, source_mtime: u64, compiled_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            source_mtime,
            compiled_at: compiled_at.timestamp().max(0) as u64,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = CodeBuffer::new();
        buf.emit_string(&self.name);
        buf.emit_integer(self.source_mtime);
        buf.emit_integer(self.compiled_at);
        buf.into_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodeError> {
        let reader = CodeReader::new(data);
        let mut address = 0;
        let name = reader.read_string(&mut address)?;
        let source_mtime = reader.read_integer(&mut address)?;
        let compiled_at = reader.read_integer(&mut address)?;
        Ok(Self {
            name,
            source_mtime,
            compiled_at,
        })
    }

    /// Compile time as a calendar timestamp
    pub fn compiled_at_utc(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.compiled_at).ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }

    /// Whether a script source with modification time `script_mtime` is
    /// newer than the source this binary was compiled from
    pub fn is_stale(&self, script_mtime: u64) -> bool {
        self.source_mtime < script_mtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_decode() {
        let compiled = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let meta = ScriptMetadata::new("personal", 1_600_000_000, compiled);
        let back = ScriptMetadata::decode(&meta.encode()).unwrap();

        assert_eq!(back.name, "personal");
        assert_eq!(back.source_mtime, 1_600_000_000);
        assert_eq!(back.compiled_at_utc(), Some(compiled));
    }

    #[test]
    fn test_staleness() {
        let meta = ScriptMetadata {
            name: "s".into(),
            source_mtime: 100,
            compiled_at: 200,
        };
        assert!(!meta.is_stale(100));
        assert!(!meta.is_stale(50));
        assert!(meta.is_stale(101));
    }
}
