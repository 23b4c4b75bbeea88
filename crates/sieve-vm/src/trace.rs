//! Execution trace side channel
//!
//! The tracer writes human-readable, indented lines describing what a
//! script does while it runs. It never influences control flow; the first
//! write failure is logged and later ones are dropped.

use parking_lot::Mutex;
use serde::Deserialize;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

/// How much detail the trace contains; each level includes the previous
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    None,
    /// Actions added to the result
    Actions,
    /// Every executed command
    Commands,
    /// Test operations and their outcome
    Tests,
    /// Individual value/key comparisons
    Matching,
}

pub struct Tracer {
    level: TraceLevel,
    addresses: bool,
    indent: usize,
    sink: Option<Box<dyn Write + Send>>,
    write_failed: bool,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("level", &self.level)
            .field("addresses", &self.addresses)
            .field("indent", &self.indent)
            .field("write_failed", &self.write_failed)
            .finish()
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Tracer {
    /// A tracer that records nothing
    pub fn disabled() -> Self {
        Self {
            level: TraceLevel::None,
            addresses: false,
            indent: 0,
            sink: None,
            write_failed: false,
        }
    }

    pub fn new(level: TraceLevel, addresses: bool, sink: Box<dyn Write + Send>) -> Self {
        Self {
            level,
            addresses,
            indent: 0,
            sink: Some(sink),
            write_failed: false,
        }
    }

    #[inline]
    pub fn enabled(&self, level: TraceLevel) -> bool {
        level != TraceLevel::None && self.level >= level && self.sink.is_some()
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn outdent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Write one line at `level`, optionally prefixed with a program address
    pub fn line(&mut self, level: TraceLevel, address: Option<usize>, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        let prefix = match address {
            Some(addr) if self.addresses => format!("{:08x}: ", addr),
            _ => String::new(),
        };
        let indent = "  ".repeat(self.indent);
        if let Some(sink) = self.sink.as_mut() {
            let outcome = writeln!(sink, "{}{}{}", prefix, indent, args);
            self.note_failure(outcome);
        }
    }

    pub fn flush(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            let outcome = sink.flush();
            self.note_failure(outcome);
        }
    }

    /// Whether writing to the sink has failed at least once
    pub fn write_failed(&self) -> bool {
        self.write_failed
    }

    fn note_failure(&mut self, outcome: io::Result<()>) {
        if let Err(e) = outcome {
            if !self.write_failed {
                tracing::debug!(error = %e, "trace sink failed, further trace output may be lost");
                self.write_failed = true;
            }
        }
    }
}

/// In-memory trace sink that can be cloned and read back
#[derive(Debug, Clone, Default)]
pub struct TraceBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl TraceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }
}

impl Write for TraceBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filtering() {
        let buf = TraceBuffer::new();
        let mut tracer = Tracer::new(TraceLevel::Commands, false, Box::new(buf.clone()));

        tracer.line(TraceLevel::Actions, None, format_args!("keep"));
        tracer.indent();
        tracer.line(TraceLevel::Commands, None, format_args!("if"));
        tracer.line(TraceLevel::Matching, None, format_args!("hidden"));
        tracer.outdent();

        assert_eq!(buf.contents(), "keep\n  if\n");
    }

    #[test]
    fn test_address_prefix() {
        let buf = TraceBuffer::new();
        let mut tracer = Tracer::new(TraceLevel::Tests, true, Box::new(buf.clone()));
        tracer.line(TraceLevel::Tests, Some(0x1c), format_args!("header"));
        tracer.line(TraceLevel::Tests, None, format_args!("done"));
        assert_eq!(buf.contents(), "0000001c: header\ndone\n");
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_failure_is_recorded() {
        let mut tracer = Tracer::new(TraceLevel::Actions, false, Box::new(BrokenSink));
        assert!(!tracer.write_failed());
        tracer.line(TraceLevel::Actions, None, format_args!("keep"));
        assert!(tracer.write_failed());
        tracer.line(TraceLevel::Actions, None, format_args!("discard"));
        tracer.flush();
        assert!(tracer.write_failed());
    }

    #[test]
    fn test_disabled_tracer() {
        let tracer = Tracer::disabled();
        assert!(!tracer.enabled(TraceLevel::Actions));
    }
}
