//! Engine facade
//!
//! Bundles the extension registry, the settings and a clock, and exposes
//! the operations a delivery pipeline needs: compile, save, load, run and
//! commit. [`Engine::execute_script`] is the one place that retries: a run
//! that fails with a corrupt binary is recompiled from source and executed
//! once more.

use crate::clock::{Clock, SystemClock};
use crate::code::BinaryDump;
use crate::compiler::{self, Diagnostics, Severity};
use crate::error::{CompileError, ExecStatus, RuntimeError};
use crate::extension::ExtensionRegistry;
use crate::message::{MessageContext, MessageSource};
use crate::result::{ActionHandler, ScriptResult};
use crate::settings::Settings;
use crate::trace::Tracer;
use crate::vm::Interpreter;
use chrono::{TimeZone, Utc};
use sieve_ast::Script;
use sieve_binary::{Binary, BinaryError, SaveHooks, ScriptMetadata, UsageUpdate};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct Engine {
    registry: ExtensionRegistry,
    settings: Settings,
    clock: Box<dyn Clock>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("extensions", &self.registry.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Engine {
    /// Engine with every built-in extension and the system clock
    pub fn new(settings: Settings) -> Self {
        Self::with_registry(ExtensionRegistry::new(), settings)
    }

    pub fn with_registry(registry: ExtensionRegistry, settings: Settings) -> Self {
        Self {
            registry,
            settings,
            clock: Box::new(SystemClock),
        }
    }

    /// Replace the clock used for timestamps and usage records
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // ===== Compiling and storing =====

    /// Compile a syntax tree into a new binary
    ///
    /// `source_mtime` is stored in the binary's metadata and later compared
    /// by [`Engine::open`] to detect stale binaries.
    pub fn compile(
        &self,
        script: &Script,
        source_mtime: u64,
        global_script: bool,
    ) -> Result<(Arc<Binary>, Diagnostics), CompileError> {
        let compiled_at = i64::try_from(self.clock.now())
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_default();
        let metadata = ScriptMetadata::new(script.name.as_str(), source_mtime, compiled_at);

        let outcome = compiler::compile(&self.registry, &self.settings, script, &metadata, global_script);
        match &outcome {
            Ok((_, diagnostics)) => {
                for warning in diagnostics.iter().filter(|d| d.severity == Severity::Warning) {
                    tracing::debug!(script = %script.name, "{}", warning);
                }
                tracing::debug!(script = %script.name, "compiled script");
            }
            Err(e) => tracing::debug!(script = %script.name, error = %e, "compilation failed"),
        }
        outcome
    }

    /// Save a binary, giving linked extensions a chance to veto
    pub fn save(&self, binary: &Binary, path: &Path) -> Result<(), BinaryError> {
        let mut hooks = ExtensionHooks {
            registry: &self.registry,
        };
        binary.save(path, &mut hooks)
    }

    /// Load a saved binary; every linked extension must be registered
    pub fn load(&self, path: &Path) -> Result<Arc<Binary>, BinaryError> {
        Binary::load(path, &self.registry)
    }

    /// Load the binary at `path`, recompiling when it is missing, stale or
    /// invalid
    ///
    /// A freshly compiled binary is saved back to `path`. Failing to save
    /// is logged and the in-memory binary is used anyway.
    pub fn open(
        &self,
        script: &Script,
        source_mtime: u64,
        path: &Path,
        global_script: bool,
    ) -> Result<Arc<Binary>, CompileError> {
        match self.load(path) {
            Ok(binary) => match binary.is_up_to_date(source_mtime) {
                Ok(true) => return Ok(binary),
                Ok(false) => tracing::debug!(path = %path.display(), "binary is stale, recompiling"),
                Err(e) if e.invalidates() => {
                    tracing::warn!(path = %path.display(), error = %e, "binary metadata is invalid, recompiling")
                }
                Err(e) => return Err(e.into()),
            },
            Err(e) if e.is_not_found() => {
                tracing::debug!(path = %path.display(), "no binary yet, compiling")
            }
            Err(e) if e.invalidates() => {
                tracing::warn!(path = %path.display(), error = %e, "binary is invalid, recompiling")
            }
            Err(e) => return Err(e.into()),
        }
        self.recompile(script, source_mtime, Some(path), global_script)
    }

    fn recompile(
        &self,
        script: &Script,
        source_mtime: u64,
        path: Option<&Path>,
        global_script: bool,
    ) -> Result<Arc<Binary>, CompileError> {
        let (binary, _) = self.compile(script, source_mtime, global_script)?;
        if let Some(path) = path {
            if let Err(e) = self.save(&binary, path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to store recompiled binary");
            }
        }
        Ok(binary)
    }

    // ===== Running =====

    /// Run a binary against one message without tracing
    pub fn execute(
        &self,
        binary: &Arc<Binary>,
        message: &mut dyn MessageSource,
        msgctx: &mut MessageContext,
    ) -> Result<ScriptResult, RuntimeError> {
        self.execute_with_trace(binary, message, msgctx, &mut Tracer::disabled())
    }

    /// Run a binary against one message, writing the trace to `trace`
    ///
    /// When a CPU time limit is configured the time spent is added to the
    /// binary's cumulative usage record afterwards.
    pub fn execute_with_trace(
        &self,
        binary: &Arc<Binary>,
        message: &mut dyn MessageSource,
        msgctx: &mut MessageContext,
        trace: &mut Tracer,
    ) -> Result<ScriptResult, RuntimeError> {
        let mut interpreter = Interpreter::new(&self.registry, &self.settings, Arc::clone(binary))?;
        let outcome = interpreter.run(message, msgctx, trace);
        self.record_usage(binary, interpreter.elapsed());

        if let Err(e) = &outcome {
            tracing::debug!(status = %e.status(), error = %e, "script execution failed");
        }
        outcome
    }

    fn record_usage(&self, binary: &Binary, elapsed: Duration) {
        let Some(limit_ms) = self.settings.max_cpu_time_ms else {
            return;
        };
        let update = UsageUpdate {
            now: self.clock.now(),
            cpu_time_ms: u32::try_from(elapsed.as_millis()).unwrap_or(u32::MAX),
            reset_after_secs: self.settings.resource_usage_timeout_secs,
            limit_ms: Some(limit_ms),
            lock_timeout: self.settings.lock_timeout(),
        };
        match binary.update_resource_usage(update) {
            Ok(true) => tracing::warn!(
                limit_ms,
                "cumulative resource usage limit exceeded, script disabled until recompiled"
            ),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "failed to record resource usage"),
        }
    }

    /// Compile or load, run and commit in one call
    ///
    /// With a `path` the binary is opened through [`Engine::open`];
    /// without one the script is compiled in memory. A run failing with
    /// [`ExecStatus::BinCorrupt`] is retried exactly once on a freshly
    /// compiled binary. Whenever the script cannot run to completion the
    /// message is kept, except for temporary failures that the caller is
    /// expected to retry.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_script(
        &self,
        script: &Script,
        source_mtime: u64,
        path: Option<&Path>,
        global_script: bool,
        message: &mut dyn MessageSource,
        msgctx: &mut MessageContext,
        handler: &mut dyn ActionHandler,
    ) -> ExecStatus {
        let opened = match path {
            Some(path) => self.open(script, source_mtime, path, global_script),
            None => self.recompile(script, source_mtime, None, global_script),
        };
        let binary = match opened {
            Ok(binary) => binary,
            Err(e) => {
                tracing::warn!(script = %script.name, error = %e, "script could not be compiled");
                return ScriptResult::commit_keep(handler);
            }
        };

        let outcome = match self.execute(&binary, message, msgctx) {
            Err(e) if e.status() == ExecStatus::BinCorrupt => {
                tracing::warn!(script = %script.name, error = %e, "binary is corrupt, recompiling once");
                match self.recompile(script, source_mtime, path, global_script) {
                    Ok(binary) => self.execute(&binary, message, msgctx),
                    Err(compile_error) => {
                        tracing::warn!(error = %compile_error, "recompiling corrupt binary failed");
                        Err(e)
                    }
                }
            }
            other => other,
        };

        match outcome {
            Ok(result) => self.commit(&result, handler),
            Err(e) => fail(&e, handler),
        }
    }

    /// Apply a result through the delivery collaborator
    pub fn commit(&self, result: &ScriptResult, handler: &mut dyn ActionHandler) -> ExecStatus {
        let status = result.commit(handler);
        tracing::debug!(%status, actions = result.actions().len(), "committed script result");
        status
    }

    // ===== Maintenance =====

    /// Human-readable listing of a binary
    pub fn dump(&self, binary: &Binary) -> Result<String, BinaryError> {
        binary.dump(&self.registry)
    }

    /// Clear a binary's cumulative usage and re-enable it
    pub fn reset_resource_usage(&self, binary: &Binary) -> Result<(), BinaryError> {
        binary.reset_resource_usage(self.settings.lock_timeout())
    }
}

/// Status after a failed run, applying the fallback keep where needed
fn fail(error: &RuntimeError, handler: &mut dyn ActionHandler) -> ExecStatus {
    let status = error.status();
    match status {
        ExecStatus::TempFailure | ExecStatus::KeepFailed => status,
        _ => match ScriptResult::commit_keep(handler) {
            ExecStatus::KeepFailed => ExecStatus::KeepFailed,
            _ => status,
        },
    }
}

/// Runs the save hooks of every extension linked into the binary
struct ExtensionHooks<'r> {
    registry: &'r ExtensionRegistry,
}

impl SaveHooks for ExtensionHooks<'_> {
    fn pre_save(&mut self, binary: &Binary) -> Result<(), String> {
        for linked in binary.extensions() {
            let hook = self
                .registry
                .lookup(&linked.name)
                .and_then(|id| self.registry.get(id))
                .and_then(|def| def.pre_save);
            if let Some(hook) = hook {
                hook(binary).map_err(|reason| format!("{}: {}", linked.name, reason))?;
            }
        }
        Ok(())
    }

    fn post_save(&mut self, binary: &Binary, path: &Path) {
        for linked in binary.extensions() {
            let hook = self
                .registry
                .lookup(&linked.name)
                .and_then(|id| self.registry.get(id))
                .and_then(|def| def.post_save);
            if let Some(hook) = hook {
                hook(binary, path);
            }
        }
    }
}
