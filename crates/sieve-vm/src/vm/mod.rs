//! Bytecode interpreter
//!
//! An [`Interpreter`] is bound to one binary. Construction links the
//! binary's extension table against the registry, verifies the main
//! program and runs the extensions' load hooks; [`Interpreter::run`] then
//! executes the program against one message.
//!
//! # Modules
//!
//! - `env`: runtime environment and operand readers handed to execute hooks
//! - `execution`: dispatch loop and core operation handlers
//! - `matching`: the value/key loop shared by every matching test

pub mod env;
mod execution;
pub mod matching;

pub use env::{Optionals, RuntimeEnv};

use crate::code::{link_extensions, Disassembler};
use crate::error::RuntimeError;
use crate::extension::{ExtId, ExtensionRegistry};
use crate::message::{MessageContext, MessageSource};
use crate::objects::MatchValues;
use crate::result::ScriptResult;
use crate::settings::Settings;
use crate::trace::{TraceLevel, Tracer};
use sieve_binary::{Binary, CodeReader};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-extension state keyed by [`ExtId`], created lazily
#[derive(Default)]
pub struct ExtContexts {
    map: HashMap<ExtId, Box<dyn Any + Send>>,
}

impl fmt::Debug for ExtContexts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.map.keys().collect();
        keys.sort();
        f.debug_struct("ExtContexts").field("extensions", &keys).finish()
    }
}

impl ExtContexts {
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Context of `ext`, replaced by `T::default()` if absent or of
    /// another type
    pub fn get_or_default<T: Any + Send + Default>(&mut self, ext: ExtId) -> &mut T {
        let slot = self
            .map
            .entry(ext)
            .or_insert_with(|| Box::new(T::default()));
        if !(**slot).is::<T>() {
            *slot = Box::new(T::default());
        }
        match slot.downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("context slot was just reset to the requested type"),
        }
    }

    pub fn get<T: Any + Send>(&self, ext: ExtId) -> Option<&T> {
        self.map.get(&ext).and_then(|b| b.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any + Send>(&mut self, ext: ExtId) -> Option<&mut T> {
        self.map.get_mut(&ext).and_then(|b| b.downcast_mut::<T>())
    }
}

/// Lifecycle of an interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterState {
    Ready,
    Running,
    /// Stopped by `stop`
    Interrupted,
    /// Ran to the end of the program or failed
    Terminated,
}

pub struct Interpreter<'r> {
    registry: &'r ExtensionRegistry,
    settings: &'r Settings,
    binary: Arc<Binary>,
    program: Arc<[u8]>,
    /// Registry id of every entry in the binary's linkage table
    ext_map: Vec<ExtId>,
    match_values: bool,
    contexts: ExtContexts,
    state: InterpreterState,
    elapsed: Duration,
}

impl fmt::Debug for Interpreter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("state", &self.state)
            .field("program_size", &self.program.len())
            .field("ext_map", &self.ext_map)
            .finish()
    }
}

impl<'r> Interpreter<'r> {
    /// Bind an interpreter to a binary
    ///
    /// Fails with a corrupt-binary error when a linked extension is
    /// unavailable or the main program does not verify.
    pub fn new(
        registry: &'r ExtensionRegistry,
        settings: &'r Settings,
        binary: Arc<Binary>,
    ) -> Result<Self, RuntimeError> {
        let ext_map = link_extensions(registry, &binary)?;
        let program = binary.main_program()?;
        Disassembler::new(registry, &ext_map, CodeReader::new(&program)).verify()?;

        let mut interpreter = Self {
            registry,
            settings,
            binary,
            program,
            ext_map,
            match_values: false,
            contexts: ExtContexts::default(),
            state: InterpreterState::Ready,
            elapsed: Duration::ZERO,
        };

        let hooks: Vec<_> = interpreter
            .ext_map
            .iter()
            .filter_map(|id| registry.get(*id)?.interpreter_load.map(|hook| (*id, hook)))
            .collect();
        for (id, hook) in hooks {
            hook(&mut interpreter, id)?;
        }

        tracing::trace!(
            program_size = interpreter.program.len(),
            extensions = interpreter.ext_map.len(),
            "interpreter ready"
        );
        Ok(interpreter)
    }

    pub fn registry(&self) -> &'r ExtensionRegistry {
        self.registry
    }

    pub fn settings(&self) -> &'r Settings {
        self.settings
    }

    pub fn binary(&self) -> &Arc<Binary> {
        &self.binary
    }

    pub fn state(&self) -> InterpreterState {
        self.state
    }

    /// Wall time spent in the last run
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Registry id of the extension linked at `index`
    pub fn extension(&self, index: usize) -> Option<ExtId> {
        self.ext_map.get(index).copied()
    }

    /// Record match values during runs
    pub fn enable_match_values(&mut self) {
        self.match_values = true;
    }

    /// Interpreter-lifetime context of an extension
    pub fn context_mut<T: Any + Send + Default>(&mut self, ext: ExtId) -> &mut T {
        self.contexts.get_or_default(ext)
    }

    /// Execute the main program against one message
    pub fn run(
        &mut self,
        message: &mut dyn MessageSource,
        msgctx: &mut MessageContext,
        trace: &mut Tracer,
    ) -> Result<ScriptResult, RuntimeError> {
        if self.binary.resource_limit_exceeded() {
            return Err(RuntimeError::ResourceLimit(
                "cumulative resource usage limit exceeded".to_string(),
            ));
        }

        let program = Arc::clone(&self.program);
        let mut env = RuntimeEnv {
            registry: self.registry,
            settings: self.settings,
            code: CodeReader::new(&program),
            ext_map: &self.ext_map,
            message,
            msgctx,
            trace,
            result: ScriptResult::new(self.settings.max_actions, self.settings.max_redirects),
            match_values: MatchValues::new(self.match_values),
            contexts: ExtContexts::default(),
            op_address: 0,
            test_result: false,
            interrupted: false,
        };

        self.state = InterpreterState::Running;
        let start = Instant::now();
        env.trace.line(TraceLevel::Commands, None, format_args!("## Started executing script"));

        let outcome = env.execute_all(start);
        self.elapsed = start.elapsed();

        match &outcome {
            Ok(()) if env.interrupted => {
                self.state = InterpreterState::Interrupted;
                env.trace.line(TraceLevel::Commands, None, format_args!("## Interrupted by stop"));
            }
            Ok(()) => {
                self.state = InterpreterState::Terminated;
                env.trace.line(TraceLevel::Commands, None, format_args!("## Finished executing script"));
            }
            Err(e) => {
                self.state = InterpreterState::Terminated;
                env.trace.line(TraceLevel::Commands, None, format_args!("## Failed: {}", e));
            }
        }
        env.trace.flush();

        tracing::debug!(
            elapsed_us = self.elapsed.as_micros() as u64,
            actions = env.result.actions().len(),
            ok = outcome.is_ok(),
            "script run finished"
        );

        outcome.map(|()| env.result)
    }
}
