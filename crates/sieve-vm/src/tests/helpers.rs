//! Collaborator fakes and shortcuts shared by the integration tests

use crate::clock::Clock;
use crate::compiler::Diagnostics;
use crate::engine::Engine;
use crate::error::{CompileError, RuntimeError};
use crate::message::{EnvelopePart, HeaderEditor, MessageContext, MessageError, MessageSource};
use crate::result::{Action, ActionError, ActionHandler, ScriptResult};
use crate::settings::Settings;
use crate::trace::{TraceBuffer, TraceLevel, Tracer};
use sieve_ast::{command, Command, Script};
use sieve_binary::Binary;
use std::sync::Arc;

/// In-memory message with optional header editing
#[derive(Debug, Default, Clone)]
pub struct FakeMessage {
    pub headers: Vec<(String, String)>,
    pub size: u64,
    pub from: Option<String>,
    pub to: Option<String>,
    pub editable: bool,
    pub temporary_failure: bool,
}

impl FakeMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn envelope(mut self, from: &str, to: &str) -> Self {
        self.from = Some(from.to_string());
        self.to = Some(to.to_string());
        self
    }

    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    /// Values of a field, in header order
    pub fn values(&self, name: &str) -> Vec<String> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .collect()
    }
}

impl MessageSource for FakeMessage {
    fn header_values(&self, name: &str) -> Result<Vec<String>, MessageError> {
        if self.temporary_failure {
            return Err(MessageError::Temporary("header store unavailable".to_string()));
        }
        Ok(self.values(name))
    }

    fn size(&self) -> Result<u64, MessageError> {
        Ok(self.size)
    }

    fn envelope(&self, part: EnvelopePart) -> Result<Option<String>, MessageError> {
        Ok(match part {
            EnvelopePart::From => self.from.clone(),
            EnvelopePart::To => self.to.clone(),
        })
    }

    fn editor(&mut self) -> Option<&mut dyn HeaderEditor> {
        if self.editable {
            Some(self as &mut dyn HeaderEditor)
        } else {
            None
        }
    }
}

impl HeaderEditor for FakeMessage {
    fn add_header(&mut self, name: &str, value: &str, last: bool) -> Result<(), MessageError> {
        let field = (name.to_string(), value.to_string());
        if last {
            self.headers.push(field);
        } else {
            self.headers.insert(0, field);
        }
        Ok(())
    }

    fn delete_header(&mut self, name: &str, occurrence: Option<usize>) -> Result<(), MessageError> {
        match occurrence {
            None => self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name)),
            Some(occurrence) => {
                let position = self
                    .headers
                    .iter()
                    .enumerate()
                    .filter(|(_, (n, _))| n.eq_ignore_ascii_case(name))
                    .nth(occurrence - 1)
                    .map(|(i, _)| i);
                if let Some(i) = position {
                    self.headers.remove(i);
                }
            }
        }
        Ok(())
    }
}

/// Records every delivery call; can be told to fail
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub log: Vec<String>,
    pub fail_mailbox: Option<String>,
    pub fail_keep: bool,
}

impl ActionHandler for RecordingHandler {
    fn store(&mut self, mailbox: &str) -> Result<(), ActionError> {
        if self.fail_mailbox.as_deref() == Some(mailbox) {
            return Err(ActionError::Permanent(format!("no such mailbox {}", mailbox)));
        }
        self.log.push(format!("store {}", mailbox));
        Ok(())
    }

    fn redirect(&mut self, address: &str) -> Result<(), ActionError> {
        self.log.push(format!("redirect {}", address));
        Ok(())
    }

    fn keep(&mut self) -> Result<(), ActionError> {
        if self.fail_keep {
            return Err(ActionError::Temporary("keep refused".to_string()));
        }
        self.log.push("keep".to_string());
        Ok(())
    }

    fn discard(&mut self) {
        self.log.push("discard".to_string());
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

pub fn engine() -> Engine {
    Engine::new(Settings::default()).with_clock(FixedClock(1_700_000_000))
}

pub fn script(commands: Vec<Command>) -> Script {
    Script::new("test").commands(commands)
}

pub fn require(capabilities: &[&str]) -> Command {
    command("require").strings(capabilities.iter().copied()).build()
}

pub fn compile(script: &Script) -> Arc<Binary> {
    engine().compile(script, 0, false).unwrap().0
}

pub fn compile_errors(script: &Script) -> Diagnostics {
    match engine().compile(script, 0, false) {
        Err(CompileError::Validation(diagnostics)) => diagnostics,
        Err(other) => panic!("Expected validation failure, got {}", other),
        Ok(_) => panic!("Expected validation failure, script compiled"),
    }
}

pub fn try_run(script: &Script, message: &mut FakeMessage) -> Result<ScriptResult, RuntimeError> {
    let engine = engine();
    let (binary, _) = engine.compile(script, 0, false).unwrap();
    engine.execute(&binary, message, &mut MessageContext::new())
}

pub fn run(script: &Script, message: &mut FakeMessage) -> ScriptResult {
    try_run(script, message).unwrap()
}

/// Run with a full trace and return it alongside the result
pub fn run_traced(script: &Script, message: &mut FakeMessage) -> (ScriptResult, String) {
    let engine = engine();
    let (binary, _) = engine.compile(script, 0, false).unwrap();
    let buffer = TraceBuffer::new();
    let mut tracer = Tracer::new(TraceLevel::Matching, true, Box::new(buffer.clone()));
    let result = engine
        .execute_with_trace(&binary, message, &mut MessageContext::new(), &mut tracer)
        .unwrap();
    (result, buffer.contents())
}

/// Recorded actions without modifiers
pub fn actions(result: &ScriptResult) -> Vec<Action> {
    result.actions().iter().map(|r| r.action.clone()).collect()
}

pub fn fileinto(mailbox: &str) -> Action {
    Action::FileInto {
        mailbox: mailbox.to_string(),
    }
}
