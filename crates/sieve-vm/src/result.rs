//! Script result: the actions a run decided on
//!
//! Actions are only recorded while the script runs. Nothing touches the
//! outside world until [`ScriptResult::commit`] hands them to an
//! [`ActionHandler`].

use crate::error::{ExecStatus, RuntimeError};
use std::fmt;
use thiserror::Error;

/// Mailbox used for keep
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// A filtering decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Keep,
    Discard,
    FileInto { mailbox: String },
    Redirect { address: String },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Keep => write!(f, "keep"),
            Action::Discard => write!(f, "discard"),
            Action::FileInto { mailbox } => write!(f, "fileinto \"{}\"", mailbox),
            Action::Redirect { address } => write!(f, "redirect \"{}\"", address),
        }
    }
}

/// A recorded action with its modifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub action: Action,
    /// `:copy` was given: the implicit keep is not cancelled
    pub copy: bool,
}

/// Failure reported by an [`ActionHandler`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("temporary action failure: {0}")]
    Temporary(String),
    #[error("action failed: {0}")]
    Permanent(String),
}

/// Delivery collaborator applying committed actions
pub trait ActionHandler {
    /// Store the message into a mailbox
    fn store(&mut self, mailbox: &str) -> Result<(), ActionError>;

    /// Forward the message to another address
    fn redirect(&mut self, address: &str) -> Result<(), ActionError>;

    /// Store the message into the default mailbox
    fn keep(&mut self) -> Result<(), ActionError> {
        self.store(DEFAULT_MAILBOX)
    }

    /// Called for discard; nothing is delivered
    fn discard(&mut self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResult {
    actions: Vec<ActionRecord>,
    implicit_keep: bool,
    redirects: usize,
    max_actions: usize,
    max_redirects: usize,
}

impl ScriptResult {
    pub fn new(max_actions: usize, max_redirects: usize) -> Self {
        Self {
            actions: Vec::new(),
            implicit_keep: true,
            redirects: 0,
            max_actions,
            max_redirects,
        }
    }

    pub fn actions(&self) -> &[ActionRecord] {
        &self.actions
    }

    /// Whether the message is still kept when the script ends
    pub fn implicit_keep(&self) -> bool {
        self.implicit_keep
    }

    /// Record an action
    ///
    /// A second keep, fileinto to the same mailbox or redirect to the same
    /// address is merged into the first. Returns whether a new action was
    /// recorded.
    pub fn add(&mut self, action: Action, copy: bool) -> Result<bool, RuntimeError> {
        if !copy {
            self.implicit_keep = false;
        }

        if let Some(existing) = self.actions.iter_mut().find(|r| same_target(&r.action, &action)) {
            existing.copy &= copy;
            return Ok(false);
        }

        if self.actions.len() >= self.max_actions {
            return Err(RuntimeError::Failure(format!(
                "total number of actions exceeds policy limit ({})",
                self.max_actions
            )));
        }
        if matches!(action, Action::Redirect { .. }) {
            if self.redirects >= self.max_redirects {
                return Err(RuntimeError::Failure(format!(
                    "number of redirect actions exceeds policy limit ({})",
                    self.max_redirects
                )));
            }
            self.redirects += 1;
        }

        self.actions.push(ActionRecord { action, copy });
        Ok(true)
    }

    /// Apply the result through `handler`
    ///
    /// When any action fails the message is kept instead. If that keep also
    /// fails the status is [`ExecStatus::KeepFailed`].
    pub fn commit(&self, handler: &mut dyn ActionHandler) -> ExecStatus {
        let mut kept = false;

        for record in &self.actions {
            let outcome = match &record.action {
                Action::Keep => handler.keep().map(|()| kept = true),
                Action::Discard => {
                    handler.discard();
                    Ok(())
                }
                Action::FileInto { mailbox } => handler.store(mailbox).map(|()| {
                    kept |= mailbox.eq_ignore_ascii_case(DEFAULT_MAILBOX);
                }),
                Action::Redirect { address } => handler.redirect(address),
            };

            if let Err(e) = outcome {
                tracing::warn!(action = %record.action, error = %e, "action failed, falling back to keep");
                return Self::fallback_keep(handler, kept, &e);
            }
        }

        if self.implicit_keep && !kept {
            if let Err(e) = handler.keep() {
                tracing::warn!(error = %e, "implicit keep failed");
                return ExecStatus::KeepFailed;
            }
        }
        ExecStatus::Ok
    }

    /// Apply only the implicit keep, used when the script itself failed
    pub fn commit_keep(handler: &mut dyn ActionHandler) -> ExecStatus {
        match handler.keep() {
            Ok(()) => ExecStatus::Failure,
            Err(e) => {
                tracing::warn!(error = %e, "fallback keep failed");
                ExecStatus::KeepFailed
            }
        }
    }

    fn fallback_keep(handler: &mut dyn ActionHandler, kept: bool, cause: &ActionError) -> ExecStatus {
        if kept {
            return failure_status(cause);
        }
        match handler.keep() {
            Ok(()) => failure_status(cause),
            Err(e) => {
                tracing::warn!(error = %e, "fallback keep failed");
                ExecStatus::KeepFailed
            }
        }
    }
}

fn failure_status(cause: &ActionError) -> ExecStatus {
    match cause {
        ActionError::Temporary(_) => ExecStatus::TempFailure,
        ActionError::Permanent(_) => ExecStatus::Failure,
    }
}

fn same_target(a: &Action, b: &Action) -> bool {
    match (a, b) {
        (Action::Keep, Action::Keep) | (Action::Discard, Action::Discard) => true,
        (Action::FileInto { mailbox: x }, Action::FileInto { mailbox: y }) => x == y,
        (Action::Redirect { address: x }, Action::Redirect { address: y }) => {
            x.eq_ignore_ascii_case(y)
        }
        _ => false,
    }
}
