//! Action operation execution

use crate::address;
use crate::error::RuntimeError;
use crate::objects::ActionOptions;
use crate::opcode::OpCode;
use crate::result::Action;
use crate::trace::TraceLevel;
use crate::vm::env::RuntimeEnv;

impl RuntimeEnv<'_, '_> {
    /// Execute `keep`, `discard` and `redirect`
    pub(crate) fn execute_action(
        &mut self,
        op: OpCode,
        op_address: usize,
        address: &mut usize,
    ) -> Result<(), RuntimeError> {
        match op {
            OpCode::Keep => self.add_action(op_address, Action::Keep, ActionOptions::default()),
            OpCode::Discard => self.add_action(op_address, Action::Discard, ActionOptions::default()),
            OpCode::Redirect => {
                let target = self.read_string(address)?;
                let opts = self.read_core_optionals(address)?;
                let target = target.trim();
                if !address::is_valid_mailbox(target) {
                    return Err(RuntimeError::Failure(format!(
                        "specified redirect address '{}' is invalid",
                        target
                    )));
                }
                self.add_action(
                    op_address,
                    Action::Redirect {
                        address: target.to_string(),
                    },
                    opts.action_options(),
                )
            }
            _ => unreachable!("non-action opcode in action handler"),
        }
    }

    /// Record an action in the result
    pub fn add_action(
        &mut self,
        op_address: usize,
        action: Action,
        options: ActionOptions,
    ) -> Result<(), RuntimeError> {
        let line = if options.copy {
            format!("{} :copy", action)
        } else {
            action.to_string()
        };
        let added = self.result.add(action, options.copy)?;
        self.trace.line(
            TraceLevel::Actions,
            Some(op_address),
            format_args!("{}{}", line, if added { "" } else { " (duplicate, merged)" }),
        );
        Ok(())
    }
}
