//! Control flow operation execution

use crate::error::RuntimeError;
use crate::opcode::OpCode;
use crate::trace::TraceLevel;
use crate::vm::env::RuntimeEnv;

impl RuntimeEnv<'_, '_> {
    /// Execute jumps and `stop`
    pub(crate) fn execute_control(
        &mut self,
        op: OpCode,
        op_address: usize,
        address: &mut usize,
    ) -> Result<(), RuntimeError> {
        match op {
            OpCode::Jmp => self.jump(op_address, address, true),
            OpCode::JmpTrue => {
                let taken = self.test_result;
                self.jump(op_address, address, taken)
            }
            OpCode::JmpFalse => {
                let taken = !self.test_result;
                self.jump(op_address, address, taken)
            }
            OpCode::Stop => {
                self.trace
                    .line(TraceLevel::Commands, Some(op_address), format_args!("stop"));
                self.interrupted = true;
                Ok(())
            }
            _ => unreachable!("non-control opcode in control handler"),
        }
    }

    fn jump(&mut self, op_address: usize, address: &mut usize, taken: bool) -> Result<(), RuntimeError> {
        let target = self.code.read_offset(address)?;
        if target < *address || target > self.code.len() {
            return Err(RuntimeError::corrupt(
                op_address,
                format!("jump target {} out of range", target),
            ));
        }
        if taken {
            self.trace.line(
                TraceLevel::Tests,
                Some(op_address),
                format_args!("jump to {:08x}", target),
            );
            *address = target;
        }
        Ok(())
    }
}
