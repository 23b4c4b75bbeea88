//! Operation dispatch and core operation handlers

mod actions;
mod conditions;
mod control;

use super::env::RuntimeEnv;
use crate::error::RuntimeError;
use crate::opcode::{OpCode, OP_CUSTOM};
use crate::trace::TraceLevel;
use std::time::{Duration, Instant};

impl RuntimeEnv<'_, '_> {
    /// Run the program from the start until it ends, stops or fails
    pub(crate) fn execute_all(&mut self, start: Instant) -> Result<(), RuntimeError> {
        let limit = self
            .settings
            .max_cpu_time_ms
            .map(|ms| Duration::from_millis(u64::from(ms)));
        let mut address = 0;

        while !self.interrupted && address < self.code.len() {
            self.execute_next(&mut address)?;

            if let Some(limit) = limit {
                if start.elapsed() > limit {
                    return Err(RuntimeError::ResourceLimit(format!(
                        "execution took longer than {} ms",
                        limit.as_millis()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Decode and execute the operation at `address`
    fn execute_next(&mut self, address: &mut usize) -> Result<(), RuntimeError> {
        let op_address = *address;
        self.op_address = op_address;
        let byte = self.code.read_byte(address)?;

        if byte >= OP_CUSTOM {
            let ext = self.extension(usize::from(byte - OP_CUSTOM), op_address)?;
            let code = self.code.read_byte(address)?;
            let op = self
                .registry
                .get(ext)
                .and_then(|def| def.operation(code))
                .ok_or_else(|| {
                    RuntimeError::corrupt(
                        op_address,
                        format!("unknown operation {} of extension {}", code, ext),
                    )
                })?;
            self.trace.line(
                TraceLevel::Commands,
                Some(op_address),
                format_args!("{}", op.mnemonic),
            );
            return (op.execute)(self, address);
        }

        let op = OpCode::from_u8(byte).ok_or_else(|| {
            RuntimeError::corrupt(op_address, format!("unknown operation code {}", byte))
        })?;

        match op {
            OpCode::Jmp | OpCode::JmpTrue | OpCode::JmpFalse | OpCode::Stop => {
                self.execute_control(op, op_address, address)
            }
            OpCode::Keep | OpCode::Discard | OpCode::Redirect => {
                self.execute_action(op, op_address, address)
            }
            OpCode::Address
            | OpCode::Header
            | OpCode::Exists
            | OpCode::SizeOver
            | OpCode::SizeUnder => self.execute_test(op, op_address, address),
        }
    }
}
