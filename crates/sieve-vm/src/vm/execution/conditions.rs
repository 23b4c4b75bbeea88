//! Test operation execution

use crate::address::parse_address_list;
use crate::error::RuntimeError;
use crate::objects::{address_part, AddressPart};
use crate::opcode::OpCode;
use crate::trace::TraceLevel;
use crate::vm::env::RuntimeEnv;
use crate::vm::matching::match_values;

impl RuntimeEnv<'_, '_> {
    /// Execute `address`, `header`, `exists` and `size`
    pub(crate) fn execute_test(
        &mut self,
        op: OpCode,
        op_address: usize,
        address: &mut usize,
    ) -> Result<(), RuntimeError> {
        let result = match op {
            OpCode::Header => {
                let names = self.read_string_list(address)?;
                let keys = self.read_string_list(address)?;
                let opts = self.read_core_optionals(address)?;
                self.trace_test(op_address, format_args!("header test on {:?}", names));

                let mut values = Vec::new();
                for name in &names {
                    values.extend(self.message.header_values(name)?);
                }
                match_values(self, opts.comparator(), opts.match_type(), &values, &keys)
            }
            OpCode::Address => {
                let names = self.read_string_list(address)?;
                let keys = self.read_string_list(address)?;
                let opts = self.read_core_optionals(address)?;
                self.trace_test(op_address, format_args!("address test on {:?}", names));

                let mut raw = Vec::new();
                for name in &names {
                    raw.extend(self.message.header_values(name)?);
                }
                let values = address_values(
                    opts.address_part(),
                    &raw,
                    &self.settings.subaddress_separator,
                );
                match_values(self, opts.comparator(), opts.match_type(), &values, &keys)
            }
            OpCode::Exists => {
                let names = self.read_string_list(address)?;
                self.trace_test(op_address, format_args!("exists test on {:?}", names));
                let mut all = true;
                for name in &names {
                    if self.message.header_values(name)?.is_empty() {
                        all = false;
                        break;
                    }
                }
                all
            }
            OpCode::SizeOver | OpCode::SizeUnder => {
                let limit = self.read_number(address)?;
                let size = self.message.size()?;
                self.trace_test(
                    op_address,
                    format_args!("size test: message is {} octets, limit {}", size, limit),
                );
                if op == OpCode::SizeOver {
                    size > limit
                } else {
                    size < limit
                }
            }
            _ => unreachable!("non-test opcode in test handler"),
        };

        self.set_test_result(op_address, result);
        Ok(())
    }

    pub fn trace_test(&mut self, op_address: usize, args: std::fmt::Arguments<'_>) {
        self.trace.line(TraceLevel::Tests, Some(op_address), args);
    }

    /// Store the outcome of a test for the following conditional jump
    pub fn set_test_result(&mut self, op_address: usize, result: bool) {
        self.test_result = result;
        self.trace.line(
            TraceLevel::Tests,
            Some(op_address),
            format_args!("  => {}", result),
        );
    }
}

/// Address parts of every address in `raw` header values
///
/// A value that does not parse as an address list is matched as is, but
/// only under `:all`.
pub(crate) fn address_values(part: &dyn AddressPart, raw: &[String], separator: &str) -> Vec<String> {
    let mut values = Vec::new();
    for value in raw {
        match parse_address_list(value) {
            Some(addresses) => {
                values.extend(addresses.iter().filter_map(|a| part.extract(a, separator)));
            }
            None if part.identifier() == address_part::ALL.identifier() => {
                values.push(value.trim().to_string());
            }
            None => {
                tracing::debug!(value = %value, "ignoring unparseable address");
            }
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_values_extract_parts() {
        let raw = vec!["Alice <alice+lists@example.com>, bob@example.org".to_string()];
        assert_eq!(
            address_values(&address_part::DOMAIN, &raw, "+"),
            vec!["example.com", "example.org"]
        );
        assert_eq!(
            address_values(&address_part::DETAIL, &raw, "+"),
            vec!["lists"]
        );
    }

    #[test]
    fn test_unparseable_value_only_under_all() {
        let raw = vec!["not an address <<".to_string()];
        assert_eq!(address_values(&address_part::ALL, &raw, "+"), vec!["not an address <<"]);
        assert!(address_values(&address_part::LOCALPART, &raw, "+").is_empty());
    }
}
