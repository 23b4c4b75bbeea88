//! Human-readable binary dump

use super::{link_extensions, Disassembler};
use crate::extension::ExtensionRegistry;
use sieve_binary::{Binary, BinaryError, CodeReader};
use std::fmt::{self, Write};

/// Render a binary as text
pub trait BinaryDump {
    /// Header, block table, extension blocks and the disassembled main
    /// program
    fn dump(&self, registry: &ExtensionRegistry) -> Result<String, BinaryError>;
}

impl BinaryDump for Binary {
    fn dump(&self, registry: &ExtensionRegistry) -> Result<String, BinaryError> {
        let ext_map = link_extensions(registry, self)?;
        let mut out = String::new();
        self.write_summary(&mut out).map_err(formatting)?;

        for (linked, id) in self.extensions().iter().zip(&ext_map) {
            let (Some(block), Some(dump_block)) = (
                linked.block,
                registry.get(*id).and_then(|def| def.dump_block),
            ) else {
                continue;
            };
            let data = self.block_data(block)?;
            writeln!(out, "Block {} ({}):", block, linked.name).map_err(formatting)?;
            dump_block(&data, &mut out).map_err(formatting)?;
        }

        let program = self.main_program()?;
        writeln!(out, "Main program ({} bytes):", program.len()).map_err(formatting)?;
        Disassembler::new(registry, &ext_map, CodeReader::new(&program))
            .write_listing(&mut out)
            .map_err(formatting)?;
        Ok(out)
    }
}

fn formatting(_: fmt::Error) -> BinaryError {
    BinaryError::Corrupt("failed to format binary dump".to_string())
}
