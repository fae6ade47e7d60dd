//! TOML configuration for the compiler and the bundled host.
//!
//! ```toml
//! [codegen]
//! filename = "demo.py"
//! name = "<module>"
//! firstlineno = 1
//!
//! [opcodes]
//! LOAD_CONST = 100
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bytecode::{CodegenOptions, Opcode, OpcodeTable, op::OpcodeTableError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid [opcodes] table: {0}")]
    Opcodes(#[from] OpcodeTableError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub codegen: CodegenOptions,

    /// Opcode numbers by mnemonic, overriding the classic numbering.
    pub opcodes: BTreeMap<String, u8>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// The classic opcode table with this config's overrides applied.
    pub fn opcode_table(&self) -> Result<OpcodeTable, ConfigError> {
        let overrides = self
            .opcodes
            .iter()
            .map(|(name, byte)| {
                Opcode::from_name(name)
                    .map(|op| (op, *byte))
                    .ok_or_else(|| OpcodeTableError::UnknownName(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(OpcodeTable::classic().with_overrides(overrides)?)
    }
}
