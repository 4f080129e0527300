use ogdb_format::FieldFormat;
use serde::{Deserialize, Serialize};

use crate::error::{MarshalError, MarshalResult};

/// Tuning of reads and writes for one open database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarshalConfig {
    /// Depth used when a read does not name one and the class has no override.
    pub activation_depth: u32,
    /// Depth used by prefetch reads that do not name one.
    pub prefetch_activation_depth: u32,
    /// Hops of already-stored referenced objects rewritten by `store`.
    pub update_depth: u32,
    /// Field spec generation written into schema slots.
    pub field_format: FieldFormat,
    /// Compare each header's class id against the instance it is read into.
    pub verify_headers: bool,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            activation_depth: 5,
            prefetch_activation_depth: 1,
            update_depth: 1,
            field_format: FieldFormat::V1,
            verify_headers: cfg!(debug_assertions),
        }
    }
}

impl MarshalConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> MarshalResult<Self> {
        toml::from_str(input).map_err(|e| MarshalError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> MarshalResult<String> {
        toml::to_string(self).map_err(|e| MarshalError::Config(e.to_string()))
    }
}
