use std::collections::HashMap;

use ogdb_types::IndexId;
use serde::{Deserialize, Serialize};

use crate::error::{DefragError, DefragResult};

/// Translation of one secondary-index root id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRemap {
    pub from: IndexId,
    pub to: IndexId,
}

/// Configuration of one defragmentation pass.
///
/// ```toml
/// keep_dangling = true
///
/// [[index]]
/// from = 12
/// to = 40
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefragConfig {
    /// Rewrite references to objects that are not copied as null instead of
    /// failing the pass.
    pub keep_dangling: bool,
    /// Index root ids of the target file. Unlisted index ids are copied
    /// unchanged.
    #[serde(rename = "index")]
    pub indexes: Vec<IndexRemap>,
}

impl DefragConfig {
    pub fn from_toml_str(s: &str) -> DefragResult<Self> {
        toml::from_str(s).map_err(|e| DefragError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> DefragResult<String> {
        toml::to_string(self).map_err(|e| DefragError::Config(e.to_string()))
    }

    pub fn map_index(mut self, from: IndexId, to: IndexId) -> Self {
        self.indexes.push(IndexRemap { from, to });
        self
    }

    pub(crate) fn index_table(&self) -> HashMap<IndexId, IndexId> {
        self.indexes.iter().map(|r| (r.from, r.to)).collect()
    }
}
