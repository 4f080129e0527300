use std::collections::HashMap;
use std::sync::RwLock;

use ogdb_types::{IndexId, ObjectId};

use crate::error::MarshalResult;
use crate::value::Value;

/// Secondary-index collaborator.
///
/// Keys are field values; references arrive as [`Value::Stub`] of the
/// referenced id.
pub trait FieldIndex: Send + Sync {
    fn add_entry(&self, index: IndexId, key: &Value, owner: ObjectId) -> MarshalResult<()>;
    fn remove_entry(&self, index: IndexId, key: &Value, owner: ObjectId) -> MarshalResult<()>;
}

/// Linear in-memory index, one entry list per index id.
#[derive(Debug, Default)]
pub struct InMemoryFieldIndex {
    entries: RwLock<HashMap<IndexId, Vec<(Value, ObjectId)>>>,
}

impl InMemoryFieldIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owners of every entry under `key`.
    pub fn lookup(&self, index: IndexId, key: &Value) -> Vec<ObjectId> {
        self.entries
            .read()
            .expect("lock poisoned")
            .get(&index)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(k, _)| k == key)
                    .map(|(_, owner)| *owner)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self, index: IndexId) -> usize {
        self.entries
            .read()
            .expect("lock poisoned")
            .get(&index)
            .map_or(0, Vec::len)
    }
}

impl FieldIndex for InMemoryFieldIndex {
    fn add_entry(&self, index: IndexId, key: &Value, owner: ObjectId) -> MarshalResult<()> {
        self.entries
            .write()
            .expect("lock poisoned")
            .entry(index)
            .or_default()
            .push((key.clone(), owner));
        Ok(())
    }

    fn remove_entry(&self, index: IndexId, key: &Value, owner: ObjectId) -> MarshalResult<()> {
        let mut entries = self.entries.write().expect("lock poisoned");
        if let Some(list) = entries.get_mut(&index) {
            if let Some(pos) = list.iter().position(|(k, o)| k == key && *o == owner) {
                list.swap_remove(pos);
            }
        }
        Ok(())
    }
}
