use std::collections::HashMap;

use ogdb_types::ObjectId;

use crate::graph::InstanceRef;

/// Session-wide binding between persistent ids and live instances.
///
/// An instance is bound before its fields are traversed, on both the write
/// and the read side.
#[derive(Clone, Debug, Default)]
pub struct IdentityMap {
    by_id: HashMap<ObjectId, InstanceRef>,
    by_instance: HashMap<InstanceRef, ObjectId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, id: ObjectId, instance: InstanceRef) {
        self.by_id.insert(id, instance);
        self.by_instance.insert(instance, id);
    }

    pub fn instance_of(&self, id: ObjectId) -> Option<InstanceRef> {
        self.by_id.get(&id).copied()
    }

    pub fn id_of(&self, instance: InstanceRef) -> Option<ObjectId> {
        self.by_instance.get(&instance).copied()
    }

    /// Drop the binding of `id`. Returns the instance it was bound to.
    pub fn unbind(&mut self, id: ObjectId) -> Option<InstanceRef> {
        let instance = self.by_id.remove(&id)?;
        self.by_instance.remove(&instance);
        Some(instance)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
