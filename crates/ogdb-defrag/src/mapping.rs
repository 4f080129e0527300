use std::cell::Cell;
use std::collections::HashMap;

use ogdb_format::{FormatError, FormatResult, IdRemap};
use ogdb_types::{ClassId, IndexId, ObjectId};

/// Source-to-target id tables built by a defragmentation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdMapping {
    pub objects: HashMap<ObjectId, ObjectId>,
    pub classes: HashMap<ClassId, ClassId>,
    pub indexes: HashMap<IndexId, IndexId>,
}

impl IdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, id: ObjectId) -> Option<ObjectId> {
        self.objects.get(&id).copied()
    }

    pub fn class(&self, id: ClassId) -> Option<ClassId> {
        self.classes.get(&id).copied()
    }

    /// Record an object slot. Schema slots are also class ids.
    pub fn insert_object(&mut self, from: ObjectId, to: ObjectId) {
        self.objects.insert(from, to);
    }

    pub fn insert_class(&mut self, from: ClassId, to: ClassId) {
        self.classes.insert(from, to);
        self.objects.insert(ObjectId::from(from), ObjectId::from(to));
    }
}

/// [`IdRemap`] over an [`IdMapping`].
///
/// A reference to an object that is not copied is either fatal or, with
/// `keep_dangling`, rewritten as null and counted.
pub(crate) struct Remapper<'a> {
    mapping: &'a IdMapping,
    keep_dangling: bool,
    dangling: Cell<usize>,
}

impl<'a> Remapper<'a> {
    pub(crate) fn new(mapping: &'a IdMapping, keep_dangling: bool) -> Self {
        Self {
            mapping,
            keep_dangling,
            dangling: Cell::new(0),
        }
    }

    pub(crate) fn dangling(&self) -> usize {
        self.dangling.get()
    }
}

impl IdRemap for Remapper<'_> {
    fn map_object(&self, id: ObjectId) -> FormatResult<ObjectId> {
        match self.mapping.object(id) {
            Some(new) => Ok(new),
            None if self.keep_dangling => {
                self.dangling.set(self.dangling.get() + 1);
                Ok(ObjectId::NULL)
            }
            None => Err(FormatError::UnmappedId {
                kind: "object",
                id: id.get(),
            }),
        }
    }

    fn map_class(&self, id: ClassId) -> FormatResult<ClassId> {
        self.mapping.class(id).ok_or(FormatError::UnmappedId {
            kind: "class",
            id: id.get(),
        })
    }

    fn map_index(&self, id: IndexId) -> FormatResult<IndexId> {
        Ok(self.mapping.indexes.get(&id).copied().unwrap_or(id))
    }
}
