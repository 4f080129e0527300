//! Class and field descriptors, and the raw skeletons read back from schema slots.

use ogdb_types::{ClassId, HandlerId, IndexId};
use serde::{Deserialize, Serialize};

/// Names starting with this prefix may denote synthetic fields that are
/// resolved by name instead of by handler id.
pub const VIRTUAL_FIELD_PREFIX: &str = "$";

/// What kind of schema member an aspect is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectKind {
    Field,
    Translator,
    TypeHandler,
}

impl AspectKind {
    pub fn is_field(self) -> bool {
        matches!(self, Self::Field)
    }
}

/// Per-field attribute bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldFlags {
    pub primitive: bool,
    pub array: bool,
    pub multi_array: bool,
}

impl FieldFlags {
    /// Bit 0 primitive, bit 1 array, bit 2 multi-array.
    pub fn to_byte(self) -> u8 {
        (self.primitive as u8) | ((self.array as u8) << 1) | ((self.multi_array as u8) << 2)
    }

    pub fn from_byte(byte: u8) -> Self {
        Self {
            primitive: byte & 0b001 != 0,
            array: byte & 0b010 != 0,
            multi_array: byte & 0b100 != 0,
        }
    }
}

/// A persisted schema member ("aspect").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: AspectKind,
    pub handler: HandlerId,
    pub flags: FieldFlags,
    /// Root id of the field's secondary index.
    pub index: Option<IndexId>,
    /// Synthetic field resolved by name, not by handler id.
    pub is_virtual: bool,
}

impl FieldDescriptor {
    /// An ordinary data field.
    pub fn field(name: impl Into<String>, handler: HandlerId) -> Self {
        Self {
            name: name.into(),
            kind: AspectKind::Field,
            handler,
            flags: FieldFlags::default(),
            index: None,
            is_virtual: false,
        }
    }

    /// A synthetic field whose handler is looked up by name.
    pub fn virtual_field(name: impl Into<String>, handler: HandlerId) -> Self {
        Self {
            is_virtual: true,
            ..Self::field(name, handler)
        }
    }

    /// A translator-backed or type-handler-backed aspect.
    pub fn aspect(name: impl Into<String>, kind: AspectKind, handler: HandlerId) -> Self {
        Self {
            kind,
            ..Self::field(name, handler)
        }
    }

    pub fn primitive(mut self) -> Self {
        self.flags.primitive = true;
        self
    }

    pub fn array(mut self) -> Self {
        self.flags.array = true;
        self
    }

    pub fn indexed(mut self, index: IndexId) -> Self {
        self.index = index.non_null();
        self
    }

    /// `true` for a genuine data field: a field aspect that is not virtual.
    /// Only these carry a handler id in the schema slot.
    pub fn is_data_field(&self) -> bool {
        self.kind.is_field() && !self.is_virtual
    }
}

/// An immutable snapshot of one persisted class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub id: ClassId,
    pub name: String,
    pub ancestor: Option<ClassId>,
    /// Root id of the class index.
    pub index: Option<IndexId>,
    pub fields: Vec<FieldDescriptor>,
}

impl ClassDescriptor {
    pub fn new(id: ClassId, name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            id,
            name: name.into(),
            ancestor: None,
            index: None,
            fields,
        }
    }

    pub fn with_ancestor(mut self, ancestor: ClassId) -> Self {
        self.ancestor = ancestor.non_null();
        self
    }

    pub fn with_index(mut self, index: IndexId) -> Self {
        self.index = index.non_null();
        self
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A field spec as read from a schema slot, before handler resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RawFieldSpec {
    pub name: String,
    pub kind: AspectKind,
    /// Present for data fields only.
    pub handler: Option<HandlerId>,
    pub flags: Option<FieldFlags>,
    /// Present for data fields read by a generation that records it.
    pub index: Option<IndexId>,
    pub is_virtual: bool,
}

impl RawFieldSpec {
    pub fn named(name: String, kind: AspectKind) -> Self {
        Self {
            name,
            kind,
            handler: None,
            flags: None,
            index: None,
            is_virtual: false,
        }
    }

    pub fn is_data_field(&self) -> bool {
        self.kind.is_field() && !self.is_virtual
    }
}

/// A class skeleton as read from a schema slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RawClassSpec {
    pub name: String,
    pub ancestor: Option<ClassId>,
    pub index: Option<IndexId>,
    pub fields: Vec<RawFieldSpec>,
}

/// The external contract used while decoding schema slots.
///
/// Aspect kinds are not self-described per field: they come from a
/// separately encoded positional index owned by the schema registry.
pub trait AspectResolver {
    /// Kind of the aspect at `position` in class `class_name`.
    fn aspect_kind(&self, class_name: &str, position: usize) -> AspectKind;

    /// `true` if `name` is a known synthetic field.
    fn is_virtual_field(&self, name: &str) -> bool;

    /// Handler of an aspect that carries no handler id in its spec.
    fn aspect_handler(&self, class_name: &str, aspect_name: &str) -> Option<HandlerId>;
}
