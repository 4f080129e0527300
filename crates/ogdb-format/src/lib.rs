//! Binary layout rules of the object-graph database.
//!
//! Every stored object and every stored schema is a self-describing byte
//! slot. This crate owns the rules that say how those bytes are laid out and
//! how to tell which historical revision of the rules produced them.
//!
//! # Architecture
//!
//! - [`SlotFormat`]: closed set of versioned layouts; [`SlotFormat::for_version`]
//!   resolves the layout that wrote a given version byte
//! - [`ObjectHeader`]: the fixed prefix of every object slot
//! - [`NullBitmap`]: one bit per field, set when the field is absent
//! - [`SchemaCodec`] / [`FieldFormat`]: class and field descriptors, in two
//!   generations (plain fields; fields with a secondary-index id)
//! - [`DefragBuffer`]: source/target buffer pair used to copy slots while
//!   remapping ids
//!
//! # Object slot
//!
//! ```text
//! [classId:i32 (negated iff version-aware)] [version:u8 (iff version-aware)]
//! [fieldCount:i32] [nullBitmap: ceil(fieldCount/8)]
//! [fields in schema order: inline payload | (offset:i32,length:i32)]
//! [indirected children, concatenated]
//! ```
//!
//! All integers are big-endian.

pub mod bitmap;
pub mod buffer;
pub mod defrag;
pub mod error;
pub mod field_codec;
pub mod header;
pub mod schema;
pub mod schema_codec;
pub mod slot_format;

pub use bitmap::NullBitmap;
pub use buffer::{ReadBuffer, WriteBuffer};
pub use defrag::{DefragBuffer, IdRemap};
pub use error::{FormatError, FormatResult};
pub use field_codec::FieldFormat;
pub use header::{HeaderAttributes, ObjectHeader};
pub use schema::{
    AspectKind, AspectResolver, ClassDescriptor, FieldDescriptor, FieldFlags, RawClassSpec,
    RawFieldSpec, VIRTUAL_FIELD_PREFIX,
};
pub use schema_codec::SchemaCodec;
pub use slot_format::{FieldLayout, SlotFormat, CURRENT_VERSION};

/// Width of an `(offset, length)` indirection pointer.
pub const POINTER_LENGTH: usize = 8;
