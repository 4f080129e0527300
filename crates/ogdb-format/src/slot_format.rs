use std::collections::BTreeMap;
use std::sync::OnceLock;

use ogdb_types::ClassId;
use serde::{Deserialize, Serialize};

use crate::bitmap::NullBitmap;
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{FormatError, FormatResult};
use crate::header::HeaderAttributes;

/// Version byte written by the live format.
pub const CURRENT_VERSION: u8 = 3;

/// The part of a field handler a slot format needs to see.
pub trait FieldLayout {
    /// `true` if the encoded payload length depends on the value.
    fn is_variable_length(&self) -> bool;

    /// `true` for fixed-width primitives that are always decoded in place.
    fn is_value_type(&self) -> bool {
        false
    }
}

/// A versioned binary-layout rule set.
///
/// The set is closed: a new on-disk shape adds a variant, never a subtype.
/// Revisions that changed no on-disk shape have no variant and resolve to
/// the next registered one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotFormat {
    /// Unversioned layout: positive class id, no version byte, every field inline.
    V0,
    /// Variable-length fields are indirected; pointers are slot-relative.
    V2,
    /// Variable-length fields are indirected; pointers are payload-relative.
    Current,
}

static REGISTRY: OnceLock<BTreeMap<u8, SlotFormat>> = OnceLock::new();

impl SlotFormat {
    /// Every format that is no longer written but must stay readable.
    pub const HISTORICAL: [SlotFormat; 2] = [SlotFormat::V0, SlotFormat::V2];

    pub fn current() -> Self {
        Self::Current
    }

    /// Resolve the format that wrote `version`.
    pub fn for_version(version: u8) -> FormatResult<Self> {
        if version == CURRENT_VERSION {
            return Ok(Self::Current);
        }
        if version > CURRENT_VERSION {
            return Err(FormatError::CorruptFormat {
                version,
                current: CURRENT_VERSION,
            });
        }
        Ok(Self::resolve(version))
    }

    fn registry() -> &'static BTreeMap<u8, SlotFormat> {
        REGISTRY.get_or_init(|| {
            Self::HISTORICAL
                .iter()
                .map(|format| (format.version(), *format))
                .collect()
        })
    }

    fn resolve(version: u8) -> Self {
        if version >= CURRENT_VERSION {
            return Self::Current;
        }
        match Self::registry().get(&version) {
            Some(format) => *format,
            None => Self::resolve(version + 1),
        }
    }

    /// The version byte this format writes.
    pub fn version(self) -> u8 {
        match self {
            Self::V0 => 0,
            Self::V2 => 2,
            Self::Current => CURRENT_VERSION,
        }
    }

    /// `true` if the header carries a version byte.
    pub fn is_version_aware(self) -> bool {
        !matches!(self, Self::V0)
    }

    /// Should a field's payload go through an `(offset, length)` pointer?
    pub fn is_indirected_within_slot<L: FieldLayout + ?Sized>(self, handler: &L) -> bool {
        match self {
            Self::V0 => false,
            Self::V2 | Self::Current => handler.is_variable_length(),
        }
    }

    /// Apply the sign convention: version-aware class ids are negated.
    pub fn encode_class_id(self, class_id: ClassId) -> i32 {
        if self.is_version_aware() {
            -class_id.get()
        } else {
            class_id.get()
        }
    }

    pub fn write_class_id(self, buf: &mut WriteBuffer, class_id: ClassId) {
        buf.write_i32(self.encode_class_id(class_id));
    }

    /// Undo the sign convention. Returns the class id and whether a version
    /// byte follows.
    pub fn read_class_id(raw: i32) -> FormatResult<(ClassId, bool)> {
        match raw {
            0 => Err(FormatError::CorruptHeader("class id 0".into())),
            i32::MIN => Err(FormatError::CorruptHeader(format!("class id {raw}"))),
            r if r < 0 => Ok((ClassId::new(-r), true)),
            r => Ok((ClassId::new(r), false)),
        }
    }

    /// Bytes of version information between the class id and the attributes.
    pub fn skip_version_info(self) -> usize {
        if self.is_version_aware() {
            1
        } else {
            0
        }
    }

    pub fn write_attributes(self, buf: &mut WriteBuffer, attributes: &HeaderAttributes) {
        buf.write_i32(attributes.field_count as i32);
        buf.write_bytes(attributes.null_bitmap.as_bytes());
    }

    pub fn read_attributes(self, buf: &mut ReadBuffer) -> FormatResult<HeaderAttributes> {
        let field_count = buf.read_length()?;
        let bytes = buf.read_slice(NullBitmap::byte_length(field_count))?;
        Ok(HeaderAttributes {
            field_count,
            null_bitmap: NullBitmap::from_bytes(field_count, bytes),
        })
    }

    /// Length of the header plus null bitmap, i.e. where the payload starts.
    pub fn header_length(self, field_count: usize) -> usize {
        4 + self.skip_version_info() + 4 + NullBitmap::byte_length(field_count)
    }

    /// Turn a payload-relative child position into the value stored in a pointer.
    pub fn encode_child_offset(self, payload_start: usize, relative: usize) -> i32 {
        match self {
            Self::V2 => (payload_start + relative) as i32,
            Self::V0 | Self::Current => relative as i32,
        }
    }

    /// Turn a stored pointer offset into an absolute position in the slot.
    pub fn decode_child_offset(self, payload_start: usize, stored: i32) -> FormatResult<usize> {
        let stored = usize::try_from(stored).map_err(|_| FormatError::InvalidPointer {
            offset: stored,
            length: 0,
        })?;
        Ok(match self {
            Self::V2 => stored,
            Self::V0 | Self::Current => payload_start + stored,
        })
    }
}
