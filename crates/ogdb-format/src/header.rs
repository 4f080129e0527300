use ogdb_types::ClassId;
use tracing::warn;

use crate::bitmap::NullBitmap;
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::FormatResult;
use crate::slot_format::SlotFormat;

/// Format-defined attribute block of an object header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderAttributes {
    /// Number of fields of the class as written.
    pub field_count: usize,
    pub null_bitmap: NullBitmap,
}

impl HeaderAttributes {
    pub fn new(null_bitmap: NullBitmap) -> Self {
        Self {
            field_count: null_bitmap.field_count(),
            null_bitmap,
        }
    }
}

/// The decoded fixed prefix of an object slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectHeader {
    pub class_id: ClassId,
    /// Version byte, `None` for unversioned slots.
    pub version: Option<u8>,
    /// The format that wrote the slot.
    pub format: SlotFormat,
    pub attributes: HeaderAttributes,
    /// Offset of the first field payload byte.
    pub payload_start: usize,
}

impl ObjectHeader {
    /// Write a header for `class_id` in `format`.
    ///
    /// The class id is negated and a version byte follows iff the format is
    /// version-aware.
    pub fn write(
        buf: &mut WriteBuffer,
        format: SlotFormat,
        class_id: ClassId,
        attributes: &HeaderAttributes,
    ) {
        format.write_class_id(buf, class_id);
        if format.is_version_aware() {
            buf.write_u8(format.version());
        }
        format.write_attributes(buf, attributes);
    }

    /// Read a header starting at the buffer's cursor.
    ///
    /// Leaves the cursor at the first payload byte.
    pub fn read(buf: &mut ReadBuffer) -> FormatResult<Self> {
        let (class_id, version_aware) = SlotFormat::read_class_id(buf.read_i32()?)?;
        let (version, format) = if version_aware {
            let version = buf.read_u8()?;
            (Some(version), SlotFormat::for_version(version)?)
        } else {
            (None, SlotFormat::V0)
        };
        let attributes = format.read_attributes(buf)?;
        Ok(Self {
            class_id,
            version,
            format,
            attributes,
            payload_start: buf.offset(),
        })
    }

    /// Encoded length of a header for `field_count` fields.
    pub fn length(format: SlotFormat, field_count: usize) -> usize {
        format.header_length(field_count)
    }

    pub fn field_count(&self) -> usize {
        self.attributes.field_count
    }

    pub fn is_null(&self, field_index: usize) -> bool {
        self.attributes.null_bitmap.is_set(field_index)
    }

    /// Compare the header's class id against the class that was resolved for
    /// it. Mismatches are logged, never raised: defragmentation rewrites ids
    /// while slots are in flight.
    pub fn check_class(&self, resolved: ClassId) -> bool {
        if self.class_id != resolved {
            warn!(
                header = %self.class_id,
                resolved = %resolved,
                "object header class id does not match resolved class"
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormatError;

    fn attributes(count: usize, absent: &[usize]) -> HeaderAttributes {
        let mut bitmap = NullBitmap::new(count);
        for i in absent {
            bitmap.set(*i, true);
        }
        HeaderAttributes::new(bitmap)
    }

    fn encode(format: SlotFormat, class: i32, attrs: &HeaderAttributes) -> Vec<u8> {
        let mut buf = WriteBuffer::new();
        ObjectHeader::write(&mut buf, format, ClassId::new(class), attrs);
        buf.into_vec()
    }

    #[test]
    fn current_header_layout() {
        let bytes = encode(SlotFormat::Current, 5, &attributes(2, &[]));
        assert_eq!(
            bytes,
            vec![0xFF, 0xFF, 0xFF, 0xFB, 3, 0, 0, 0, 2, 0b0000_0000]
        );
        assert_eq!(bytes.len(), ObjectHeader::length(SlotFormat::Current, 2));
    }

    #[test]
    fn versioned_roundtrip() {
        let attrs = attributes(3, &[1]);
        let mut buf = ReadBuffer::new(encode(SlotFormat::Current, 9, &attrs));
        let header = ObjectHeader::read(&mut buf).unwrap();
        assert_eq!(header.class_id, ClassId::new(9));
        assert_eq!(header.version, Some(3));
        assert_eq!(header.format, SlotFormat::Current);
        assert_eq!(header.attributes, attrs);
        assert!(header.is_null(1));
        assert!(!header.is_null(0));
        assert_eq!(header.payload_start, buf.offset());
    }

    #[test]
    fn unversioned_header_is_oldest_layout() {
        let mut buf = ReadBuffer::new(encode(SlotFormat::V0, 9, &attributes(1, &[])));
        let header = ObjectHeader::read(&mut buf).unwrap();
        assert_eq!(header.version, None);
        assert_eq!(header.format, SlotFormat::V0);
        assert_eq!(header.payload_start, 9);
    }

    #[test]
    fn older_versioned_header_keeps_its_format() {
        let mut buf = ReadBuffer::new(encode(SlotFormat::V2, 4, &attributes(1, &[0])));
        let header = ObjectHeader::read(&mut buf).unwrap();
        assert_eq!(header.format, SlotFormat::V2);
        assert_eq!(header.version, Some(2));
    }

    #[test]
    fn future_version_byte_fails() {
        let mut bytes = encode(SlotFormat::Current, 4, &attributes(0, &[]));
        bytes[4] = 42;
        let err = ObjectHeader::read(&mut ReadBuffer::new(bytes)).unwrap_err();
        assert!(matches!(err, FormatError::CorruptFormat { version: 42, .. }));
    }

    #[test]
    fn check_class_reports_mismatch() {
        let mut buf = ReadBuffer::new(encode(SlotFormat::Current, 4, &attributes(0, &[])));
        let header = ObjectHeader::read(&mut buf).unwrap();
        assert!(header.check_class(ClassId::new(4)));
        assert!(!header.check_class(ClassId::new(5)));
    }
}
