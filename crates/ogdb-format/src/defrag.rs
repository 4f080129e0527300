use ogdb_types::{ClassId, IndexId, ObjectId};

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::FormatResult;
use crate::slot_format::SlotFormat;

/// Old-to-new id translation applied while copying slots.
pub trait IdRemap {
    fn map_object(&self, id: ObjectId) -> FormatResult<ObjectId>;
    fn map_class(&self, id: ClassId) -> FormatResult<ClassId>;
    fn map_index(&self, id: IndexId) -> FormatResult<IndexId>;
}

/// A source slot and its target copy, walked in lockstep.
///
/// The target starts as a byte-for-byte copy of the source, so every offset
/// means the same thing in both. Walking the source advances the shared
/// cursor; copying an id rewrites the four target bytes it was read from.
/// Nothing changes length, which keeps every indirection pointer valid.
#[derive(Debug)]
pub struct DefragBuffer {
    source: ReadBuffer,
    target: WriteBuffer,
    format: SlotFormat,
    payload_start: usize,
}

impl DefragBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            target: WriteBuffer::from(bytes.clone()),
            source: ReadBuffer::new(bytes),
            format: SlotFormat::current(),
            payload_start: 0,
        }
    }

    /// Record the layout of the object slot being copied.
    pub fn set_layout(&mut self, format: SlotFormat, payload_start: usize) {
        self.format = format;
        self.payload_start = payload_start;
    }

    pub fn slot_format(&self) -> SlotFormat {
        self.format
    }

    pub fn payload_start(&self) -> usize {
        self.payload_start
    }

    pub fn offset(&self) -> usize {
        self.source.offset()
    }

    pub fn seek(&mut self, offset: usize) {
        self.source.seek(offset);
    }

    /// Skip bytes that are copied verbatim.
    pub fn increment_offset(&mut self, len: usize) -> FormatResult<()> {
        self.source.skip(len)
    }

    pub fn read_u8(&mut self) -> FormatResult<u8> {
        self.source.read_u8()
    }

    pub fn read_i32(&mut self) -> FormatResult<i32> {
        self.source.read_i32()
    }

    pub fn read_length(&mut self) -> FormatResult<usize> {
        self.source.read_length()
    }

    /// Skip a short string, leaving the copied name untouched.
    pub fn copy_short_string(&mut self) -> FormatResult<()> {
        let len = self.read_length()?;
        self.increment_offset(len)
    }

    /// Overwrite the next four target bytes with `value` and advance.
    pub fn write_i32(&mut self, value: i32) -> FormatResult<()> {
        let at = self.offset();
        self.source.skip(4)?;
        self.target.patch_i32(at, value);
        Ok(())
    }

    pub fn copy_object_id(&mut self, remap: &dyn IdRemap) -> FormatResult<ObjectId> {
        let at = self.offset();
        let old = ObjectId::new(self.read_i32()?);
        if old.is_null() {
            return Ok(old);
        }
        let new = remap.map_object(old)?;
        self.target.patch_i32(at, new.get());
        Ok(new)
    }

    pub fn copy_class_id(&mut self, remap: &dyn IdRemap) -> FormatResult<ClassId> {
        let at = self.offset();
        let old = ClassId::new(self.read_i32()?);
        if old.is_null() {
            return Ok(old);
        }
        let new = remap.map_class(old)?;
        self.target.patch_i32(at, new.get());
        Ok(new)
    }

    pub fn copy_index_id(&mut self, remap: &dyn IdRemap) -> FormatResult<IndexId> {
        let at = self.offset();
        let old = IndexId::new(self.read_i32()?);
        if old.is_null() {
            return Ok(old);
        }
        let new = remap.map_index(old)?;
        self.target.patch_i32(at, new.get());
        Ok(new)
    }

    /// Copy the sign-encoded class id at the start of an object header.
    ///
    /// Returns the source class id.
    pub fn copy_header_class_id(&mut self, remap: &dyn IdRemap) -> FormatResult<ClassId> {
        let at = self.offset();
        let (old, version_aware) = SlotFormat::read_class_id(self.read_i32()?)?;
        let new = remap.map_class(old)?;
        let encoded = if version_aware { -new.get() } else { new.get() };
        self.target.patch_i32(at, encoded);
        Ok(old)
    }

    /// Read access to the untouched source bytes.
    pub fn source(&self) -> &ReadBuffer {
        &self.source
    }

    pub fn into_target(self) -> Vec<u8> {
        self.target.into_vec()
    }
}
