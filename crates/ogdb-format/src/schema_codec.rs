use ogdb_types::{ClassId, IndexId, ID_LENGTH};
use tracing::debug;

use crate::buffer::{short_string_length, ReadBuffer, WriteBuffer};
use crate::defrag::{DefragBuffer, IdRemap};
use crate::error::{FormatError, FormatResult};
use crate::field_codec::FieldFormat;
use crate::schema::{AspectResolver, ClassDescriptor, RawClassSpec};

/// Encoder/decoder for schema slots.
///
/// ```text
/// [name:shortstring] [reserved:i32 = 0] [ancestorId:i32] [indexId:i32]
/// [fieldCount:i32] [field specs...]
/// ```
///
/// The reserved word is always written as zero; it keeps the layout stable
/// across versions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchemaCodec {
    field_format: FieldFormat,
}

impl SchemaCodec {
    pub fn new(field_format: FieldFormat) -> Self {
        Self { field_format }
    }

    pub fn field_format(&self) -> FieldFormat {
        self.field_format
    }

    /// Encode a class descriptor, checking the result against
    /// [`SchemaCodec::marshalled_length`].
    pub fn write(&self, class: &ClassDescriptor) -> FormatResult<Vec<u8>> {
        let expected = self.marshalled_length(class);
        let mut buf = WriteBuffer::with_capacity(expected);
        buf.write_short_string(&class.name);
        buf.write_i32(0);
        buf.write_i32(class.ancestor.unwrap_or(ClassId::NULL).get());
        buf.write_i32(class.index.unwrap_or(IndexId::NULL).get());
        buf.write_i32(class.fields.len() as i32);
        for field in &class.fields {
            self.field_format.write(&mut buf, field);
        }
        if buf.len() != expected {
            return Err(FormatError::LengthMismatch {
                expected,
                actual: buf.len(),
            });
        }
        Ok(buf.into_vec())
    }

    pub fn marshalled_length(&self, class: &ClassDescriptor) -> usize {
        short_string_length(&class.name)
            + 4 * ID_LENGTH
            + class
                .fields
                .iter()
                .map(|f| self.field_format.marshalled_length(f))
                .sum::<usize>()
    }

    /// Decode a schema slot into an unresolved skeleton.
    ///
    /// Turning the raw field specs into live handlers is the schema
    /// registry's job.
    pub fn read(&self, buf: &mut ReadBuffer, resolver: &dyn AspectResolver) -> FormatResult<RawClassSpec> {
        let name = buf.read_short_string()?;
        buf.skip(ID_LENGTH)?;
        let ancestor = ClassId::new(buf.read_i32()?).non_null();
        let index = IndexId::new(buf.read_i32()?).non_null();
        let field_count = buf.read_length()?;
        let mut fields = Vec::with_capacity(field_count.min(buf.remaining()));
        for position in 0..field_count {
            let kind = resolver.aspect_kind(&name, position);
            fields.push(self.field_format.read(buf, kind, resolver)?);
        }
        debug!(class = %name, fields = fields.len(), "schema slot read");
        Ok(RawClassSpec {
            name,
            ancestor,
            index,
            fields,
        })
    }

    /// Copy a schema slot, remapping the ancestor, class index and field
    /// index ids.
    ///
    /// The recorded field count must equal the live class's field count.
    pub fn defrag(
        &self,
        buf: &mut DefragBuffer,
        live: &ClassDescriptor,
        remap: &dyn IdRemap,
    ) -> FormatResult<()> {
        buf.copy_short_string()?;
        buf.write_i32(0)?;
        buf.copy_class_id(remap)?;
        buf.copy_index_id(remap)?;
        let recorded = buf.read_length()?;
        if recorded != live.field_count() {
            return Err(FormatError::AspectCountMismatch {
                class: live.id,
                recorded,
                live: live.field_count(),
            });
        }
        for field in &live.fields {
            self.field_format.defrag(buf, field, remap)?;
        }
        Ok(())
    }
}
