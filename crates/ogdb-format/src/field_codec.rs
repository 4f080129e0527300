use ogdb_types::{HandlerId, IndexId, ID_LENGTH};
use serde::{Deserialize, Serialize};

use crate::buffer::{short_string_length, ReadBuffer, WriteBuffer};
use crate::defrag::{DefragBuffer, IdRemap};
use crate::error::FormatResult;
use crate::schema::{
    AspectKind, AspectResolver, FieldDescriptor, FieldFlags, RawFieldSpec, VIRTUAL_FIELD_PREFIX,
};

/// Generation of the per-field spec inside a schema slot.
///
/// ```text
/// V0 virtual / non-field aspect:  [name]
/// V0 data field:                  [name][handlerId:i32][attrByte]
/// V1 data field:                  [name][handlerId:i32][attrByte][indexId:i32]
/// ```
///
/// V1 only extends the data-field case, so both generations agree on where
/// a virtual field's encoding ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldFormat {
    V0,
    #[default]
    V1,
}

impl FieldFormat {
    fn has_index_id(self) -> bool {
        matches!(self, Self::V1)
    }

    pub fn write(self, buf: &mut WriteBuffer, field: &FieldDescriptor) {
        buf.write_short_string(&field.name);
        if !field.is_data_field() {
            return;
        }
        buf.write_i32(field.handler.get());
        buf.write_u8(field.flags.to_byte());
        if self.has_index_id() {
            buf.write_i32(field.index.unwrap_or(IndexId::NULL).get());
        }
    }

    pub fn marshalled_length(self, field: &FieldDescriptor) -> usize {
        let mut len = short_string_length(&field.name);
        if field.is_data_field() {
            len += ID_LENGTH + 1;
            if self.has_index_id() {
                len += ID_LENGTH;
            }
        }
        len
    }

    /// Read one field spec. `kind` comes from the caller's positional index.
    pub fn read(
        self,
        buf: &mut ReadBuffer,
        kind: AspectKind,
        resolver: &dyn AspectResolver,
    ) -> FormatResult<RawFieldSpec> {
        let name = buf.read_short_string()?;
        if !kind.is_field() {
            return Ok(RawFieldSpec::named(name, kind));
        }
        if name.starts_with(VIRTUAL_FIELD_PREFIX) && resolver.is_virtual_field(&name) {
            return Ok(RawFieldSpec {
                is_virtual: true,
                ..RawFieldSpec::named(name, kind)
            });
        }
        let handler = HandlerId::new(buf.read_i32()?);
        let flags = FieldFlags::from_byte(buf.read_u8()?);
        let index = if self.has_index_id() {
            IndexId::new(buf.read_i32()?).non_null()
        } else {
            None
        };
        Ok(RawFieldSpec {
            handler: Some(handler),
            flags: Some(flags),
            index,
            ..RawFieldSpec::named(name, kind)
        })
    }

    /// Copy one field spec, remapping its index id.
    ///
    /// Names and handler ids are copied verbatim; handler ids are globally
    /// stable.
    pub fn defrag(
        self,
        buf: &mut DefragBuffer,
        field: &FieldDescriptor,
        remap: &dyn IdRemap,
    ) -> FormatResult<()> {
        buf.copy_short_string()?;
        if !field.is_data_field() {
            return Ok(());
        }
        buf.increment_offset(ID_LENGTH)?;
        buf.increment_offset(1)?;
        if self.has_index_id() {
            buf.copy_index_id(remap)?;
        }
        Ok(())
    }
}
