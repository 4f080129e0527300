use ogdb_format::{DefragBuffer, FieldLayout, IdRemap};
use ogdb_types::{HandlerId, ObjectId, ID_LENGTH};

use super::{mismatch, IdRead, TypeHandler};
use crate::context::{ReadContext, WriteContext};
use crate::error::MarshalResult;
use crate::value::Value;

/// A reference to another stored object, written as its 4-byte id.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReferenceHandler;

impl FieldLayout for ReferenceHandler {
    fn is_variable_length(&self) -> bool {
        false
    }
}

impl TypeHandler for ReferenceHandler {
    fn id(&self) -> HandlerId {
        super::REFERENCE
    }

    fn name(&self) -> &'static str {
        "reference"
    }

    fn write(&self, ctx: &mut dyn WriteContext, value: &Value) -> MarshalResult<()> {
        match value {
            Value::Null | Value::Ref(_) | Value::Stub(_) => ctx.write_object(value),
            other => Err(mismatch(self, other)),
        }
    }

    fn read(&self, ctx: &mut dyn ReadContext) -> MarshalResult<Value> {
        ctx.read_object()
    }

    fn skip(&self, ctx: &mut dyn ReadContext) -> MarshalResult<()> {
        ctx.seek(ctx.offset() + ID_LENGTH);
        Ok(())
    }

    fn is_id_readable(&self) -> bool {
        true
    }

    fn read_id(&self, ctx: &mut dyn ReadContext) -> MarshalResult<IdRead> {
        let id = ObjectId::new(ctx.read_int()?);
        Ok(match id.non_null() {
            Some(id) => IdRead::Id(id),
            None => IdRead::Absent,
        })
    }

    fn defrag(&self, buf: &mut DefragBuffer, remap: &dyn IdRemap) -> MarshalResult<()> {
        buf.copy_object_id(remap)?;
        Ok(())
    }
}
