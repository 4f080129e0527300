//! Fixed-width value types. Always decoded in place, never indirected.

use ogdb_format::{DefragBuffer, FieldLayout, IdRemap};
use ogdb_types::HandlerId;

use super::{mismatch, TypeHandler};
use crate::context::{ReadContext, WriteContext};
use crate::error::{MarshalError, MarshalResult};
use crate::value::Value;

macro_rules! fixed_width {
    ($handler:ident, $width:expr) => {
        impl FieldLayout for $handler {
            fn is_variable_length(&self) -> bool {
                false
            }

            fn is_value_type(&self) -> bool {
                true
            }
        }

        impl $handler {
            pub const WIDTH: usize = $width;
        }
    };
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ByteHandler;

fixed_width!(ByteHandler, 1);

impl TypeHandler for ByteHandler {
    fn id(&self) -> HandlerId {
        super::BYTE
    }

    fn name(&self) -> &'static str {
        "byte"
    }

    fn write(&self, ctx: &mut dyn WriteContext, value: &Value) -> MarshalResult<()> {
        match value {
            Value::Byte(b) => {
                ctx.write_byte(*b);
                Ok(())
            }
            other => Err(mismatch(self, other)),
        }
    }

    fn read(&self, ctx: &mut dyn ReadContext) -> MarshalResult<Value> {
        Ok(Value::Byte(ctx.read_byte()?))
    }

    fn skip(&self, ctx: &mut dyn ReadContext) -> MarshalResult<()> {
        ctx.seek(ctx.offset() + Self::WIDTH);
        Ok(())
    }

    fn defrag(&self, buf: &mut DefragBuffer, _remap: &dyn IdRemap) -> MarshalResult<()> {
        Ok(buf.increment_offset(Self::WIDTH)?)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BoolHandler;

fixed_width!(BoolHandler, 1);

impl TypeHandler for BoolHandler {
    fn id(&self) -> HandlerId {
        super::BOOL
    }

    fn name(&self) -> &'static str {
        "bool"
    }

    fn write(&self, ctx: &mut dyn WriteContext, value: &Value) -> MarshalResult<()> {
        match value {
            Value::Bool(b) => {
                ctx.write_byte(u8::from(*b));
                Ok(())
            }
            other => Err(mismatch(self, other)),
        }
    }

    fn read(&self, ctx: &mut dyn ReadContext) -> MarshalResult<Value> {
        match ctx.read_byte()? {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            other => Err(MarshalError::CorruptPayload {
                handler: self.name(),
                detail: format!("byte {other:#04x} is not a bool"),
            }),
        }
    }

    fn skip(&self, ctx: &mut dyn ReadContext) -> MarshalResult<()> {
        ctx.seek(ctx.offset() + Self::WIDTH);
        Ok(())
    }

    fn defrag(&self, buf: &mut DefragBuffer, _remap: &dyn IdRemap) -> MarshalResult<()> {
        Ok(buf.increment_offset(Self::WIDTH)?)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IntHandler;

fixed_width!(IntHandler, 4);

impl TypeHandler for IntHandler {
    fn id(&self) -> HandlerId {
        super::INT
    }

    fn name(&self) -> &'static str {
        "int"
    }

    fn write(&self, ctx: &mut dyn WriteContext, value: &Value) -> MarshalResult<()> {
        match value {
            Value::Int(v) => {
                ctx.write_int(*v);
                Ok(())
            }
            other => Err(mismatch(self, other)),
        }
    }

    fn read(&self, ctx: &mut dyn ReadContext) -> MarshalResult<Value> {
        Ok(Value::Int(ctx.read_int()?))
    }

    fn skip(&self, ctx: &mut dyn ReadContext) -> MarshalResult<()> {
        ctx.seek(ctx.offset() + Self::WIDTH);
        Ok(())
    }

    fn defrag(&self, buf: &mut DefragBuffer, _remap: &dyn IdRemap) -> MarshalResult<()> {
        Ok(buf.increment_offset(Self::WIDTH)?)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LongHandler;

fixed_width!(LongHandler, 8);

impl TypeHandler for LongHandler {
    fn id(&self) -> HandlerId {
        super::LONG
    }

    fn name(&self) -> &'static str {
        "long"
    }

    fn write(&self, ctx: &mut dyn WriteContext, value: &Value) -> MarshalResult<()> {
        match value {
            Value::Long(v) => {
                ctx.write_long(*v);
                Ok(())
            }
            other => Err(mismatch(self, other)),
        }
    }

    fn read(&self, ctx: &mut dyn ReadContext) -> MarshalResult<Value> {
        Ok(Value::Long(ctx.read_long()?))
    }

    fn skip(&self, ctx: &mut dyn ReadContext) -> MarshalResult<()> {
        ctx.seek(ctx.offset() + Self::WIDTH);
        Ok(())
    }

    fn defrag(&self, buf: &mut DefragBuffer, _remap: &dyn IdRemap) -> MarshalResult<()> {
        Ok(buf.increment_offset(Self::WIDTH)?)
    }
}
