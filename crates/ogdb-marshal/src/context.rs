//! The primitive operations handlers see while encoding or decoding a field.

use ogdb_format::{SlotFormat, POINTER_LENGTH};

use crate::error::MarshalResult;
use crate::handlers::TypeHandler;
use crate::value::Value;

/// Sink for one object's field payloads.
pub trait WriteContext {
    fn write_byte(&mut self, value: u8);
    fn write_int(&mut self, value: i32);
    fn write_long(&mut self, value: i64);
    fn write_bytes(&mut self, bytes: &[u8]);

    /// Write a reference as its 4-byte id, persisting the target first if it
    /// has none.
    fn write_object(&mut self, value: &Value) -> MarshalResult<()>;

    /// Write a nested value through `handler`.
    ///
    /// In an indirected position the payload goes to a child buffer, and an
    /// absent value writes the zero/zero pointer. Inline, a presence byte
    /// precedes the payload.
    fn write_value(&mut self, handler: &dyn TypeHandler, value: Option<&Value>)
        -> MarshalResult<()>;

    fn slot_format(&self) -> SlotFormat;
}

/// Source of one object's field payloads.
pub trait ReadContext {
    fn read_byte(&mut self) -> MarshalResult<u8>;
    fn read_int(&mut self) -> MarshalResult<i32>;
    fn read_long(&mut self) -> MarshalResult<i64>;
    fn read_bytes(&mut self, len: usize) -> MarshalResult<Vec<u8>>;

    /// Read a 4-byte reference id and resolve it. Id 0 and unresolvable
    /// targets yield [`Value::Null`].
    fn read_object(&mut self) -> MarshalResult<Value>;

    fn offset(&self) -> usize;
    fn seek(&mut self, offset: usize);
    fn slot_format(&self) -> SlotFormat;
    fn payload_start(&self) -> usize;
}

/// Where the payload of an indirected value lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Pointer {
    Sentinel,
    At { position: usize, length: usize },
}

pub(crate) fn read_pointer(ctx: &mut dyn ReadContext) -> MarshalResult<Pointer> {
    let offset = ctx.read_int()?;
    let length = ctx.read_int()?;
    if offset == 0 && length == 0 {
        return Ok(Pointer::Sentinel);
    }
    let position = ctx
        .slot_format()
        .decode_child_offset(ctx.payload_start(), offset)?;
    let length = usize::try_from(length)
        .map_err(|_| ogdb_format::FormatError::InvalidPointer { offset, length })?;
    Ok(Pointer::At { position, length })
}

/// Decode the value at the cursor with `handler`.
///
/// Value types decode in place. Indirected handlers read their pointer,
/// decode at the child position and leave the cursor just past the pointer.
pub fn read_at_current_seek_position(
    ctx: &mut dyn ReadContext,
    handler: &dyn TypeHandler,
) -> MarshalResult<Value> {
    if handler.is_value_type() || !ctx.slot_format().is_indirected_within_slot(handler) {
        return handler.read(ctx);
    }
    match read_pointer(ctx)? {
        Pointer::Sentinel => Ok(Value::Null),
        Pointer::At { position, .. } => {
            let resume = ctx.offset();
            ctx.seek(position);
            let value = handler.read(ctx);
            ctx.seek(resume);
            value
        }
    }
}

/// Advance the cursor past the value at the cursor.
pub fn skip_at_current_seek_position(
    ctx: &mut dyn ReadContext,
    handler: &dyn TypeHandler,
) -> MarshalResult<()> {
    if !handler.is_value_type() && ctx.slot_format().is_indirected_within_slot(handler) {
        let resume = ctx.offset() + POINTER_LENGTH;
        ctx.seek(resume);
        return Ok(());
    }
    handler.skip(ctx)
}

/// Counterpart of [`WriteContext::write_value`].
pub fn read_nested(
    ctx: &mut dyn ReadContext,
    handler: &dyn TypeHandler,
) -> MarshalResult<Option<Value>> {
    if ctx.slot_format().is_indirected_within_slot(handler) {
        return match read_at_current_seek_position(ctx, handler)? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        };
    }
    match ctx.read_byte()? {
        0 => Ok(None),
        _ => handler.read(ctx).map(Some),
    }
}
