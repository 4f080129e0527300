//! Variable-length handlers. Indirected in every version-aware format.

use ogdb_format::{DefragBuffer, FieldLayout, IdRemap, POINTER_LENGTH};
use ogdb_types::HandlerId;

use super::{mismatch, read_len, TypeHandler};
use crate::context::{read_nested, ReadContext, WriteContext};
use crate::error::{MarshalError, MarshalResult};
use crate::value::Value;

macro_rules! variable_length {
    ($handler:ident) => {
        impl FieldLayout for $handler {
            fn is_variable_length(&self) -> bool {
                true
            }
        }
    };
}

fn write_len(ctx: &mut dyn WriteContext, len: usize) {
    ctx.write_int(len as i32);
}

/// `[byteLength:i32][UTF-8 bytes]`
#[derive(Clone, Copy, Debug, Default)]
pub struct StringHandler;

variable_length!(StringHandler);

impl TypeHandler for StringHandler {
    fn id(&self) -> HandlerId {
        super::STRING
    }

    fn name(&self) -> &'static str {
        "string"
    }

    fn write(&self, ctx: &mut dyn WriteContext, value: &Value) -> MarshalResult<()> {
        match value {
            Value::Str(s) => {
                write_len(ctx, s.len());
                ctx.write_bytes(s.as_bytes());
                Ok(())
            }
            other => Err(mismatch(self, other)),
        }
    }

    fn read(&self, ctx: &mut dyn ReadContext) -> MarshalResult<Value> {
        let len = read_len(self.name(), ctx.read_int()?)?;
        let bytes = ctx.read_bytes(len)?;
        String::from_utf8(bytes)
            .map(Value::Str)
            .map_err(|e| MarshalError::CorruptPayload {
                handler: self.name(),
                detail: e.to_string(),
            })
    }

    fn skip(&self, ctx: &mut dyn ReadContext) -> MarshalResult<()> {
        let len = read_len(self.name(), ctx.read_int()?)?;
        ctx.seek(ctx.offset() + len);
        Ok(())
    }

    fn defrag(&self, buf: &mut DefragBuffer, _remap: &dyn IdRemap) -> MarshalResult<()> {
        Ok(buf.copy_short_string()?)
    }
}

/// `[length:i32][bytes]`
#[derive(Clone, Copy, Debug, Default)]
pub struct BytesHandler;

variable_length!(BytesHandler);

impl TypeHandler for BytesHandler {
    fn id(&self) -> HandlerId {
        super::BYTES
    }

    fn name(&self) -> &'static str {
        "bytes"
    }

    fn write(&self, ctx: &mut dyn WriteContext, value: &Value) -> MarshalResult<()> {
        match value {
            Value::Bytes(b) => {
                write_len(ctx, b.len());
                ctx.write_bytes(b);
                Ok(())
            }
            other => Err(mismatch(self, other)),
        }
    }

    fn read(&self, ctx: &mut dyn ReadContext) -> MarshalResult<Value> {
        let len = read_len(self.name(), ctx.read_int()?)?;
        Ok(Value::Bytes(ctx.read_bytes(len)?))
    }

    fn skip(&self, ctx: &mut dyn ReadContext) -> MarshalResult<()> {
        let len = read_len(self.name(), ctx.read_int()?)?;
        ctx.seek(ctx.offset() + len);
        Ok(())
    }

    fn defrag(&self, buf: &mut DefragBuffer, _remap: &dyn IdRemap) -> MarshalResult<()> {
        let len = buf.read_length()?;
        Ok(buf.increment_offset(len)?)
    }
}

/// `[count:i32][i32 * count]`
#[derive(Clone, Copy, Debug, Default)]
pub struct IntArrayHandler;

variable_length!(IntArrayHandler);

impl TypeHandler for IntArrayHandler {
    fn id(&self) -> HandlerId {
        super::INT_ARRAY
    }

    fn name(&self) -> &'static str {
        "int array"
    }

    fn write(&self, ctx: &mut dyn WriteContext, value: &Value) -> MarshalResult<()> {
        match value {
            Value::IntArray(items) => {
                write_len(ctx, items.len());
                for item in items {
                    ctx.write_int(*item);
                }
                Ok(())
            }
            other => Err(mismatch(self, other)),
        }
    }

    fn read(&self, ctx: &mut dyn ReadContext) -> MarshalResult<Value> {
        let count = read_len(self.name(), ctx.read_int()?)?;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(ctx.read_int()?);
        }
        Ok(Value::IntArray(items))
    }

    fn skip(&self, ctx: &mut dyn ReadContext) -> MarshalResult<()> {
        let count = read_len(self.name(), ctx.read_int()?)?;
        ctx.seek(ctx.offset() + count * 4);
        Ok(())
    }

    fn defrag(&self, buf: &mut DefragBuffer, _remap: &dyn IdRemap) -> MarshalResult<()> {
        let count = buf.read_length()?;
        Ok(buf.increment_offset(count * 4)?)
    }
}

/// `[count:i32][nested string * count]`
///
/// Each element is a nested value: a pointer (zero/zero when absent) in
/// version-aware formats, a presence byte plus inline string otherwise.
#[derive(Clone, Copy, Debug, Default)]
pub struct StringListHandler;

variable_length!(StringListHandler);

impl TypeHandler for StringListHandler {
    fn id(&self) -> HandlerId {
        super::STRING_LIST
    }

    fn name(&self) -> &'static str {
        "string list"
    }

    fn write(&self, ctx: &mut dyn WriteContext, value: &Value) -> MarshalResult<()> {
        let Value::List(items) = value else {
            return Err(mismatch(self, value));
        };
        write_len(ctx, items.len());
        for item in items {
            match item {
                Value::Null => ctx.write_value(&StringHandler, None)?,
                Value::Str(_) => ctx.write_value(&StringHandler, Some(item))?,
                other => return Err(mismatch(self, other)),
            }
        }
        Ok(())
    }

    fn read(&self, ctx: &mut dyn ReadContext) -> MarshalResult<Value> {
        let count = read_len(self.name(), ctx.read_int()?)?;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(read_nested(ctx, &StringHandler)?.unwrap_or(Value::Null));
        }
        Ok(Value::List(items))
    }

    fn skip(&self, ctx: &mut dyn ReadContext) -> MarshalResult<()> {
        let count = read_len(self.name(), ctx.read_int()?)?;
        let indirected = ctx.slot_format().is_indirected_within_slot(&StringHandler);
        for _ in 0..count {
            if indirected {
                ctx.seek(ctx.offset() + POINTER_LENGTH);
            } else if ctx.read_byte()? != 0 {
                StringHandler.skip(ctx)?;
            }
        }
        Ok(())
    }

    fn defrag(&self, buf: &mut DefragBuffer, _remap: &dyn IdRemap) -> MarshalResult<()> {
        let count = buf.read_length()?;
        let indirected = buf.slot_format().is_indirected_within_slot(&StringHandler);
        for _ in 0..count {
            if indirected {
                buf.increment_offset(POINTER_LENGTH)?;
            } else if buf.read_u8()? != 0 {
                buf.copy_short_string()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{decode, encode, FlatReader};
    use ogdb_format::{FormatResult, SlotFormat};
    use ogdb_types::{ClassId, IndexId, ObjectId};
    use proptest::prelude::*;

    #[test]
    fn string_layout() {
        assert_eq!(
            encode(&StringHandler, &Value::Str("hi".into())),
            vec![0, 0, 0, 2, b'h', b'i']
        );
    }

    #[test]
    fn string_rejects_invalid_utf8() {
        let mut reader = FlatReader::new(vec![0, 0, 0, 1, 0xFF]);
        assert!(matches!(
            StringHandler.read(&mut reader),
            Err(MarshalError::CorruptPayload { .. })
        ));
    }

    #[test]
    fn negative_length_is_corrupt() {
        let mut reader = FlatReader::new(vec![0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(
            BytesHandler.read(&mut reader),
            Err(MarshalError::CorruptPayload { handler: "bytes", .. })
        ));
    }

    #[test]
    fn inline_string_list_uses_presence_bytes() {
        let list = Value::List(vec![Value::Str("a".into()), Value::Null]);
        let bytes = encode(&StringListHandler, &list);
        assert_eq!(bytes, vec![0, 0, 0, 2, 1, 0, 0, 0, 1, b'a', 0]);
        assert_eq!(decode(&StringListHandler, bytes), list);
    }

    #[test]
    fn string_list_rejects_non_strings() {
        let mut writer = crate::handlers::testing::FlatWriter::new();
        let err = StringListHandler
            .write(&mut writer, &Value::List(vec![Value::Int(1)]))
            .unwrap_err();
        assert!(matches!(err, MarshalError::TypeMismatch { found: "int", .. }));
    }

    #[test]
    fn skips_land_where_reads_do() {
        let cases: Vec<(&dyn TypeHandler, Value)> = vec![
            (&StringHandler as &dyn TypeHandler, Value::Str("skip me".into())),
            (&BytesHandler, Value::Bytes(vec![1, 2, 3])),
            (&IntArrayHandler, Value::IntArray(vec![4, 5])),
            (
                &StringListHandler,
                Value::List(vec![Value::Null, Value::Str("x".into())]),
            ),
        ];
        for (handler, value) in cases {
            let bytes = encode(handler, &value);
            let len = bytes.len();
            let mut reader = FlatReader::new(bytes);
            handler.skip(&mut reader).unwrap();
            assert_eq!(reader.offset(), len, "{}", handler.name());
        }
    }

    #[test]
    fn inline_defrag_walks_whole_payload() {
        let list = Value::List(vec![Value::Str("abc".into()), Value::Null]);
        let bytes = encode(&StringListHandler, &list);
        let len = bytes.len();
        let mut buf = DefragBuffer::new(bytes.clone());
        buf.set_layout(SlotFormat::V0, 0);
        StringListHandler.defrag(&mut buf, &NoRemap).unwrap();
        assert_eq!(buf.offset(), len);
        assert_eq!(buf.into_target(), bytes);
    }

    struct NoRemap;

    impl IdRemap for NoRemap {
        fn map_object(&self, id: ObjectId) -> FormatResult<ObjectId> {
            Ok(id)
        }
        fn map_class(&self, id: ClassId) -> FormatResult<ClassId> {
            Ok(id)
        }
        fn map_index(&self, id: IndexId) -> FormatResult<IndexId> {
            Ok(id)
        }
    }

    proptest! {
        #[test]
        fn string_roundtrip(s in ".{0,64}") {
            let v = Value::Str(s);
            prop_assert_eq!(decode(&StringHandler, encode(&StringHandler, &v)), v);
        }

        #[test]
        fn bytes_roundtrip(b in proptest::collection::vec(any::<u8>(), 0..64)) {
            let v = Value::Bytes(b);
            prop_assert_eq!(decode(&BytesHandler, encode(&BytesHandler, &v)), v);
        }

        #[test]
        fn int_array_roundtrip(items in proptest::collection::vec(any::<i32>(), 0..32)) {
            let v = Value::IntArray(items);
            prop_assert_eq!(decode(&IntArrayHandler, encode(&IntArrayHandler, &v)), v);
        }

        #[test]
        fn string_list_roundtrip(items in proptest::collection::vec(proptest::option::of("[a-z]{0,8}"), 0..8)) {
            let v = Value::List(items.into_iter().map(Value::from).collect());
            prop_assert_eq!(decode(&StringListHandler, encode(&StringListHandler, &v)), v);
        }
    }
}
