//! Field handlers: the pluggable codec of each field type.
//!
//! Handler ids are written into schema slots and must never change.

mod primitive;
mod reference;
mod variable;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ogdb_format::{DefragBuffer, FieldDescriptor, FieldLayout, IdRemap};
use ogdb_types::{HandlerId, ObjectId};

use crate::context::{ReadContext, WriteContext};
use crate::error::{MarshalError, MarshalResult};
use crate::value::Value;

pub use primitive::{BoolHandler, ByteHandler, IntHandler, LongHandler};
pub use reference::ReferenceHandler;
pub use variable::{BytesHandler, IntArrayHandler, StringHandler, StringListHandler};

pub const BYTE: HandlerId = HandlerId::new(1);
pub const BOOL: HandlerId = HandlerId::new(2);
pub const INT: HandlerId = HandlerId::new(3);
pub const LONG: HandlerId = HandlerId::new(4);
pub const STRING: HandlerId = HandlerId::new(5);
pub const BYTES: HandlerId = HandlerId::new(6);
pub const INT_ARRAY: HandlerId = HandlerId::new(7);
pub const STRING_LIST: HandlerId = HandlerId::new(8);
pub const REFERENCE: HandlerId = HandlerId::new(9);

/// Synthetic field holding a database-wide unique id of the object.
pub const UUID_FIELD: &str = "$uuid";
/// Synthetic field holding the version stamp of the object's last write.
pub const VERSION_FIELD: &str = "$version";

/// Outcome of reading a field as a bare id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdRead {
    /// The handler cannot produce an id without decoding the payload.
    NotPossible,
    /// The handler can, but this occurrence holds no reference.
    Absent,
    Id(ObjectId),
}

/// Codec of one field type.
pub trait TypeHandler: FieldLayout + Send + Sync + fmt::Debug {
    fn id(&self) -> HandlerId;

    fn name(&self) -> &'static str;

    fn write(&self, ctx: &mut dyn WriteContext, value: &Value) -> MarshalResult<()>;

    fn read(&self, ctx: &mut dyn ReadContext) -> MarshalResult<Value>;

    /// Advance past an inline payload without keeping it.
    fn skip(&self, ctx: &mut dyn ReadContext) -> MarshalResult<()> {
        self.read(ctx).map(|_| ())
    }

    /// Capability check for the query fast path.
    fn is_id_readable(&self) -> bool {
        false
    }

    fn read_id(&self, _ctx: &mut dyn ReadContext) -> MarshalResult<IdRead> {
        Ok(IdRead::NotPossible)
    }

    /// Walk this field's payload in a slot being copied, remapping any ids.
    fn defrag(&self, buf: &mut DefragBuffer, remap: &dyn IdRemap) -> MarshalResult<()>;
}

pub(crate) fn mismatch(handler: &dyn TypeHandler, value: &Value) -> MarshalError {
    MarshalError::TypeMismatch {
        handler: handler.name(),
        found: value.kind(),
    }
}

pub(crate) fn read_len(handler: &'static str, raw: i32) -> MarshalResult<usize> {
    usize::try_from(raw).map_err(|_| MarshalError::CorruptPayload {
        handler,
        detail: format!("negative length {raw}"),
    })
}

/// Id-keyed set of handlers, plus the by-name table of virtual fields.
#[derive(Clone, Debug, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<HandlerId, Arc<dyn TypeHandler>>,
    virtual_fields: BTreeMap<String, HandlerId>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in handler, with `$uuid` and `$version` bound to [`LONG`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ByteHandler));
        registry.register(Arc::new(BoolHandler));
        registry.register(Arc::new(IntHandler));
        registry.register(Arc::new(LongHandler));
        registry.register(Arc::new(StringHandler));
        registry.register(Arc::new(BytesHandler));
        registry.register(Arc::new(IntArrayHandler));
        registry.register(Arc::new(StringListHandler));
        registry.register(Arc::new(ReferenceHandler));
        registry.register_virtual(UUID_FIELD, LONG);
        registry.register_virtual(VERSION_FIELD, LONG);
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn TypeHandler>) {
        self.handlers.insert(handler.id(), handler);
    }

    pub fn register_virtual(&mut self, name: impl Into<String>, handler: HandlerId) {
        self.virtual_fields.insert(name.into(), handler);
    }

    pub fn get(&self, id: HandlerId) -> Option<&dyn TypeHandler> {
        self.handlers.get(&id).map(|h| h.as_ref())
    }

    pub fn resolve(&self, id: HandlerId) -> MarshalResult<&dyn TypeHandler> {
        self.get(id).ok_or(MarshalError::UnknownHandler(id))
    }

    pub fn is_virtual_field(&self, name: &str) -> bool {
        self.virtual_fields.contains_key(name)
    }

    pub fn virtual_handler_id(&self, name: &str) -> Option<HandlerId> {
        self.virtual_fields.get(name).copied()
    }

    /// The handler that encodes `field`. Virtual fields resolve by name.
    pub fn for_field(&self, field: &FieldDescriptor) -> MarshalResult<&dyn TypeHandler> {
        if field.is_virtual {
            let id = self
                .virtual_handler_id(&field.name)
                .ok_or_else(|| MarshalError::UnknownVirtualField(field.name.clone()))?;
            return self.resolve(id);
        }
        self.resolve(field.handler)
    }

    pub fn ids(&self) -> impl Iterator<Item = HandlerId> + '_ {
        self.handlers.keys().copied()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory contexts that drive handlers without a session.

    use ogdb_format::{ReadBuffer, SlotFormat, WriteBuffer};
    use ogdb_types::ObjectId;

    use super::*;
    use crate::context::{read_pointer, Pointer};

    /// Writes everything inline; nested values get a presence byte.
    pub struct FlatWriter {
        pub buf: WriteBuffer,
        pub format: SlotFormat,
    }

    impl FlatWriter {
        pub fn new() -> Self {
            Self {
                buf: WriteBuffer::new(),
                format: SlotFormat::V0,
            }
        }
    }

    impl WriteContext for FlatWriter {
        fn write_byte(&mut self, value: u8) {
            self.buf.write_u8(value);
        }
        fn write_int(&mut self, value: i32) {
            self.buf.write_i32(value);
        }
        fn write_long(&mut self, value: i64) {
            self.buf.write_i64(value);
        }
        fn write_bytes(&mut self, bytes: &[u8]) {
            self.buf.write_bytes(bytes);
        }
        fn write_object(&mut self, value: &Value) -> MarshalResult<()> {
            match value {
                Value::Stub(id) => self.buf.write_i32(id.get()),
                _ => self.buf.write_i32(0),
            }
            Ok(())
        }
        fn write_value(
            &mut self,
            handler: &dyn TypeHandler,
            value: Option<&Value>,
        ) -> MarshalResult<()> {
            match value {
                None => {
                    self.buf.write_u8(0);
                    Ok(())
                }
                Some(v) => {
                    self.buf.write_u8(1);
                    handler.write(self, v)
                }
            }
        }
        fn slot_format(&self) -> SlotFormat {
            self.format
        }
    }

    pub struct FlatReader {
        pub buf: ReadBuffer,
        pub format: SlotFormat,
    }

    impl FlatReader {
        pub fn new(bytes: Vec<u8>) -> Self {
            Self {
                buf: ReadBuffer::new(bytes),
                format: SlotFormat::V0,
            }
        }
    }

    impl ReadContext for FlatReader {
        fn read_byte(&mut self) -> MarshalResult<u8> {
            Ok(self.buf.read_u8()?)
        }
        fn read_int(&mut self) -> MarshalResult<i32> {
            Ok(self.buf.read_i32()?)
        }
        fn read_long(&mut self) -> MarshalResult<i64> {
            Ok(self.buf.read_i64()?)
        }
        fn read_bytes(&mut self, len: usize) -> MarshalResult<Vec<u8>> {
            Ok(self.buf.read_bytes(len)?)
        }
        fn read_object(&mut self) -> MarshalResult<Value> {
            let id = ObjectId::new(self.buf.read_i32()?);
            Ok(if id.is_null() { Value::Null } else { Value::Stub(id) })
        }
        fn offset(&self) -> usize {
            self.buf.offset()
        }
        fn seek(&mut self, offset: usize) {
            self.buf.seek(offset)
        }
        fn slot_format(&self) -> SlotFormat {
            self.format
        }
        fn payload_start(&self) -> usize {
            0
        }
    }

    pub fn encode(handler: &dyn TypeHandler, value: &Value) -> Vec<u8> {
        let mut writer = FlatWriter::new();
        handler.write(&mut writer, value).unwrap();
        writer.buf.into_vec()
    }

    pub fn decode(handler: &dyn TypeHandler, bytes: Vec<u8>) -> Value {
        let mut reader = FlatReader::new(bytes);
        let value = handler.read(&mut reader).unwrap();
        assert_eq!(reader.buf.remaining(), 0, "{} left bytes behind", handler.name());
        value
    }

    #[test]
    fn pointer_sentinel_is_recognized() {
        let mut reader = FlatReader::new(vec![0; 8]);
        reader.format = SlotFormat::Current;
        assert_eq!(read_pointer(&mut reader).unwrap(), Pointer::Sentinel);
    }
}
