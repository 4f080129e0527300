use std::sync::Arc;

use ogdb_format::{
    ClassDescriptor, FormatError, HeaderAttributes, NullBitmap, ObjectHeader, SlotFormat,
    WriteBuffer,
};
use ogdb_store::{Slot, SlotStore};
use ogdb_types::ObjectId;
use tracing::debug;

use crate::buffer_tree::{BufferTree, ChunkId, PatchedPointer};
use crate::context::WriteContext;
use crate::env::MarshalEnv;
use crate::error::{MarshalError, MarshalResult};
use crate::handlers::TypeHandler;
use crate::session::Session;
use crate::value::Value;

/// Assembles the slot of one object.
///
/// Fields are written in schema order. An absent top-level field only sets
/// its null-bitmap bit. Variable-length payloads go to child chunks whose
/// pointers are patched by [`MarshallingContext::finish`].
pub struct MarshallingContext<'s, 'e> {
    session: &'s mut Session<'e>,
    env: &'e MarshalEnv,
    id: ObjectId,
    class: Arc<ClassDescriptor>,
    format: SlotFormat,
    is_new: bool,
    update_depth: u32,
    bitmap: NullBitmap,
    tree: BufferTree,
    current: ChunkId,
}

impl<'s, 'e> MarshallingContext<'s, 'e> {
    /// `update_depth` is the remaining number of hops along which already
    /// stored referenced objects are rewritten.
    pub fn new(
        session: &'s mut Session<'e>,
        id: ObjectId,
        class: Arc<ClassDescriptor>,
        format: SlotFormat,
        is_new: bool,
        update_depth: u32,
    ) -> Self {
        let env = session.env();
        Self {
            session,
            env,
            id,
            bitmap: NullBitmap::new(class.field_count()),
            class,
            format,
            is_new,
            update_depth,
            tree: BufferTree::new(),
            current: BufferTree::ROOT,
        }
    }

    /// Encode every field of the object. `values` is indexed like the
    /// class's field list; missing trailing values count as absent.
    pub fn write_fields(&mut self, values: &[Value]) -> MarshalResult<()> {
        let class = Arc::clone(&self.class);
        let env = self.env;
        for (i, field) in class.fields.iter().enumerate() {
            let handler = env.handlers.for_field(field)?;
            match values.get(i) {
                None | Some(Value::Null) => self.bitmap.set(i, true),
                Some(value) => self.write_field(handler, value)?,
            }
        }
        Ok(())
    }

    fn write_field(&mut self, handler: &dyn TypeHandler, value: &Value) -> MarshalResult<()> {
        if !self.format.is_indirected_within_slot(handler) {
            return handler.write(self, value);
        }
        let child = self.tree.open_child(self.current);
        let parent = std::mem::replace(&mut self.current, child);
        let result = handler.write(self, value);
        self.current = parent;
        result
    }

    fn header_length(&self) -> usize {
        self.format.header_length(self.class.field_count())
    }

    /// Finished length before block alignment.
    pub fn marshalled_length(&self) -> usize {
        self.header_length() + self.tree.len()
    }

    /// Merge the buffer tree behind the header and hand back the slot bytes.
    pub fn finish(self) -> MarshalResult<EncodedSlot> {
        let expected = self.marshalled_length();
        let payload_start = self.header_length();
        let merged = self.tree.merge(self.format, payload_start)?;

        let mut buf = WriteBuffer::with_capacity(expected);
        ObjectHeader::write(
            &mut buf,
            self.format,
            self.class.id,
            &HeaderAttributes::new(self.bitmap),
        );
        buf.write_bytes(&merged.bytes);
        if buf.len() != expected {
            return Err(FormatError::LengthMismatch {
                expected,
                actual: buf.len(),
            }
            .into());
        }
        Ok(EncodedSlot {
            id: self.id,
            is_new: self.is_new,
            payload_start,
            bytes: buf.into_vec(),
            pointers: merged.pointers,
        })
    }
}

impl WriteContext for MarshallingContext<'_, '_> {
    fn write_byte(&mut self, value: u8) {
        self.tree.chunk_mut(self.current).write_u8(value);
    }

    fn write_int(&mut self, value: i32) {
        self.tree.chunk_mut(self.current).write_i32(value);
    }

    fn write_long(&mut self, value: i64) {
        self.tree.chunk_mut(self.current).write_i64(value);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.tree.chunk_mut(self.current).write_bytes(bytes);
    }

    fn write_object(&mut self, value: &Value) -> MarshalResult<()> {
        let id = match value {
            Value::Null => ObjectId::NULL,
            Value::Stub(id) => *id,
            Value::Ref(target) => {
                self.session
                    .store_reference(*target, self.update_depth, self.format)?
            }
            other => {
                return Err(MarshalError::TypeMismatch {
                    handler: "reference",
                    found: other.kind(),
                })
            }
        };
        self.write_int(id.get());
        Ok(())
    }

    fn write_value(&mut self, handler: &dyn TypeHandler, value: Option<&Value>) -> MarshalResult<()> {
        let indirected = self.format.is_indirected_within_slot(handler);
        match (value, indirected) {
            (None, true) => {
                self.write_int(0);
                self.write_int(0);
                Ok(())
            }
            (None, false) => {
                self.write_byte(0);
                Ok(())
            }
            (Some(value), true) => self.write_field(handler, value),
            (Some(value), false) => {
                self.write_byte(1);
                handler.write(self, value)
            }
        }
    }

    fn slot_format(&self) -> SlotFormat {
        self.format
    }
}

/// A finished object slot, ready for allocation.
#[derive(Clone, Debug)]
pub struct EncodedSlot {
    pub id: ObjectId,
    pub is_new: bool,
    pub payload_start: usize,
    pub bytes: Vec<u8>,
    /// Every pointer patched during the merge, payload-relative.
    pub pointers: Vec<PatchedPointer>,
}

impl EncodedSlot {
    /// Request a block-aligned destination range from the allocator.
    pub fn allocate_slot(&self, store: &dyn SlotStore) -> MarshalResult<Slot> {
        let length = store.block_aligned(self.bytes.len());
        Ok(if self.is_new {
            store.allocate_new(self.id, length)?
        } else {
            store.allocate_update(self.id, length)?
        })
    }

    /// Allocate, zero-pad to the allocated length, and write.
    pub fn commit(mut self, store: &dyn SlotStore) -> MarshalResult<Slot> {
        let slot = self.allocate_slot(store)?;
        self.bytes.resize(slot.length, 0);
        store.write(self.id, slot, &self.bytes)?;
        debug!(id = %self.id, len = slot.length, new = self.is_new, "object slot written");
        Ok(slot)
    }
}
