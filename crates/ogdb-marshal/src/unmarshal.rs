use std::sync::Arc;

use ogdb_format::{ClassDescriptor, ObjectHeader, ReadBuffer, SlotFormat};
use ogdb_types::{ActivationDepth, ObjectId};
use tracing::debug;

use crate::context::{read_at_current_seek_position, skip_at_current_seek_position, ReadContext};
use crate::env::MarshalEnv;
use crate::error::MarshalResult;
use crate::graph::{InstanceRef, InstanceState};
use crate::session::Session;
use crate::value::Value;

/// How a read materializes objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// Into the session's identity map.
    Durable,
    /// Like `Durable`, with the prefetch activation policy.
    Prefetch,
    /// Into a detached graph; the session's identity map is left alone.
    Transient,
}

/// Materializes one object slot into an instance.
///
/// The identity of the object is registered before any field is read, so a
/// reference cycle leads back to the placeholder instead of recursing.
pub struct UnmarshallingContext<'s, 'e> {
    session: &'s mut Session<'e>,
    env: &'e MarshalEnv,
    id: ObjectId,
    buffer: ReadBuffer,
    header: ObjectHeader,
    class: Arc<ClassDescriptor>,
    depth: ActivationDepth,
    mode: ReadMode,
}

impl<'s, 'e> UnmarshallingContext<'s, 'e> {
    /// Fetch the slot of `id`, read its header and resolve its class.
    ///
    /// `None` when the id has no slot or its class is unknown.
    pub fn open(
        session: &'s mut Session<'e>,
        id: ObjectId,
        depth: ActivationDepth,
        mode: ReadMode,
    ) -> MarshalResult<Option<Self>> {
        let env = session.env();
        let Some(bytes) = env.store.read(id)? else {
            debug!(%id, "no slot, reading as absent");
            return Ok(None);
        };
        let mut buffer = ReadBuffer::new(bytes);
        let header = ObjectHeader::read(&mut buffer)?;
        let Some(class) = env.schema.class_for_id(header.class_id) else {
            debug!(%id, class = %header.class_id, "unknown class, reading as absent");
            return Ok(None);
        };
        Ok(Some(Self {
            session,
            env,
            id,
            buffer,
            header,
            class,
            depth,
            mode,
        }))
    }

    pub fn header(&self) -> &ObjectHeader {
        &self.header
    }

    pub fn class(&self) -> &ClassDescriptor {
        &self.class
    }

    /// Whether the header's class id is the id of the descriptor the
    /// registry resolved it to. A mismatch is logged, never raised.
    pub fn header_matches_class(&self) -> bool {
        self.header.check_class(self.class.id)
    }

    /// Resolve identity, instantiate if needed, and activate to the
    /// resolved depth.
    pub fn read(mut self) -> MarshalResult<InstanceRef> {
        self.adjust_activation_depth();
        if let Some(existing) = self.session.lookup(self.id, self.mode) {
            self.activate_instance(existing)?;
            return Ok(existing);
        }
        let instance = self.env.schema.instantiate(&self.class);
        let instance = self.session.register(self.id, instance, self.mode);
        self.activate_instance(instance)?;
        Ok(instance)
    }

    /// Fill in an instance that is already bound to this context's id.
    pub fn activate(mut self, instance: InstanceRef) -> MarshalResult<()> {
        self.adjust_activation_depth();
        self.activate_instance(instance)
    }

    /// Decode exactly one field, skipping the ones before it.
    pub fn read_field_value(mut self, index: usize) -> MarshalResult<Value> {
        self.adjust_activation_depth();
        if index >= self.header.field_count() || self.header.is_null(index) {
            return Ok(Value::Null);
        }
        let class = Arc::clone(&self.class);
        let env = self.env;
        let handlers = env.handlers.as_ref();
        self.buffer.seek(self.header.payload_start);
        for (i, field) in class.fields.iter().enumerate().take(index) {
            if !self.header.is_null(i) {
                skip_at_current_seek_position(&mut self, handlers.for_field(field)?)?;
            }
        }
        match class.fields.get(index) {
            Some(field) => read_at_current_seek_position(&mut self, handlers.for_field(field)?),
            None => Ok(Value::Null),
        }
    }

    fn adjust_activation_depth(&mut self) {
        if !self.depth.is_unknown() {
            return;
        }
        let config = &self.env.config;
        let depth = match self.mode {
            ReadMode::Prefetch => config.prefetch_activation_depth,
            ReadMode::Durable | ReadMode::Transient => self
                .env
                .schema
                .activation_depth_for(self.class.id)
                .unwrap_or(config.activation_depth),
        };
        self.depth = ActivationDepth::Bounded(depth);
    }

    fn activate_instance(&mut self, instance: InstanceRef) -> MarshalResult<()> {
        if !self.depth.is_active() {
            return Ok(());
        }
        let target = self.session.instance_mut(instance, self.mode)?;
        if target.is_active() {
            return Ok(());
        }
        // Marked before the fields are read: a cycle back to this instance
        // must find it active.
        target.state = InstanceState::Active;
        if self.env.config.verify_headers {
            self.header_matches_class();
        }
        let values = self.read_fields()?;
        self.session.instance_mut(instance, self.mode)?.fields = values;
        debug!(id = %self.id, class = %self.class.name, depth = ?self.depth, "object activated");
        Ok(())
    }

    fn read_fields(&mut self) -> MarshalResult<Vec<Value>> {
        let class = Arc::clone(&self.class);
        let env = self.env;
        let mut values = vec![Value::Null; class.field_count()];
        self.buffer.seek(self.header.payload_start);
        let recorded = self.header.field_count();
        for (i, field) in class.fields.iter().enumerate().take(recorded) {
            if self.header.is_null(i) {
                continue;
            }
            let handler = env.handlers.for_field(field)?;
            values[i] = read_at_current_seek_position(self, handler)?;
        }
        Ok(values)
    }
}

impl ReadContext for UnmarshallingContext<'_, '_> {
    fn read_byte(&mut self) -> MarshalResult<u8> {
        Ok(self.buffer.read_u8()?)
    }

    fn read_int(&mut self) -> MarshalResult<i32> {
        Ok(self.buffer.read_i32()?)
    }

    fn read_long(&mut self) -> MarshalResult<i64> {
        Ok(self.buffer.read_i64()?)
    }

    fn read_bytes(&mut self, len: usize) -> MarshalResult<Vec<u8>> {
        Ok(self.buffer.read_bytes(len)?)
    }

    fn read_object(&mut self) -> MarshalResult<Value> {
        let id = ObjectId::new(self.buffer.read_i32()?);
        if id.is_null() {
            return Ok(Value::Null);
        }
        let target = self
            .session
            .read_internal(id, self.depth.descend(), self.mode)?;
        Ok(target.map_or(Value::Null, Value::Ref))
    }

    fn offset(&self) -> usize {
        self.buffer.offset()
    }

    fn seek(&mut self, offset: usize) {
        self.buffer.seek(offset);
    }

    fn slot_format(&self) -> SlotFormat {
        self.header.format
    }

    fn payload_start(&self) -> usize {
        self.header.payload_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Instance;
    use crate::handlers::INT;
    use crate::registry::{InMemorySchemaRegistry, SchemaRegistry};
    use ogdb_format::FieldDescriptor;
    use ogdb_store::InMemorySlotStore;
    use ogdb_types::ClassId;

    /// Resolves one class id to the descriptor registered under another.
    struct Aliasing {
        inner: InMemorySchemaRegistry,
        from: ClassId,
        to: ClassId,
    }

    impl SchemaRegistry for Aliasing {
        fn class_for_id(&self, id: ClassId) -> Option<Arc<ClassDescriptor>> {
            let id = if id == self.from { self.to } else { id };
            self.inner.class_for_id(id)
        }

        fn class_id_for_name(&self, name: &str) -> Option<ClassId> {
            self.inner.class_id_for_name(name)
        }

        fn register(&self, class: ClassDescriptor) -> MarshalResult<Arc<ClassDescriptor>> {
            self.inner.register(class)
        }

        fn class_ids(&self) -> Vec<ClassId> {
            self.inner.class_ids()
        }

        fn instantiate(&self, class: &ClassDescriptor) -> Instance {
            self.inner.instantiate(class)
        }
    }

    fn point_fields() -> Vec<FieldDescriptor> {
        vec![FieldDescriptor::field("x", INT), FieldDescriptor::field("y", INT)]
    }

    #[test]
    fn header_check_compares_against_the_resolved_class() {
        let store = Arc::new(InMemorySlotStore::new());
        let env = MarshalEnv::new(store.clone(), Arc::new(InMemorySchemaRegistry::new()));
        let class = env
            .register_class(ClassDescriptor::new(ClassId::NULL, "Point", point_fields()))
            .unwrap();
        let mut session = env.session();
        let p = session.new_object("Point").unwrap();
        session.set_field(p, "x", 1).unwrap();
        let id = session.store(p).unwrap();

        let mut same = env.session();
        let ctx = UnmarshallingContext::open(&mut same, id, ActivationDepth::Unknown, ReadMode::Durable)
            .unwrap()
            .unwrap();
        assert!(ctx.header_matches_class());

        let alias = ClassId::new(class.id.get() + 100);
        let aliasing = Aliasing {
            inner: InMemorySchemaRegistry::new(),
            from: class.id,
            to: alias,
        };
        aliasing
            .register(ClassDescriptor::new(alias, "Point", point_fields()))
            .unwrap();
        let aliased_env = MarshalEnv::new(store, Arc::new(aliasing));
        let mut other = aliased_env.session();
        let ctx = UnmarshallingContext::open(&mut other, id, ActivationDepth::Unknown, ReadMode::Durable)
            .unwrap()
            .unwrap();
        assert_eq!(ctx.class().id, alias);
        assert!(!ctx.header_matches_class());

        // The mismatch is only logged; the object still reads.
        let r = ctx.read().unwrap();
        assert_eq!(other.field(r, "x"), Some(&Value::Int(1)));
    }
}
