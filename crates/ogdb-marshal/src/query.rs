use std::sync::Arc;

use ogdb_format::{ClassDescriptor, ObjectHeader, ReadBuffer, SlotFormat};
use ogdb_types::ObjectId;
use tracing::debug;

use crate::context::{read_at_current_seek_position, skip_at_current_seek_position, ReadContext};
use crate::env::MarshalEnv;
use crate::error::{MarshalError, MarshalResult};
use crate::handlers::{IdRead, TypeHandler};
use crate::identity::IdentityMap;
use crate::value::Value;

/// A value collected for query evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Candidate {
    /// A persistent object, known by id only.
    Id(ObjectId),
    /// A decoded value with no persistent identity.
    Value(Value),
}

/// Id-only read path used while evaluating query constraints.
///
/// References are never materialized: they decode as [`Value::Stub`].
pub struct QueryingReadContext<'a> {
    env: &'a MarshalEnv,
    identity: Option<&'a IdentityMap>,
    id: ObjectId,
    buffer: ReadBuffer,
    header: ObjectHeader,
    class: Arc<ClassDescriptor>,
    candidates: Vec<Candidate>,
}

impl<'a> QueryingReadContext<'a> {
    /// `None` when the id has no slot or its class is unknown.
    pub fn open(
        env: &'a MarshalEnv,
        identity: Option<&'a IdentityMap>,
        id: ObjectId,
    ) -> MarshalResult<Option<Self>> {
        let Some(bytes) = env.store.read(id)? else {
            debug!(%id, "query: no slot");
            return Ok(None);
        };
        let mut buffer = ReadBuffer::new(bytes);
        let header = ObjectHeader::read(&mut buffer)?;
        let Some(class) = env.schema.class_for_id(header.class_id) else {
            debug!(%id, class = %header.class_id, "query: unknown class");
            return Ok(None);
        };
        Ok(Some(Self {
            env,
            identity,
            id,
            buffer,
            header,
            class,
            candidates: Vec::new(),
        }))
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn class(&self) -> &ClassDescriptor {
        &self.class
    }

    /// Position the cursor on field `name`.
    ///
    /// Returns its handler, or `None` if this slot holds no value for it.
    pub fn seek_field(&mut self, name: &str) -> MarshalResult<Option<&'a dyn TypeHandler>> {
        let class = Arc::clone(&self.class);
        let env = self.env;
        let index = class
            .field_index(name)
            .ok_or_else(|| MarshalError::UnknownField {
                class: class.name.clone(),
                field: name.to_string(),
            })?;
        if index >= self.header.field_count() || self.header.is_null(index) {
            return Ok(None);
        }
        self.buffer.seek(self.header.payload_start);
        for (i, field) in class.fields.iter().enumerate().take(index) {
            if !self.header.is_null(i) {
                skip_at_current_seek_position(self, env.handlers.for_field(field)?)?;
            }
        }
        Ok(Some(env.handlers.for_field(&class.fields[index])?))
    }

    /// Collect the field at the cursor as a bare id if the handler allows
    /// it, else as its decoded value.
    pub fn read_id(&mut self, handler: &dyn TypeHandler) -> MarshalResult<()> {
        let start = self.buffer.offset();
        let outcome = if handler.is_id_readable() {
            handler.read_id(self)?
        } else {
            IdRead::NotPossible
        };
        match outcome {
            IdRead::Id(id) => self.candidates.push(Candidate::Id(id)),
            IdRead::Absent => {}
            IdRead::NotPossible => {
                self.buffer.seek(start);
                let value = read_at_current_seek_position(self, handler)?;
                self.add(value);
            }
        }
        Ok(())
    }

    /// Advance past the field at the cursor without collecting it.
    pub fn skip_id(&mut self, handler: &dyn TypeHandler) -> MarshalResult<()> {
        skip_at_current_seek_position(self, handler)
    }

    /// Queue a candidate: persistent objects by id, anything else as is.
    pub fn add(&mut self, value: Value) {
        let candidate = match value {
            Value::Null => return,
            Value::Stub(id) => Candidate::Id(id),
            Value::Ref(r) => match self.identity.and_then(|map| map.id_of(r)) {
                Some(id) => Candidate::Id(id),
                None => Candidate::Value(Value::Ref(r)),
            },
            other => Candidate::Value(other),
        };
        self.candidates.push(candidate);
    }

    /// Seek to `name` and collect it.
    pub fn collect_field(&mut self, name: &str) -> MarshalResult<()> {
        if let Some(handler) = self.seek_field(name)? {
            self.read_id(handler)?;
        }
        Ok(())
    }

    /// Decode field `name` in full. References come back as stubs.
    pub fn read_field(&mut self, name: &str) -> MarshalResult<Value> {
        match self.seek_field(name)? {
            Some(handler) => read_at_current_seek_position(self, handler),
            None => Ok(Value::Null),
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn into_candidates(self) -> Vec<Candidate> {
        self.candidates
    }

    /// For each owner, the id referenced by its field `name`.
    ///
    /// Owners without a slot, with an unknown class, or with the field
    /// absent contribute nothing.
    pub fn collect_ids(
        env: &'a MarshalEnv,
        identity: Option<&'a IdentityMap>,
        owners: &[ObjectId],
        name: &str,
    ) -> MarshalResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for &owner in owners {
            let Some(mut ctx) = Self::open(env, identity, owner)? else {
                continue;
            };
            ctx.collect_field(name)?;
            ids.extend(ctx.candidates.iter().filter_map(|c| match c {
                Candidate::Id(id) => Some(*id),
                Candidate::Value(_) => None,
            }));
        }
        Ok(ids)
    }
}

impl ReadContext for QueryingReadContext<'_> {
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
        Ok(match id.non_null() {
            Some(id) => Value::Stub(id),
            None => Value::Null,
        })
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
