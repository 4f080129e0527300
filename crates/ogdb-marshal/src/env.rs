use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use ogdb_format::{ClassDescriptor, SchemaCodec};
use ogdb_store::{InMemorySlotStore, SlotStore};
use ogdb_types::{ClassId, ObjectId};
use tracing::debug;

use crate::config::MarshalConfig;
use crate::error::{MarshalError, MarshalResult};
use crate::handlers::HandlerRegistry;
use crate::index::{FieldIndex, InMemoryFieldIndex};
use crate::registry::{InMemorySchemaRegistry, SchemaRegistry};
use crate::session::Session;

/// Everything one open database shares across marshalling calls.
///
/// Built once and passed by reference into every [`Session`].
pub struct MarshalEnv {
    pub store: Arc<dyn SlotStore>,
    pub schema: Arc<dyn SchemaRegistry>,
    pub handlers: Arc<HandlerRegistry>,
    pub index: Arc<dyn FieldIndex>,
    pub config: MarshalConfig,
    versions: AtomicI64,
}

impl MarshalEnv {
    /// An environment over `store` and `schema` with the built-in handlers,
    /// an in-memory field index and the default configuration.
    pub fn new(store: Arc<dyn SlotStore>, schema: Arc<dyn SchemaRegistry>) -> Self {
        Self {
            store,
            schema,
            handlers: Arc::new(HandlerRegistry::with_builtins()),
            index: Arc::new(InMemoryFieldIndex::new()),
            config: MarshalConfig::default(),
            versions: AtomicI64::new(0),
        }
    }

    /// An environment where every collaborator lives in memory.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemorySlotStore::new()),
            Arc::new(InMemorySchemaRegistry::new()),
        )
    }

    pub fn with_config(mut self, config: MarshalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_handlers(mut self, handlers: Arc<HandlerRegistry>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_index(mut self, index: Arc<dyn FieldIndex>) -> Self {
        self.index = index;
        self
    }

    pub fn session(&self) -> Session<'_> {
        Session::new(self)
    }

    pub fn schema_codec(&self) -> SchemaCodec {
        SchemaCodec::new(self.config.field_format)
    }

    /// Stamp for the `$version` field of the next object write.
    pub(crate) fn next_version(&self) -> i64 {
        self.versions.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Persist a class: assign its id, write its schema slot and register it.
    ///
    /// Any id `class` carries is replaced. Registering a known name again
    /// evolves the class in place; the new field list must extend the old
    /// one.
    pub fn register_class(&self, mut class: ClassDescriptor) -> MarshalResult<Arc<ClassDescriptor>> {
        for field in &class.fields {
            self.handlers.for_field(field)?;
        }
        let existing = self
            .schema
            .class_id_for_name(&class.name)
            .and_then(|id| self.schema.class_for_id(id));
        let (id, is_new) = match &existing {
            Some(old) => {
                check_evolution(old, &class)?;
                class.id = old.id;
                if **old == class {
                    return Ok(Arc::clone(old));
                }
                (ObjectId::from(old.id), false)
            }
            None => (self.store.reserve_id()?, true),
        };
        class.id = ClassId::from(id);

        let mut bytes = self.schema_codec().write(&class)?;
        let length = self.store.block_aligned(bytes.len());
        let slot = if is_new {
            self.store.allocate_new(id, length)?
        } else {
            self.store.allocate_update(id, length)?
        };
        bytes.resize(slot.length, 0);
        self.store.write(id, slot, &bytes)?;
        debug!(class = %class.name, id = %class.id, fields = class.field_count(), "schema slot written");
        self.schema.register(class)
    }
}

fn check_evolution(old: &ClassDescriptor, new: &ClassDescriptor) -> MarshalResult<()> {
    if new.fields.len() < old.fields.len() {
        return Err(MarshalError::IncompatibleSchema {
            class: new.name.clone(),
            detail: format!("{} fields persisted, {} given", old.fields.len(), new.fields.len()),
        });
    }
    for (persisted, given) in old.fields.iter().zip(&new.fields) {
        if persisted != given {
            return Err(MarshalError::IncompatibleSchema {
                class: new.name.clone(),
                detail: format!("field {:?} changed", persisted.name),
            });
        }
    }
    Ok(())
}

impl fmt::Debug for MarshalEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshalEnv")
            .field("handlers", &self.handlers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
