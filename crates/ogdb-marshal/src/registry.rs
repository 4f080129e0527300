use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use ogdb_format::{
    AspectKind, AspectResolver, ClassDescriptor, FieldDescriptor, RawClassSpec, ReadBuffer,
    SchemaCodec,
};
use ogdb_store::SlotStore;
use ogdb_types::{ClassId, HandlerId, ObjectId};
use tracing::debug;

use crate::error::{MarshalError, MarshalResult};
use crate::graph::Instance;
use crate::handlers::HandlerRegistry;

/// Schema registry seen from the marshalling core.
///
/// Lookups return `None` for unknown ids and names; they never fail.
pub trait SchemaRegistry: Send + Sync {
    fn class_for_id(&self, id: ClassId) -> Option<Arc<ClassDescriptor>>;

    fn class_id_for_name(&self, name: &str) -> Option<ClassId>;

    /// Insert or replace a descriptor.
    fn register(&self, class: ClassDescriptor) -> MarshalResult<Arc<ClassDescriptor>>;

    /// Ids of every registered class, ascending.
    fn class_ids(&self) -> Vec<ClassId>;

    /// A bare, unactivated instance of `class`.
    fn instantiate(&self, class: &ClassDescriptor) -> Instance {
        Instance::bare(class.id, class.field_count())
    }

    /// Per-class override of the default activation depth.
    fn activation_depth_for(&self, _class: ClassId) -> Option<u32> {
        None
    }
}

#[derive(Debug, Default)]
struct Inner {
    by_id: BTreeMap<ClassId, Arc<ClassDescriptor>>,
    by_name: HashMap<String, ClassId>,
    depths: HashMap<ClassId, u32>,
}

/// Map-backed schema registry.
#[derive(Debug, Default)]
pub struct InMemorySchemaRegistry {
    inner: RwLock<Inner>,
}

impl InMemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget a class. Objects of the class then read back as absent.
    pub fn remove(&self, id: ClassId) -> bool {
        let mut inner = self.inner.write().expect("lock poisoned");
        match inner.by_id.remove(&id) {
            Some(class) => {
                inner.by_name.remove(&class.name);
                inner.depths.remove(&id);
                true
            }
            None => false,
        }
    }

    pub fn set_activation_depth(&self, id: ClassId, depth: u32) {
        self.inner
            .write()
            .expect("lock poisoned")
            .depths
            .insert(id, depth);
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuild descriptors from the schema slots of `ids`.
    ///
    /// Field kinds come from `resolver`; ids without a slot are skipped.
    /// Returns the number of classes loaded.
    pub fn load(
        &self,
        store: &dyn SlotStore,
        ids: &[ClassId],
        codec: SchemaCodec,
        resolver: &dyn AspectResolver,
        handlers: &HandlerRegistry,
    ) -> MarshalResult<usize> {
        let mut loaded = 0;
        for &id in ids {
            let Some(bytes) = store.read(ObjectId::from(id))? else {
                debug!(class = %id, "no schema slot");
                continue;
            };
            let spec = codec.read(&mut ReadBuffer::new(bytes), resolver)?;
            let class = resolve_spec(id, spec, resolver, handlers)?;
            debug!(class = %class.name, id = %id, fields = class.field_count(), "schema loaded");
            self.register(class)?;
            loaded += 1;
        }
        Ok(loaded)
    }
}

/// Turn a raw skeleton into a live descriptor by resolving every handler.
pub fn resolve_spec(
    id: ClassId,
    spec: RawClassSpec,
    resolver: &dyn AspectResolver,
    handlers: &HandlerRegistry,
) -> MarshalResult<ClassDescriptor> {
    let mut fields = Vec::with_capacity(spec.fields.len());
    for raw in spec.fields {
        let handler = if raw.is_virtual {
            handlers
                .virtual_handler_id(&raw.name)
                .ok_or_else(|| MarshalError::UnknownVirtualField(raw.name.clone()))?
        } else if raw.kind.is_field() {
            let handler = raw.handler.ok_or_else(|| {
                MarshalError::InternalConsistency(format!("data field {:?} without handler", raw.name))
            })?;
            handlers.resolve(handler)?;
            handler
        } else {
            resolver
                .aspect_handler(&spec.name, &raw.name)
                .ok_or_else(|| MarshalError::UnresolvedAspect {
                    class: spec.name.clone(),
                    aspect: raw.name.clone(),
                })?
        };
        fields.push(FieldDescriptor {
            name: raw.name,
            kind: raw.kind,
            handler,
            flags: raw.flags.unwrap_or_default(),
            index: raw.index,
            is_virtual: raw.is_virtual,
        });
    }
    Ok(ClassDescriptor {
        id,
        name: spec.name,
        ancestor: spec.ancestor,
        index: spec.index,
        fields,
    })
}

impl SchemaRegistry for InMemorySchemaRegistry {
    fn class_for_id(&self, id: ClassId) -> Option<Arc<ClassDescriptor>> {
        self.inner.read().expect("lock poisoned").by_id.get(&id).cloned()
    }

    fn class_id_for_name(&self, name: &str) -> Option<ClassId> {
        self.inner
            .read()
            .expect("lock poisoned")
            .by_name
            .get(name)
            .copied()
    }

    fn register(&self, class: ClassDescriptor) -> MarshalResult<Arc<ClassDescriptor>> {
        if class.id.is_null() {
            return Err(MarshalError::InternalConsistency(format!(
                "class {:?} has no id",
                class.name
            )));
        }
        let class = Arc::new(class);
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.by_name.insert(class.name.clone(), class.id);
        inner.by_id.insert(class.id, Arc::clone(&class));
        Ok(class)
    }

    fn class_ids(&self) -> Vec<ClassId> {
        self.inner
            .read()
            .expect("lock poisoned")
            .by_id
            .keys()
            .copied()
            .collect()
    }

    fn activation_depth_for(&self, class: ClassId) -> Option<u32> {
        self.inner
            .read()
            .expect("lock poisoned")
            .depths
            .get(&class)
            .copied()
    }
}

/// Positional aspect kinds taken from the descriptors already registered.
impl AspectResolver for InMemorySchemaRegistry {
    fn aspect_kind(&self, class_name: &str, position: usize) -> AspectKind {
        self.class_id_for_name(class_name)
            .and_then(|id| self.class_for_id(id))
            .and_then(|class| class.fields.get(position).map(|f| f.kind))
            .unwrap_or(AspectKind::Field)
    }

    fn is_virtual_field(&self, name: &str) -> bool {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .by_id
            .values()
            .any(|class| class.fields.iter().any(|f| f.is_virtual && f.name == name))
    }

    fn aspect_handler(&self, class_name: &str, aspect_name: &str) -> Option<HandlerId> {
        self.class_id_for_name(class_name)
            .and_then(|id| self.class_for_id(id))
            .and_then(|class| class.field(aspect_name).map(|f| f.handler))
    }
}

/// Every aspect is a plain field; virtual fields are the registry's
/// by-name table. Suitable when no positional aspect index exists.
impl AspectResolver for HandlerRegistry {
    fn aspect_kind(&self, _class_name: &str, _position: usize) -> AspectKind {
        AspectKind::Field
    }

    fn is_virtual_field(&self, name: &str) -> bool {
        HandlerRegistry::is_virtual_field(self, name)
    }

    fn aspect_handler(&self, _class_name: &str, _aspect_name: &str) -> Option<HandlerId> {
        None
    }
}
