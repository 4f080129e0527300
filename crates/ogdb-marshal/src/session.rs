use std::collections::HashSet;
use std::sync::Arc;

use ogdb_format::{ClassDescriptor, SlotFormat};
use ogdb_types::{ActivationDepth, IndexId, ObjectId};
use tracing::debug;

use crate::env::MarshalEnv;
use crate::error::{MarshalError, MarshalResult};
use crate::graph::{DetachedGraph, Instance, InstanceRef, InstanceState, ObjectGraph};
use crate::handlers::{UUID_FIELD, VERSION_FIELD};
use crate::identity::IdentityMap;
use crate::query::{Candidate, QueryingReadContext};
use crate::tracker::IdentityTracker;
use crate::unmarshal::{ReadMode, UnmarshallingContext};
use crate::value::Value;
use crate::write_context::MarshallingContext;

#[derive(Debug, Default)]
struct TransientGraph {
    graph: ObjectGraph,
    seen: IdentityTracker<ObjectId>,
}

/// One unit of work against a [`MarshalEnv`]: a live object graph and the
/// identity map binding it to persistent ids.
///
/// Sessions are single-threaded. The identity map lives as long as the
/// session.
#[derive(Debug)]
pub struct Session<'e> {
    env: &'e MarshalEnv,
    graph: ObjectGraph,
    identity: IdentityMap,
    in_progress: HashSet<InstanceRef>,
    transient: Option<TransientGraph>,
}

impl<'e> Session<'e> {
    pub fn new(env: &'e MarshalEnv) -> Self {
        Self {
            env,
            graph: ObjectGraph::new(),
            identity: IdentityMap::new(),
            in_progress: HashSet::new(),
            transient: None,
        }
    }

    pub fn env(&self) -> &'e MarshalEnv {
        self.env
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn identity(&self) -> &IdentityMap {
        &self.identity
    }

    pub fn register_class(&self, class: ClassDescriptor) -> MarshalResult<Arc<ClassDescriptor>> {
        self.env.register_class(class)
    }

    // ---- live objects ----

    /// A new, unsaved instance of `class_name` with every field absent.
    pub fn new_object(&mut self, class_name: &str) -> MarshalResult<InstanceRef> {
        let class = self.class_named(class_name)?;
        let mut instance = Instance::bare(class.id, class.field_count());
        instance.state = InstanceState::Active;
        Ok(self.graph.insert(instance))
    }

    pub fn instance(&self, r: InstanceRef) -> Option<&Instance> {
        self.graph.get(r)
    }

    pub fn id_of(&self, r: InstanceRef) -> Option<ObjectId> {
        self.identity.id_of(r)
    }

    /// Value of field `name`, `None` if the instance or field is unknown.
    pub fn field(&self, r: InstanceRef, name: &str) -> Option<&Value> {
        let instance = self.graph.get(r)?;
        let index = self.env.schema.class_for_id(instance.class)?.field_index(name)?;
        instance.fields.get(index)
    }

    pub fn set_field(
        &mut self,
        r: InstanceRef,
        name: &str,
        value: impl Into<Value>,
    ) -> MarshalResult<()> {
        let class_id = self.graph.get(r).ok_or(MarshalError::UnknownInstance(r))?.class;
        let class = self
            .env
            .schema
            .class_for_id(class_id)
            .ok_or(MarshalError::UnknownClass(class_id))?;
        let index = class
            .field_index(name)
            .ok_or_else(|| MarshalError::UnknownField {
                class: class.name.clone(),
                field: name.to_string(),
            })?;
        let instance = self.graph.get_mut(r).ok_or(MarshalError::UnknownInstance(r))?;
        if instance.fields.len() < class.field_count() {
            instance.fields.resize(class.field_count(), Value::Null);
        }
        instance.fields[index] = value.into();
        Ok(())
    }

    fn class_named(&self, name: &str) -> MarshalResult<Arc<ClassDescriptor>> {
        self.env
            .schema
            .class_id_for_name(name)
            .and_then(|id| self.env.schema.class_for_id(id))
            .ok_or_else(|| MarshalError::UnknownClassName(name.to_string()))
    }

    // ---- write path ----

    /// Persist `r` and everything it references that has no id yet.
    pub fn store(&mut self, r: InstanceRef) -> MarshalResult<ObjectId> {
        self.store_in_format(r, SlotFormat::current())
    }

    /// [`Session::store`] with an explicit slot layout, for producing data
    /// in a historical format.
    pub fn store_in_format(&mut self, r: InstanceRef, format: SlotFormat) -> MarshalResult<ObjectId> {
        let result = self.store_internal(r, self.env.config.update_depth, format);
        self.in_progress.clear();
        result
    }

    /// Id of a referenced instance, writing it first if it has none, or if
    /// it is already stored and `update_depth` hops remain.
    pub(crate) fn store_reference(
        &mut self,
        r: InstanceRef,
        update_depth: u32,
        format: SlotFormat,
    ) -> MarshalResult<ObjectId> {
        match self.identity.id_of(r) {
            Some(id) if update_depth == 0 || self.in_progress.contains(&r) => Ok(id),
            _ => self.store_internal(r, update_depth.saturating_sub(1), format),
        }
    }

    fn store_internal(
        &mut self,
        r: InstanceRef,
        update_depth: u32,
        format: SlotFormat,
    ) -> MarshalResult<ObjectId> {
        let instance = self.graph.get(r).ok_or(MarshalError::UnknownInstance(r))?;
        // An inactive instance holds no field values; its slot stays as stored.
        if let (Some(id), false) = (self.identity.id_of(r), instance.is_active()) {
            debug!(%id, "inactive object not rewritten");
            return Ok(id);
        }
        let class_id = instance.class;
        let class = self
            .env
            .schema
            .class_for_id(class_id)
            .ok_or(MarshalError::UnknownClass(class_id))?;

        // Bound before any field is written so that cycles find the id.
        let (id, is_new) = match self.identity.id_of(r) {
            Some(id) => (id, false),
            None => {
                let id = self.env.store.reserve_id()?;
                self.identity.bind(id, r);
                (id, true)
            }
        };
        self.in_progress.insert(r);

        let values = self.stamp_virtual_fields(r, &class)?;
        let mut ctx = MarshallingContext::new(self, id, Arc::clone(&class), format, is_new, update_depth);
        ctx.write_fields(&values)?;
        let encoded = ctx.finish()?;

        // The old slot is still in place: read its entries before it is
        // overwritten, drop them only once the new slot is written.
        let stale = if is_new {
            Vec::new()
        } else {
            self.stored_index_entries(id, &class)?
        };
        encoded.commit(self.env.store.as_ref())?;
        for (index, old) in &stale {
            self.env.index.remove_entry(*index, old, id)?;
        }
        self.add_index_entries(id, &class, &values, is_new)?;
        debug!(%id, class = %class.name, new = is_new, "object stored");
        Ok(id)
    }

    fn stamp_virtual_fields(
        &mut self,
        r: InstanceRef,
        class: &ClassDescriptor,
    ) -> MarshalResult<Vec<Value>> {
        let env = self.env;
        let instance = self.graph.get_mut(r).ok_or(MarshalError::UnknownInstance(r))?;
        if instance.fields.len() < class.field_count() {
            instance.fields.resize(class.field_count(), Value::Null);
        }
        for (i, field) in class.fields.iter().enumerate() {
            if !field.is_virtual {
                continue;
            }
            match field.name.as_str() {
                VERSION_FIELD => instance.fields[i] = Value::Long(env.next_version()),
                UUID_FIELD if instance.fields[i].is_null() => {
                    let (high, low) = uuid::Uuid::now_v7().as_u64_pair();
                    instance.fields[i] = Value::Long((high ^ low) as i64);
                }
                _ => {}
            }
        }
        Ok(instance.fields.clone())
    }

    fn index_key(&self, value: &Value) -> Option<Value> {
        match value {
            Value::Null => None,
            Value::Ref(r) => self.identity.id_of(*r).map(Value::Stub),
            other => Some(other.clone()),
        }
    }

    fn add_index_entries(
        &self,
        id: ObjectId,
        class: &ClassDescriptor,
        values: &[Value],
        is_new: bool,
    ) -> MarshalResult<()> {
        if let (true, Some(index)) = (is_new, class.index) {
            self.env.index.add_entry(index, &Value::Stub(id), id)?;
        }
        for (field, value) in class.fields.iter().zip(values) {
            let (Some(index), Some(key)) = (field.index, self.index_key(value)) else {
                continue;
            };
            self.env.index.add_entry(index, &key, id)?;
        }
        Ok(())
    }

    /// Index keys of the slot currently stored under `id`, one per indexed
    /// field that is present.
    fn stored_index_entries(
        &self,
        id: ObjectId,
        class: &ClassDescriptor,
    ) -> MarshalResult<Vec<(IndexId, Value)>> {
        if class.fields.iter().all(|f| f.index.is_none()) {
            return Ok(Vec::new());
        }
        let Some(mut ctx) = QueryingReadContext::open(self.env, Some(&self.identity), id)? else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::new();
        for field in &class.fields {
            let Some(index) = field.index else { continue };
            let old = ctx.read_field(&field.name)?;
            if !old.is_null() {
                entries.push((index, old));
            }
        }
        Ok(entries)
    }

    /// Remove the object's slot and its index entries. Returns `false` if
    /// there was no slot.
    pub fn delete(&mut self, id: ObjectId) -> MarshalResult<bool> {
        if let Some(ctx) = QueryingReadContext::open(self.env, Some(&self.identity), id)? {
            let class = ctx.class().clone();
            drop(ctx);
            for (index, old) in self.stored_index_entries(id, &class)? {
                self.env.index.remove_entry(index, &old, id)?;
            }
            if let Some(index) = class.index {
                self.env.index.remove_entry(index, &Value::Stub(id), id)?;
            }
        }
        self.identity.unbind(id);
        let freed = self.env.store.free(id)?;
        debug!(%id, freed, "object deleted");
        Ok(freed)
    }

    // ---- read path ----

    /// Read `id` with the default activation depth.
    pub fn read(&mut self, id: ObjectId) -> MarshalResult<Option<InstanceRef>> {
        self.read_with_depth(id, ActivationDepth::Unknown)
    }

    pub fn read_with_depth(
        &mut self,
        id: ObjectId,
        depth: ActivationDepth,
    ) -> MarshalResult<Option<InstanceRef>> {
        self.read_internal(id, depth, ReadMode::Durable)
    }

    /// Read `id` under the prefetch activation policy.
    pub fn read_prefetch(&mut self, id: ObjectId) -> MarshalResult<Option<InstanceRef>> {
        self.read_internal(id, ActivationDepth::Unknown, ReadMode::Prefetch)
    }

    /// Materialize `id` into a detached graph, leaving this session's
    /// identity map untouched.
    pub fn peek(
        &mut self,
        id: ObjectId,
        depth: ActivationDepth,
    ) -> MarshalResult<Option<DetachedGraph>> {
        self.transient = Some(TransientGraph::default());
        let root = self.read_internal(id, depth, ReadMode::Transient);
        let transient = self.transient.take().unwrap_or_default();
        Ok(root?.map(|root| DetachedGraph {
            graph: transient.graph,
            root,
        }))
    }

    /// Fill in `r` and what it references, `depth` hops deep.
    pub fn activate(&mut self, r: InstanceRef, depth: u32) -> MarshalResult<()> {
        if depth == 0 {
            return Ok(());
        }
        let instance = self.graph.get(r).ok_or(MarshalError::UnknownInstance(r))?;
        if instance.is_active() {
            let children: Vec<InstanceRef> =
                instance.fields.iter().filter_map(Value::as_instance).collect();
            for child in children {
                self.activate(child, depth - 1)?;
            }
            return Ok(());
        }
        let Some(id) = self.identity.id_of(r) else {
            return Ok(());
        };
        match UnmarshallingContext::open(self, id, ActivationDepth::Bounded(depth), ReadMode::Durable)? {
            Some(ctx) => ctx.activate(r),
            None => Ok(()),
        }
    }

    /// Decode one field of a stored object without activating the object.
    ///
    /// `None` if the object has no slot or its class is unknown.
    pub fn read_field_value(&mut self, id: ObjectId, name: &str) -> MarshalResult<Option<Value>> {
        let Some(ctx) = UnmarshallingContext::open(self, id, ActivationDepth::Bounded(1), ReadMode::Durable)?
        else {
            return Ok(None);
        };
        let index = ctx
            .class()
            .field_index(name)
            .ok_or_else(|| MarshalError::UnknownField {
                class: ctx.class().name.clone(),
                field: name.to_string(),
            })?;
        ctx.read_field_value(index).map(Some)
    }

    /// Candidates for a constraint on field `name` of `id`.
    pub fn query_field(&self, id: ObjectId, name: &str) -> MarshalResult<Option<Vec<Candidate>>> {
        let Some(mut ctx) = QueryingReadContext::open(self.env, Some(&self.identity), id)? else {
            return Ok(None);
        };
        ctx.collect_field(name)?;
        Ok(Some(ctx.into_candidates()))
    }

    /// Ids referenced by field `name` of every owner.
    pub fn collect_ids(&self, owners: &[ObjectId], name: &str) -> MarshalResult<Vec<ObjectId>> {
        QueryingReadContext::collect_ids(self.env, Some(&self.identity), owners, name)
    }

    pub(crate) fn read_internal(
        &mut self,
        id: ObjectId,
        depth: ActivationDepth,
        mode: ReadMode,
    ) -> MarshalResult<Option<InstanceRef>> {
        if id.is_null() {
            return Ok(None);
        }
        match UnmarshallingContext::open(self, id, depth, mode)? {
            Some(ctx) => ctx.read().map(Some),
            None => Ok(None),
        }
    }

    // ---- identity, used by the read contexts ----

    pub(crate) fn lookup(&self, id: ObjectId, mode: ReadMode) -> Option<InstanceRef> {
        match (&self.transient, mode) {
            (Some(transient), ReadMode::Transient) => {
                transient.seen.get_offset(&id).map(InstanceRef::from_index)
            }
            _ => self.identity.instance_of(id),
        }
    }

    pub(crate) fn register(&mut self, id: ObjectId, instance: Instance, mode: ReadMode) -> InstanceRef {
        match (&mut self.transient, mode) {
            (Some(transient), ReadMode::Transient) => {
                let r = transient.graph.insert(instance);
                transient.seen.add(id, r.index());
                r
            }
            _ => {
                let r = self.graph.insert(instance);
                self.identity.bind(id, r);
                r
            }
        }
    }

    pub(crate) fn instance_mut(&mut self, r: InstanceRef, mode: ReadMode) -> MarshalResult<&mut Instance> {
        let graph = match (&mut self.transient, mode) {
            (Some(transient), ReadMode::Transient) => &mut transient.graph,
            _ => &mut self.graph,
        };
        graph.get_mut(r).ok_or(MarshalError::UnknownInstance(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{INT, LONG, REFERENCE, STRING, STRING_LIST};
    use crate::index::InMemoryFieldIndex;
    use crate::registry::InMemorySchemaRegistry;
    use crate::MarshalConfig;
    use ogdb_format::{FieldDescriptor, FormatError};
    use ogdb_store::{InMemorySlotStore, SlotStore};
    use ogdb_types::{ClassId, IndexId};

    struct Fixture {
        store: Arc<InMemorySlotStore>,
        schema: Arc<InMemorySchemaRegistry>,
        index: Arc<InMemoryFieldIndex>,
        env: MarshalEnv,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemorySlotStore::new());
        let schema = Arc::new(InMemorySchemaRegistry::new());
        let index = Arc::new(InMemoryFieldIndex::new());
        let env = MarshalEnv::new(store.clone(), schema.clone()).with_index(index.clone());
        Fixture {
            store,
            schema,
            index,
            env,
        }
    }

    fn point(env: &MarshalEnv) -> Arc<ClassDescriptor> {
        env.register_class(ClassDescriptor::new(
            ClassId::NULL,
            "Point",
            vec![FieldDescriptor::field("x", INT), FieldDescriptor::field("y", INT)],
        ))
        .unwrap()
    }

    fn node(env: &MarshalEnv) -> Arc<ClassDescriptor> {
        env.register_class(ClassDescriptor::new(
            ClassId::NULL,
            "Node",
            vec![
                FieldDescriptor::field("value", INT),
                FieldDescriptor::field("next", REFERENCE),
            ],
        ))
        .unwrap()
    }

    fn store_point(env: &MarshalEnv, x: i32, y: i32) -> ObjectId {
        let mut session = env.session();
        let p = session.new_object("Point").unwrap();
        session.set_field(p, "x", x).unwrap();
        session.set_field(p, "y", y).unwrap();
        session.store(p).unwrap()
    }

    #[test]
    fn point_slot_has_exact_layout() {
        let f = fixture();
        let class = point(&f.env);
        let id = store_point(&f.env, 1, 2);

        let mut expected = Vec::new();
        expected.extend_from_slice(&(-class.id.get()).to_be_bytes());
        expected.push(3);
        expected.extend_from_slice(&[0, 0, 0, 2]);
        expected.push(0b0000_0000);
        expected.extend_from_slice(&[0, 0, 0, 1]);
        expected.extend_from_slice(&[0, 0, 0, 2]);
        expected.resize(24, 0);
        assert_eq!(f.store.read(id).unwrap().unwrap(), expected);

        let mut session = f.env.session();
        let p = session.read(id).unwrap().unwrap();
        assert_eq!(session.field(p, "x"), Some(&Value::Int(1)));
        assert_eq!(session.field(p, "y"), Some(&Value::Int(2)));
    }

    #[test]
    fn node_chain_reads_back() {
        let f = fixture();
        node(&f.env);
        let mut session = f.env.session();
        let n1 = session.new_object("Node").unwrap();
        let n2 = session.new_object("Node").unwrap();
        session.set_field(n1, "value", 1).unwrap();
        session.set_field(n1, "next", n2).unwrap();
        session.set_field(n2, "value", 2).unwrap();
        let id = session.store(n1).unwrap();
        assert!(session.id_of(n2).is_some());

        let mut fresh = f.env.session();
        let r1 = fresh.read(id).unwrap().unwrap();
        let r2 = fresh.field(r1, "next").and_then(Value::as_instance).unwrap();
        assert_eq!(fresh.field(r2, "value"), Some(&Value::Int(2)));
        assert_eq!(fresh.field(r2, "next"), Some(&Value::Null));
    }

    #[test]
    fn cycles_share_identity() {
        let f = fixture();
        node(&f.env);
        let mut session = f.env.session();
        let a = session.new_object("Node").unwrap();
        let b = session.new_object("Node").unwrap();
        session.set_field(a, "next", b).unwrap();
        session.set_field(b, "next", a).unwrap();
        let id_a = session.store(a).unwrap();
        let id_b = session.id_of(b).unwrap();
        assert_ne!(id_a, id_b);

        let mut fresh = f.env.session();
        let ra = fresh.read(id_a).unwrap().unwrap();
        let rb = fresh.field(ra, "next").and_then(Value::as_instance).unwrap();
        assert_eq!(fresh.field(rb, "next"), Some(&Value::Ref(ra)));
        assert_eq!(fresh.identity().len(), 2);
    }

    #[test]
    fn reading_twice_returns_the_same_instance() {
        let f = fixture();
        point(&f.env);
        let id = store_point(&f.env, 3, 4);
        let mut session = f.env.session();
        let first = session.read(id).unwrap().unwrap();
        let second = session.read(id).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(session.graph().len(), 1);
    }

    #[test]
    fn unknown_class_reads_as_absent() {
        let f = fixture();
        let class = point(&f.env);
        let id = store_point(&f.env, 1, 2);
        assert!(f.schema.remove(class.id));
        let mut session = f.env.session();
        assert_eq!(session.read(id).unwrap(), None);
        assert_eq!(session.read(ObjectId::new(999)).unwrap(), None);
        assert_eq!(session.read(ObjectId::NULL).unwrap(), None);
    }

    #[test]
    fn older_formats_stay_readable() {
        let f = fixture();
        let class = point(&f.env);
        for format in [SlotFormat::V0, SlotFormat::V2, SlotFormat::Current] {
            let mut session = f.env.session();
            let p = session.new_object("Point").unwrap();
            session.set_field(p, "x", 10).unwrap();
            session.set_field(p, "y", 20).unwrap();
            let id = session.store_in_format(p, format).unwrap();

            let bytes = f.store.read(id).unwrap().unwrap();
            let raw = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            assert_eq!(raw < 0, format.is_version_aware());
            assert_eq!(raw.abs(), class.id.get());

            let mut fresh = f.env.session();
            let r = fresh.read(id).unwrap().unwrap();
            assert_eq!(fresh.field(r, "x"), Some(&Value::Int(10)), "{format:?}");
        }
    }

    #[test]
    fn rewriting_upgrades_to_the_current_format() {
        let f = fixture();
        f.env
            .register_class(ClassDescriptor::new(
                ClassId::NULL,
                "Tagged",
                vec![FieldDescriptor::field("name", STRING)],
            ))
            .unwrap();
        let mut session = f.env.session();
        let t = session.new_object("Tagged").unwrap();
        session.set_field(t, "name", "old").unwrap();
        let id = session.store_in_format(t, SlotFormat::V2).unwrap();
        assert_eq!(f.store.read(id).unwrap().unwrap()[4], 2);

        let mut fresh = f.env.session();
        let r = fresh.read(id).unwrap().unwrap();
        assert_eq!(fresh.field(r, "name"), Some(&Value::from("old")));
        fresh.set_field(r, "name", "new").unwrap();
        fresh.store(r).unwrap();
        assert_eq!(f.store.read(id).unwrap().unwrap()[4], 3);
        assert_eq!(
            f.env.session().read_field_value(id, "name").unwrap(),
            Some(Value::from("new"))
        );
    }

    #[test]
    fn every_variable_length_payload_is_indirected() {
        let f = fixture();
        let class = f
            .env
            .register_class(ClassDescriptor::new(
                ClassId::NULL,
                "Doc",
                vec![
                    FieldDescriptor::field("title", STRING),
                    FieldDescriptor::field("size", INT),
                    FieldDescriptor::field("tags", STRING_LIST),
                ],
            ))
            .unwrap();
        let mut session = f.env.session();
        let values = vec![
            Value::from("t"),
            Value::Int(5),
            Value::List(vec![Value::from("a"), Value::from("bc")]),
        ];
        let id = f.env.store.reserve_id().unwrap();
        let mut ctx = MarshallingContext::new(&mut session, id, class, SlotFormat::Current, true, 0);
        ctx.write_fields(&values).unwrap();
        let encoded = ctx.finish().unwrap();

        // title, tags, and one per list element
        assert_eq!(encoded.pointers.len(), 4);
        let payload_len = encoded.bytes.len() - encoded.payload_start;
        for pointer in &encoded.pointers {
            assert!(pointer.child_start + pointer.length as usize <= payload_len);
            assert!(pointer.child_start > pointer.at);
        }
    }

    #[test]
    fn absent_list_elements_use_the_sentinel() {
        let f = fixture();
        f.env
            .register_class(ClassDescriptor::new(
                ClassId::NULL,
                "Labels",
                vec![FieldDescriptor::field("items", STRING_LIST)],
            ))
            .unwrap();
        let list = Value::List(vec![Value::from("a"), Value::Null, Value::from("c")]);
        let mut session = f.env.session();
        let l = session.new_object("Labels").unwrap();
        session.set_field(l, "items", list.clone()).unwrap();
        let id = session.store(l).unwrap();

        let mut fresh = f.env.session();
        let r = fresh.read(id).unwrap().unwrap();
        assert_eq!(fresh.field(r, "items"), Some(&list));
    }

    #[test]
    fn shallow_reads_leave_references_inactive() {
        let f = fixture();
        node(&f.env);
        let mut session = f.env.session();
        let n1 = session.new_object("Node").unwrap();
        let n2 = session.new_object("Node").unwrap();
        let n3 = session.new_object("Node").unwrap();
        session.set_field(n1, "next", n2).unwrap();
        session.set_field(n2, "value", 2).unwrap();
        session.set_field(n2, "next", n3).unwrap();
        session.set_field(n3, "value", 3).unwrap();
        let id = session.store(n1).unwrap();

        let mut fresh = f.env.session();
        let r1 = fresh.read_with_depth(id, ActivationDepth::Bounded(1)).unwrap().unwrap();
        let r2 = fresh.field(r1, "next").and_then(Value::as_instance).unwrap();
        assert!(!fresh.instance(r2).unwrap().is_active());
        assert_eq!(fresh.field(r2, "value"), Some(&Value::Null));

        fresh.activate(r1, 3).unwrap();
        assert!(fresh.instance(r2).unwrap().is_active());
        assert_eq!(fresh.field(r2, "value"), Some(&Value::Int(2)));
        let r3 = fresh.field(r2, "next").and_then(Value::as_instance).unwrap();
        assert_eq!(fresh.field(r3, "value"), Some(&Value::Int(3)));
    }

    #[test]
    fn per_class_depth_overrides_the_default() {
        let f = fixture();
        let class = node(&f.env);
        let mut session = f.env.session();
        let n1 = session.new_object("Node").unwrap();
        let n2 = session.new_object("Node").unwrap();
        session.set_field(n1, "next", n2).unwrap();
        session.set_field(n2, "value", 9).unwrap();
        let id = session.store(n1).unwrap();

        f.schema.set_activation_depth(class.id, 1);
        let mut fresh = f.env.session();
        let r1 = fresh.read(id).unwrap().unwrap();
        let r2 = fresh.field(r1, "next").and_then(Value::as_instance).unwrap();
        assert!(!fresh.instance(r2).unwrap().is_active());
    }

    #[test]
    fn prefetch_uses_its_own_depth() {
        let f = fixture();
        node(&f.env);
        let mut session = f.env.session();
        let n1 = session.new_object("Node").unwrap();
        let n2 = session.new_object("Node").unwrap();
        session.set_field(n1, "value", 1).unwrap();
        session.set_field(n1, "next", n2).unwrap();
        session.set_field(n2, "value", 2).unwrap();
        let id = session.store(n1).unwrap();

        let mut fresh = f.env.session();
        let r1 = fresh.read_prefetch(id).unwrap().unwrap();
        assert_eq!(fresh.field(r1, "value"), Some(&Value::Int(1)));
        let r2 = fresh.field(r1, "next").and_then(Value::as_instance).unwrap();
        assert!(!fresh.instance(r2).unwrap().is_active());
    }

    #[test]
    fn peek_leaves_the_identity_map_alone() {
        let f = fixture();
        node(&f.env);
        let mut session = f.env.session();
        let n1 = session.new_object("Node").unwrap();
        let n2 = session.new_object("Node").unwrap();
        session.set_field(n1, "value", 1).unwrap();
        session.set_field(n1, "next", n2).unwrap();
        let id = session.store(n1).unwrap();

        let mut fresh = f.env.session();
        let detached = fresh.peek(id, ActivationDepth::Unknown).unwrap().unwrap();
        assert_eq!(detached.root().unwrap().fields[0], Value::Int(1));
        assert_eq!(detached.graph.len(), 2);
        assert!(fresh.identity().is_empty());
        assert!(fresh.graph().is_empty());
        assert!(fresh.peek(ObjectId::new(999), ActivationDepth::Unknown).unwrap().is_none());
    }

    #[test]
    fn version_field_is_stamped_on_every_write() {
        let f = fixture();
        f.env
            .register_class(ClassDescriptor::new(
                ClassId::NULL,
                "Versioned",
                vec![
                    FieldDescriptor::field("n", INT),
                    FieldDescriptor::virtual_field(VERSION_FIELD, LONG),
                    FieldDescriptor::virtual_field(UUID_FIELD, LONG),
                ],
            ))
            .unwrap();
        let mut session = f.env.session();
        let v = session.new_object("Versioned").unwrap();
        let id = session.store(v).unwrap();
        let first = session.field(v, VERSION_FIELD).and_then(Value::as_long).unwrap();
        let uuid = session.field(v, UUID_FIELD).cloned().unwrap();
        assert!(!uuid.is_null());

        session.set_field(v, "n", 1).unwrap();
        session.store(v).unwrap();
        let second = session.field(v, VERSION_FIELD).and_then(Value::as_long).unwrap();
        assert!(second > first);
        assert_eq!(session.field(v, UUID_FIELD), Some(&uuid));
        assert_eq!(
            f.env.session().read_field_value(id, VERSION_FIELD).unwrap(),
            Some(Value::Long(second))
        );
    }

    #[test]
    fn index_entries_follow_updates_and_deletes() {
        let f = fixture();
        let class = f
            .env
            .register_class(
                ClassDescriptor::new(
                    ClassId::NULL,
                    "Person",
                    vec![FieldDescriptor::field("name", STRING).indexed(IndexId::new(7))],
                )
                .with_index(IndexId::new(1)),
            )
            .unwrap();
        let by_name = IndexId::new(7);
        let mut session = f.env.session();
        let p = session.new_object("Person").unwrap();
        session.set_field(p, "name", "ann").unwrap();
        let id = session.store(p).unwrap();
        assert_eq!(f.index.lookup(by_name, &Value::from("ann")), vec![id]);
        assert_eq!(f.index.len(IndexId::new(1)), 1);

        session.set_field(p, "name", "bob").unwrap();
        session.store(p).unwrap();
        assert!(f.index.lookup(by_name, &Value::from("ann")).is_empty());
        assert_eq!(f.index.lookup(by_name, &Value::from("bob")), vec![id]);

        assert!(session.delete(id).unwrap());
        assert!(f.index.lookup(by_name, &Value::from("bob")).is_empty());
        assert_eq!(f.index.len(class.index.unwrap()), 0);
        assert_eq!(session.id_of(p), None);
        assert!(!session.delete(id).unwrap());
    }

    #[test]
    fn queries_collect_ids_without_activation() {
        let f = fixture();
        node(&f.env);
        let mut session = f.env.session();
        let n1 = session.new_object("Node").unwrap();
        let n2 = session.new_object("Node").unwrap();
        session.set_field(n1, "value", 1).unwrap();
        session.set_field(n1, "next", n2).unwrap();
        let id1 = session.store(n1).unwrap();
        let id2 = session.id_of(n2).unwrap();

        let fresh = f.env.session();
        assert_eq!(
            fresh.query_field(id1, "next").unwrap(),
            Some(vec![Candidate::Id(id2)])
        );
        assert_eq!(
            fresh.query_field(id1, "value").unwrap(),
            Some(vec![Candidate::Value(Value::Int(1))])
        );
        assert_eq!(fresh.query_field(id2, "next").unwrap(), Some(vec![]));
        assert_eq!(fresh.collect_ids(&[id1, id2], "next").unwrap(), vec![id2]);
        assert!(fresh.graph().is_empty());
        assert!(matches!(
            fresh.query_field(id1, "missing"),
            Err(MarshalError::UnknownField { .. })
        ));
    }

    #[test]
    fn corrupt_version_byte_is_reported() {
        let f = fixture();
        point(&f.env);
        let id = store_point(&f.env, 1, 2);
        assert!(f.store.corrupt(id, 4, &[9]));
        let mut session = f.env.session();
        assert!(matches!(
            session.read(id),
            Err(MarshalError::Format(FormatError::CorruptFormat { version: 9, .. }))
        ));
    }

    #[test]
    fn fields_added_later_read_as_absent() {
        let f = fixture();
        point(&f.env);
        let id = store_point(&f.env, 1, 2);
        f.env
            .register_class(ClassDescriptor::new(
                ClassId::NULL,
                "Point",
                vec![
                    FieldDescriptor::field("x", INT),
                    FieldDescriptor::field("y", INT),
                    FieldDescriptor::field("z", INT),
                ],
            ))
            .unwrap();

        let mut session = f.env.session();
        let p = session.read(id).unwrap().unwrap();
        assert_eq!(session.field(p, "y"), Some(&Value::Int(2)));
        assert_eq!(session.field(p, "z"), Some(&Value::Null));
        assert_eq!(session.read_field_value(id, "z").unwrap(), Some(Value::Null));
    }

    #[test]
    fn update_depth_zero_keeps_stored_references() {
        let f = fixture();
        node(&f.env);
        let config = MarshalConfig {
            update_depth: 0,
            ..MarshalConfig::default()
        };
        let env = MarshalEnv::new(f.store.clone(), f.schema.clone()).with_config(config);
        let mut session = env.session();
        let n1 = session.new_object("Node").unwrap();
        let n2 = session.new_object("Node").unwrap();
        session.set_field(n1, "next", n2).unwrap();
        session.set_field(n2, "value", 1).unwrap();
        session.store(n1).unwrap();
        let id2 = session.id_of(n2).unwrap();

        session.set_field(n2, "value", 2).unwrap();
        session.store(n1).unwrap();
        assert_eq!(
            env.session().read_field_value(id2, "value").unwrap(),
            Some(Value::Int(1))
        );
    }

    #[test]
    fn inactive_references_are_not_rewritten() {
        let f = fixture();
        node(&f.env);
        let mut session = f.env.session();
        let n1 = session.new_object("Node").unwrap();
        let n2 = session.new_object("Node").unwrap();
        let n3 = session.new_object("Node").unwrap();
        session.set_field(n1, "value", 1).unwrap();
        session.set_field(n1, "next", n2).unwrap();
        session.set_field(n2, "value", 2).unwrap();
        session.set_field(n2, "next", n3).unwrap();
        session.set_field(n3, "value", 3).unwrap();
        let id1 = session.store(n1).unwrap();
        let id2 = session.id_of(n2).unwrap();
        let id3 = session.id_of(n3).unwrap();
        let stored_n2 = f.store.read(id2).unwrap().unwrap();

        let mut fresh = f.env.session();
        let r1 = fresh.read_with_depth(id1, ActivationDepth::Bounded(1)).unwrap().unwrap();
        let r2 = fresh.field(r1, "next").and_then(Value::as_instance).unwrap();
        assert!(!fresh.instance(r2).unwrap().is_active());
        fresh.set_field(r1, "value", 10).unwrap();
        assert_eq!(fresh.store(r1).unwrap(), id1);
        assert_eq!(fresh.store(r2).unwrap(), id2);

        assert_eq!(f.store.read(id2).unwrap().unwrap(), stored_n2);
        let mut check = f.env.session();
        assert_eq!(check.read_field_value(id1, "value").unwrap(), Some(Value::Int(10)));
        assert_eq!(check.read_field_value(id2, "value").unwrap(), Some(Value::Int(2)));
        assert_eq!(
            check.query_field(id2, "next").unwrap(),
            Some(vec![Candidate::Id(id3)])
        );
    }

    #[test]
    fn failed_update_keeps_index_entries() {
        let f = fixture();
        f.env
            .register_class(ClassDescriptor::new(
                ClassId::NULL,
                "Person",
                vec![
                    FieldDescriptor::field("name", STRING).indexed(IndexId::new(7)),
                    FieldDescriptor::field("age", INT),
                ],
            ))
            .unwrap();
        let by_name = IndexId::new(7);
        let mut session = f.env.session();
        let p = session.new_object("Person").unwrap();
        session.set_field(p, "name", "ann").unwrap();
        let id = session.store(p).unwrap();

        session.set_field(p, "name", "bob").unwrap();
        session.set_field(p, "age", "not an int").unwrap();
        assert!(matches!(
            session.store(p),
            Err(MarshalError::TypeMismatch { .. })
        ));

        assert_eq!(
            f.env.session().read_field_value(id, "name").unwrap(),
            Some(Value::from("ann"))
        );
        assert_eq!(f.index.lookup(by_name, &Value::from("ann")), vec![id]);
        assert!(f.index.lookup(by_name, &Value::from("bob")).is_empty());
    }

    #[test]
    fn reference_to_unknown_class_reads_as_absent() {
        let f = fixture();
        let target = point(&f.env);
        f.env
            .register_class(ClassDescriptor::new(
                ClassId::NULL,
                "Owner",
                vec![
                    FieldDescriptor::field("label", STRING),
                    FieldDescriptor::field("target", REFERENCE),
                    FieldDescriptor::field("count", INT),
                ],
            ))
            .unwrap();
        let mut session = f.env.session();
        let p = session.new_object("Point").unwrap();
        session.set_field(p, "x", 1).unwrap();
        let owner = session.new_object("Owner").unwrap();
        session.set_field(owner, "label", "o").unwrap();
        session.set_field(owner, "target", p).unwrap();
        session.set_field(owner, "count", 4).unwrap();
        let id = session.store(owner).unwrap();

        assert!(f.schema.remove(target.id));
        let mut fresh = f.env.session();
        let r = fresh.read(id).unwrap().unwrap();
        assert_eq!(fresh.field(r, "target"), Some(&Value::Null));
        assert_eq!(fresh.field(r, "label"), Some(&Value::from("o")));
        assert_eq!(fresh.field(r, "count"), Some(&Value::Int(4)));
        assert_eq!(fresh.identity().len(), 1);
    }

    #[test]
    fn unknown_names_are_errors() {
        let f = fixture();
        point(&f.env);
        let mut session = f.env.session();
        assert!(matches!(
            session.new_object("Nope"),
            Err(MarshalError::UnknownClassName(_))
        ));
        let p = session.new_object("Point").unwrap();
        assert!(matches!(
            session.set_field(p, "w", 1),
            Err(MarshalError::UnknownField { .. })
        ));
    }
}
