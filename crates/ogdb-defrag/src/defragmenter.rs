use std::collections::HashSet;
use std::sync::Arc;

use ogdb_format::{
    ClassDescriptor, DefragBuffer, FieldLayout, FormatError, IdRemap, ObjectHeader, ReadBuffer,
};
use ogdb_marshal::MarshalEnv;
use ogdb_store::SlotStore;
use ogdb_types::{ClassId, ObjectId};
use tracing::{debug, info};

use crate::config::DefragConfig;
use crate::error::DefragResult;
use crate::mapping::{IdMapping, Remapper};

/// Counts gathered by one defragmentation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DefragReport {
    pub schemas: usize,
    pub objects: usize,
    /// Object slots whose class is not registered. They are not copied.
    pub skipped_unknown_class: usize,
    /// References rewritten as null because their target was not copied.
    pub dangling_references: usize,
    /// Bytes allocated in the target.
    pub bytes: usize,
}

struct PendingObject {
    source: ObjectId,
    target: ObjectId,
    bytes: Vec<u8>,
    header: ObjectHeader,
    class: Arc<ClassDescriptor>,
}

/// Copies every slot of an environment's store into a fresh target store.
///
/// Ids are reassigned by the target store. Slot bytes are copied verbatim
/// except for the ids inside them; nothing changes length, so every
/// indirection pointer stays valid.
pub struct Defragmenter<'e> {
    env: &'e MarshalEnv,
    config: DefragConfig,
}

impl<'e> Defragmenter<'e> {
    pub fn new(env: &'e MarshalEnv, config: DefragConfig) -> Self {
        Self { env, config }
    }

    /// Run the pass. Returns the report and the id tables that were used.
    ///
    /// The first sweep reserves a target id for every schema slot and every
    /// object slot with a known class. The second rewrites and writes them,
    /// schemas first.
    pub fn run(&self, target: &dyn SlotStore) -> DefragResult<(DefragReport, IdMapping)> {
        let source = self.env.store.as_ref();
        let schema_ids: HashSet<ObjectId> = self
            .env
            .schema
            .class_ids()
            .into_iter()
            .map(ObjectId::from)
            .collect();

        let mut report = DefragReport::default();
        let mut mapping = IdMapping::new();
        mapping.indexes = self.config.index_table();
        let mut schemas = Vec::new();
        let mut objects = Vec::new();

        for id in source.ids()? {
            let Some(bytes) = source.read(id)? else {
                continue;
            };
            if schema_ids.contains(&id) {
                let new = target.reserve_id()?;
                mapping.insert_class(ClassId::from(id), ClassId::from(new));
                schemas.push((id, new, bytes));
                continue;
            }
            let header = ObjectHeader::read(&mut ReadBuffer::new(bytes.clone()))?;
            let Some(class) = self.env.schema.class_for_id(header.class_id) else {
                debug!(%id, class = %header.class_id, "unknown class, slot not copied");
                report.skipped_unknown_class += 1;
                continue;
            };
            let new = target.reserve_id()?;
            mapping.insert_object(id, new);
            objects.push(PendingObject {
                source: id,
                target: new,
                bytes,
                header,
                class,
            });
        }

        let remap = Remapper::new(&mapping, self.config.keep_dangling);
        let codec = self.env.schema_codec();
        for (id, new, bytes) in schemas {
            let Some(class) = self.env.schema.class_for_id(ClassId::from(id)) else {
                continue;
            };
            let mut buf = DefragBuffer::new(bytes);
            codec.defrag(&mut buf, &class, &remap)?;
            report.bytes += write_slot(target, new, buf.into_target())?;
            report.schemas += 1;
        }
        for object in objects {
            let bytes = self.copy_object(object.bytes, &object.header, &object.class, &remap)?;
            report.bytes += write_slot(target, object.target, bytes)?;
            report.objects += 1;
            debug!(from = %object.source, to = %object.target, class = %object.class.name, "object slot copied");
        }
        report.dangling_references = remap.dangling();
        drop(remap);

        info!(
            schemas = report.schemas,
            objects = report.objects,
            skipped = report.skipped_unknown_class,
            dangling = report.dangling_references,
            bytes = report.bytes,
            "defragmentation finished"
        );
        Ok((report, mapping))
    }

    /// Rewrite one object slot: header class id, then each present field
    /// through its handler, following indirection pointers.
    fn copy_object(
        &self,
        bytes: Vec<u8>,
        header: &ObjectHeader,
        class: &ClassDescriptor,
        remap: &dyn IdRemap,
    ) -> DefragResult<Vec<u8>> {
        let recorded = header.field_count();
        if recorded > class.field_count() {
            return Err(FormatError::AspectCountMismatch {
                class: class.id,
                recorded,
                live: class.field_count(),
            }
            .into());
        }
        let format = header.format;
        let mut buf = DefragBuffer::new(bytes);
        buf.copy_header_class_id(remap)?;
        buf.seek(header.payload_start);
        buf.set_layout(format, header.payload_start);

        for (i, field) in class.fields.iter().enumerate().take(recorded) {
            if header.is_null(i) {
                continue;
            }
            let handler = self.env.handlers.for_field(field)?;
            if handler.is_value_type() || !format.is_indirected_within_slot(handler) {
                handler.defrag(&mut buf, remap)?;
                continue;
            }
            let offset = buf.read_i32()?;
            let length = buf.read_i32()?;
            if offset == 0 && length == 0 {
                continue;
            }
            let resume = buf.offset();
            buf.seek(format.decode_child_offset(header.payload_start, offset)?);
            handler.defrag(&mut buf, remap)?;
            buf.seek(resume);
        }
        Ok(buf.into_target())
    }
}

fn write_slot(target: &dyn SlotStore, id: ObjectId, mut bytes: Vec<u8>) -> DefragResult<usize> {
    let slot = target.allocate_new(id, target.block_aligned(bytes.len()))?;
    bytes.resize(slot.length, 0);
    target.write(id, slot, &bytes)?;
    Ok(slot.length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DefragError;
    use ogdb_format::FieldDescriptor;
    use ogdb_marshal::handlers::{INT, REFERENCE, STRING, STRING_LIST};
    use ogdb_marshal::{HandlerRegistry, InMemorySchemaRegistry, SchemaRegistry, Value};
    use ogdb_store::InMemorySlotStore;
    use ogdb_types::IndexId;

    fn source_env() -> MarshalEnv {
        let env = MarshalEnv::in_memory();
        env.register_class(ClassDescriptor::new(
            ClassId::NULL,
            "Node",
            vec![
                FieldDescriptor::field("value", INT),
                FieldDescriptor::field("label", STRING),
                FieldDescriptor::field("tags", STRING_LIST),
                FieldDescriptor::field("next", REFERENCE),
            ],
        ))
        .unwrap();
        env
    }

    /// Store `N1 -> N2` and return both ids.
    fn store_chain(env: &MarshalEnv) -> (ObjectId, ObjectId) {
        let mut session = env.session();
        let n1 = session.new_object("Node").unwrap();
        let n2 = session.new_object("Node").unwrap();
        session.set_field(n1, "value", 1).unwrap();
        session.set_field(n1, "label", "first").unwrap();
        session
            .set_field(n1, "tags", Value::List(vec![Value::from("a"), Value::Null]))
            .unwrap();
        session.set_field(n1, "next", n2).unwrap();
        session.set_field(n2, "value", 2).unwrap();
        let id1 = session.store(n1).unwrap();
        (id1, session.id_of(n2).unwrap())
    }

    /// A target store whose ids do not line up with the source's.
    fn shifted_target() -> Arc<InMemorySlotStore> {
        let target = Arc::new(InMemorySlotStore::new());
        for _ in 0..5 {
            target.reserve_id().unwrap();
        }
        target
    }

    fn open_target(store: Arc<InMemorySlotStore>, mapping: &IdMapping) -> MarshalEnv {
        let schema = Arc::new(InMemorySchemaRegistry::new());
        let handlers = HandlerRegistry::with_builtins();
        let classes: Vec<ClassId> = mapping.classes.values().copied().collect();
        schema
            .load(store.as_ref(), &classes, Default::default(), &handlers, &handlers)
            .unwrap();
        MarshalEnv::new(store, schema)
    }

    #[test]
    fn copied_graph_reads_back_under_new_ids() {
        let env = source_env();
        let (id1, id2) = store_chain(&env);
        let target = shifted_target();

        let (report, mapping) = Defragmenter::new(&env, DefragConfig::default())
            .run(target.as_ref())
            .unwrap();
        assert_eq!(report.schemas, 1);
        assert_eq!(report.objects, 2);
        assert_eq!(report.dangling_references, 0);
        assert_eq!(report.bytes, target.total_bytes());

        let new1 = mapping.object(id1).unwrap();
        let new2 = mapping.object(id2).unwrap();
        assert_ne!(new1, id1);

        let target_env = open_target(target, &mapping);
        let mut session = target_env.session();
        let r1 = session.read(new1).unwrap().unwrap();
        assert_eq!(session.field(r1, "label"), Some(&Value::from("first")));
        assert_eq!(
            session.field(r1, "tags"),
            Some(&Value::List(vec![Value::from("a"), Value::Null]))
        );
        let r2 = session.field(r1, "next").and_then(Value::as_instance).unwrap();
        assert_eq!(session.id_of(r2), Some(new2));
        assert_eq!(session.field(r2, "value"), Some(&Value::Int(2)));
    }

    #[test]
    fn dangling_references_fail_unless_kept() {
        let env = source_env();
        let (id1, id2) = store_chain(&env);
        assert!(env.store.free(id2).unwrap());

        let err = Defragmenter::new(&env, DefragConfig::default())
            .run(shifted_target().as_ref())
            .unwrap_err();
        assert!(matches!(
            err,
            DefragError::Format(FormatError::UnmappedId { kind: "object", .. })
        ));

        let target = shifted_target();
        let config = DefragConfig {
            keep_dangling: true,
            ..DefragConfig::default()
        };
        let (report, mapping) = Defragmenter::new(&env, config).run(target.as_ref()).unwrap();
        assert_eq!(report.dangling_references, 1);
        let target_env = open_target(target, &mapping);
        assert_eq!(
            target_env
                .session()
                .read_field_value(mapping.object(id1).unwrap(), "next")
                .unwrap(),
            Some(Value::Null)
        );
    }

    #[test]
    fn index_ids_are_remapped() {
        let env = MarshalEnv::in_memory();
        env.register_class(
            ClassDescriptor::new(
                ClassId::NULL,
                "Person",
                vec![FieldDescriptor::field("name", STRING).indexed(IndexId::new(7))],
            )
            .with_index(IndexId::new(3)),
        )
        .unwrap();
        let target = shifted_target();
        let config = DefragConfig::default().map_index(IndexId::new(7), IndexId::new(70));
        let (_, mapping) = Defragmenter::new(&env, config).run(target.as_ref()).unwrap();

        let target_env = open_target(target, &mapping);
        let id = target_env.schema.class_id_for_name("Person").unwrap();
        let class = target_env.schema.class_for_id(id).unwrap();
        assert_eq!(class.fields[0].index, Some(IndexId::new(70)));
        assert_eq!(class.index, Some(IndexId::new(3)));
    }

    #[test]
    fn objects_of_unknown_classes_are_skipped() {
        let schema = Arc::new(InMemorySchemaRegistry::new());
        let env = MarshalEnv::new(Arc::new(InMemorySlotStore::new()), schema.clone());
        let class = env
            .register_class(ClassDescriptor::new(
                ClassId::NULL,
                "Point",
                vec![FieldDescriptor::field("x", INT)],
            ))
            .unwrap();
        let mut session = env.session();
        let p = session.new_object("Point").unwrap();
        session.store(p).unwrap();
        schema.remove(class.id);

        let (report, _) = Defragmenter::new(&env, DefragConfig::default())
            .run(shifted_target().as_ref())
            .unwrap();
        assert_eq!(report.skipped_unknown_class, 1);
        assert_eq!(report.objects, 0);
        assert_eq!(report.schemas, 0);
    }

    #[test]
    fn unevolved_schema_is_fatal() {
        let env = source_env();
        store_chain(&env);
        let id = env.schema.class_id_for_name("Node").unwrap();
        let mut shrunk = (*env.schema.class_for_id(id).unwrap()).clone();
        shrunk.fields.truncate(2);
        env.schema.register(shrunk).unwrap();

        let err = Defragmenter::new(&env, DefragConfig::default())
            .run(shifted_target().as_ref())
            .unwrap_err();
        assert!(matches!(
            err,
            DefragError::Format(FormatError::AspectCountMismatch { recorded: 4, live: 2, .. })
        ));
    }
}
