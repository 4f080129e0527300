use std::fmt;

use ogdb_types::ClassId;

use crate::tracker::IdentityTracker;
use crate::value::Value;

/// Handle to an instance in an [`ObjectGraph`].
///
/// Instances refer to each other through handles, never through pointers,
/// so cyclic graphs need no shared ownership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceRef(usize);

impl InstanceRef {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether an instance's fields have been read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    /// Identity only; fields are still absent.
    Inactive,
    Active,
}

/// A live object: its class and one value per aspect, in schema order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instance {
    pub class: ClassId,
    pub fields: Vec<Value>,
    pub state: InstanceState,
}

impl Instance {
    /// An unactivated instance with every field absent.
    pub fn bare(class: ClassId, field_count: usize) -> Self {
        Self {
            class,
            fields: vec![Value::Null; field_count],
            state: InstanceState::Inactive,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == InstanceState::Active
    }
}

/// Arena of instances.
#[derive(Clone, Debug, Default)]
pub struct ObjectGraph {
    instances: Vec<Instance>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instance: Instance) -> InstanceRef {
        self.instances.push(instance);
        InstanceRef(self.instances.len() - 1)
    }

    pub fn get(&self, r: InstanceRef) -> Option<&Instance> {
        self.instances.get(r.0)
    }

    pub fn get_mut(&mut self, r: InstanceRef) -> Option<&mut Instance> {
        self.instances.get_mut(r.0)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Every instance reachable from `root` through references, in visit
    /// order. Each instance appears once, however many paths lead to it.
    pub fn reachable(&self, root: InstanceRef) -> Vec<InstanceRef> {
        let mut visited = IdentityTracker::new();
        let mut stack = vec![root];
        while let Some(next) = stack.pop() {
            if visited.contains(&next) {
                continue;
            }
            let Some(instance) = self.get(next) else {
                continue;
            };
            visited.add(next, visited.len());
            for value in instance.fields.iter().rev() {
                push_refs(value, &mut stack);
            }
        }
        (0..visited.len())
            .filter_map(|offset| visited.get_object(offset))
            .collect()
    }
}

fn push_refs(value: &Value, stack: &mut Vec<InstanceRef>) {
    match value {
        Value::Ref(r) => stack.push(*r),
        Value::List(items) => {
            for item in items.iter().rev() {
                push_refs(item, stack);
            }
        }
        _ => {}
    }
}

/// A graph materialized outside any session's identity map.
#[derive(Clone, Debug)]
pub struct DetachedGraph {
    pub graph: ObjectGraph,
    pub root: InstanceRef,
}

impl DetachedGraph {
    pub fn root(&self) -> Option<&Instance> {
        self.graph.get(self.root)
    }

    pub fn get(&self, r: InstanceRef) -> Option<&Instance> {
        self.graph.get(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(graph: &mut ObjectGraph) -> InstanceRef {
        graph.insert(Instance::bare(ClassId::new(1), 2))
    }

    #[test]
    fn reachable_visits_each_instance_once() {
        let mut graph = ObjectGraph::new();
        let a = node(&mut graph);
        let b = node(&mut graph);
        let c = node(&mut graph);
        graph.get_mut(a).unwrap().fields = vec![Value::Ref(b), Value::Ref(c)];
        graph.get_mut(b).unwrap().fields = vec![Value::Ref(a), Value::Ref(c)];
        assert_eq!(graph.reachable(a), vec![a, b, c]);
    }

    #[test]
    fn reachable_follows_lists() {
        let mut graph = ObjectGraph::new();
        let a = node(&mut graph);
        let b = node(&mut graph);
        graph.get_mut(a).unwrap().fields = vec![Value::List(vec![Value::Ref(b)]), Value::Null];
        assert_eq!(graph.reachable(a), vec![a, b]);
        assert_eq!(graph.reachable(b), vec![b]);
    }

    #[test]
    fn bare_instance_is_inactive() {
        let instance = Instance::bare(ClassId::new(4), 3);
        assert!(!instance.is_active());
        assert_eq!(instance.fields, vec![Value::Null; 3]);
    }
}
