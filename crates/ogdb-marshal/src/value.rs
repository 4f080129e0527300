use ogdb_types::ObjectId;

use crate::graph::InstanceRef;

/// A field value of a live instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Value {
    /// Absent. Top-level absent fields are recorded in the null bitmap.
    #[default]
    Null,
    Bool(bool),
    Byte(u8),
    Int(i32),
    Long(i64),
    Str(String),
    Bytes(Vec<u8>),
    IntArray(Vec<i32>),
    List(Vec<Value>),
    /// Reference to an instance in the same object graph.
    Ref(InstanceRef),
    /// Reference known only by persistent id. Produced by the query path,
    /// which never materializes referenced objects.
    Stub(ObjectId),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short variant name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Byte(_) => "byte",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::IntArray(_) => "int array",
            Self::List(_) => "list",
            Self::Ref(_) => "reference",
            Self::Stub(_) => "stub",
        }
    }

    pub fn as_instance(&self) -> Option<InstanceRef> {
        match self {
            Self::Ref(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<InstanceRef> for Value {
    fn from(r: InstanceRef) -> Self {
        Self::Ref(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(Value::from(3), Value::Int(3));
        assert_eq!(Value::from("a"), Value::Str("a".into()));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(7_i64)).as_long(), Some(7));
    }

    #[test]
    fn kind_names() {
        assert_eq!(Value::Null.kind(), "null");
        assert_eq!(Value::Stub(ObjectId::new(1)).kind(), "stub");
        assert!(Value::default().is_null());
    }
}
