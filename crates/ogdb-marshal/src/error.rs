use ogdb_format::FormatError;
use ogdb_store::StoreError;
use ogdb_types::{ClassId, HandlerId};

use crate::graph::InstanceRef;

/// Errors from marshalling, unmarshalling and schema operations.
///
/// An unknown class or a missing slot on the read side is not an error:
/// reads return `Ok(None)` or an absent value for those.
#[derive(Debug, thiserror::Error)]
pub enum MarshalError {
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A field references a handler id that is not registered.
    #[error("no handler registered for {0}")]
    UnknownHandler(HandlerId),

    /// A virtual field name has no handler bound to it.
    #[error("no handler for virtual field {0:?}")]
    UnknownVirtualField(String),

    /// A handler was handed a value it cannot encode.
    #[error("handler {handler} cannot encode a {found} value")]
    TypeMismatch {
        handler: &'static str,
        found: &'static str,
    },

    /// A handler found bytes it cannot decode.
    #[error("corrupt {handler} payload: {detail}")]
    CorruptPayload {
        handler: &'static str,
        detail: String,
    },

    /// An engine defect: unpatched pointer, tracker miss, and the like.
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),

    /// Write side only: an instance names a class the registry does not know.
    #[error("unknown class {0}")]
    UnknownClass(ClassId),

    #[error("unknown class {0:?}")]
    UnknownClassName(String),

    #[error("class {class:?} has no field {field:?}")]
    UnknownField { class: String, field: String },

    #[error("instance {0} does not belong to this session")]
    UnknownInstance(InstanceRef),

    /// A re-registered class does not extend the persisted one.
    #[error("class {class:?} cannot evolve: {detail}")]
    IncompatibleSchema { class: String, detail: String },

    /// A translator or type-handler aspect has no resolvable handler.
    #[error("cannot resolve handler of aspect {aspect:?} in class {class:?}")]
    UnresolvedAspect { class: String, aspect: String },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for marshalling operations.
pub type MarshalResult<T> = Result<T, MarshalError>;
