//! Object marshalling for the object-graph database.
//!
//! Turns live object graphs into self-describing byte slots and back. A
//! [`MarshalEnv`] bundles the collaborators (slot store, schema registry,
//! handler registry, field index, configuration); a [`Session`] is one unit
//! of work against it and owns the identity map that keeps an object unique
//! while the session lives.
//!
//! # Architecture
//!
//! - [`MarshallingContext`]: writes one object slot; variable-length
//!   payloads go into a [`BufferTree`] that is merged behind the header
//! - [`UnmarshallingContext`]: reads one slot and activates the instance to
//!   a bounded [`ActivationDepth`](ogdb_types::ActivationDepth)
//! - [`QueryingReadContext`]: reads single fields as ids or values without
//!   materializing anything
//! - [`TypeHandler`]: codec of one field type, looked up by a stable id
//!
//! # Design Rules
//!
//! 1. An object's id is bound before its fields are written or read, so
//!    reference cycles terminate.
//! 2. The marshalled length of a slot is known before the bytes are merged,
//!    and the merged slot must match it.
//! 3. Every historical slot format stays readable. Writes use the current
//!    format unless told otherwise.
//! 4. A missing slot or unknown class reads as absent, never as an error.

pub mod buffer_tree;
pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod graph;
pub mod handlers;
pub mod identity;
pub mod index;
pub mod query;
pub mod registry;
pub mod session;
pub mod tracker;
pub mod unmarshal;
pub mod value;
pub mod write_context;

pub use buffer_tree::{BufferTree, ChunkId, MergedPayload, PatchedPointer};
pub use config::MarshalConfig;
pub use context::{ReadContext, WriteContext};
pub use env::MarshalEnv;
pub use error::{MarshalError, MarshalResult};
pub use graph::{DetachedGraph, Instance, InstanceRef, InstanceState, ObjectGraph};
pub use handlers::{HandlerRegistry, IdRead, TypeHandler};
pub use identity::IdentityMap;
pub use index::{FieldIndex, InMemoryFieldIndex};
pub use query::{Candidate, QueryingReadContext};
pub use registry::{InMemorySchemaRegistry, SchemaRegistry};
pub use session::Session;
pub use tracker::IdentityTracker;
pub use unmarshal::{ReadMode, UnmarshallingContext};
pub use value::Value;
pub use write_context::{EncodedSlot, MarshallingContext};
