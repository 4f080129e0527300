//! Foundation types for the object-graph database.
//!
//! Every other crate in the workspace depends on `ogdb-types`. The types here
//! carry no storage or codec logic; they only give the raw 32-bit ids that
//! appear in slots a distinct type each.
//!
//! # Key Types
//!
//! - [`ObjectId`]: persistent id of any stored slot (object or schema)
//! - [`ClassId`]: id of a class descriptor; equal to the id of its schema slot
//! - [`HandlerId`]: globally stable id of a field handler
//! - [`IndexId`]: root id of a secondary index
//! - [`ActivationDepth`]: bound on reference hops followed by a read

pub mod activation;
pub mod error;
pub mod ids;

pub use activation::ActivationDepth;
pub use error::TypeError;
pub use ids::{ClassId, HandlerId, IndexId, ObjectId};

/// Width in bytes of every persistent id as written into a slot.
pub const ID_LENGTH: usize = 4;
