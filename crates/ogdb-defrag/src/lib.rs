//! Defragmentation for the object-graph database.
//!
//! Rewrites every schema slot and object slot of a source store into a
//! target store while remapping the ids inside them: class ids, referenced
//! object ids and secondary-index root ids. The walk is byte-wise. Names
//! and attribute bytes are copied without being interpreted; each field's
//! payload is walked by the field's own handler.
//!
//! A source slot whose recorded field count exceeds the live schema (an
//! un-evolved format) aborts the pass.

pub mod config;
pub mod defragmenter;
pub mod error;
pub mod mapping;

pub use config::{DefragConfig, IndexRemap};
pub use defragmenter::{DefragReport, Defragmenter};
pub use error::{DefragError, DefragResult};
pub use mapping::IdMapping;
