//! Slot storage boundary for the object-graph database.
//!
//! The marshalling core never touches files. It hands finished byte slots to
//! a [`SlotStore`] and asks it for the bytes of an id when reading. This crate
//! defines that boundary and ships a `HashMap`-backed implementation used by
//! tests, tooling and embedding.
//!
//! # Design Rules
//!
//! 1. Ids are reserved before the slot bytes exist, so a writer can hand out
//!    an object's id before its fields are encoded.
//! 2. An allocated slot's length is exactly the length that was requested.
//! 3. A write must match the slot most recently allocated for its id.
//! 4. The store never interprets slot contents.

pub mod error;
pub mod memory;
pub mod slot;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemorySlotStore;
pub use slot::{block_aligned, Slot};
pub use traits::SlotStore;
