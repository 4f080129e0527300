use crate::error::{MarshalError, MarshalResult};

/// Append-only visited list for small traversals.
///
/// Maps an identity to the offset it was registered at. Lookups are linear
/// scans; traversals that use this are small, and `T` needs no hashing.
#[derive(Clone, Debug)]
pub struct IdentityTracker<T> {
    entries: Vec<(T, usize)>,
}

impl<T> Default for IdentityTracker<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Copy + Eq + std::fmt::Debug> IdentityTracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: T, offset: usize) {
        self.entries.push((object, offset));
    }

    /// Offset `object` was registered at.
    pub fn get_offset(&self, object: &T) -> Option<usize> {
        self.entries
            .iter()
            .find(|(o, _)| o == object)
            .map(|(_, offset)| *offset)
    }

    /// Object registered at `offset`.
    pub fn get_object(&self, offset: usize) -> Option<T> {
        self.entries
            .iter()
            .find(|(_, at)| *at == offset)
            .map(|(o, _)| *o)
    }

    pub fn contains(&self, object: &T) -> bool {
        self.get_offset(object).is_some()
    }

    /// Swap the registration of `old` for `new`, keeping its offset.
    ///
    /// Scans from the most recent entry backward. A missing `old` is an
    /// engine defect.
    pub fn replace_object(&mut self, old: T, new: T) -> MarshalResult<()> {
        match self.entries.iter_mut().rev().find(|(o, _)| *o == old) {
            Some(entry) => {
                entry.0 = new;
                Ok(())
            }
            None => Err(MarshalError::InternalConsistency(format!(
                "identity tracker has no entry for {old:?}"
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
