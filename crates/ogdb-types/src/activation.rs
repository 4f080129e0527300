use serde::{Deserialize, Serialize};

/// Bound on how many reference hops a read eagerly materializes.
///
/// A depth of `1` activates the object itself; its references come back as
/// bare, unactivated instances. `0` activates nothing. `Unknown` is resolved
/// to a per-class default before any field is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActivationDepth {
    #[default]
    Unknown,
    Bounded(u32),
}

impl ActivationDepth {
    /// Returns `true` if fields should be read at this depth.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Bounded(n) if n > 0)
    }

    /// The depth handed to objects referenced from an object read at `self`.
    pub fn descend(self) -> Self {
        match self {
            Self::Unknown => Self::Unknown,
            Self::Bounded(n) => Self::Bounded(n.saturating_sub(1)),
        }
    }

    /// Replace `Unknown` with `default`.
    pub fn or_default(self, default: u32) -> Self {
        match self {
            Self::Unknown => Self::Bounded(default),
            bounded => bounded,
        }
    }

    /// Returns `true` if the depth has not been resolved yet.
    pub fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<u32> for ActivationDepth {
    fn from(depth: u32) -> Self {
        Self::Bounded(depth)
    }
}
