use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! persistent_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            /// The null id. Represents "none".
            pub const NULL: Self = Self(0);

            /// Wrap a raw id as read from a slot.
            pub const fn new(raw: i32) -> Self {
                Self(raw)
            }

            /// The raw 32-bit value written into slots.
            pub const fn get(self) -> i32 {
                self.0
            }

            /// Returns `true` if this is the null id.
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }

            /// `None` for the null id, `Some(self)` otherwise.
            pub fn non_null(self) -> Option<Self> {
                if self.is_null() {
                    None
                } else {
                    Some(self)
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw: i64 = s
                    .trim()
                    .parse()
                    .map_err(|_| TypeError::InvalidId(s.to_string()))?;
                let raw = i32::try_from(raw).map_err(|_| TypeError::OutOfRange(raw))?;
                Ok(Self(raw))
            }
        }

        impl From<i32> for $name {
            fn from(raw: i32) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

persistent_id!(
    /// Persistent identifier of a stored slot.
    ///
    /// Ids are assigned by the slot store and stay stable for the lifetime of
    /// the slot. `0` means "no object" and is what an absent reference encodes to.
    ObjectId
);

persistent_id!(
    /// Identifier of a class descriptor.
    ///
    /// A class id is the object id of the slot holding the class's schema.
    ClassId
);

persistent_id!(
    /// Globally stable identifier of a field handler.
    HandlerId
);

persistent_id!(
    /// Root identifier of a secondary field index.
    IndexId
);

impl From<ClassId> for ObjectId {
    fn from(id: ClassId) -> Self {
        Self(id.0)
    }
}

impl From<ObjectId> for ClassId {
    fn from(id: ObjectId) -> Self {
        Self(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn null_is_zero() {
        assert!(ObjectId::NULL.is_null());
        assert_eq!(ObjectId::default(), ObjectId::NULL);
        assert_eq!(ClassId::NULL.get(), 0);
    }

    #[test]
    fn non_null_filters_zero() {
        assert_eq!(IndexId::new(0).non_null(), None);
        assert_eq!(IndexId::new(7).non_null(), Some(IndexId::new(7)));
    }

    #[test]
    fn class_id_is_slot_id() {
        let class = ClassId::new(12);
        let slot: ObjectId = class.into();
        assert_eq!(slot.get(), 12);
        assert_eq!(ClassId::from(slot), class);
    }

    #[test]
    fn debug_names_the_kind() {
        assert_eq!(format!("{:?}", HandlerId::new(3)), "HandlerId(3)");
        assert_eq!(format!("{}", HandlerId::new(3)), "3");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(
            "abc".parse::<ObjectId>().unwrap_err(),
            TypeError::InvalidId("abc".into())
        );
        assert_eq!(
            "4294967296".parse::<ObjectId>().unwrap_err(),
            TypeError::OutOfRange(4_294_967_296)
        );
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&ObjectId::new(42)).unwrap();
        assert_eq!(json, "42");
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ObjectId::new(42));
    }

    proptest! {
        #[test]
        fn display_parse_roundtrip(raw in any::<i32>()) {
            let id = ObjectId::new(raw);
            prop_assert_eq!(id.to_string().parse::<ObjectId>().unwrap(), id);
        }
    }
}
