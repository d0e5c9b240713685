//! Newtype wrappers for record identifiers.
//!
//! Records reference each other only through these ids; the store resolves
//! them. Numeric ids are allocated by the store, stage ids are the ordinals
//! declared in the stage graph.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Returns the raw id value.
            #[must_use]
            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// Ordinal of a stage in the stage graph. Lower ordinals come first.
    StageId(u32)
);

numeric_id!(
    /// Store-assigned id of an order.
    OrderId(u64)
);

numeric_id!(
    /// Store-assigned id of an attached artifact.
    ArtifactId(u64)
);

numeric_id!(
    /// Store-assigned id of a component.
    ComponentId(u64)
);

numeric_id!(
    /// Store-assigned id of a production task.
    TaskId(u64)
);

numeric_id!(
    /// Id of a shop-floor area.
    AreaId(u32)
);

/// A user identifier (the user's login).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Creates a new user id.
    pub fn new(login: impl Into<String>) -> Self {
        Self(login.into())
    }

    /// Returns the login as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A resolved user: the id plus a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// The login.
    pub id: UserId,
    /// The full display name.
    pub name: String,
}

impl UserRef {
    /// Creates a new user reference.
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
