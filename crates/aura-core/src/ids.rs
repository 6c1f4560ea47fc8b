//! Identifier newtypes
//!
//! Identifiers are validated syntactically at construction time: non-empty,
//! at most 128 characters, ASCII alphanumerics plus `.`, `_`, `:` and `-`.
//! Whether an identifier refers to an existing device or zone is a runtime
//! concern of the adapter layer, never of these types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted identifier length.
const MAX_ID_LEN: usize = 128;

/// Identifier validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier must not be empty")]
    Empty,

    #[error("identifier exceeds {MAX_ID_LEN} characters")]
    TooLong,

    #[error("identifier contains invalid character {0:?}")]
    InvalidChar(char),
}

fn validate(raw: &str) -> Result<(), IdError> {
    if raw.is_empty() {
        return Err(IdError::Empty);
    }
    if raw.len() > MAX_ID_LEN {
        return Err(IdError::TooLong);
    }
    if let Some(c) = raw
        .chars()
        .find(|&c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '_' | ':' | '-'))
    {
        return Err(IdError::InvalidChar(c));
    }
    Ok(())
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and validate an identifier.
            pub fn new(raw: impl Into<String>) -> Result<Self, IdError> {
                let raw = raw.into();
                validate(&raw)?;
                Ok(Self(raw))
            }

            /// Generate a fresh ulid-backed identifier.
            pub fn generate() -> Self {
                Self(ulid::Ulid::new().to_string())
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(raw: String) -> Result<Self, IdError> {
                Self::new(raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, IdError> {
                Self::new(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a device or sensor known to the adapter layer.
    DeviceId
);

id_type!(
    /// Identifier of a geographic zone used by location transitions.
    ZoneId
);

id_type!(
    /// Identifier of a scene (a named, reusable action list).
    SceneId
);

id_type!(
    /// Stable identifier of an automation. Immutable across edits.
    AutomationId
);

id_type!(
    /// Stable identifier of a single action within an automation,
    /// used for reordering without disturbing running snapshots.
    ActionId
);
