//! Identity value types shared across uptrack crates.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EndpointError, EndpointResult};

/// Unique identifier of a monitored endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    /// Fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing id (as read back from storage or the command line).
    pub fn parse(raw: &str) -> EndpointResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.contains(':') {
            return Err(EndpointError::InvalidId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declares a non-empty string newtype whose constructor rejects blank input.
macro_rules! required_string {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> EndpointResult<Self> {
                let raw = raw.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(EndpointError::MissingField($field));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = EndpointError;

            fn try_from(raw: String) -> EndpointResult<Self> {
                Self::new(raw)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

required_string!(
    /// Owner (user account) of an endpoint.
    OwnerId,
    "owner"
);

required_string!(
    /// Address probed by the health checker (`host`, `host:port` or a URL).
    EndpointUrl,
    "url"
);

required_string!(
    /// Human-readable label.
    EndpointName,
    "name"
);
