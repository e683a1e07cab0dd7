//! Newtype identifier wrappers used throughout the graph and retrieval layers.
//!
//! All ids are plain strings under the hood (`#[serde(transparent)]`) so they
//! round-trip through SQLite TEXT columns and JSON without a conversion layer.
//! Most are deterministic, content-addressed strings built in `canonical` or
//! at the call site (e.g. `"{chunk_id}_sent_{index}"`); none are randomly
//! generated, since retrieval correctness depends on the same input producing
//! the same id across indexing runs (spec invariant: stable under repeated
//! execution).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(GroupId);
string_id!(DocumentId);
string_id!(ChunkId);
string_id!(SectionId);
string_id!(EntityId);
string_id!(CommunityId);
string_id!(SentenceId);
string_id!(KeyValuePairId);
string_id!(FigureId);
string_id!(BarcodeId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let id = EntityId::new("entity:abc123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"entity:abc123\"");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn equal_strings_produce_equal_ids() {
        assert_eq!(GroupId::new("g-test"), GroupId::from("g-test".to_string()));
    }
}
