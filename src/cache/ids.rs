//! Identifier scheme for cached entities
//!
//! Downstream code addresses annotations and lists only by unified id.
//! Local and remote ids are secondary keys owned by the storage layers.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an id from a string
            pub fn from_string(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the inner string value
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
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
    };
}

string_id!(
    /// Process-local primary key of a cached annotation
    UnifiedAnnotationId
);
string_id!(
    /// Process-local primary key of a cached list
    UnifiedListId
);
string_id!(
    /// On-device id of an annotation (its annotation URL)
    LocalAnnotationId
);
string_id!(
    /// Id assigned by the remote store once an entity is shared
    RemoteId
);

/// On-device id of a list
pub type LocalListId = i64;

/// Identity of one page context (one cache + orchestrator lifetime)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageContextId(Uuid);

impl PageContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PageContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PageContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic generator of unified ids.
///
/// Never resets: an id handed out once is never handed out again for the
/// lifetime of the generator.
#[derive(Debug, Default)]
pub struct IdSequence {
    next: AtomicU64,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_annotation_id(&self) -> UnifiedAnnotationId {
        UnifiedAnnotationId(self.next_raw().to_string())
    }

    pub fn next_list_id(&self) -> UnifiedListId {
        UnifiedListId(self.next_raw().to_string())
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Deterministic local id for a new annotation: page URL plus creation
/// timestamp in milliseconds. Stable before any storage layer confirms it.
pub fn generate_annotation_local_id(page_url: &str, timestamp_ms: i64) -> LocalAnnotationId {
    LocalAnnotationId(format!("{}/#{}", page_url.trim_end_matches('/'), timestamp_ms))
}
