//! Cached entity shapes

use super::ids::{LocalAnnotationId, LocalListId, RemoteId, UnifiedAnnotationId, UnifiedListId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highlight color used when an annotation arrives without one
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "default";

/// Visibility of an annotation, ordered from least to most visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    /// Visible only to the creator
    Private,
    /// In at least one shared list, but not shared with the whole page
    Protected,
    /// Shared along with every shared list the page is in
    Shared,
}

impl PrivacyLevel {
    /// Map sharing flags onto a privacy level.
    pub fn from_share_opts(opts: ShareOpts) -> Self {
        if opts.should_share {
            Self::Shared
        } else if opts.is_bulk_share_protected {
            Self::Protected
        } else {
            Self::Private
        }
    }

    pub fn is_shared(self) -> bool {
        self >= Self::Shared
    }
}

impl Default for PrivacyLevel {
    fn default() -> Self {
        Self::Private
    }
}

impl std::fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::Protected => write!(f, "protected"),
            Self::Shared => write!(f, "shared"),
        }
    }
}

/// Sharing flags attached to a create or edit request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareOpts {
    pub should_share: bool,
    #[serde(default)]
    pub is_bulk_share_protected: bool,
}

/// Reference to the user who created an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserReference {
    pub id: String,
}

impl UserReference {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Anchor descriptor produced by the anchoring service.
///
/// `descriptor` is opaque to the cache; only `quote` is inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub quote: String,
    #[serde(default)]
    pub descriptor: serde_json::Value,
}

impl Anchor {
    pub fn new(quote: impl Into<String>) -> Self {
        Self {
            quote: quote.into(),
            descriptor: serde_json::Value::Null,
        }
    }

    pub fn with_descriptor(mut self, descriptor: serde_json::Value) -> Self {
        self.descriptor = descriptor;
        self
    }
}

/// An annotation as held by the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedAnnotation {
    pub unified_id: UnifiedAnnotationId,
    pub local_id: Option<LocalAnnotationId>,
    pub remote_id: Option<RemoteId>,
    pub normalized_page_url: String,
    pub body: Option<String>,
    pub comment: Option<String>,
    pub selector: Option<Anchor>,
    pub color: String,
    pub creator: Option<UserReference>,
    pub created_when: DateTime<Utc>,
    pub last_edited: DateTime<Utc>,
    pub privacy_level: PrivacyLevel,
    /// Lists this annotation belongs to, most recently added first
    pub unified_list_ids: Vec<UnifiedListId>,
}

impl UnifiedAnnotation {
    /// True if this annotation highlights page text
    pub fn is_highlight(&self) -> bool {
        self.body.as_deref().map_or(false, |b| !b.is_empty())
    }
}

/// A list ("space") as held by the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedList {
    pub unified_id: UnifiedListId,
    pub local_id: Option<LocalListId>,
    pub remote_id: Option<RemoteId>,
    pub name: String,
    pub description: Option<String>,
    pub creator: Option<UserReference>,
    pub has_remote_annotations_to_load: bool,
    pub unified_annotation_ids: Vec<UnifiedAnnotationId>,
}

impl UnifiedList {
    /// A list is shared once the remote store knows it
    pub fn is_shared(&self) -> bool {
        self.remote_id.is_some()
    }
}

/// Input to `PageAnnotationsCache::add_annotation`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationForCache {
    pub local_id: Option<LocalAnnotationId>,
    pub remote_id: Option<RemoteId>,
    pub normalized_page_url: String,
    pub body: Option<String>,
    pub comment: Option<String>,
    pub selector: Option<Anchor>,
    pub color: Option<String>,
    pub creator: Option<UserReference>,
    pub created_when: Option<DateTime<Utc>>,
    pub last_edited: Option<DateTime<Utc>>,
    pub privacy_level: PrivacyLevel,
    #[serde(default)]
    pub unified_list_ids: Vec<UnifiedListId>,
    /// On-device list ids, resolved against already cached lists
    #[serde(default)]
    pub local_list_ids: Vec<LocalListId>,
}

impl AnnotationForCache {
    pub fn new(normalized_page_url: impl Into<String>) -> Self {
        Self {
            normalized_page_url: normalized_page_url.into(),
            ..Default::default()
        }
    }

    pub fn with_local_id(mut self, local_id: LocalAnnotationId) -> Self {
        self.local_id = Some(local_id);
        self
    }

    pub fn with_remote_id(mut self, remote_id: RemoteId) -> Self {
        self.remote_id = Some(remote_id);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_selector(mut self, selector: Anchor) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_privacy(mut self, level: PrivacyLevel) -> Self {
        self.privacy_level = level;
        self
    }

    pub fn with_creator(mut self, creator: UserReference) -> Self {
        self.creator = Some(creator);
        self
    }

    pub fn with_lists(mut self, unified_list_ids: Vec<UnifiedListId>) -> Self {
        self.unified_list_ids = unified_list_ids;
        self
    }

    pub fn with_local_lists(mut self, local_list_ids: Vec<LocalListId>) -> Self {
        self.local_list_ids = local_list_ids;
        self
    }

    pub fn created_at(mut self, when: DateTime<Utc>) -> Self {
        self.created_when = Some(when);
        self
    }
}

/// Input to `PageAnnotationsCache::add_list`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListForCache {
    pub local_id: Option<LocalListId>,
    pub remote_id: Option<RemoteId>,
    pub name: String,
    pub description: Option<String>,
    pub creator: Option<UserReference>,
    #[serde(default)]
    pub has_remote_annotations_to_load: bool,
    #[serde(default)]
    pub unified_annotation_ids: Vec<UnifiedAnnotationId>,
}

impl ListForCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_local_id(mut self, local_id: LocalListId) -> Self {
        self.local_id = Some(local_id);
        self
    }

    pub fn with_remote_id(mut self, remote_id: RemoteId) -> Self {
        self.remote_id = Some(remote_id);
        self
    }

    pub fn with_creator(mut self, creator: UserReference) -> Self {
        self.creator = Some(creator);
        self
    }
}

/// Fields to merge into a cached annotation. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationPatch {
    pub body: Option<String>,
    pub comment: Option<String>,
    pub color: Option<String>,
    pub remote_id: Option<RemoteId>,
    pub privacy_level: Option<PrivacyLevel>,
    pub unified_list_ids: Option<Vec<UnifiedListId>>,
}

impl AnnotationPatch {
    pub fn remote_id(remote_id: RemoteId) -> Self {
        Self {
            remote_id: Some(remote_id),
            ..Default::default()
        }
    }

    pub fn privacy(level: PrivacyLevel) -> Self {
        Self {
            privacy_level: Some(level),
            ..Default::default()
        }
    }

    pub fn lists(unified_list_ids: Vec<UnifiedListId>) -> Self {
        Self {
            unified_list_ids: Some(unified_list_ids),
            ..Default::default()
        }
    }

    pub fn comment(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Default::default()
        }
    }
}

/// Options for `PageAnnotationsCache::update_annotation`
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateAnnotationOpts {
    /// Apply the patch's lists even when the privacy level changes
    pub force_list_update: bool,
    /// When unsharing, keep list memberships and downgrade to protected
    pub keep_lists_if_unsharing: bool,
    /// Bump `last_edited` to this instant
    pub edited_at: Option<DateTime<Utc>>,
}

/// Fields to merge into a cached list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub remote_id: Option<RemoteId>,
    pub has_remote_annotations_to_load: Option<bool>,
}

/// Event emission control for mutations
#[derive(Debug, Clone, Copy, Default)]
pub struct MutationOpts {
    /// Apply the mutation without notifying subscribers (bulk hydration)
    pub skip_event_emission: bool,
}

impl MutationOpts {
    pub fn silent() -> Self {
        Self {
            skip_event_emission: true,
        }
    }
}

/// How the current user relates to a list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOwnership {
    Creator,
    Follower,
    Contributor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privacy_levels_are_ordered_by_visibility() {
        assert!(PrivacyLevel::Private < PrivacyLevel::Protected);
        assert!(PrivacyLevel::Protected < PrivacyLevel::Shared);
        assert!(PrivacyLevel::Shared.is_shared());
        assert!(!PrivacyLevel::Protected.is_shared());
    }

    #[test]
    fn share_opts_map_to_levels() {
        let shared = ShareOpts { should_share: true, is_bulk_share_protected: true };
        let protected = ShareOpts { should_share: false, is_bulk_share_protected: true };
        assert_eq!(PrivacyLevel::from_share_opts(shared), PrivacyLevel::Shared);
        assert_eq!(PrivacyLevel::from_share_opts(protected), PrivacyLevel::Protected);
        assert_eq!(PrivacyLevel::from_share_opts(ShareOpts::default()), PrivacyLevel::Private);
    }

    #[test]
    fn privacy_level_serializes_lowercase() {
        let json = serde_json::to_string(&PrivacyLevel::Protected).unwrap();
        assert_eq!(json, "\"protected\"");
    }
}
