//! Collaborator contracts consumed by the cache, pipeline and orchestrator
//!
//! Implementations live outside this crate (anchoring, storage, settings);
//! `gateway::memory` provides in-process stand-ins.

use crate::cache::{
    Anchor, LocalAnnotationId, LocalListId, PrivacyLevel, RemoteId, ShareOpts, UnifiedAnnotation,
    UnifiedAnnotationId, UserReference,
};
use crate::in_page_ui::Component;
use crate::page::PageInfo;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by collaborators
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Anchoring error: {0}")]
    Anchoring(String),

    #[error("Preference store error: {0}")]
    Preferences(String),

    #[error("Component load error: {0}")]
    Load(String),
}

/// Result type for collaborator calls
pub type GatewayResult<T> = Result<T, GatewayError>;

/// The user's current text selection, as captured by the page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub text: String,
    /// Opaque range data for the anchoring service
    #[serde(default)]
    pub range: serde_json::Value,
}

impl Selection {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            range: serde_json::Value::Null,
        }
    }

    /// Collapsed or whitespace-only selections carry nothing to anchor
    pub fn is_collapsed(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A highlight was clicked on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightClick {
    pub unified_id: UnifiedAnnotationId,
    pub open_in_edit: bool,
}

/// Callback invoked by the anchoring service when a highlight is clicked
pub type HighlightClickHandler = Arc<dyn Fn(HighlightClick) + Send + Sync>;

/// Turns selections into anchors and draws highlights.
#[async_trait]
pub trait AnchoringService: Send + Sync {
    /// Describe a selection so it can be re-found after reflow
    async fn selection_to_descriptor(&self, selection: &Selection, page: &PageInfo) -> GatewayResult<Anchor>;

    /// Draw one annotation's highlight and scroll it into view
    async fn highlight_and_scroll(&self, unified_id: &UnifiedAnnotationId, selector: &Anchor) -> GatewayResult<()>;

    /// Draw highlights for the given annotations; returns how many were drawn
    async fn render_highlights(
        &self,
        annotations: &[UnifiedAnnotation],
        on_click: HighlightClickHandler,
    ) -> GatewayResult<usize>;

    /// Remove one annotation's highlight; a missing highlight is ignored
    fn remove_annotation_highlight(&self, unified_id: &UnifiedAnnotationId);

    /// Remove every highlight drawn on the page
    async fn remove_highlights(&self) -> GatewayResult<()>;
}

/// Data for a new annotation handed to storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnnotation {
    pub local_id: LocalAnnotationId,
    pub full_page_url: String,
    pub page_title: Option<String>,
    pub body: Option<String>,
    pub comment: Option<String>,
    pub selector: Option<Anchor>,
    pub local_list_ids: Vec<LocalListId>,
    pub created_when: DateTime<Utc>,
}

/// A create call against the storage layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAnnotationRequest {
    pub annotation: NewAnnotation,
    pub share_opts: ShareOpts,
    pub privacy_level_override: Option<PrivacyLevel>,
}

/// Outcome of a successful create
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedAnnotation {
    /// Set when the annotation was also shared to the remote store
    pub remote_id: Option<RemoteId>,
}

/// A stored annotation as returned for hydration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub local_id: LocalAnnotationId,
    pub remote_id: Option<RemoteId>,
    pub body: Option<String>,
    pub comment: Option<String>,
    pub selector: Option<Anchor>,
    pub color: Option<String>,
    pub created_when: DateTime<Utc>,
    pub last_edited: DateTime<Utc>,
    pub privacy_level: PrivacyLevel,
    pub local_list_ids: Vec<LocalListId>,
}

/// A stored list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRecord {
    pub local_id: LocalListId,
    pub remote_id: Option<RemoteId>,
    pub name: String,
    pub description: Option<String>,
}

/// A remote list the user follows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowedListRecord {
    pub remote_id: RemoteId,
    pub name: String,
    pub creator: UserReference,
    pub has_annotations_from_others: bool,
}

/// On-device and remote storage for annotations and lists.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    // === Annotations ===

    async fn create_annotation(&self, request: CreateAnnotationRequest) -> GatewayResult<SavedAnnotation>;

    async fn delete_annotation(&self, local_id: &LocalAnnotationId) -> GatewayResult<()>;

    async fn fetch_page_annotations(&self, full_page_url: &str) -> GatewayResult<Vec<AnnotationRecord>>;

    // === Lists ===

    async fn fetch_all_lists(&self) -> GatewayResult<Vec<ListRecord>>;

    async fn fetch_followed_lists(&self, full_page_url: &str) -> GatewayResult<Vec<FollowedListRecord>>;

    /// On-device ids of the lists the page is in
    async fn fetch_page_lists(&self, full_page_url: &str) -> GatewayResult<Vec<LocalListId>>;

    async fn create_list(&self, name: &str) -> GatewayResult<ListRecord>;

    async fn delete_list(&self, local_id: LocalListId) -> GatewayResult<()>;
}

/// Persisted user preferences that feed privacy decisions.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn auto_share(&self) -> GatewayResult<bool>;

    async fn set_auto_share(&self, value: bool) -> GatewayResult<()>;

    /// Privacy level the user chose as default for one page, if any
    async fn page_privacy_default(&self, normalized_page_url: &str) -> GatewayResult<Option<PrivacyLevel>>;

    async fn set_page_privacy_default(
        &self,
        normalized_page_url: &str,
        level: Option<PrivacyLevel>,
    ) -> GatewayResult<()>;
}

/// Injects a UI component's code into the page and resolves once it is ready.
#[async_trait]
pub trait ComponentLoader: Send + Sync {
    async fn load(&self, component: Component) -> GatewayResult<()>;
}
