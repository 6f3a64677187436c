//! Change notifications emitted by the annotation cache
//!
//! One event per logical mutation. Bulk operations emit a single
//! aggregate event instead of one per row.

use super::ids::UnifiedListId;
use super::types::{UnifiedAnnotation, UnifiedList};

#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    AddedAnnotation(UnifiedAnnotation),
    UpdatedAnnotation(UnifiedAnnotation),
    RemovedAnnotation(UnifiedAnnotation),
    AddedList(UnifiedList),
    UpdatedList(UnifiedList),
    RemovedList(UnifiedList),
    /// The set of lists the page is in changed, or hydration finished
    UpdatedPageData {
        normalized_page_url: String,
        list_ids: Vec<UnifiedListId>,
    },
    /// Shared annotations' list memberships were re-derived from page lists
    SharedMembershipsChanged {
        annotation_count: usize,
    },
}

impl CacheEvent {
    /// Short name, used in logs and by the CLI summary
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddedAnnotation(_) => "added_annotation",
            Self::UpdatedAnnotation(_) => "updated_annotation",
            Self::RemovedAnnotation(_) => "removed_annotation",
            Self::AddedList(_) => "added_list",
            Self::UpdatedList(_) => "updated_list",
            Self::RemovedList(_) => "removed_list",
            Self::UpdatedPageData { .. } => "updated_page_data",
            Self::SharedMembershipsChanged { .. } => "shared_memberships_changed",
        }
    }
}
