//! Read-only views over the cache used by UI surfaces

use super::ids::{LocalListId, UnifiedListId};
use super::store::PageAnnotationsCache;
use super::types::{ListOwnership, UnifiedAnnotation, UnifiedList, UserReference};

impl PageAnnotationsCache {
    /// Annotations created by the given user, plus those with no known creator
    pub fn user_annotations(&self, user_id: Option<&str>) -> Vec<UnifiedAnnotation> {
        self.annotations()
            .into_iter()
            .filter(|a| is_own(a, user_id))
            .collect()
    }

    /// Annotations that highlight page text
    pub fn highlight_annotations(&self) -> Vec<UnifiedAnnotation> {
        self.annotations()
            .into_iter()
            .filter(UnifiedAnnotation::is_highlight)
            .collect()
    }

    /// Highlights created by the given user
    pub fn user_highlights(&self, user_id: Option<&str>) -> Vec<UnifiedAnnotation> {
        self.highlight_annotations()
            .into_iter()
            .filter(|a| is_own(a, user_id))
            .collect()
    }

    /// Highlights belonging to one list
    pub fn list_highlights(&self, list_id: &UnifiedListId) -> Vec<UnifiedAnnotation> {
        self.highlight_annotations()
            .into_iter()
            .filter(|a| a.unified_list_ids.contains(list_id))
            .collect()
    }

    /// Annotations that carry an anchor and can be drawn on the page
    pub fn anchored_annotations(&self) -> Vec<UnifiedAnnotation> {
        self.annotations()
            .into_iter()
            .filter(|a| a.selector.is_some())
            .collect()
    }

    /// On-device ids of the given lists, skipping lists with none
    pub fn local_list_ids_for(&self, unified_ids: &[UnifiedListId]) -> Vec<LocalListId> {
        self.read(|state| {
            unified_ids
                .iter()
                .filter_map(|id| state.lists.get(id).and_then(|l| l.local_id))
                .collect()
        })
    }
}

fn is_own(annotation: &UnifiedAnnotation, user_id: Option<&str>) -> bool {
    match (&annotation.creator, user_id) {
        (None, _) => true,
        (Some(creator), Some(user_id)) => creator.id == user_id,
        (Some(_), None) => false,
    }
}

/// How the current user relates to a list
pub fn list_ownership(list: &UnifiedList, current_user: Option<&UserReference>) -> ListOwnership {
    match (&list.remote_id, list.local_id) {
        (Some(_), None) => ListOwnership::Follower,
        (Some(_), Some(_)) if list.creator.as_ref() != current_user => ListOwnership::Contributor,
        _ => ListOwnership::Creator,
    }
}
