//! PageAnnotationsCache: the in-memory authority for one page context
//!
//! All mutation goes through the methods here, and only these methods emit
//! `CacheEvent`s. State lives behind one mutex so each mutation, including
//! cascades across annotations and lists, is applied atomically; events are
//! emitted after the lock is released.

use super::events::CacheEvent;
use super::ids::{
    IdSequence, LocalAnnotationId, LocalListId, RemoteId, UnifiedAnnotationId, UnifiedListId,
};
use super::types::{
    AnnotationForCache, AnnotationPatch, ListForCache, ListPatch, MutationOpts, PrivacyLevel,
    UnifiedAnnotation, UnifiedList, UpdateAnnotationOpts, DEFAULT_HIGHLIGHT_COLOR,
};
use crate::bus::EventBus;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors from cache mutations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Annotation not found: {0}")]
    AnnotationNotFound(UnifiedAnnotationId),

    #[error("List not found: {0}")]
    ListNotFound(UnifiedListId),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Default)]
pub(crate) struct CacheState {
    pub(crate) annotations: HashMap<UnifiedAnnotationId, UnifiedAnnotation>,
    /// Newest first
    pub(crate) annotation_order: Vec<UnifiedAnnotationId>,
    pub(crate) lists: HashMap<UnifiedListId, UnifiedList>,
    pub(crate) list_order: Vec<UnifiedListId>,
    local_annotation_index: HashMap<LocalAnnotationId, UnifiedAnnotationId>,
    remote_annotation_index: HashMap<RemoteId, UnifiedAnnotationId>,
    local_list_index: HashMap<LocalListId, UnifiedListId>,
    remote_list_index: HashMap<RemoteId, UnifiedListId>,
    page_list_ids: HashMap<String, Vec<UnifiedListId>>,
}

impl CacheState {
    fn is_list_shared(&self, id: &UnifiedListId) -> bool {
        self.lists.get(id).map_or(false, UnifiedList::is_shared)
    }

    fn shared_page_list_ids(&self, normalized_page_url: &str) -> Vec<UnifiedListId> {
        self.page_list_ids
            .get(normalized_page_url)
            .map(|ids| {
                ids.iter()
                    .filter(|id| self.is_list_shared(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn existing_lists(&self, ids: impl IntoIterator<Item = UnifiedListId>) -> Vec<UnifiedListId> {
        dedupe(ids.into_iter().filter(|id| self.lists.contains_key(id)))
    }

    /// Keep list → annotation refs in step with an annotation's membership change.
    fn sync_list_refs(
        &mut self,
        annotation_id: &UnifiedAnnotationId,
        prev: &[UnifiedListId],
        next: &[UnifiedListId],
    ) {
        for removed in prev.iter().filter(|id| !next.contains(id)) {
            if let Some(list) = self.lists.get_mut(removed) {
                list.unified_annotation_ids.retain(|a| a != annotation_id);
            }
        }
        for added in next.iter().filter(|id| !prev.contains(id)) {
            if let Some(list) = self.lists.get_mut(added) {
                if !list.unified_annotation_ids.contains(annotation_id) {
                    list.unified_annotation_ids.insert(0, annotation_id.clone());
                }
            }
        }
    }

    /// Re-derive the lists of every shared annotation from its page's shared
    /// lists, keeping its private list memberships. Returns the changed ids.
    fn update_shared_annotations_with_shared_page_lists(&mut self) -> Vec<UnifiedAnnotationId> {
        let mut changes = Vec::new();
        for id in &self.annotation_order {
            let Some(annotation) = self.annotations.get(id) else {
                continue;
            };
            if !annotation.privacy_level.is_shared() {
                continue;
            }
            let next = dedupe(
                self.shared_page_list_ids(&annotation.normalized_page_url)
                    .into_iter()
                    .chain(
                        annotation
                            .unified_list_ids
                            .iter()
                            .filter(|l| !self.is_list_shared(l))
                            .cloned(),
                    ),
            );
            if !same_members(&annotation.unified_list_ids, &next) {
                changes.push((id.clone(), annotation.unified_list_ids.clone(), next));
            }
        }

        let mut changed = Vec::with_capacity(changes.len());
        for (id, prev, next) in changes {
            self.sync_list_refs(&id, &prev, &next);
            if let Some(annotation) = self.annotations.get_mut(&id) {
                annotation.unified_list_ids = next;
            }
            changed.push(id);
        }
        changed
    }
}

/// The per-page annotation and list cache.
#[derive(Debug)]
pub struct PageAnnotationsCache {
    state: Mutex<CacheState>,
    annotation_ids: IdSequence,
    list_ids: IdSequence,
    events: Arc<EventBus<CacheEvent>>,
    default_color: String,
    debug: bool,
}

impl Default for PageAnnotationsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PageAnnotationsCache {
    /// Create an empty cache with its own event bus
    pub fn new() -> Self {
        Self::with_events(Arc::new(EventBus::default()))
    }

    /// Create an empty cache emitting on a shared bus
    pub fn with_events(events: Arc<EventBus<CacheEvent>>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            annotation_ids: IdSequence::new(),
            list_ids: IdSequence::new(),
            events,
            default_color: DEFAULT_HIGHLIGHT_COLOR.to_string(),
            debug: false,
        }
    }

    pub fn with_default_color(mut self, color: impl Into<String>) -> Self {
        self.default_color = color.into();
        self
    }

    /// Log data-shape warnings (e.g. annotations referencing uncached lists)
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn events(&self) -> &Arc<EventBus<CacheEvent>> {
        &self.events
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&CacheState) -> R) -> R {
        f(&self.state())
    }

    fn emit_all(&self, events: Vec<CacheEvent>) {
        for event in events {
            self.events.emit(event);
        }
    }

    // === Reads ===

    /// True when no annotations are cached
    pub fn is_empty(&self) -> bool {
        self.state().annotations.is_empty()
    }

    pub fn annotation_count(&self) -> usize {
        self.state().annotations.len()
    }

    pub fn list_count(&self) -> usize {
        self.state().lists.len()
    }

    pub fn has_annotation(&self, id: &UnifiedAnnotationId) -> bool {
        self.state().annotations.contains_key(id)
    }

    pub fn annotation(&self, id: &UnifiedAnnotationId) -> Option<UnifiedAnnotation> {
        self.state().annotations.get(id).cloned()
    }

    pub fn list(&self, id: &UnifiedListId) -> Option<UnifiedList> {
        self.state().lists.get(id).cloned()
    }

    /// All annotations, newest first
    pub fn annotations(&self) -> Vec<UnifiedAnnotation> {
        let state = self.state();
        state
            .annotation_order
            .iter()
            .filter_map(|id| state.annotations.get(id).cloned())
            .collect()
    }

    /// All lists, newest first
    pub fn lists(&self) -> Vec<UnifiedList> {
        let state = self.state();
        state
            .list_order
            .iter()
            .filter_map(|id| state.lists.get(id).cloned())
            .collect()
    }

    pub fn get_annotation_by_local_id(&self, local_id: &LocalAnnotationId) -> Option<UnifiedAnnotation> {
        let state = self.state();
        let id = state.local_annotation_index.get(local_id)?;
        state.annotations.get(id).cloned()
    }

    pub fn get_annotation_by_remote_id(&self, remote_id: &RemoteId) -> Option<UnifiedAnnotation> {
        let state = self.state();
        let id = state.remote_annotation_index.get(remote_id)?;
        state.annotations.get(id).cloned()
    }

    pub fn get_list_by_local_id(&self, local_id: LocalListId) -> Option<UnifiedList> {
        let state = self.state();
        let id = state.local_list_index.get(&local_id)?;
        state.lists.get(id).cloned()
    }

    pub fn get_list_by_remote_id(&self, remote_id: &RemoteId) -> Option<UnifiedList> {
        let state = self.state();
        let id = state.remote_list_index.get(remote_id)?;
        state.lists.get(id).cloned()
    }

    /// Lists the given page is in
    pub fn page_list_ids(&self, normalized_page_url: &str) -> Vec<UnifiedListId> {
        self.state()
            .page_list_ids
            .get(normalized_page_url)
            .cloned()
            .unwrap_or_default()
    }

    /// Shared lists the given page is in
    pub fn shared_page_list_ids(&self, normalized_page_url: &str) -> Vec<UnifiedListId> {
        self.state().shared_page_list_ids(normalized_page_url)
    }

    // === Annotation mutations ===

    /// Insert an annotation and return its unified id.
    ///
    /// Never blocks on persistence. If an annotation with the same remote or
    /// local id is already cached, its id is returned and nothing changes.
    pub fn add_annotation(&self, data: AnnotationForCache, opts: MutationOpts) -> UnifiedAnnotationId {
        let mut state = self.state();

        let existing = data
            .remote_id
            .as_ref()
            .and_then(|r| state.remote_annotation_index.get(r))
            .or_else(|| {
                data.local_id
                    .as_ref()
                    .and_then(|l| state.local_annotation_index.get(l))
            });
        if let Some(existing) = existing {
            tracing::debug!(unified_id = %existing, "annotation already cached");
            return existing.clone();
        }

        let unified_id = self.annotation_ids.next_annotation_id();
        let mut privacy_level = data.privacy_level;

        let mut resolved = Vec::with_capacity(data.local_list_ids.len());
        for local_list_id in &data.local_list_ids {
            match state.local_list_index.get(local_list_id) {
                Some(list_id) => {
                    if state.is_list_shared(list_id) && privacy_level == PrivacyLevel::Private {
                        privacy_level = PrivacyLevel::Protected;
                    }
                    resolved.push(list_id.clone());
                }
                None if self.debug => tracing::warn!(
                    local_list_id,
                    "no cached list for local list id; cache lists before annotations"
                ),
                None => {}
            }
        }

        let mut candidate_lists: Vec<UnifiedListId> = Vec::new();
        if privacy_level.is_shared() {
            candidate_lists.extend(state.shared_page_list_ids(&data.normalized_page_url));
        }
        candidate_lists.extend(data.unified_list_ids.iter().cloned());
        candidate_lists.extend(resolved);
        let unified_list_ids = state.existing_lists(candidate_lists);

        let created_when = data.created_when.unwrap_or_else(Utc::now);
        let annotation = UnifiedAnnotation {
            unified_id: unified_id.clone(),
            local_id: data.local_id,
            remote_id: data.remote_id,
            normalized_page_url: data.normalized_page_url,
            body: data.body,
            comment: data.comment,
            selector: data.selector,
            color: data.color.unwrap_or_else(|| self.default_color.clone()),
            creator: data.creator,
            created_when,
            last_edited: data.last_edited.unwrap_or(created_when),
            privacy_level,
            unified_list_ids,
        };

        if let Some(local_id) = &annotation.local_id {
            state.local_annotation_index.insert(local_id.clone(), unified_id.clone());
        }
        if let Some(remote_id) = &annotation.remote_id {
            state.remote_annotation_index.insert(remote_id.clone(), unified_id.clone());
        }
        state.sync_list_refs(&unified_id, &[], &annotation.unified_list_ids);
        state.annotation_order.insert(0, unified_id.clone());
        state.annotations.insert(unified_id.clone(), annotation.clone());
        drop(state);

        tracing::debug!(%unified_id, privacy = %annotation.privacy_level, "annotation cached");
        if !opts.skip_event_emission {
            self.events.emit(CacheEvent::AddedAnnotation(annotation));
        }
        unified_id
    }

    /// Merge a patch into a cached annotation.
    ///
    /// Only fields set in the patch change. List memberships follow the
    /// privacy transition rules: unsharing drops shared lists (or keeps them
    /// and downgrades to protected), sharing a private annotation adds the
    /// page's shared lists.
    pub fn update_annotation(
        &self,
        unified_id: &UnifiedAnnotationId,
        patch: AnnotationPatch,
        opts: UpdateAnnotationOpts,
    ) -> CacheResult<UnifiedAnnotation> {
        let mut state = self.state();
        let previous = state
            .annotations
            .get(unified_id)
            .cloned()
            .ok_or_else(|| CacheError::AnnotationNotFound(unified_id.clone()))?;

        let mut privacy_level = patch.privacy_level.unwrap_or(previous.privacy_level);
        let mut next_lists = previous.unified_list_ids.clone();

        if opts.force_list_update || privacy_level == previous.privacy_level {
            if let Some(lists) = patch.unified_list_ids {
                next_lists = lists;
            }
        } else if previous.privacy_level != PrivacyLevel::Private
            && privacy_level == PrivacyLevel::Private
        {
            if opts.keep_lists_if_unsharing {
                privacy_level = PrivacyLevel::Protected;
            } else {
                next_lists.retain(|id| !state.is_list_shared(id));
            }
        } else if previous.privacy_level == PrivacyLevel::Private && privacy_level.is_shared() {
            let private_lists: Vec<UnifiedListId> = next_lists
                .iter()
                .filter(|id| !state.is_list_shared(id))
                .cloned()
                .collect();
            next_lists = state.shared_page_list_ids(&previous.normalized_page_url);
            next_lists.extend(private_lists);
        }
        let next_lists = state.existing_lists(next_lists);

        if let Some(remote_id) = &patch.remote_id {
            if previous.remote_id.as_ref() != Some(remote_id) {
                if let Some(old) = &previous.remote_id {
                    state.remote_annotation_index.remove(old);
                }
                state
                    .remote_annotation_index
                    .insert(remote_id.clone(), unified_id.clone());
            }
        }

        let next = UnifiedAnnotation {
            privacy_level,
            unified_list_ids: next_lists,
            body: patch.body.or_else(|| previous.body.clone()),
            comment: patch.comment.or_else(|| previous.comment.clone()),
            color: patch.color.unwrap_or_else(|| previous.color.clone()),
            remote_id: patch.remote_id.or_else(|| previous.remote_id.clone()),
            last_edited: opts.edited_at.unwrap_or(previous.last_edited),
            ..previous.clone()
        };

        state.sync_list_refs(unified_id, &previous.unified_list_ids, &next.unified_list_ids);
        state.annotations.insert(unified_id.clone(), next.clone());
        drop(state);

        tracing::debug!(%unified_id, "annotation updated");
        self.events.emit(CacheEvent::UpdatedAnnotation(next.clone()));
        Ok(next)
    }

    /// Remove an annotation. Removing an absent id is a no-op returning `None`.
    pub fn remove_annotation(
        &self,
        unified_id: &UnifiedAnnotationId,
        opts: MutationOpts,
    ) -> Option<UnifiedAnnotation> {
        let mut state = self.state();
        let Some(removed) = state.annotations.remove(unified_id) else {
            tracing::debug!(%unified_id, "remove of uncached annotation ignored");
            return None;
        };
        if let Some(local_id) = &removed.local_id {
            state.local_annotation_index.remove(local_id);
        }
        if let Some(remote_id) = &removed.remote_id {
            state.remote_annotation_index.remove(remote_id);
        }
        state.annotation_order.retain(|id| id != unified_id);
        state.sync_list_refs(unified_id, &removed.unified_list_ids, &[]);
        drop(state);

        tracing::debug!(%unified_id, "annotation removed");
        if !opts.skip_event_emission {
            self.events.emit(CacheEvent::RemovedAnnotation(removed.clone()));
        }
        Some(removed)
    }

    /// Remove an annotation addressed by its on-device id
    pub fn remove_annotation_by_local_id(
        &self,
        local_id: &LocalAnnotationId,
        opts: MutationOpts,
    ) -> Option<UnifiedAnnotation> {
        let unified_id = self.state().local_annotation_index.get(local_id).cloned()?;
        self.remove_annotation(&unified_id, opts)
    }

    // === List mutations ===

    /// Insert a list and return its unified id.
    ///
    /// Annotation ids seeded on the list get a back reference to it.
    pub fn add_list(&self, data: ListForCache, opts: MutationOpts) -> UnifiedListId {
        let mut state = self.state();

        let existing = data
            .remote_id
            .as_ref()
            .and_then(|r| state.remote_list_index.get(r))
            .or_else(|| data.local_id.and_then(|l| state.local_list_index.get(&l)));
        if let Some(existing) = existing {
            return existing.clone();
        }

        let unified_id = self.list_ids.next_list_id();
        let annotation_ids: Vec<UnifiedAnnotationId> = dedupe(
            data.unified_annotation_ids
                .into_iter()
                .filter(|id| state.annotations.contains_key(id)),
        );
        for annotation_id in &annotation_ids {
            if let Some(annotation) = state.annotations.get_mut(annotation_id) {
                if !annotation.unified_list_ids.contains(&unified_id) {
                    annotation.unified_list_ids.insert(0, unified_id.clone());
                }
            }
        }

        let list = UnifiedList {
            unified_id: unified_id.clone(),
            local_id: data.local_id,
            remote_id: data.remote_id,
            name: data.name,
            description: data.description,
            creator: data.creator,
            has_remote_annotations_to_load: data.has_remote_annotations_to_load,
            unified_annotation_ids: annotation_ids,
        };
        if let Some(local_id) = list.local_id {
            state.local_list_index.insert(local_id, unified_id.clone());
        }
        if let Some(remote_id) = &list.remote_id {
            state.remote_list_index.insert(remote_id.clone(), unified_id.clone());
        }
        state.list_order.insert(0, unified_id.clone());
        state.lists.insert(unified_id.clone(), list.clone());
        drop(state);

        tracing::debug!(%unified_id, name = %list.name, "list cached");
        if !opts.skip_event_emission {
            self.events.emit(CacheEvent::AddedList(list));
        }
        unified_id
    }

    /// Merge a patch into a cached list.
    ///
    /// Sharing a list (first remote id) re-derives shared annotations' lists.
    pub fn update_list(&self, unified_id: &UnifiedListId, patch: ListPatch) -> CacheResult<UnifiedList> {
        let mut state = self.state();
        let previous = state
            .lists
            .get(unified_id)
            .cloned()
            .ok_or_else(|| CacheError::ListNotFound(unified_id.clone()))?;

        let next = UnifiedList {
            name: patch.name.unwrap_or_else(|| previous.name.clone()),
            description: patch.description.or_else(|| previous.description.clone()),
            remote_id: patch.remote_id.or_else(|| previous.remote_id.clone()),
            has_remote_annotations_to_load: patch
                .has_remote_annotations_to_load
                .unwrap_or(previous.has_remote_annotations_to_load),
            ..previous.clone()
        };
        let newly_shared = previous.remote_id != next.remote_id;
        if newly_shared {
            if let Some(old) = &previous.remote_id {
                state.remote_list_index.remove(old);
            }
            if let Some(remote_id) = &next.remote_id {
                state.remote_list_index.insert(remote_id.clone(), unified_id.clone());
            }
        }
        state.lists.insert(unified_id.clone(), next);

        let changed = if newly_shared {
            state.update_shared_annotations_with_shared_page_lists()
        } else {
            Vec::new()
        };
        let updated = state.lists.get(unified_id).cloned().unwrap_or(previous);
        drop(state);

        let mut events = vec![CacheEvent::UpdatedList(updated.clone())];
        if !changed.is_empty() {
            events.push(CacheEvent::SharedMembershipsChanged {
                annotation_count: changed.len(),
            });
        }
        self.emit_all(events);
        Ok(updated)
    }

    /// Remove a list and strip it from every annotation in the same step.
    ///
    /// Removing an absent id is a no-op returning `None`.
    pub fn remove_list(&self, unified_id: &UnifiedListId, opts: MutationOpts) -> Option<UnifiedList> {
        let mut state = self.state();
        let removed = state.lists.remove(unified_id)?;
        if let Some(local_id) = removed.local_id {
            state.local_list_index.remove(&local_id);
        }
        if let Some(remote_id) = &removed.remote_id {
            state.remote_list_index.remove(remote_id);
        }
        state.list_order.retain(|id| id != unified_id);
        for annotation in state.annotations.values_mut() {
            annotation.unified_list_ids.retain(|id| id != unified_id);
        }
        for page_lists in state.page_list_ids.values_mut() {
            page_lists.retain(|id| id != unified_id);
        }
        drop(state);

        tracing::debug!(%unified_id, "list removed");
        if !opts.skip_event_emission {
            self.events.emit(CacheEvent::RemovedList(removed.clone()));
        }
        Some(removed)
    }

    // === Page data ===

    /// Record which lists a page is in.
    ///
    /// Emits `UpdatedPageData` once, then re-derives shared annotations'
    /// memberships from the page's shared lists.
    pub fn set_page_data(&self, normalized_page_url: &str, list_ids: Vec<UnifiedListId>) {
        let mut state = self.state();
        let next = state.existing_lists(list_ids);
        state
            .page_list_ids
            .insert(normalized_page_url.to_string(), next.clone());
        let changed = state.update_shared_annotations_with_shared_page_lists();
        drop(state);

        let mut events = vec![CacheEvent::UpdatedPageData {
            normalized_page_url: normalized_page_url.to_string(),
            list_ids: next,
        }];
        if !changed.is_empty() {
            events.push(CacheEvent::SharedMembershipsChanged {
                annotation_count: changed.len(),
            });
        }
        self.emit_all(events);
    }
}

/// Order-preserving de-duplication
fn dedupe<T: Eq + Hash + Clone>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

fn same_members<T: Eq + Hash>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len() && a.iter().collect::<HashSet<_>>() == b.iter().collect::<HashSet<_>>()
}
