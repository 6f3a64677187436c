//! In-process collaborators backed by concurrent maps
//!
//! Used by the `folio` CLI simulation and by tests. Each can be told to fail
//! so rollback paths can be exercised.

use super::traits::{
    AnchoringService, AnnotationRecord, ComponentLoader, CreateAnnotationRequest,
    FollowedListRecord, GatewayError, GatewayResult, HighlightClick, HighlightClickHandler,
    ListRecord, PersistenceGateway, PreferenceStore, SavedAnnotation, Selection,
};
use crate::cache::{
    Anchor, LocalAnnotationId, LocalListId, PrivacyLevel, RemoteId, UnifiedAnnotation,
    UnifiedAnnotationId,
};
use crate::in_page_ui::Component;
use crate::page::PageInfo;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// Persistence held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    annotations: DashMap<LocalAnnotationId, (String, AnnotationRecord)>,
    lists: DashMap<LocalListId, ListRecord>,
    followed: DashMap<RemoteId, FollowedListRecord>,
    page_lists: DashMap<String, Vec<LocalListId>>,
    next_list_id: AtomicI64,
    fail_writes: AtomicBool,
    write_delay_ms: AtomicUsize,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self {
            next_list_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    /// Make every create and delete fail until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay writes so callers can observe the optimistic window
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    /// Seed a stored annotation for a page
    pub fn insert_annotation(&self, full_page_url: impl Into<String>, record: AnnotationRecord) {
        self.annotations
            .insert(record.local_id.clone(), (full_page_url.into(), record));
    }

    /// Seed a stored list, keeping the id counter ahead of it
    pub fn insert_list(&self, record: ListRecord) {
        self.next_list_id.fetch_max(record.local_id + 1, Ordering::SeqCst);
        self.lists.insert(record.local_id, record);
    }

    pub fn insert_followed_list(&self, record: FollowedListRecord) {
        self.followed.insert(record.remote_id.clone(), record);
    }

    /// Record that a page is in a list
    pub fn add_page_to_list(&self, full_page_url: impl Into<String>, list_id: LocalListId) {
        let mut entry = self.page_lists.entry(full_page_url.into()).or_default();
        if !entry.contains(&list_id) {
            entry.push(list_id);
        }
    }

    pub fn has_annotation(&self, local_id: &LocalAnnotationId) -> bool {
        self.annotations.contains_key(local_id)
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    async fn before_write(&self, op: &str) -> GatewayResult<()> {
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GatewayError::Persistence(format!("{op} rejected by store")));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for MemoryPersistence {
    async fn create_annotation(&self, request: CreateAnnotationRequest) -> GatewayResult<SavedAnnotation> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.before_write("create annotation").await?;

        let privacy_level = request
            .privacy_level_override
            .unwrap_or_else(|| PrivacyLevel::from_share_opts(request.share_opts));
        let remote_id = privacy_level
            .is_shared()
            .then(|| RemoteId::from_string(Uuid::new_v4().to_string()));
        let new = request.annotation;
        let record = AnnotationRecord {
            local_id: new.local_id.clone(),
            remote_id: remote_id.clone(),
            body: new.body,
            comment: new.comment,
            selector: new.selector,
            color: None,
            created_when: new.created_when,
            last_edited: new.created_when,
            privacy_level,
            local_list_ids: new.local_list_ids,
        };
        self.annotations
            .insert(new.local_id, (new.full_page_url, record));
        Ok(SavedAnnotation { remote_id })
    }

    async fn delete_annotation(&self, local_id: &LocalAnnotationId) -> GatewayResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.before_write("delete annotation").await?;
        self.annotations.remove(local_id);
        Ok(())
    }

    async fn fetch_page_annotations(&self, full_page_url: &str) -> GatewayResult<Vec<AnnotationRecord>> {
        Ok(self
            .annotations
            .iter()
            .filter(|entry| entry.value().0 == full_page_url)
            .map(|entry| entry.value().1.clone())
            .collect())
    }

    async fn fetch_all_lists(&self) -> GatewayResult<Vec<ListRecord>> {
        let mut lists: Vec<ListRecord> = self.lists.iter().map(|r| r.value().clone()).collect();
        lists.sort_by_key(|l| l.local_id);
        Ok(lists)
    }

    async fn fetch_followed_lists(&self, _full_page_url: &str) -> GatewayResult<Vec<FollowedListRecord>> {
        Ok(self.followed.iter().map(|r| r.value().clone()).collect())
    }

    async fn fetch_page_lists(&self, full_page_url: &str) -> GatewayResult<Vec<LocalListId>> {
        Ok(self
            .page_lists
            .get(full_page_url)
            .map(|r| r.clone())
            .unwrap_or_default())
    }

    async fn create_list(&self, name: &str) -> GatewayResult<ListRecord> {
        self.before_write("create list").await?;
        let record = ListRecord {
            local_id: self.next_list_id.fetch_add(1, Ordering::SeqCst),
            remote_id: None,
            name: name.to_string(),
            description: None,
        };
        self.lists.insert(record.local_id, record.clone());
        Ok(record)
    }

    async fn delete_list(&self, local_id: LocalListId) -> GatewayResult<()> {
        self.before_write("delete list").await?;
        self.lists.remove(&local_id);
        for mut entry in self.page_lists.iter_mut() {
            entry.value_mut().retain(|id| *id != local_id);
        }
        Ok(())
    }
}

/// Anchoring that records drawn highlights instead of touching a page
#[derive(Default)]
pub struct MemoryAnchoring {
    highlights: DashMap<UnifiedAnnotationId, Anchor>,
    on_click: Mutex<Option<HighlightClickHandler>>,
    fail: AtomicBool,
}

impl std::fmt::Debug for MemoryAnchoring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAnchoring")
            .field("highlights", &self.highlights.len())
            .finish()
    }
}

impl MemoryAnchoring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make anchoring calls fail until reset
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn is_highlighted(&self, unified_id: &UnifiedAnnotationId) -> bool {
        self.highlights.contains_key(unified_id)
    }

    pub fn highlight_count(&self) -> usize {
        self.highlights.len()
    }

    /// Simulate a click on a drawn highlight. Returns false if none is drawn
    /// or no click handler was registered.
    pub fn click(&self, unified_id: &UnifiedAnnotationId) -> bool {
        if !self.highlights.contains_key(unified_id) {
            return false;
        }
        let handler = self
            .on_click
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match handler {
            Some(handler) => {
                handler(HighlightClick {
                    unified_id: unified_id.clone(),
                    open_in_edit: false,
                });
                true
            }
            None => false,
        }
    }

    fn check(&self) -> GatewayResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Anchoring("selection could not be anchored".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AnchoringService for MemoryAnchoring {
    async fn selection_to_descriptor(&self, selection: &Selection, page: &PageInfo) -> GatewayResult<Anchor> {
        self.check()?;
        Ok(Anchor::new(selection.text.clone()).with_descriptor(serde_json::json!({
            "url": page.full_page_url,
            "range": selection.range,
        })))
    }

    async fn highlight_and_scroll(&self, unified_id: &UnifiedAnnotationId, selector: &Anchor) -> GatewayResult<()> {
        self.check()?;
        self.highlights.insert(unified_id.clone(), selector.clone());
        Ok(())
    }

    async fn render_highlights(
        &self,
        annotations: &[UnifiedAnnotation],
        on_click: HighlightClickHandler,
    ) -> GatewayResult<usize> {
        self.check()?;
        *self.on_click.lock().unwrap_or_else(PoisonError::into_inner) = Some(on_click);
        let mut drawn = 0;
        for annotation in annotations {
            if let Some(selector) = &annotation.selector {
                self.highlights
                    .insert(annotation.unified_id.clone(), selector.clone());
                drawn += 1;
            }
        }
        Ok(drawn)
    }

    fn remove_annotation_highlight(&self, unified_id: &UnifiedAnnotationId) {
        self.highlights.remove(unified_id);
    }

    async fn remove_highlights(&self) -> GatewayResult<()> {
        self.highlights.clear();
        Ok(())
    }
}

/// Preferences held in memory
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    auto_share: AtomicBool,
    page_defaults: DashMap<String, PrivacyLevel>,
}

impl MemoryPreferences {
    pub fn new(auto_share: bool) -> Self {
        Self {
            auto_share: AtomicBool::new(auto_share),
            page_defaults: DashMap::new(),
        }
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferences {
    async fn auto_share(&self) -> GatewayResult<bool> {
        Ok(self.auto_share.load(Ordering::SeqCst))
    }

    async fn set_auto_share(&self, value: bool) -> GatewayResult<()> {
        self.auto_share.store(value, Ordering::SeqCst);
        Ok(())
    }

    async fn page_privacy_default(&self, normalized_page_url: &str) -> GatewayResult<Option<PrivacyLevel>> {
        Ok(self.page_defaults.get(normalized_page_url).map(|r| *r))
    }

    async fn set_page_privacy_default(
        &self,
        normalized_page_url: &str,
        level: Option<PrivacyLevel>,
    ) -> GatewayResult<()> {
        match level {
            Some(level) => {
                self.page_defaults.insert(normalized_page_url.to_string(), level);
            }
            None => {
                self.page_defaults.remove(normalized_page_url);
            }
        }
        Ok(())
    }
}

/// Loader that "injects" components instantly, optionally after a delay
#[derive(Debug, Default)]
pub struct MemoryLoader {
    calls: DashMap<Component, usize>,
    failing: DashMap<Component, String>,
    delay_ms: AtomicUsize,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.delay_ms.store(delay.as_millis() as usize, Ordering::SeqCst);
        self
    }

    /// Make loads of one component fail with the given message
    pub fn fail(&self, component: Component, message: impl Into<String>) {
        self.failing.insert(component, message.into());
    }

    pub fn recover(&self, component: Component) {
        self.failing.remove(&component);
    }

    /// How many times the loader ran for a component
    pub fn calls(&self, component: Component) -> usize {
        self.calls.get(&component).map(|r| *r).unwrap_or(0)
    }
}

#[async_trait]
impl ComponentLoader for MemoryLoader {
    async fn load(&self, component: Component) -> GatewayResult<()> {
        *self.calls.entry(component).or_insert(0) += 1;
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        match self.failing.get(&component) {
            Some(message) => Err(GatewayError::Load(message.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ShareOpts;
    use crate::gateway::NewAnnotation;
    use chrono::Utc;

    fn request(local_id: &str, should_share: bool) -> CreateAnnotationRequest {
        CreateAnnotationRequest {
            annotation: NewAnnotation {
                local_id: LocalAnnotationId::from(local_id),
                full_page_url: "https://example.com/a".into(),
                page_title: None,
                body: Some("quote".into()),
                comment: None,
                selector: None,
                local_list_ids: Vec::new(),
                created_when: Utc::now(),
            },
            share_opts: ShareOpts {
                should_share,
                is_bulk_share_protected: false,
            },
            privacy_level_override: None,
        }
    }

    #[tokio::test]
    async fn shared_creates_get_remote_ids() {
        let store = MemoryPersistence::new();
        let saved = store.create_annotation(request("a", true)).await.unwrap();
        assert!(saved.remote_id.is_some());

        let saved = store.create_annotation(request("b", false)).await.unwrap();
        assert!(saved.remote_id.is_none());

        let records = store.fetch_page_annotations("https://example.com/a").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(store.create_calls(), 2);
    }

    #[tokio::test]
    async fn failing_store_rejects_writes() {
        let store = MemoryPersistence::new();
        store.set_fail_writes(true);
        let err = store.create_annotation(request("a", false)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Persistence(_)));
        assert_eq!(store.annotation_count(), 0);
    }

    #[tokio::test]
    async fn list_ids_stay_ahead_of_seeded_lists() {
        let store = MemoryPersistence::new();
        store.insert_list(ListRecord {
            local_id: 10,
            remote_id: None,
            name: "seeded".into(),
            description: None,
        });
        let created = store.create_list("new").await.unwrap();
        assert_eq!(created.local_id, 11);

        store.add_page_to_list("p", 10);
        store.delete_list(10).await.unwrap();
        assert!(store.fetch_page_lists("p").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn page_defaults_can_be_cleared() {
        let prefs = MemoryPreferences::new(false);
        prefs
            .set_page_privacy_default("p", Some(PrivacyLevel::Shared))
            .await
            .unwrap();
        assert_eq!(prefs.page_privacy_default("p").await.unwrap(), Some(PrivacyLevel::Shared));
        prefs.set_page_privacy_default("p", None).await.unwrap();
        assert_eq!(prefs.page_privacy_default("p").await.unwrap(), None);
    }
}
