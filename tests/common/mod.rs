//! Shared fixtures for folio integration tests

#![allow(dead_code)]

pub mod mock_loader;

pub use mock_loader::GatedLoader;

use chrono::{Duration, TimeZone, Utc};
use folio::cache::{generate_annotation_local_id, Anchor, RemoteId};
use folio::gateway::{
    AnnotationRecord, ListRecord, MemoryAnchoring, MemoryPersistence, MemoryPreferences,
};
use folio::{FolioConfig, PageInfo, PageSession, PageSessionDeps, PrivacyLevel};
use std::sync::Arc;

pub const PAGE_URL: &str = "https://www.example.com/articles/rust-ownership/";

pub fn page() -> PageInfo {
    PageInfo::from_url(PAGE_URL).with_title("Understanding ownership")
}

/// Collaborators of a session, kept so tests can steer and inspect them
pub struct Harness {
    pub session: PageSession,
    pub store: Arc<MemoryPersistence>,
    pub anchoring: Arc<MemoryAnchoring>,
    pub prefs: Arc<MemoryPreferences>,
    pub loader: Arc<GatedLoader>,
}

pub fn harness_with(store: MemoryPersistence, loader: GatedLoader, auto_share: bool) -> Harness {
    let store = Arc::new(store);
    let anchoring = Arc::new(MemoryAnchoring::new());
    let prefs = Arc::new(MemoryPreferences::new(auto_share));
    let loader = Arc::new(loader);
    let session = PageSession::new(
        page(),
        PageSessionDeps {
            anchoring: anchoring.clone(),
            persistence: store.clone(),
            preferences: prefs.clone(),
            loader: loader.clone(),
            user: None,
        },
        &FolioConfig::default(),
    );
    Harness {
        session,
        store,
        anchoring,
        prefs,
        loader,
    }
}

pub fn harness() -> Harness {
    harness_with(MemoryPersistence::new(), GatedLoader::open(), false)
}

/// A stored highlight created `index` seconds after a fixed instant
pub fn stored_highlight(index: usize, privacy_level: PrivacyLevel) -> AnnotationRecord {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let created_when = base + Duration::seconds(index as i64);
    let quote = format!("quote {index}");
    AnnotationRecord {
        local_id: generate_annotation_local_id(PAGE_URL, created_when.timestamp_millis()),
        remote_id: privacy_level
            .is_shared()
            .then(|| RemoteId::from_string(format!("remote-annotation-{index}"))),
        body: Some(quote.clone()),
        comment: None,
        selector: Some(Anchor::new(quote)),
        color: None,
        created_when,
        last_edited: created_when,
        privacy_level,
        local_list_ids: Vec::new(),
    }
}

/// A store holding `count` private highlights for the test page
pub fn store_with_highlights(count: usize) -> MemoryPersistence {
    let store = MemoryPersistence::new();
    for i in 0..count {
        store.insert_annotation(PAGE_URL, stored_highlight(i, PrivacyLevel::Private));
    }
    store
}

pub fn list_record(local_id: i64, name: &str, remote_id: Option<&str>) -> ListRecord {
    ListRecord {
        local_id,
        remote_id: remote_id.map(RemoteId::from),
        name: name.to_string(),
        description: None,
    }
}
