//! Cache behaviour seen from a page session: idempotent removal, list
//! cascades, and quiet hydration.

mod common;

use common::{harness, harness_with, list_record, store_with_highlights, stored_highlight, GatedLoader, PAGE_URL};
use folio::bus::drain;
use folio::cache::{AnnotationForCache, ListForCache, MutationOpts, RemoteId, UserReference};
use folio::gateway::{FollowedListRecord, MemoryPersistence};
use folio::{CacheEvent, PrivacyLevel};

#[tokio::test]
async fn removing_twice_matches_removing_once() {
    let h = harness();
    let cache = h.session.cache();
    let keep = cache.add_annotation(AnnotationForCache::new("p").with_body("keep"), MutationOpts::default());
    let gone = cache.add_annotation(AnnotationForCache::new("p").with_body("gone"), MutationOpts::default());

    assert!(cache.remove_annotation(&gone, MutationOpts::default()).is_some());
    let after_once = cache.annotations();
    assert!(cache.remove_annotation(&gone, MutationOpts::default()).is_none());

    assert_eq!(cache.annotations(), after_once);
    assert!(cache.has_annotation(&keep));
}

#[tokio::test]
async fn removing_a_list_cascades_to_its_annotations() {
    let h = harness();
    let cache = h.session.cache();
    let list = cache.add_list(ListForCache::new("to read").with_local_id(3), MutationOpts::default());
    let other = cache.add_list(ListForCache::new("later").with_local_id(4), MutationOpts::default());
    let a = cache.add_annotation(
        AnnotationForCache::new("p").with_body("a").with_lists(vec![list.clone(), other.clone()]),
        MutationOpts::default(),
    );
    let b = cache.add_annotation(
        AnnotationForCache::new("p").with_body("b").with_lists(vec![list.clone()]),
        MutationOpts::default(),
    );

    cache.remove_list(&list, MutationOpts::default());

    assert!(cache.list(&list).is_none());
    assert_eq!(cache.annotation(&a).unwrap().unified_list_ids, vec![other.clone()]);
    assert!(cache.annotation(&b).unwrap().unified_list_ids.is_empty());
    assert_eq!(cache.list(&other).unwrap().unified_annotation_ids, vec![a]);
}

#[tokio::test]
async fn hydrating_fifty_annotations_emits_one_event() {
    let h = harness_with(store_with_highlights(50), GatedLoader::open(), false);
    let mut events = h.session.cache().events().subscribe();

    let summary = h.session.hydrate().await.unwrap();

    assert_eq!(summary.annotations, 50);
    assert_eq!(h.session.cache().annotation_count(), 50);
    let events = drain(&mut events);
    assert!(events.len() <= 1, "got {} events", events.len());
    assert!(matches!(events.as_slice(), [CacheEvent::UpdatedPageData { .. }]));
}

#[tokio::test]
async fn hydration_keeps_newest_first_and_mutations_emit_afterwards() {
    let h = harness_with(store_with_highlights(3), GatedLoader::open(), false);
    h.session.hydrate().await.unwrap();
    let bodies: Vec<_> = h
        .session
        .cache()
        .annotations()
        .into_iter()
        .filter_map(|a| a.body)
        .collect();
    assert_eq!(bodies, vec!["quote 2", "quote 1", "quote 0"]);

    let mut events = h.session.cache().events().subscribe();
    h.session
        .cache()
        .add_annotation(AnnotationForCache::new("p").with_body("live"), MutationOpts::default());
    assert_eq!(drain(&mut events).len(), 1);
}

#[tokio::test]
async fn hydration_resolves_lists_and_shared_page_membership() {
    let store = MemoryPersistence::new();
    store.insert_list(list_record(1, "Private shelf", None));
    store.insert_list(list_record(2, "Public shelf", Some("remote-list-2")));
    store.add_page_to_list(PAGE_URL, 1);
    store.add_page_to_list(PAGE_URL, 2);
    store.insert_followed_list(FollowedListRecord {
        remote_id: RemoteId::from("remote-list-9"),
        name: "Followed".into(),
        creator: UserReference::new("someone-else"),
        has_annotations_from_others: true,
    });

    let mut in_private_list = stored_highlight(0, PrivacyLevel::Private);
    in_private_list.local_list_ids = vec![1];
    let mut in_public_list = stored_highlight(1, PrivacyLevel::Private);
    in_public_list.local_list_ids = vec![2];
    let shared = stored_highlight(2, PrivacyLevel::Shared);
    for record in [in_private_list.clone(), in_public_list.clone(), shared.clone()] {
        store.insert_annotation(PAGE_URL, record);
    }

    let h = harness_with(store, GatedLoader::open(), false);
    let summary = h.session.hydrate().await.unwrap();
    assert_eq!(summary.lists, 3);

    let cache = h.session.cache();
    let private_list = cache.get_list_by_local_id(1).unwrap();
    let public_list = cache.get_list_by_local_id(2).unwrap();
    let followed = cache.get_list_by_remote_id(&RemoteId::from("remote-list-9")).unwrap();
    assert!(followed.has_remote_annotations_to_load);
    assert!(followed.local_id.is_none());

    let page = &h.session.page().normalized_page_url;
    assert_eq!(cache.page_list_ids(page).len(), 2);
    assert_eq!(cache.shared_page_list_ids(page), vec![public_list.unified_id.clone()]);

    let a = cache.get_annotation_by_local_id(&in_private_list.local_id).unwrap();
    assert_eq!(a.privacy_level, PrivacyLevel::Private);
    assert_eq!(a.unified_list_ids, vec![private_list.unified_id.clone()]);

    let b = cache.get_annotation_by_local_id(&in_public_list.local_id).unwrap();
    assert_eq!(b.privacy_level, PrivacyLevel::Protected);

    let c = cache.get_annotation_by_local_id(&shared.local_id).unwrap();
    assert_eq!(c.unified_list_ids, vec![public_list.unified_id.clone()]);
    assert_eq!(
        cache.get_annotation_by_remote_id(shared.remote_id.as_ref().unwrap()).map(|x| x.unified_id),
        Some(c.unified_id.clone())
    );
    assert!(cache
        .list(&public_list.unified_id)
        .unwrap()
        .unified_annotation_ids
        .contains(&c.unified_id));
}

#[tokio::test]
async fn hydrating_twice_does_not_duplicate() {
    let h = harness_with(store_with_highlights(5), GatedLoader::open(), false);
    h.session.hydrate().await.unwrap();
    h.session.hydrate().await.unwrap();
    assert_eq!(h.session.cache().annotation_count(), 5);
}

#[tokio::test]
async fn shared_annotation_in_an_off_page_shared_list_hydrates_quietly() {
    let store = MemoryPersistence::new();
    store.insert_list(list_record(4, "Notes", None));
    store.insert_list(list_record(5, "Elsewhere", Some("remote-list-5")));
    let mut shared = stored_highlight(0, PrivacyLevel::Shared);
    shared.local_list_ids = vec![4, 5];
    store.insert_annotation(PAGE_URL, shared.clone());

    let h = harness_with(store, GatedLoader::open(), false);
    let mut events = h.session.cache().events().subscribe();
    h.session.hydrate().await.unwrap();

    let events = drain(&mut events);
    assert!(
        matches!(events.as_slice(), [CacheEvent::UpdatedPageData { .. }]),
        "got {events:?}"
    );

    let cache = h.session.cache();
    let private_list = cache.get_list_by_local_id(4).unwrap();
    let off_page = cache.get_list_by_local_id(5).unwrap();
    let annotation = cache.get_annotation_by_local_id(&shared.local_id).unwrap();
    assert_eq!(annotation.unified_list_ids, vec![private_list.unified_id]);
    assert!(!cache
        .list(&off_page.unified_id)
        .unwrap()
        .unified_annotation_ids
        .contains(&annotation.unified_id));
}
