//! Initial bulk load of a page's lists and annotations into the cache
//!
//! Rows are inserted silently; the single `UpdatedPageData` emitted by
//! `set_page_data` at the end tells subscribers hydration is done.

use super::store::PageAnnotationsCache;
use super::types::{AnnotationForCache, ListForCache, MutationOpts, UserReference};
use super::ids::UnifiedListId;
use crate::gateway::{GatewayResult, PersistenceGateway};
use crate::page::PageInfo;
use std::collections::{HashMap, HashSet};

/// What a hydration pass loaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrationSummary {
    pub lists: usize,
    pub annotations: usize,
}

/// Load every list and the page's annotations into `cache`.
///
/// Lists go in first so annotations can resolve their on-device list ids.
/// Shared annotations get their final lists up front (the page's shared
/// lists plus their own non-shared ones), so the page-data update at the
/// end changes nothing and emits only `UpdatedPageData`.
pub async fn hydrate_cache_for_page(
    cache: &PageAnnotationsCache,
    gateway: &dyn PersistenceGateway,
    page: &PageInfo,
    user: Option<&UserReference>,
) -> GatewayResult<HydrationSummary> {
    let silent = MutationOpts::silent();
    let mut summary = HydrationSummary::default();

    let local_lists = gateway.fetch_all_lists().await?;
    let followed_lists: HashMap<_, _> = gateway
        .fetch_followed_lists(&page.full_page_url)
        .await?
        .into_iter()
        .map(|f| (f.remote_id.clone(), f))
        .collect();

    let mut seen_followed = HashSet::new();
    for list in local_lists {
        let mut data = ListForCache {
            local_id: Some(list.local_id),
            remote_id: list.remote_id.clone(),
            name: list.name,
            description: list.description,
            creator: user.cloned(),
            ..Default::default()
        };
        if let Some(followed) = list.remote_id.as_ref().and_then(|r| followed_lists.get(r)) {
            seen_followed.insert(followed.remote_id.clone());
            data.creator = Some(followed.creator.clone());
            data.has_remote_annotations_to_load = followed.has_annotations_from_others;
        }
        cache.add_list(data, silent);
        summary.lists += 1;
    }
    for followed in followed_lists.values().filter(|f| !seen_followed.contains(&f.remote_id)) {
        cache.add_list(
            ListForCache {
                remote_id: Some(followed.remote_id.clone()),
                name: followed.name.clone(),
                creator: Some(followed.creator.clone()),
                has_remote_annotations_to_load: followed.has_annotations_from_others,
                ..Default::default()
            },
            silent,
        );
        summary.lists += 1;
    }

    let page_list_ids: Vec<UnifiedListId> = gateway
        .fetch_page_lists(&page.full_page_url)
        .await?
        .into_iter()
        .filter_map(|local_id| cache.get_list_by_local_id(local_id))
        .map(|list| list.unified_id)
        .collect();
    let shared_page_list_ids: Vec<UnifiedListId> = page_list_ids
        .iter()
        .filter(|id| cache.list(id).map_or(false, |l| l.is_shared()))
        .cloned()
        .collect();

    let mut records = gateway.fetch_page_annotations(&page.full_page_url).await?;
    records.sort_by_key(|r| r.created_when);
    for mut record in records {
        // A shared annotation sits in exactly the page's shared lists plus its own private ones
        let inherited = if record.privacy_level.is_shared() {
            record.local_list_ids.retain(|local_id| {
                cache
                    .get_list_by_local_id(*local_id)
                    .map_or(true, |list| !list.is_shared())
            });
            shared_page_list_ids.clone()
        } else {
            Vec::new()
        };
        cache.add_annotation(
            AnnotationForCache {
                local_id: Some(record.local_id),
                remote_id: record.remote_id,
                normalized_page_url: page.normalized_page_url.clone(),
                body: record.body,
                comment: record.comment,
                selector: record.selector,
                color: record.color,
                creator: user.cloned(),
                created_when: Some(record.created_when),
                last_edited: Some(record.last_edited),
                privacy_level: record.privacy_level,
                unified_list_ids: inherited,
                local_list_ids: record.local_list_ids,
            },
            silent,
        );
        summary.annotations += 1;
    }

    cache.set_page_data(&page.normalized_page_url, page_list_ids);
    tracing::info!(
        page = %page.normalized_page_url,
        lists = summary.lists,
        annotations = summary.annotations,
        "page cache hydrated"
    );
    Ok(summary)
}
