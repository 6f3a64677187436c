//! Per-page annotation cache

mod events;
mod hydrate;
mod ids;
mod queries;
mod store;
mod types;


pub use events::CacheEvent;
pub use hydrate::{hydrate_cache_for_page, HydrationSummary};
pub use ids::{
    generate_annotation_local_id, IdSequence, LocalAnnotationId, LocalListId, PageContextId,
    RemoteId, UnifiedAnnotationId, UnifiedListId,
};
pub use queries::list_ownership;
pub use store::{CacheError, CacheResult, PageAnnotationsCache};
pub use types::{
    Anchor, AnnotationForCache, AnnotationPatch, ListForCache, ListOwnership, ListPatch,
    MutationOpts, PrivacyLevel, ShareOpts, UnifiedAnnotation, UnifiedList, UpdateAnnotationOpts,
    UserReference, DEFAULT_HIGHLIGHT_COLOR,
};
