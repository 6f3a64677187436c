//! Folio: per-page annotation cache and in-page UI orchestration
//!
//! Everything an annotation UI needs inside one page context, minus the UI:
//!
//! - **Cache**: the in-memory authority for a page's annotations and lists,
//!   with optimistic updates and typed change events
//! - **Pipeline**: creates and deletes annotations against the cache first,
//!   persisting in the background and rolling back on failure
//! - **Orchestrator**: loads each UI component at most once and never
//!   reports a component shown before it has loaded
//!
//! # Example
//!
//! ```
//! use folio::{AnnotationForCache, MutationOpts, PageAnnotationsCache};
//!
//! let cache = PageAnnotationsCache::new();
//! let id = cache.add_annotation(
//!     AnnotationForCache::new("example.com/post").with_body("a quote"),
//!     MutationOpts::default(),
//! );
//! assert!(cache.has_annotation(&id));
//! ```

pub mod bus;
pub mod cache;
pub mod config;
pub mod gateway;
pub mod in_page_ui;
pub mod logging;
pub mod page;
pub mod pipeline;

pub use bus::EventBus;
pub use cache::{
    AnnotationForCache, AnnotationPatch, CacheError, CacheEvent, CacheResult, ListForCache,
    MutationOpts, PageAnnotationsCache, PrivacyLevel, UnifiedAnnotation, UnifiedAnnotationId,
    UnifiedList, UnifiedListId,
};
pub use config::{ConfigError, FolioConfig};
pub use gateway::{AnchoringService, GatewayError, PersistenceGateway, PreferenceStore};
pub use in_page_ui::{Component, InPageUiEvent, LoadError, SharedInPageUiState};
pub use page::{PageInfo, PageSession, PageSessionDeps};
pub use pipeline::{CreationPipeline, CreationState, PipelineError, PipelineResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
