//! One page context: cache, UI orchestrator and creation pipeline together
//!
//! `PageSession` is what an embedding UI talks to. It owns exactly one
//! cache and one orchestrator; nothing is shared across pages.

use crate::bus::EventBus;
use crate::cache::{
    hydrate_cache_for_page, HydrationSummary, PageAnnotationsCache, PageContextId, UserReference,
};
use crate::config::FolioConfig;
use crate::gateway::{AnchoringService, ComponentLoader, PersistenceGateway, PreferenceStore};
use crate::in_page_ui::{ComponentRegistry, InPageUiDeps, SharedInPageUiState};
use crate::pipeline::{CreationPipeline, PipelineDeps, PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity of the page a context is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub full_page_url: String,
    pub normalized_page_url: String,
    pub title: Option<String>,
}

impl PageInfo {
    pub fn from_url(url: impl Into<String>) -> Self {
        let full_page_url = url.into();
        Self {
            normalized_page_url: normalize_url(&full_page_url),
            full_page_url,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Normalize a page URL for use as a cache key.
///
/// Drops the scheme, a leading `www.`, the fragment, `utm_*` tracking
/// parameters and any trailing slash; lowercases the host.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let without_fragment = without_scheme
        .split_once('#')
        .map_or(without_scheme, |(before, _)| before);
    let (location, query) = without_fragment
        .split_once('?')
        .map_or((without_fragment, None), |(l, q)| (l, Some(q)));

    let (host, path) = location
        .split_once('/')
        .map_or((location, ""), |(h, p)| (h, p));
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut normalized = host.to_string();
    let path = path.trim_end_matches('/');
    if !path.is_empty() {
        normalized.push('/');
        normalized.push_str(path);
    }

    let kept: Vec<&str> = query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .filter(|param| !param.is_empty() && !param.starts_with("utm_"))
        .collect();
    if !kept.is_empty() {
        normalized.push('?');
        normalized.push_str(&kept.join("&"));
    }
    normalized
}

/// Collaborators a page session is built from
#[derive(Clone)]
pub struct PageSessionDeps {
    pub anchoring: Arc<dyn AnchoringService>,
    pub persistence: Arc<dyn PersistenceGateway>,
    pub preferences: Arc<dyn PreferenceStore>,
    /// Loader for the ribbon, sidebar and tooltip
    pub loader: Arc<dyn ComponentLoader>,
    pub user: Option<UserReference>,
}

/// Everything one page context owns
pub struct PageSession {
    context_id: PageContextId,
    page: PageInfo,
    cache: Arc<PageAnnotationsCache>,
    ui: SharedInPageUiState,
    pipeline: CreationPipeline,
    persistence: Arc<dyn PersistenceGateway>,
    user: Option<UserReference>,
}

impl std::fmt::Debug for PageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSession")
            .field("context_id", &self.context_id)
            .field("page", &self.page)
            .field("annotations", &self.cache.annotation_count())
            .finish()
    }
}

impl PageSession {
    pub fn new(page: PageInfo, deps: PageSessionDeps, config: &FolioConfig) -> Self {
        let context_id = PageContextId::new();
        let cache = Arc::new(
            PageAnnotationsCache::with_events(Arc::new(EventBus::new(config.event_capacity)))
                .with_default_color(config.default_highlight_color.clone())
                .with_debug(config.debug),
        );
        let ui = SharedInPageUiState::with_options(
            InPageUiDeps {
                cache: cache.clone(),
                anchoring: deps.anchoring.clone(),
                registry: ComponentRegistry::with_script_loader(deps.loader),
            },
            Arc::new(EventBus::new(config.event_capacity)),
            config.pending_action_ttl(),
        );
        let pipeline = CreationPipeline::new(PipelineDeps {
            cache: cache.clone(),
            ui: ui.clone(),
            anchoring: deps.anchoring,
            persistence: deps.persistence.clone(),
            preferences: deps.preferences,
            page: page.clone(),
            user: deps.user.clone(),
        });
        tracing::info!(%context_id, page = %page.normalized_page_url, "page session created");
        Self {
            context_id,
            page,
            cache,
            ui,
            pipeline,
            persistence: deps.persistence,
            user: deps.user,
        }
    }

    /// Load the page's lists and annotations and the sharing preferences.
    ///
    /// The cache is filled silently; subscribers see one `UpdatedPageData`.
    pub async fn hydrate(&self) -> PipelineResult<HydrationSummary> {
        let summary = hydrate_cache_for_page(
            &self.cache,
            self.persistence.as_ref(),
            &self.page,
            self.user.as_ref(),
        )
        .await
        .map_err(PipelineError::Persistence)?;
        self.pipeline.refresh_preferences().await?;
        Ok(summary)
    }

    pub fn context_id(&self) -> PageContextId {
        self.context_id
    }

    pub fn page(&self) -> &PageInfo {
        &self.page
    }

    pub fn cache(&self) -> &Arc<PageAnnotationsCache> {
        &self.cache
    }

    pub fn ui(&self) -> &SharedInPageUiState {
        &self.ui
    }

    pub fn pipeline(&self) -> &CreationPipeline {
        &self.pipeline
    }
}
