//! CreationPipeline: optimistic annotation writes with rollback
//!
//! The cache write happens before any call to persistence, so the new
//! annotation is visible the moment `schedule_annotation_creation` returns.
//! Persistence runs on a spawned task whose handle is returned to the
//! caller. If it fails, the entry is removed again and the error is shown.

use super::privacy::{resolve_privacy_level, share_opts_for, SharingPreference};
use super::state::{CreationAttempt, CreationState, CreationTracker};
use crate::cache::{
    generate_annotation_local_id, Anchor, AnnotationForCache, AnnotationPatch, CacheError,
    ListForCache, LocalAnnotationId, MutationOpts, PageAnnotationsCache, UnifiedAnnotationId,
    UnifiedListId, UpdateAnnotationOpts, UserReference,
};
use crate::gateway::{
    AnchoringService, CreateAnnotationRequest, GatewayError, NewAnnotation, PersistenceGateway,
    PreferenceStore, SavedAnnotation, Selection,
};
use crate::in_page_ui::{
    Component, LoadError, SharedInPageUiState, SidebarAction, SidebarActionOptions,
};
use crate::page::PageInfo;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("{0}")]
    Persistence(GatewayError),

    #[error("{0}")]
    Anchoring(GatewayError),

    #[error("{0}")]
    Preferences(GatewayError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Collaborators of one page's pipeline
pub struct PipelineDeps {
    pub cache: Arc<PageAnnotationsCache>,
    pub ui: SharedInPageUiState,
    pub anchoring: Arc<dyn AnchoringService>,
    pub persistence: Arc<dyn PersistenceGateway>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub page: PageInfo,
    pub user: Option<UserReference>,
}

/// Content of an annotation about to be created
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationDraft {
    pub body: Option<String>,
    pub comment: Option<String>,
    pub selector: Option<Anchor>,
    /// Explicit share choice for this annotation
    pub should_share: Option<bool>,
}

impl AnnotationDraft {
    pub fn highlight(anchor: Anchor) -> Self {
        Self {
            body: Some(anchor.quote.clone()),
            selector: Some(anchor),
            ..Default::default()
        }
    }

    pub fn note(comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..Default::default()
        }
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    pub fn sharing(mut self, should_share: Option<bool>) -> Self {
        self.should_share = should_share;
        self
    }
}

/// An annotation already in the cache, with its persistence still running
#[derive(Debug)]
pub struct CreatedAnnotation {
    pub unified_id: UnifiedAnnotationId,
    pub local_id: LocalAnnotationId,
    pub create_task: JoinHandle<PipelineResult<SavedAnnotation>>,
    /// This attempt's state, unaffected by later creations
    pub state: watch::Receiver<CreationState>,
}

impl CreatedAnnotation {
    pub fn creation_state(&self) -> CreationState {
        *self.state.borrow()
    }

    /// Wait until the annotation is durable (or rolled back)
    pub async fn persisted(self) -> PipelineResult<SavedAnnotation> {
        match self.create_task.await {
            Ok(result) => result,
            Err(err) => Err(PipelineError::Persistence(GatewayError::Persistence(format!(
                "save task did not complete: {err}"
            )))),
        }
    }
}

/// The parts of the pipeline a background save needs
struct SaveJob {
    cache: Arc<PageAnnotationsCache>,
    persistence: Arc<dyn PersistenceGateway>,
    anchoring: Arc<dyn AnchoringService>,
    ui: SharedInPageUiState,
    attempt: CreationAttempt,
}

impl SaveJob {
    async fn run(
        self,
        unified_id: UnifiedAnnotationId,
        request: CreateAnnotationRequest,
    ) -> PipelineResult<SavedAnnotation> {
        match self.persistence.create_annotation(request).await {
            Ok(saved) => {
                if let Some(remote_id) = &saved.remote_id {
                    // Merge only the remote id; lists and privacy may have been edited since.
                    let patch = AnnotationPatch::remote_id(remote_id.clone());
                    if let Err(err) =
                        self.cache
                            .update_annotation(&unified_id, patch, UpdateAnnotationOpts::default())
                    {
                        tracing::debug!(%unified_id, error = %err, "annotation gone before save finished");
                    }
                }
                tracing::debug!(%unified_id, shared = saved.remote_id.is_some(), "annotation saved");
                Ok(saved)
            }
            Err(err) => {
                tracing::error!(%unified_id, error = %err, "annotation save failed, rolling back");
                self.cache.remove_annotation(&unified_id, MutationOpts::default());
                self.anchoring.remove_annotation_highlight(&unified_id);
                self.ui.show_error(format!("Could not save annotation: {err}"));
                self.attempt.set(CreationState::Error);
                Err(PipelineError::Persistence(err))
            }
        }
    }
}

/// Creates and deletes annotations and lists for one page.
pub struct CreationPipeline {
    deps: PipelineDeps,
    preference: Mutex<SharingPreference>,
    state: CreationTracker,
    last_created_ms: AtomicI64,
}

impl std::fmt::Debug for CreationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreationPipeline")
            .field("page", &self.deps.page.normalized_page_url)
            .field("state", &self.state.get())
            .field("preference", &self.sharing_preference())
            .finish()
    }
}

impl CreationPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self {
            deps,
            preference: Mutex::new(SharingPreference::default()),
            state: CreationTracker::new(),
            last_created_ms: AtomicI64::new(0),
        }
    }

    /// State of the most recently started attempt
    pub fn creation_state(&self) -> CreationState {
        self.state.get()
    }

    pub fn watch_creation_state(&self) -> watch::Receiver<CreationState> {
        self.state.watch()
    }

    /// Preferences used for the next creation
    pub fn sharing_preference(&self) -> SharingPreference {
        *self.preference.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-read sharing preferences from the store
    pub async fn refresh_preferences(&self) -> PipelineResult<SharingPreference> {
        let prefs = &self.deps.preferences;
        let auto_share = prefs.auto_share().await.map_err(PipelineError::Preferences)?;
        let page_default = prefs
            .page_privacy_default(&self.deps.page.normalized_page_url)
            .await
            .map_err(PipelineError::Preferences)?;
        let preference = SharingPreference {
            auto_share,
            page_default,
        };
        *self.preference.lock().unwrap_or_else(PoisonError::into_inner) = preference;
        Ok(preference)
    }

    pub async fn set_auto_share(&self, value: bool) -> PipelineResult<SharingPreference> {
        self.deps
            .preferences
            .set_auto_share(value)
            .await
            .map_err(PipelineError::Preferences)?;
        self.refresh_preferences().await
    }

    /// Strictly increasing creation time, so local ids never collide
    fn next_creation_time(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        let previous = self
            .last_created_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now_ms.max(last + 1))
            })
            .unwrap_or(now_ms);
        let ms = now_ms.max(previous + 1);
        DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(now)
    }

    /// Put an annotation in the cache now and persist it in the background.
    ///
    /// Never suspends: the returned id is already in the cache.
    pub fn schedule_annotation_creation(&self, draft: AnnotationDraft) -> CreatedAnnotation {
        self.schedule_attempt(self.state.begin(), draft)
    }

    fn schedule_attempt(&self, attempt: CreationAttempt, draft: AnnotationDraft) -> CreatedAnnotation {
        let PipelineDeps {
            cache, ui, page, user, ..
        } = &self.deps;

        let selected_list = ui.selected_list().and_then(|id| cache.list(&id));
        let privacy_level =
            resolve_privacy_level(selected_list.as_ref(), draft.should_share, &self.sharing_preference());
        let created_when = self.next_creation_time();
        let local_id = generate_annotation_local_id(&page.full_page_url, created_when.timestamp_millis());

        let unified_id = cache.add_annotation(
            AnnotationForCache {
                local_id: Some(local_id.clone()),
                normalized_page_url: page.normalized_page_url.clone(),
                body: draft.body.clone(),
                comment: draft.comment.clone(),
                selector: draft.selector.clone(),
                creator: user.clone(),
                created_when: Some(created_when),
                privacy_level,
                unified_list_ids: selected_list.iter().map(|l| l.unified_id.clone()).collect(),
                ..Default::default()
            },
            MutationOpts::default(),
        );
        attempt.set(CreationState::Success);

        // The cache may have adjusted privacy and lists (shared page lists, protected).
        let (privacy_level, list_ids) = cache
            .annotation(&unified_id)
            .map(|a| (a.privacy_level, a.unified_list_ids))
            .unwrap_or((privacy_level, Vec::new()));
        tracing::info!(%unified_id, %local_id, privacy = %privacy_level, "annotation created");

        let request = CreateAnnotationRequest {
            annotation: NewAnnotation {
                local_id: local_id.clone(),
                full_page_url: page.full_page_url.clone(),
                page_title: page.title.clone(),
                body: draft.body,
                comment: draft.comment,
                selector: draft.selector,
                local_list_ids: cache.local_list_ids_for(&list_ids),
                created_when,
            },
            share_opts: share_opts_for(privacy_level),
            privacy_level_override: Some(privacy_level),
        };
        let job = SaveJob {
            cache: cache.clone(),
            persistence: self.deps.persistence.clone(),
            anchoring: self.deps.anchoring.clone(),
            ui: ui.clone(),
            attempt: attempt.clone(),
        };
        let create_task = tokio::spawn(job.run(unified_id.clone(), request));

        CreatedAnnotation {
            unified_id,
            local_id,
            create_task,
            state: attempt.watch(),
        }
    }

    /// Highlight the selection. An empty or missing selection creates nothing.
    pub async fn create_highlight(
        &self,
        selection: Option<&Selection>,
        should_share: Option<bool>,
    ) -> PipelineResult<Option<CreatedAnnotation>> {
        self.highlight_selection(selection, should_share, None).await
    }

    /// Highlight the selection and open the sidebar to edit it.
    ///
    /// Without a selection the sidebar opens on a blank comment and nothing
    /// is written.
    pub async fn create_annotation(
        &self,
        selection: Option<&Selection>,
        should_share: Option<bool>,
        show_space_picker: bool,
        comment: Option<String>,
    ) -> PipelineResult<Option<CreatedAnnotation>> {
        let Some(created) = self.highlight_selection(selection, should_share, comment).await? else {
            self.deps
                .ui
                .show_sidebar(Some(SidebarActionOptions::new(SidebarAction::Comment)))
                .await?;
            return Ok(None);
        };
        let action = if show_space_picker {
            SidebarAction::EditAnnotationSpaces
        } else {
            SidebarAction::EditAnnotation
        };
        self.deps
            .ui
            .show_sidebar(Some(SidebarActionOptions::for_annotation(
                action,
                created.unified_id.clone(),
            )))
            .await?;
        Ok(Some(created))
    }

    async fn highlight_selection(
        &self,
        selection: Option<&Selection>,
        should_share: Option<bool>,
        comment: Option<String>,
    ) -> PipelineResult<Option<CreatedAnnotation>> {
        let Some(selection) = selection.filter(|s| !s.is_collapsed()) else {
            tracing::debug!("empty selection, nothing to create");
            return Ok(None);
        };
        let attempt = self.state.begin();

        let anchoring = &self.deps.anchoring;
        let anchor = match anchoring.selection_to_descriptor(selection, &self.deps.page).await {
            Ok(anchor) => anchor,
            Err(err) => {
                tracing::warn!(error = %err, "selection could not be anchored");
                attempt.set(CreationState::Error);
                return Err(PipelineError::Anchoring(err));
            }
        };

        let created = self.schedule_attempt(
            attempt,
            AnnotationDraft::highlight(anchor.clone())
                .with_comment(comment)
                .sharing(should_share),
        );
        let id = &created.unified_id;
        if let Err(err) = anchoring.highlight_and_scroll(id, &anchor).await {
            tracing::warn!(unified_id = %id, error = %err, "could not draw highlight");
        } else if !self.deps.cache.has_annotation(id) {
            // Rolled back while drawing
            anchoring.remove_annotation_highlight(id);
        }

        let ui = &self.deps.ui;
        if ui.is_shown(Component::Sidebar) {
            ui.sidebar_action(SidebarActionOptions::for_annotation(
                SidebarAction::ShowAnnotation,
                id.clone(),
            ));
        }
        ui.hide_tooltip().await?;
        Ok(Some(created))
    }

    /// Remove an annotation: highlight first, then the cache, then storage.
    ///
    /// A failed storage delete is logged and reported but not undone.
    /// Returns false if the annotation was not cached.
    pub async fn delete_annotation(&self, unified_id: &UnifiedAnnotationId) -> PipelineResult<bool> {
        self.deps.anchoring.remove_annotation_highlight(unified_id);
        let Some(removed) = self
            .deps
            .cache
            .remove_annotation(unified_id, MutationOpts::default())
        else {
            return Ok(false);
        };
        if let Some(local_id) = &removed.local_id {
            if let Err(err) = self.deps.persistence.delete_annotation(local_id).await {
                tracing::warn!(%unified_id, error = %err, "delete failed in storage; kept removed locally");
                self.deps
                    .ui
                    .show_error(format!("Could not delete annotation: {err}"));
                return Err(PipelineError::Persistence(err));
            }
        }
        Ok(true)
    }

    /// Create a list in storage, then cache it
    pub async fn create_list(&self, name: &str) -> PipelineResult<UnifiedListId> {
        let record = self
            .deps
            .persistence
            .create_list(name)
            .await
            .map_err(PipelineError::Persistence)?;
        Ok(self.deps.cache.add_list(
            ListForCache {
                local_id: Some(record.local_id),
                remote_id: record.remote_id,
                name: record.name,
                description: record.description,
                creator: self.deps.user.clone(),
                ..Default::default()
            },
            MutationOpts::default(),
        ))
    }

    /// Remove a list from the cache (and every annotation), then from storage
    pub async fn delete_list(&self, unified_id: &UnifiedListId) -> PipelineResult<bool> {
        let Some(removed) = self
            .deps
            .cache
            .remove_list(unified_id, MutationOpts::default())
        else {
            return Ok(false);
        };
        if self.deps.ui.selected_list().as_ref() == Some(unified_id) {
            self.deps.ui.set_selected_list(None);
        }
        if let Some(local_id) = removed.local_id {
            if let Err(err) = self.deps.persistence.delete_list(local_id).await {
                tracing::warn!(%unified_id, error = %err, "list delete failed in storage");
                self.deps.ui.show_error(format!("Could not delete list: {err}"));
                return Err(PipelineError::Persistence(err));
            }
        }
        Ok(true)
    }
}
