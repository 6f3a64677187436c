//! SharedInPageUiState: which components a page context wants, loaded once
//!
//! Each component moves `Unloaded → Loading → Ready` and, independently, is
//! logically shown or hidden. Showing always loads first: no `StateChanged`
//! with `shown: true` is emitted before the component's load has finished
//! and `ComponentShouldSetUp` has gone out. Actual mount state is tracked
//! apart from visibility through `ack_set_up` / `ack_destroyed`.

use super::component::{Component, ComponentShowState, LoadError, LoadResult, LoadStatus};
use super::events::{InPageUiEvent, PendingAction, RibbonAction, SidebarAction, SidebarActionOptions};
use super::registry::ComponentRegistry;
use crate::bus::EventBus;
use crate::cache::{PageAnnotationsCache, UnifiedListId};
use crate::gateway::{AnchoringService, GatewayError, HighlightClick, HighlightClickHandler};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// How long an action for a not-yet-mounted component is kept
pub const DEFAULT_PENDING_ACTION_TTL: Duration = Duration::from_secs(5);

/// Errors from orchestrator operations that also call the anchoring service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UiError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Anchoring(#[from] GatewayError),
}

pub type UiResult<T> = Result<T, UiError>;

type LoadOutcome = Option<LoadResult<()>>;

#[derive(Debug)]
enum LoadSlot {
    Loading {
        generation: u64,
        done: watch::Receiver<LoadOutcome>,
    },
    Ready {
        generation: u64,
    },
}

impl LoadSlot {
    fn generation(&self) -> u64 {
        match self {
            Self::Loading { generation, .. } | Self::Ready { generation } => *generation,
        }
    }
}

#[derive(Debug, Default)]
struct UiState {
    loads: HashMap<Component, LoadSlot>,
    next_generation: u64,
    shown: ComponentShowState,
    /// `ComponentShouldSetUp` sent and not yet torn down
    set_up: HashSet<Component>,
    /// Components that acknowledged set-up
    mounted: HashSet<Component>,
    pending: HashMap<Component, (Instant, PendingAction)>,
    selected_list: Option<UnifiedListId>,
    error: Option<String>,
}

/// What the orchestrator needs from its page context
pub struct InPageUiDeps {
    pub cache: Arc<PageAnnotationsCache>,
    pub anchoring: Arc<dyn AnchoringService>,
    pub registry: ComponentRegistry,
}

struct Inner {
    deps: InPageUiDeps,
    events: Arc<EventBus<InPageUiEvent>>,
    pending_action_ttl: Duration,
    state: Mutex<UiState>,
}

/// The UI orchestrator of one page context. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SharedInPageUiState {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SharedInPageUiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedInPageUiState")
            .field("shown", &self.show_state())
            .field("registry", &self.inner.deps.registry)
            .finish()
    }
}

impl SharedInPageUiState {
    pub fn new(deps: InPageUiDeps) -> Self {
        Self::with_options(deps, Arc::new(EventBus::default()), DEFAULT_PENDING_ACTION_TTL)
    }

    pub fn with_options(
        deps: InPageUiDeps,
        events: Arc<EventBus<InPageUiEvent>>,
        pending_action_ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                events,
                pending_action_ttl,
                state: Mutex::new(UiState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, UiState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: InPageUiEvent) {
        self.inner.events.emit(event);
    }

    // === Accessors ===

    pub fn events(&self) -> &Arc<EventBus<InPageUiEvent>> {
        &self.inner.events
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<InPageUiEvent> {
        self.inner.events.subscribe()
    }

    pub fn cache(&self) -> &Arc<PageAnnotationsCache> {
        &self.inner.deps.cache
    }

    pub fn load_status(&self, component: Component) -> LoadStatus {
        match self.state().loads.get(&component) {
            None => LoadStatus::Unloaded,
            Some(LoadSlot::Loading { .. }) => LoadStatus::Loading,
            Some(LoadSlot::Ready { .. }) => LoadStatus::Ready,
        }
    }

    pub fn is_shown(&self, component: Component) -> bool {
        self.state().shown.get(component)
    }

    pub fn show_state(&self) -> ComponentShowState {
        self.state().shown
    }

    /// True once `ComponentShouldSetUp` was sent and until the component is removed
    pub fn is_set_up(&self, component: Component) -> bool {
        self.state().set_up.contains(&component)
    }

    /// True while the component has acknowledged set-up and not destruction
    pub fn is_mounted(&self, component: Component) -> bool {
        self.state().mounted.contains(&component)
    }

    pub fn are_highlights_shown(&self) -> bool {
        self.is_shown(Component::Highlights)
    }

    // === Loading ===

    /// Load a component at most once.
    ///
    /// Concurrent callers share one loader invocation and all receive its
    /// outcome. A failed load is not retried; bookkeeping returns to
    /// `Unloaded` so a later explicit call starts over. If the component is
    /// unloaded before the loader finishes, every waiter gets an error.
    pub async fn load_component(&self, component: Component) -> LoadResult<()> {
        let waiting = {
            let mut state = self.state();
            match state.loads.get(&component) {
                Some(LoadSlot::Ready { .. }) => None,
                Some(LoadSlot::Loading { generation, done }) => Some((*generation, done.clone())),
                None => {
                    let loader = self
                        .inner
                        .deps
                        .registry
                        .loader(component)
                        .ok_or_else(|| LoadError::new(component, "no loader registered"))?;
                    let generation = state.next_generation;
                    state.next_generation += 1;
                    let (tx, rx) = watch::channel(None);
                    state.loads.insert(
                        component,
                        LoadSlot::Loading {
                            generation,
                            done: rx.clone(),
                        },
                    );
                    tracing::info!(%component, "loading component");

                    let weak = Arc::downgrade(&self.inner);
                    tokio::spawn(async move {
                        let result = loader
                            .load(component)
                            .await
                            .map_err(|e| LoadError::new(component, e.to_string()));
                        if let Some(inner) = weak.upgrade() {
                            SharedInPageUiState { inner }.finish_load(component, generation, &result);
                        }
                        let _ = tx.send(Some(result));
                    });
                    Some((generation, rx))
                }
            }
        };

        if let Some((generation, mut done)) = waiting {
            let outcome = done
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|outcome| outcome.clone());
            outcome.unwrap_or_else(|| Err(LoadError::new(component, "load abandoned")))?;
            // An unload while the loader ran discards its result
            let still_current = matches!(
                self.state().loads.get(&component),
                Some(LoadSlot::Ready { generation: g }) if *g == generation
            );
            if !still_current {
                return Err(LoadError::new(component, "unloaded while loading"));
            }
        }
        self.maybe_emit_should_set_up(component);
        Ok(())
    }

    fn finish_load(&self, component: Component, generation: u64, result: &LoadResult<()>) {
        {
            let mut state = self.state();
            let current = state.loads.get(&component).map(LoadSlot::generation);
            if current != Some(generation) {
                tracing::debug!(%component, "stale load finished after unload");
                return;
            }
            match result {
                Ok(()) => {
                    state.loads.insert(component, LoadSlot::Ready { generation });
                }
                Err(err) => {
                    state.loads.remove(&component);
                    tracing::warn!(%component, error = %err, "component failed to load");
                }
            }
        }
        if result.is_ok() {
            tracing::info!(%component, "component ready");
            self.maybe_emit_should_set_up(component);
        }
    }

    /// Forget a component's load so the next `load_component` runs the loader again
    pub fn unload_component(&self, component: Component) {
        {
            let mut state = self.state();
            state.loads.remove(&component);
            state.set_up.remove(&component);
            state.mounted.remove(&component);
            state.pending.remove(&component);
            state.shown.set(component, false);
        }
        tracing::info!(%component, "component unloaded");
    }

    fn maybe_emit_should_set_up(&self, component: Component) {
        let first = self.state().set_up.insert(component);
        if first {
            self.emit(InPageUiEvent::ComponentShouldSetUp { component });
        }
    }

    fn remove_component(&self, component: Component) {
        let hidden_state = {
            let mut state = self.state();
            state.set_up.remove(&component);
            let was_shown = state.shown.get(component);
            state.shown.set(component, false);
            was_shown.then_some(state.shown)
        };
        if let Some(new_state) = hidden_state {
            self.emit(InPageUiEvent::StateChanged {
                new_state,
                component,
                shown: false,
            });
        }
        self.emit(InPageUiEvent::ComponentShouldDestroy { component });
    }

    async fn set_state(&self, component: Component, visible: bool) -> LoadResult<()> {
        let unchanged = self.is_shown(component) == visible;
        if unchanged {
            return Ok(());
        }
        if visible {
            self.load_component(component).await?;
        }
        let new_state = {
            let mut state = self.state();
            if state.shown.get(component) == visible {
                return Ok(());
            }
            if visible && !matches!(state.loads.get(&component), Some(LoadSlot::Ready { .. })) {
                return Err(LoadError::new(component, "unloaded while loading"));
            }
            state.shown.set(component, visible);
            state.shown
        };
        tracing::debug!(%component, shown = visible, "component visibility changed");
        self.emit(InPageUiEvent::StateChanged {
            new_state,
            component,
            shown: visible,
        });
        Ok(())
    }

    // === Mount acknowledgement ===

    /// A component finished setting itself up.
    ///
    /// Returns (and broadcasts) an action that was requested while it was
    /// not mounted, if that action is still fresh.
    pub fn ack_set_up(&self, component: Component) -> Option<PendingAction> {
        let pending = {
            let mut state = self.state();
            state.mounted.insert(component);
            state.pending.remove(&component)
        };
        let (emitted_when, action) = pending?;
        if emitted_when.elapsed() > self.inner.pending_action_ttl {
            tracing::debug!(%component, "dropping stale pending action");
            return None;
        }
        self.emit(action_event(&action));
        Some(action)
    }

    /// A component tore itself down
    pub fn ack_destroyed(&self, component: Component) {
        self.state().mounted.remove(&component);
    }

    fn emit_action(&self, action: PendingAction) {
        let component = match action {
            PendingAction::Sidebar(_) => Component::Sidebar,
            PendingAction::Ribbon(_) => Component::Ribbon,
        };
        let mounted = {
            let mut state = self.state();
            let mounted = state.mounted.contains(&component);
            if !mounted {
                state.pending.insert(component, (Instant::now(), action.clone()));
            }
            mounted
        };
        if mounted {
            self.emit(action_event(&action));
        } else {
            tracing::debug!(%component, "holding action until component is mounted");
        }
    }

    // === Sidebar ===

    /// Show the sidebar (and the ribbon), then hand it `options`' action
    pub async fn show_sidebar(&self, options: Option<SidebarActionOptions>) -> LoadResult<()> {
        if self.is_shown(Component::Sidebar) {
            if let Some(options) = options {
                self.emit_action(PendingAction::Sidebar(options));
            }
            return Ok(());
        }
        self.set_state(Component::Sidebar, true).await?;
        if let Some(options) = options {
            self.emit_action(PendingAction::Sidebar(options));
        }
        self.show_ribbon(None).await
    }

    pub async fn hide_sidebar(&self) -> LoadResult<()> {
        self.set_state(Component::Sidebar, false).await
    }

    pub async fn toggle_sidebar(&self) -> LoadResult<()> {
        if self.is_shown(Component::Sidebar) {
            self.hide_sidebar().await
        } else {
            self.show_sidebar(None).await
        }
    }

    /// Ask a shown sidebar to do something, or queue it for when it mounts
    pub fn sidebar_action(&self, options: SidebarActionOptions) {
        self.emit_action(PendingAction::Sidebar(options));
    }

    // === Ribbon ===

    /// Show the ribbon, then preload the sidebar in the background
    pub async fn show_ribbon(&self, action: Option<RibbonAction>) -> LoadResult<()> {
        if !self.is_shown(Component::Ribbon) {
            self.set_state(Component::Ribbon, true).await?;
            let ui = self.clone();
            tokio::spawn(async move {
                if let Err(err) = ui.load_component(Component::Sidebar).await {
                    tracing::warn!(error = %err, "sidebar preload failed");
                }
            });
        }
        if let Some(action) = action {
            self.emit_action(PendingAction::Ribbon(action));
        }
        Ok(())
    }

    pub async fn hide_ribbon(&self) -> LoadResult<()> {
        self.set_state(Component::Ribbon, false).await
    }

    pub async fn toggle_ribbon(&self) -> LoadResult<()> {
        if self.is_shown(Component::Ribbon) {
            self.hide_ribbon().await
        } else {
            self.show_ribbon(None).await
        }
    }

    /// Tear down the ribbon, and the sidebar with it
    pub fn remove_ribbon(&self) {
        if self.is_set_up(Component::Sidebar) {
            self.remove_component(Component::Sidebar);
        }
        self.remove_component(Component::Ribbon);
    }

    pub fn update_ribbon(&self) {
        self.emit(InPageUiEvent::RibbonUpdate);
    }

    // === Tooltip ===

    /// Load the tooltip without showing it
    pub async fn setup_tooltip(&self) -> LoadResult<()> {
        self.load_component(Component::Tooltip).await
    }

    pub async fn show_tooltip(&self) -> LoadResult<()> {
        self.set_state(Component::Tooltip, true).await
    }

    pub async fn hide_tooltip(&self) -> LoadResult<()> {
        self.set_state(Component::Tooltip, false).await
    }

    pub fn remove_tooltip(&self) {
        self.remove_component(Component::Tooltip);
    }

    /// Remove a set-up tooltip entirely, otherwise show it
    pub async fn toggle_tooltip(&self) -> LoadResult<()> {
        if self.is_set_up(Component::Tooltip) {
            self.remove_tooltip();
            Ok(())
        } else {
            self.show_tooltip().await
        }
    }

    // === Highlights ===

    /// Draw every anchored annotation in the cache.
    ///
    /// Returns false, leaving highlights hidden, when there is nothing to draw.
    pub async fn show_highlights(&self) -> UiResult<bool> {
        self.load_component(Component::Highlights).await?;
        let annotations = self.inner.deps.cache.anchored_annotations();
        if annotations.is_empty() {
            return Ok(false);
        }
        let drawn = self
            .inner
            .deps
            .anchoring
            .render_highlights(&annotations, self.highlight_click_handler())
            .await?;
        tracing::debug!(drawn, "highlights rendered");
        self.set_state(Component::Highlights, true).await?;
        Ok(true)
    }

    pub async fn hide_highlights(&self) -> UiResult<()> {
        self.inner.deps.anchoring.remove_highlights().await?;
        self.set_state(Component::Highlights, false).await?;
        Ok(())
    }

    /// Returns whether highlights are shown afterwards
    pub async fn toggle_highlights(&self) -> UiResult<bool> {
        if self.are_highlights_shown() {
            self.hide_highlights().await?;
            Ok(false)
        } else {
            self.show_highlights().await
        }
    }

    /// Click handler that opens the sidebar on the clicked annotation.
    ///
    /// Holds only a weak reference, so a handler kept by the anchoring
    /// service does not keep the page context alive.
    pub fn highlight_click_handler(&self) -> HighlightClickHandler {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |click: HighlightClick| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let ui = SharedInPageUiState { inner };
            let action = if click.open_in_edit {
                SidebarAction::EditAnnotation
            } else {
                SidebarAction::ShowAnnotation
            };
            let options = SidebarActionOptions::for_annotation(action, click.unified_id);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(err) = ui.show_sidebar(Some(options)).await {
                            tracing::warn!(error = %err, "could not open sidebar for highlight");
                        }
                    });
                }
                Err(_) => tracing::warn!("highlight clicked with no runtime to open the sidebar"),
            }
        })
    }

    // === Selected list ===

    pub fn set_selected_list(&self, list_id: Option<UnifiedListId>) {
        self.state().selected_list = list_id;
    }

    pub fn selected_list(&self) -> Option<UnifiedListId> {
        self.state().selected_list.clone()
    }

    // === Error display ===

    pub fn show_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(%message, "showing error");
        self.state().error = Some(message.clone());
        self.emit(InPageUiEvent::ErrorShown {
            message: Some(message),
        });
    }

    pub fn hide_error(&self) {
        let had_error = self.state().error.take().is_some();
        if had_error {
            self.emit(InPageUiEvent::ErrorShown { message: None });
        }
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }
}

fn action_event(action: &PendingAction) -> InPageUiEvent {
    match action {
        PendingAction::Sidebar(options) => InPageUiEvent::SidebarAction(options.clone()),
        PendingAction::Ribbon(action) => InPageUiEvent::RibbonAction(*action),
    }
}
