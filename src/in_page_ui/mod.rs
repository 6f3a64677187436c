//! In-page UI orchestration
//!
//! `SharedInPageUiState` decides which components are loaded and shown for
//! one page context. Components learn about changes only through the
//! `InPageUiEvent` bus handed to them at load.

mod component;
mod events;
mod registry;
mod state;

#[cfg(test)]
mod tests;

pub use component::{Component, ComponentShowState, LoadError, LoadResult, LoadStatus};
pub use events::{InPageUiEvent, PendingAction, RibbonAction, SidebarAction, SidebarActionOptions};
pub use registry::{ComponentRegistry, InProcessLoader};
pub use state::{InPageUiDeps, SharedInPageUiState, UiError, UiResult, DEFAULT_PENDING_ACTION_TTL};
