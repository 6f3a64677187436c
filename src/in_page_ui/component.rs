//! In-page UI surfaces and their per-component bookkeeping

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An independently loaded piece of in-page UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Ribbon,
    Sidebar,
    Tooltip,
    /// Highlight overlay, rendered in-process
    Highlights,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Ribbon,
        Component::Sidebar,
        Component::Tooltip,
        Component::Highlights,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ribbon => "ribbon",
            Self::Sidebar => "sidebar",
            Self::Tooltip => "tooltip",
            Self::Highlights => "highlights",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load lifecycle of one component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Unloaded,
    Loading,
    Ready,
}

/// A component failed to load. Shared by every caller waiting on that load.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to load {component}: {message}")]
pub struct LoadError {
    pub component: Component,
    pub message: String,
}

impl LoadError {
    pub fn new(component: Component, message: impl Into<String>) -> Self {
        Self {
            component,
            message: message.into(),
        }
    }
}

/// Result type for orchestrator operations that may load a component
pub type LoadResult<T> = Result<T, LoadError>;

/// Logical visibility of every component
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentShowState {
    pub ribbon: bool,
    pub sidebar: bool,
    pub tooltip: bool,
    pub highlights: bool,
}

impl ComponentShowState {
    pub fn get(&self, component: Component) -> bool {
        match component {
            Component::Ribbon => self.ribbon,
            Component::Sidebar => self.sidebar,
            Component::Tooltip => self.tooltip,
            Component::Highlights => self.highlights,
        }
    }

    pub fn set(&mut self, component: Component, shown: bool) {
        match component {
            Component::Ribbon => self.ribbon = shown,
            Component::Sidebar => self.sidebar = shown,
            Component::Tooltip => self.tooltip = shown,
            Component::Highlights => self.highlights = shown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_state_is_addressed_per_component() {
        let mut state = ComponentShowState::default();
        state.set(Component::Sidebar, true);
        assert!(state.get(Component::Sidebar));
        assert!(Component::ALL
            .iter()
            .filter(|c| **c != Component::Sidebar)
            .all(|c| !state.get(*c)));
    }

    #[test]
    fn load_error_names_component() {
        let err = LoadError::new(Component::Tooltip, "script blocked");
        assert_eq!(err.to_string(), "Failed to load tooltip: script blocked");
    }
}
