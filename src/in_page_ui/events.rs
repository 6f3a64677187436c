//! Signals the orchestrator sends to components

use super::component::{Component, ComponentShowState};
use crate::cache::UnifiedAnnotationId;
use serde::{Deserialize, Serialize};

/// What the sidebar should do once shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SidebarAction {
    /// Open a blank comment box
    Comment,
    EditAnnotation,
    /// Edit an annotation with the list picker open
    EditAnnotationSpaces,
    ShowAnnotation,
    /// Refresh the annotation listing
    ShowAnnotations,
}

/// A sidebar action with its target annotation, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidebarActionOptions {
    pub action: SidebarAction,
    pub annotation_id: Option<UnifiedAnnotationId>,
}

impl SidebarActionOptions {
    pub fn new(action: SidebarAction) -> Self {
        Self {
            action,
            annotation_id: None,
        }
    }

    pub fn for_annotation(action: SidebarAction, annotation_id: UnifiedAnnotationId) -> Self {
        Self {
            action,
            annotation_id: Some(annotation_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RibbonAction {
    Comment,
    Tag,
    List,
    Bookmark,
}

/// An action waiting for its component to finish setting up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    Sidebar(SidebarActionOptions),
    Ribbon(RibbonAction),
}

/// Events broadcast to every component of a page context
#[derive(Debug, Clone, PartialEq)]
pub enum InPageUiEvent {
    ComponentShouldSetUp {
        component: Component,
    },
    ComponentShouldDestroy {
        component: Component,
    },
    StateChanged {
        new_state: ComponentShowState,
        component: Component,
        shown: bool,
    },
    SidebarAction(SidebarActionOptions),
    RibbonAction(RibbonAction),
    /// The ribbon should re-read page state (bookmark, lists)
    RibbonUpdate,
    /// `None` clears a previously shown error
    ErrorShown {
        message: Option<String>,
    },
}
