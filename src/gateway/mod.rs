//! Collaborators: anchoring, persistence, preferences and component loading
//!
//! The cache and pipeline talk to the outside world only through the traits
//! defined here.

mod memory;
mod traits;

pub use memory::{MemoryAnchoring, MemoryLoader, MemoryPersistence, MemoryPreferences};
pub use traits::{
    AnchoringService, AnnotationRecord, ComponentLoader, CreateAnnotationRequest,
    FollowedListRecord, GatewayError, GatewayResult, HighlightClick, HighlightClickHandler, ListRecord, NewAnnotation,
    PersistenceGateway, PreferenceStore, SavedAnnotation, Selection,
};
