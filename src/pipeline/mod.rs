//! Annotation creation and deletion

mod creation;
mod privacy;
mod state;


pub use creation::{
    AnnotationDraft, CreatedAnnotation, CreationPipeline, PipelineDeps, PipelineError,
    PipelineResult,
};
pub use privacy::{resolve_privacy_level, share_opts_for, SharingPreference};
pub use state::CreationState;
