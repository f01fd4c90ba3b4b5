//! Terminal presentation for the pipeline.

pub mod icons;
pub mod progress;

pub use progress::PipelineUI;
