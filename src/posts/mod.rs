//! Posts: the normalized model, the normalizer and the fetch pipeline.

pub mod normalize;
pub mod pipeline;
pub mod types;

pub use normalize::{normalize, NormalizeOptions};
pub use pipeline::{PipelineOptions, PostPipeline};
pub use types::Post;
