pub mod assembly;
pub mod config;
pub mod error;
pub mod export;
pub mod gpu;
pub mod ingestion;
pub mod pipeline;
pub mod types;

pub use config::{NormalConfig, OutputConfig, PipelineConfig};
pub use error::{MeshError, Result, ValidationError};
pub use pipeline::Pipeline;
pub use types::{Mesh, MeshFlags, MeshInstance};
