use std::io;

use crate::types::StreamType;

/// Bad caller arguments to the geometry model.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("component count {0} is outside 1..=4 (or below 3 for VERTICES)")]
    InvalidArity(u32),
    #[error("stream {0} is already registered on layer {1}")]
    DuplicateStream(StreamType, usize),
    #[error("element count {0} is not a multiple of 3")]
    InvalidTopology(u32),
    #[error("index set {set_id} for {stream} is already registered on pass {pass}")]
    DuplicateIndexSet {
        pass: usize,
        stream: StreamType,
        set_id: u32,
    },
    #[error("index set holds {actual} indices but the pass has {expected} elements")]
    IndexCountMismatch { expected: u32, actual: usize },
    #[error("stream data length {len} is not a multiple of {components} components")]
    MisalignedData { len: usize, components: u32 },
    #[error("layer {0} does not exist")]
    UnknownLayer(usize),
    #[error("pass {0} does not exist")]
    UnknownPass(usize),
    #[error("mesh is frozen: the GPU blob has already been assembled")]
    FrozenMesh,
}

/// All error types for the meshweld pipeline.
#[derive(thiserror::Error, Debug)]
pub enum MeshError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Capacity error: {0}")]
    Capacity(String),
    #[error("Integrity error: {0}")]
    Integrity(String),
    #[error("Out of memory: failed to reserve {bytes} bytes")]
    OutOfMemory { bytes: usize },
    #[error("Input error: {0}")]
    Input(String),
    #[error("Output error: {0}")]
    Output(String),
    #[error("Format error: {0}")]
    Format(String),
    #[error("Upload error: {0}")]
    Upload(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MeshError>;
