//! Boundary to the rendering backend.
//!
//! Assembly never touches the GPU directly: it hands a finished blob to
//! [`GpuResource::request`], which asks the backend to run the upload on its
//! context thread and waits for the completion message.

pub mod headless;
pub mod upload;

pub use headless::HeadlessBackend;
pub use upload::GpuResource;

use crate::error::Result;

/// Opaque backend buffer name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    /// Interleaved vertices followed by indices in one allocation.
    VertexIndex,
}

/// Buffer operations that are only valid on the context thread.
pub trait BufferDevice {
    fn create_buffer(&self, size: usize, usage: BufferUsage) -> Result<BufferHandle>;
    fn upload(&self, buffer: BufferHandle, offset: usize, bytes: &[u8]) -> Result<()>;
}

/// Work scheduled onto the context thread.
pub type ContextTask = Box<dyn FnOnce(&dyn BufferDevice) + Send + 'static>;

/// Outcome of a scheduling attempt.
pub enum Dispatch {
    Scheduled,
    /// The context thread is unavailable; the caller keeps the task.
    Deferred(ContextTask),
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatch::Scheduled => f.write_str("Scheduled"),
            Dispatch::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

pub trait RenderBackend: BufferDevice + Send + Sync {
    /// Non-blocking request to run `task` on the context thread.
    fn run_on_context_thread(&self, task: ContextTask) -> Dispatch;
}
