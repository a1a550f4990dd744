use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender};
use tracing::debug;

use super::{BufferDevice, BufferHandle, BufferUsage, ContextTask, Dispatch, RenderBackend};
use crate::error::{MeshError, Result};

/// Buffers kept in host memory.
#[derive(Debug, Default)]
struct MemoryDevice {
    buffers: Mutex<HashMap<BufferHandle, Vec<u8>>>,
    next_id: AtomicU64,
}

impl MemoryDevice {
    fn buffers(&self) -> Result<std::sync::MutexGuard<'_, HashMap<BufferHandle, Vec<u8>>>> {
        self.buffers
            .lock()
            .map_err(|_| MeshError::Upload("buffer table poisoned".into()))
    }
}

impl BufferDevice for MemoryDevice {
    fn create_buffer(&self, size: usize, _usage: BufferUsage) -> Result<BufferHandle> {
        let handle = BufferHandle(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.buffers()?.insert(handle, vec![0; size]);
        Ok(handle)
    }

    fn upload(&self, buffer: BufferHandle, offset: usize, bytes: &[u8]) -> Result<()> {
        let mut buffers = self.buffers()?;
        let dst = buffers
            .get_mut(&buffer)
            .ok_or_else(|| MeshError::Upload(format!("unknown buffer {}", buffer.0)))?;
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= dst.len())
            .ok_or_else(|| {
                MeshError::Upload(format!(
                    "{} bytes at offset {offset} overflow buffer {} of {} bytes",
                    bytes.len(),
                    buffer.0,
                    dst.len()
                ))
            })?;
        dst[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

/// In-memory backend with a dedicated context thread.
///
/// Used by the CLI and the tests. `set_available(false)` simulates a context
/// thread that cannot accept work, which makes dispatches come back deferred.
pub struct HeadlessBackend {
    device: Arc<MemoryDevice>,
    queue: Option<Sender<ContextTask>>,
    worker: Option<JoinHandle<()>>,
    available: AtomicBool,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        let device = Arc::new(MemoryDevice::default());
        let (tx, rx) = channel::unbounded::<ContextTask>();
        let ctx = Arc::clone(&device);
        let worker = thread::Builder::new()
            .name("meshweld-context".into())
            .spawn(move || {
                for task in rx {
                    task(ctx.as_ref());
                }
            })
            .ok();

        Self {
            device,
            queue: worker.as_ref().map(|_| tx),
            worker,
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Copy of a buffer's bytes.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.device.buffers().ok()?.get(&buffer).cloned()
    }

    pub fn buffer_count(&self) -> usize {
        self.device.buffers().map_or(0, |b| b.len())
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferDevice for HeadlessBackend {
    fn create_buffer(&self, size: usize, usage: BufferUsage) -> Result<BufferHandle> {
        self.device.create_buffer(size, usage)
    }

    fn upload(&self, buffer: BufferHandle, offset: usize, bytes: &[u8]) -> Result<()> {
        self.device.upload(buffer, offset, bytes)
    }
}

impl RenderBackend for HeadlessBackend {
    fn run_on_context_thread(&self, task: ContextTask) -> Dispatch {
        if !self.available.load(Ordering::SeqCst) {
            return Dispatch::Deferred(task);
        }
        match &self.queue {
            Some(queue) => match queue.send(task) {
                Ok(()) => Dispatch::Scheduled,
                Err(err) => Dispatch::Deferred(err.into_inner()),
            },
            None => Dispatch::Deferred(task),
        }
    }
}

impl Drop for HeadlessBackend {
    fn drop(&mut self) {
        // Closing the queue ends the worker loop.
        self.queue.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                debug!("Context thread panicked");
            }
        }
    }
}
