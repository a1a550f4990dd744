use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError};
use tracing::debug;

use super::{BufferHandle, BufferUsage, ContextTask, Dispatch, RenderBackend};
use crate::assembly::GpuBlob;
use crate::error::{MeshError, Result};

/// Upload still in flight.
pub struct PendingUpload {
    blob: Arc<GpuBlob>,
    completion: Receiver<Result<BufferHandle>>,
    /// Set while the backend could not take the task.
    deferred: Option<ContextTask>,
}

impl fmt::Debug for PendingUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingUpload")
            .field("bytes", &self.blob.len())
            .field("deferred", &self.deferred.is_some())
            .finish()
    }
}

/// GPU-side copy of an assembled blob.
#[derive(Debug)]
pub enum GpuResource {
    Pending(PendingUpload),
    Uploaded(BufferHandle),
}

impl GpuResource {
    /// Ask `backend` to upload `blob` on its context thread. Never blocks.
    pub fn request(backend: &dyn RenderBackend, blob: Arc<GpuBlob>) -> GpuResource {
        let (tx, rx) = channel::bounded(1);
        let source = Arc::clone(&blob);
        let task: ContextTask = Box::new(move |device| {
            let result = device
                .create_buffer(source.len(), BufferUsage::VertexIndex)
                .and_then(|handle| device.upload(handle, 0, &source.data).map(|()| handle));
            // The requester may have given up; nothing to report then.
            let _ = tx.send(result);
        });

        let deferred = match backend.run_on_context_thread(task) {
            Dispatch::Scheduled => None,
            Dispatch::Deferred(task) => {
                debug!(bytes = blob.len(), "Context thread busy, upload deferred");
                Some(task)
            }
        };

        GpuResource::Pending(PendingUpload {
            blob,
            completion: rx,
            deferred,
        })
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self, GpuResource::Uploaded(_))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, GpuResource::Pending(p) if p.deferred.is_some())
    }

    pub fn handle(&self) -> Option<BufferHandle> {
        match self {
            GpuResource::Uploaded(handle) => Some(*handle),
            GpuResource::Pending(_) => None,
        }
    }

    /// Retry a deferred dispatch. Returns `true` once the task is scheduled.
    pub fn service(&mut self, backend: &dyn RenderBackend) -> bool {
        let GpuResource::Pending(pending) = self else {
            return true;
        };
        let Some(task) = pending.deferred.take() else {
            return true;
        };
        match backend.run_on_context_thread(task) {
            Dispatch::Scheduled => {
                debug!(bytes = pending.blob.len(), "Deferred upload scheduled");
                true
            }
            Dispatch::Deferred(task) => {
                pending.deferred = Some(task);
                false
            }
        }
    }

    /// Check for completion without blocking.
    pub fn poll(&mut self) -> Result<Option<BufferHandle>> {
        let GpuResource::Pending(pending) = self else {
            return Ok(self.handle());
        };
        if pending.deferred.is_some() {
            return Ok(None);
        }
        match pending.completion.try_recv() {
            Ok(result) => self.complete(result).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }

    /// Block until the upload finishes or `timeout` elapses.
    pub fn wait(&mut self, timeout: Duration) -> Result<BufferHandle> {
        let GpuResource::Pending(pending) = self else {
            return self
                .handle()
                .ok_or_else(|| MeshError::Upload("resource has no buffer".into()));
        };
        if pending.deferred.is_some() {
            return Err(MeshError::Upload(
                "upload is deferred; service() must schedule it first".into(),
            ));
        }
        match pending.completion.recv_timeout(timeout) {
            Ok(result) => self.complete(result),
            Err(RecvTimeoutError::Timeout) => Err(MeshError::Upload(format!(
                "upload did not finish within {timeout:?}"
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(disconnected()),
        }
    }

    fn complete(&mut self, result: Result<BufferHandle>) -> Result<BufferHandle> {
        let handle = result?;
        *self = GpuResource::Uploaded(handle);
        Ok(handle)
    }
}

fn disconnected() -> MeshError {
    MeshError::Upload("context thread dropped the upload".into())
}
