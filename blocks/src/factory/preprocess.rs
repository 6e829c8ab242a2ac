use std::cell::Cell;
use std::future::Future;

use futures::future::LocalBoxFuture;
use tokio::sync::Semaphore;

use crate::error::{CssBlocksError, Result};
use crate::options::Options;

/// Output of one preprocessing stage.
#[derive(Debug, Clone, Default)]
pub struct ProcessedFile {
    pub content: String,
    pub source_map: Option<String>,
    /// Extra files the output depends on, e.g. Sass partials.
    pub dependencies: Vec<String>,
}

impl ProcessedFile {
    pub fn unchanged(content: String) -> Self {
        ProcessedFile {
            content,
            source_map: None,
            dependencies: Vec::new(),
        }
    }

    /// Feed this stage's output into a following stage's result.
    pub(crate) fn chain(self, next: ProcessedFile) -> ProcessedFile {
        let mut dependencies = self.dependencies;
        dependencies.extend(next.dependencies);
        ProcessedFile {
            content: next.content,
            source_map: next.source_map.or(self.source_map),
            dependencies,
        }
    }
}

/// Turns one syntax into CSS (or CSS into CSS).
pub trait Preprocessor {
    fn process<'a>(
        &'a self,
        full_path: &'a str,
        content: String,
        options: &'a Options,
        source_map: Option<String>,
    ) -> LocalBoxFuture<'a, Result<ProcessedFile>>;
}

/// Bounds how many preprocessing jobs run at once. Waiters are admitted in
/// FIFO order.
pub struct PreprocessQueue {
    permits: Semaphore,
    capacity: u32,
    draining: Cell<usize>,
}

impl PreprocessQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS.min(u32::MAX as usize));
        PreprocessQueue {
            permits: Semaphore::new(capacity),
            capacity: capacity as u32,
            draining: Cell::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Jobs currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.capacity() - self.permits.available_permits()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.get() > 0
    }

    /// Run `job` once a slot is free. Refused while the queue drains.
    pub async fn run<T>(&self, job: impl Future<Output = Result<T>>) -> Result<T> {
        if self.is_draining() {
            return Err(CssBlocksError::block(
                "Preprocessing was cancelled because another block failed to compile",
            ));
        }
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CssBlocksError::block("The preprocessing queue is closed"))?;
        job.await
    }

    /// Stop admitting jobs and wait until every running job has finished.
    pub async fn drain(&self) {
        self.draining.set(self.draining.get() + 1);
        tracing::debug!(in_flight = self.in_flight(), "draining preprocessing queue");
        if let Ok(all) = self.permits.acquire_many(self.capacity).await {
            drop(all);
        }
        self.draining.set(self.draining.get() - 1);
    }
}
