//! Serial Executor
//!
//! Single worker task draining a queue, so callbacks run one at a time
//! in the order they were submitted.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::{Executor, Work};
use crate::error::{Error, Result};

/// Executor with a single FIFO worker
///
/// This is a cloneable handle to the underlying worker task.
#[derive(Debug, Clone)]
pub struct SerialExecutor {
    sender: mpsc::UnboundedSender<Work>,
}

impl SerialExecutor {
    /// Spawn the worker on the current runtime
    pub fn new() -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let (sender, receiver) = mpsc::unbounded_channel();

        handle.spawn(Self::worker_task(receiver));

        Ok(Self { sender })
    }

    /// Worker task that runs queued work in order
    async fn worker_task(mut receiver: mpsc::UnboundedReceiver<Work>) {
        while let Some(work) = receiver.recv().await {
            // A panicking unit must not take the queue down with it
            if AssertUnwindSafe(work).catch_unwind().await.is_err() {
                tracing::warn!("Serial executor work panicked");
            }
        }

        tracing::debug!("Serial executor worker stopped");
    }
}

impl Executor for SerialExecutor {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn submit(&self, work: Work) -> Result<()> {
        self.sender
            .send(work)
            .map_err(|_| Error::ExecutorRejected("serial executor worker has stopped".into()))
    }
}
