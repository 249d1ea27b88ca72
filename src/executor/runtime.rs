//! Tokio Executor
//!
//! Spawns every unit of work as its own task, so callbacks run in
//! parallel on the runtime's worker pool.

use tokio::runtime::Handle;

use super::{Executor, Work};
use crate::error::{Error, Result};

/// Executor backed by a tokio runtime handle
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Create an executor spawning onto the given runtime
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Create an executor spawning onto the runtime of the calling context
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| Error::NoRuntime)
    }
}

impl Executor for TokioExecutor {
    fn name(&self) -> &'static str {
        "tokio"
    }

    fn submit(&self, work: Work) -> Result<()> {
        self.handle.spawn(work);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_runs_submitted_work() {
        let executor = TokioExecutor::current().unwrap();
        let (tx, rx) = oneshot::channel();

        executor
            .submit(async move {
                let _ = tx.send(42);
            }
            .boxed())
            .unwrap();

        assert_eq!(rx.await.unwrap(), 42);
    }

    #[test]
    fn test_current_requires_runtime() {
        assert!(matches!(TokioExecutor::current(), Err(Error::NoRuntime)));
    }
}
