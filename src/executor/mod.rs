//! Callback Executor Module
//!
//! Runs contender and listener callbacks away from the caller that
//! triggered them.

pub(crate) mod dispatch;
mod runtime;
mod serial;

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::ExecutorKind;
use crate::error::Result;

pub use dispatch::Completion;
pub(crate) use dispatch::Dispatcher;
pub use runtime::TokioExecutor;
pub use serial::SerialExecutor;

/// Unit of work accepted by an [`Executor`]
pub type Work = BoxFuture<'static, ()>;

/// Accepts units of work and runs them, asynchronously relative to the
/// submitting thread.
///
/// Implementations must never poll `work` inline inside `submit`; the
/// election service submits while holding its lock.
pub trait Executor: Send + Sync {
    /// Short name for diagnostics
    fn name(&self) -> &'static str;

    /// Hand over a unit of work. An error means it will never run.
    fn submit(&self, work: Work) -> Result<()>;
}

/// Build the executor selected in configuration on the current runtime
pub fn from_kind(kind: ExecutorKind) -> Result<Arc<dyn Executor>> {
    Ok(match kind {
        ExecutorKind::Parallel => Arc::new(TokioExecutor::current()?),
        ExecutorKind::Serial => Arc::new(SerialExecutor::new()?),
    })
}
