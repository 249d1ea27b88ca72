//! Callback Dispatch
//!
//! Wraps every contender and listener callback so that a returned error or
//! a panic is logged and routed to that party's own `handle_error`, and
//! never escapes into the election service or the executor.

use std::any::Any;
use std::future::IntoFuture;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use tokio::sync::oneshot;

use super::{Executor, Work};
use crate::error::{Error, Result};
use crate::leader::{LeaderContender, LeaderInfo, LeaderListener};
use crate::token::FencingToken;

/// Signal that completes once every dispatched callback has run.
///
/// It reports that the work was dispatched and ran, not that the callbacks
/// succeeded; callback failures go to the failing party's `handle_error`.
/// Resolves to [`Error::DispatchDropped`] only if the executor discarded a
/// unit without running it.
#[derive(Debug, Default)]
#[must_use = "a Completion does nothing unless awaited"]
pub struct Completion {
    pending: Vec<oneshot::Receiver<()>>,
}

impl Completion {
    /// An already completed signal
    pub fn done() -> Self {
        Self::default()
    }

    fn pending(receiver: oneshot::Receiver<()>) -> Self {
        Self {
            pending: vec![receiver],
        }
    }

    /// Combine two signals into one that waits for both
    pub fn merge(mut self, other: Completion) -> Self {
        self.pending.extend(other.pending);
        self
    }

    /// Number of dispatched units this signal waits for
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait for all dispatched units to run
    pub async fn wait(self) -> Result<()> {
        let results = future::join_all(self.pending).await;
        if results.iter().any(|r| r.is_err()) {
            return Err(Error::DispatchDropped);
        }
        Ok(())
    }
}

impl IntoFuture for Completion {
    type Output = Result<()>;
    type IntoFuture = BoxFuture<'static, Result<()>>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait().boxed()
    }
}

/// Submits work to the executor and tracks its completion
#[derive(Clone)]
pub(crate) struct Dispatcher {
    executor: Arc<dyn Executor>,
}

impl Dispatcher {
    pub(crate) fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    pub(crate) fn executor_name(&self) -> &'static str {
        self.executor.name()
    }

    /// Submit one unit; fails if the executor refuses it
    pub(crate) fn submit(&self, work: Work) -> Result<Completion> {
        let (tx, rx) = oneshot::channel();

        self.executor.submit(
            async move {
                work.await;
                let _ = tx.send(());
            }
            .boxed(),
        )?;

        Ok(Completion::pending(rx))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run one callback, turning an error or a panic into an [`Error`]
async fn guarded<F>(operation: &'static str, callback: F) -> Result<()>
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(callback).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(Error::Callback { operation, source }),
        Err(payload) => Err(Error::CallbackPanicked {
            operation,
            message: panic_message(payload.as_ref()),
        }),
    }
}

/// Deliver an error to a party's handler; a panicking handler is only logged
fn deliver_error<F: FnOnce()>(handler: F) {
    if std::panic::catch_unwind(AssertUnwindSafe(handler)).is_err() {
        tracing::error!("Error handler panicked while handling a callback failure");
    }
}

pub(crate) fn grant_call(
    component_id: String,
    contender: Arc<dyn LeaderContender>,
    token: FencingToken,
) -> Work {
    async move {
        if let Err(error) = guarded("grant_leadership", contender.grant_leadership(token)).await {
            tracing::warn!(
                component_id = %component_id,
                %token,
                %error,
                "Error granting leadership to contender"
            );
            deliver_error(|| contender.handle_error(&error));
        }
    }
    .boxed()
}

pub(crate) fn revoke_call(component_id: String, contender: Arc<dyn LeaderContender>) -> Work {
    async move {
        if let Err(error) = guarded("revoke_leadership", contender.revoke_leadership()).await {
            tracing::warn!(
                component_id = %component_id,
                %error,
                "Error revoking leadership of contender"
            );
            deliver_error(|| contender.handle_error(&error));
        }
    }
    .boxed()
}

/// Revoke (if it was leader), then hand the contender the shutdown cause
pub(crate) fn contender_shutdown_call(
    component_id: String,
    contender: Arc<dyn LeaderContender>,
    was_leader: bool,
    cause: Arc<Error>,
) -> Work {
    async move {
        if was_leader {
            revoke_call(component_id, Arc::clone(&contender)).await;
        }
        deliver_error(|| contender.handle_error(&cause));
    }
    .boxed()
}

pub(crate) fn notify_call(
    listener_id: u64,
    listener: Arc<dyn LeaderListener>,
    leader: Option<LeaderInfo>,
) -> Work {
    async move {
        if let Err(error) = guarded(
            "notify_leader_address",
            listener.notify_leader_address(leader),
        )
        .await
        {
            tracing::warn!(listener_id, %error, "Error notifying leader listener about new leader");
            deliver_error(|| listener.handle_error(&error));
        }
    }
    .boxed()
}

pub(crate) fn listener_shutdown_call(listener: Arc<dyn LeaderListener>, cause: Arc<Error>) -> Work {
    async move {
        deliver_error(|| listener.handle_error(&cause));
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TokioExecutor;
    use crate::testing::{ContenderEvent, ListenerEvent, RecordingContender, RecordingListener};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(TokioExecutor::current().unwrap()))
    }

    #[tokio::test]
    async fn test_empty_completion_is_done() {
        let done = Completion::done();
        assert!(done.is_empty());
        done.await.unwrap();
    }

    #[tokio::test]
    async fn test_merge_waits_for_all() {
        let dispatcher = dispatcher();
        let a = dispatcher.submit(async {}.boxed()).unwrap();
        let b = dispatcher.submit(async {}.boxed()).unwrap();

        let both = a.merge(b);
        assert_eq!(both.len(), 2);
        both.await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_grant_goes_to_handle_error() {
        let (contender, mut events) = RecordingContender::failing_grant();
        let token = FencingToken::random();

        dispatcher()
            .submit(grant_call("a".into(), contender, token))
            .unwrap()
            .await
            .unwrap();

        assert_eq!(events.recv().await, Some(ContenderEvent::Granted(token)));
        match events.recv().await {
            Some(ContenderEvent::Error(message)) => assert!(message.contains("grant_leadership")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panicking_listener_goes_to_handle_error() {
        let (listener, mut events) = RecordingListener::panicking();

        // Completion is still Ok: the unit ran even though the callback blew up
        dispatcher()
            .submit(notify_call(7, listener, None))
            .unwrap()
            .await
            .unwrap();

        match events.recv().await {
            Some(ListenerEvent::Error(message)) => assert!(message.contains("panicked")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_work_fails_completion() {
        let (tx, rx) = oneshot::channel::<()>();
        drop(tx);

        let completion = Completion::pending(rx);
        assert!(matches!(completion.await, Err(Error::DispatchDropped)));
    }
}
