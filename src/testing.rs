//! Test doubles shared by the unit tests

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::executor::{Executor, Work};
use crate::leader::{LeaderContender, LeaderInfo, LeaderListener};
use crate::token::FencingToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ContenderEvent {
    Granted(FencingToken),
    Revoked,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListenerEvent {
    Notified(Option<LeaderInfo>),
    Error(String),
}

/// Contender that records every callback
pub(crate) struct RecordingContender {
    events: mpsc::UnboundedSender<ContenderEvent>,
    fail_grant: bool,
}

impl RecordingContender {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ContenderEvent>) {
        Self::build(false)
    }

    /// Records the grant, then returns an error from it
    pub(crate) fn failing_grant() -> (Arc<Self>, mpsc::UnboundedReceiver<ContenderEvent>) {
        Self::build(true)
    }

    fn build(fail_grant: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<ContenderEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events, fail_grant }), rx)
    }
}

#[async_trait::async_trait]
impl LeaderContender for RecordingContender {
    async fn grant_leadership(&self, token: FencingToken) -> anyhow::Result<()> {
        let _ = self.events.send(ContenderEvent::Granted(token));
        if self.fail_grant {
            anyhow::bail!("contender refused token {}", token);
        }
        Ok(())
    }

    async fn revoke_leadership(&self) -> anyhow::Result<()> {
        let _ = self.events.send(ContenderEvent::Revoked);
        Ok(())
    }

    fn handle_error(&self, error: &Error) {
        let _ = self.events.send(ContenderEvent::Error(error.to_string()));
    }
}

/// Listener that records every callback
pub(crate) struct RecordingListener {
    events: mpsc::UnboundedSender<ListenerEvent>,
    panic_on_notify: bool,
}

impl RecordingListener {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ListenerEvent>) {
        Self::build(false)
    }

    pub(crate) fn panicking() -> (Arc<Self>, mpsc::UnboundedReceiver<ListenerEvent>) {
        Self::build(true)
    }

    fn build(panic_on_notify: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<ListenerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events, panic_on_notify }), rx)
    }
}

#[async_trait::async_trait]
impl LeaderListener for RecordingListener {
    async fn notify_leader_address(&self, leader: Option<LeaderInfo>) -> anyhow::Result<()> {
        if self.panic_on_notify {
            panic!("listener exploded");
        }
        let _ = self.events.send(ListenerEvent::Notified(leader));
        Ok(())
    }

    fn handle_error(&self, error: &Error) {
        let _ = self.events.send(ListenerEvent::Error(error.to_string()));
    }
}

/// Executor that refuses everything
pub(crate) struct RejectingExecutor;

impl Executor for RejectingExecutor {
    fn name(&self) -> &'static str {
        "rejecting"
    }

    fn submit(&self, _work: Work) -> Result<()> {
        Err(Error::ExecutorRejected("executor is closed".into()))
    }
}

/// Wait for the next recorded event
pub(crate) async fn next_event<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Give dispatched work a chance to run, then check nothing arrived
pub(crate) async fn assert_no_event<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if let Ok(event) = rx.try_recv() {
        panic!("unexpected event: {:?}", event);
    }
}
