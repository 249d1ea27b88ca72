//! Embedded Leader Election
//!
//! Picks one leader among the registered contenders and tells every
//! registered listener who it is, without any external coordinator.
//!
//! All election state sits behind one lock. Callbacks into contenders and
//! listeners are handed to the executor and never run while the lock is
//! held. The leadership slot moves `Empty -> Proposed -> Confirmed -> Empty`,
//! or `Proposed -> Empty` when the proposed contender goes away first.
//! Shutdown is absorbing from every state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};

use super::membership::{
    next_registration_id, ArbiterSummary, ContenderEntry, ContenderHandle, ContenderRegistration,
    ListenerEntry, ListenerHandle, ListenerRegistration, Membership, RegistrationId,
};
use crate::config::WolfLeaderConfig;
use crate::error::{Error, Result};
use crate::executor::dispatch::{
    contender_shutdown_call, grant_call, listener_shutdown_call, notify_call, revoke_call,
};
use crate::executor::{self, Completion, Dispatcher, Executor};
use crate::leader::{LeaderContender, LeaderInfo, LeaderListener};
use crate::token::FencingToken;

/// Mutable election state, guarded by [`ServiceInner::state`]
#[derive(Default)]
struct ElectionState {
    membership: Membership,
    /// Asked to lead, not yet confirmed
    proposed: Option<RegistrationId>,
    /// Confirmed and announced to listeners
    confirmed: Option<RegistrationId>,
    /// Set exactly when `proposed` or `confirmed` is
    token: Option<FencingToken>,
    /// Set exactly when `confirmed` is
    address: Option<String>,
    confirmed_at: Option<DateTime<Utc>>,
    shutdown: bool,
}

impl ElectionState {
    fn leader_info(&self) -> Option<LeaderInfo> {
        self.confirmed?;
        Some(LeaderInfo::new(self.address.clone()?, self.token?))
    }

    fn component_id(&self, id: Option<RegistrationId>) -> Option<String> {
        id.and_then(|id| self.membership.contender(id))
            .map(|entry| entry.registration.component_id.clone())
    }
}

/// Shared service internals, referenced by the service and every handle
pub(crate) struct ServiceInner {
    state: Mutex<ElectionState>,
    dispatcher: Dispatcher,
    /// Copy of the current token for lock-free reads
    published_token: watch::Sender<Option<FencingToken>>,
}

impl ServiceInner {
    /// Token as last published; may trail the locked state briefly
    pub(crate) fn current_token(&self) -> Option<FencingToken> {
        *self.published_token.borrow()
    }

    fn set_token(&self, state: &mut ElectionState, token: Option<FencingToken>) {
        state.token = token;
        self.published_token.send_replace(token);
    }

    fn clear_leader(&self, state: &mut ElectionState) {
        state.proposed = None;
        state.confirmed = None;
        state.address = None;
        state.confirmed_at = None;
        self.set_token(state, None);
    }

    pub(crate) async fn add_contender(
        &self,
        registration: &Arc<ContenderRegistration>,
        contender: Arc<dyn LeaderContender>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.shutdown {
            return Err(Error::AlreadyShutdown);
        }

        let entry = ContenderEntry {
            registration: Arc::clone(registration),
            contender,
        };
        if registration.is_active() || !state.membership.add_contender(entry) {
            return Err(self.fail(
                &mut state,
                Error::ProtocolViolation(format!(
                    "leader election '{}' was added to this service multiple times",
                    registration.component_id
                )),
            ));
        }
        registration.set_active(true);

        tracing::debug!(component_id = %registration.component_id, "Contender registered");

        self.update_leader(&mut state)
            .map(drop)
            .map_err(|e| self.fail(&mut state, e))
    }

    pub(crate) async fn remove_contender(&self, registration: &Arc<ContenderRegistration>) {
        let mut state = self.state.lock().await;
        // not started, or everything was already torn down
        if !registration.is_active() || state.shutdown {
            return;
        }

        let Some(entry) = state.membership.remove_contender(registration) else {
            self.fail(
                &mut state,
                Error::ProtocolViolation(format!(
                    "leader election '{}' does not belong to this service",
                    registration.component_id
                )),
            );
            return;
        };

        let was_leader = registration.is_leader();
        registration.set_active(false);
        registration.set_leader(false);

        if state.confirmed == Some(registration.id) {
            state.confirmed = None;
            state.address = None;
            state.confirmed_at = None;
            self.set_token(&mut state, None);
        }
        if state.proposed == Some(registration.id) {
            state.proposed = None;
            self.set_token(&mut state, None);
        }

        tracing::debug!(
            component_id = %registration.component_id,
            was_leader,
            "Contender removed"
        );

        let result = if was_leader {
            self.dispatcher
                .submit(revoke_call(registration.component_id.clone(), entry.contender))
                .map(drop)
        } else {
            Ok(())
        };

        if let Err(e) = result.and_then(|_| self.update_leader(&mut state).map(drop)) {
            self.fail(&mut state, e);
        }
    }

    pub(crate) async fn confirm_leader(
        &self,
        registration: &Arc<ContenderRegistration>,
        token: FencingToken,
        address: String,
    ) -> Completion {
        let mut state = self.state.lock().await;
        if !registration.is_active() || state.shutdown {
            tracing::debug!(
                component_id = %registration.component_id,
                "Ignoring leadership confirmation from an inactive contender"
            );
            return Completion::done();
        }

        if state.proposed != Some(registration.id) || state.token != Some(token) {
            tracing::debug!(
                component_id = %registration.component_id,
                %token,
                "Received confirmation of leadership for a stale leadership grant. Ignoring."
            );
            return Completion::done();
        }

        tracing::info!(
            component_id = %registration.component_id,
            address = %address,
            %token,
            "Received confirmation of leadership"
        );

        state.confirmed = Some(registration.id);
        state.proposed = None;
        state.address = Some(address.clone());
        state.confirmed_at = Some(Utc::now());

        match self.notify_all_listeners(&state, Some(LeaderInfo::new(address, token))) {
            Ok(completion) => completion,
            Err(e) => {
                self.fail(&mut state, e);
                Completion::done()
            }
        }
    }

    pub(crate) async fn add_listener(
        &self,
        registration: &Arc<ListenerRegistration>,
        listener: Arc<dyn LeaderListener>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.shutdown {
            return Err(Error::AlreadyShutdown);
        }

        let entry = ListenerEntry {
            registration: Arc::clone(registration),
            listener: Arc::clone(&listener),
        };
        if registration.is_active() || !state.membership.add_listener(entry) {
            return Err(self.fail(
                &mut state,
                Error::ProtocolViolation(
                    "leader retrieval service was added to this service multiple times".into(),
                ),
            ));
        }
        registration.set_active(true);

        // catch the new listener up with the current leader
        if let Some(leader) = state.leader_info() {
            if let Err(e) = self
                .dispatcher
                .submit(notify_call(registration.id, listener, Some(leader)))
            {
                return Err(self.fail(&mut state, e));
            }
        }

        Ok(())
    }

    pub(crate) async fn remove_listener(&self, registration: &Arc<ListenerRegistration>) {
        let mut state = self.state.lock().await;
        if !registration.is_active() || state.shutdown {
            return;
        }

        if state.membership.remove_listener(registration).is_none() {
            self.fail(
                &mut state,
                Error::ProtocolViolation(
                    "leader retrieval service does not belong to this service".into(),
                ),
            );
            return;
        }

        registration.set_active(false);
    }

    async fn grant_leadership(&self) -> Result<Completion> {
        let mut state = self.state.lock().await;
        if state.shutdown {
            return Err(Error::AlreadyShutdown);
        }

        self.update_leader(&mut state)
            .map_err(|e| self.fail(&mut state, e))
    }

    async fn revoke_leadership(&self) -> Result<Completion> {
        let mut state = self.state.lock().await;
        if state.shutdown {
            return Err(Error::AlreadyShutdown);
        }

        let Some(leader_id) = state.confirmed.or(state.proposed) else {
            return Ok(Completion::done());
        };
        let leader = state.membership.contender(leader_id).cloned();
        self.clear_leader(&mut state);

        let mut completion = Completion::done();
        if let Some(entry) = leader {
            tracing::info!(component_id = %entry.registration.component_id, "Revoking leadership");
            entry.registration.set_leader(false);

            match self
                .dispatcher
                .submit(revoke_call(entry.registration.component_id.clone(), entry.contender))
            {
                Ok(revoked) => completion = completion.merge(revoked),
                Err(e) => return Err(self.fail(&mut state, e)),
            }
        }

        match self.notify_all_listeners(&state, None) {
            Ok(notified) => Ok(completion.merge(notified)),
            Err(e) => Err(self.fail(&mut state, e)),
        }
    }

    /// Propose a new leader if the slot is empty. Must hold the lock.
    fn update_leader(&self, state: &mut ElectionState) -> Result<Completion> {
        if state.confirmed.is_some() || state.proposed.is_some() {
            return Ok(Completion::done());
        }

        let Some(entry) = state.membership.any_contender() else {
            // nobody can lead, tell everyone there is no leader
            return self.notify_all_listeners(state, None);
        };

        let token = FencingToken::random();
        self.set_token(state, Some(token));
        state.proposed = Some(entry.registration.id);
        entry.registration.set_leader(true);

        tracing::info!(
            component_id = %entry.registration.component_id,
            %token,
            "Proposing leadership to contender"
        );

        self.dispatcher.submit(grant_call(
            entry.registration.component_id.clone(),
            entry.contender,
            token,
        ))
    }

    fn notify_all_listeners(
        &self,
        state: &ElectionState,
        leader: Option<LeaderInfo>,
    ) -> Result<Completion> {
        let mut completion = Completion::done();
        for entry in state.membership.listeners() {
            let notified = self.dispatcher.submit(notify_call(
                entry.registration.id,
                Arc::clone(&entry.listener),
                leader.clone(),
            ))?;
            completion = completion.merge(notified);
        }
        Ok(completion)
    }

    /// Run the fatal path and return the error to hand the caller
    fn fail(&self, state: &mut ElectionState, error: Error) -> Error {
        self.fatal_error(state, error);
        Error::AlreadyShutdown
    }

    fn fatal_error(&self, state: &mut ElectionState, error: Error) {
        tracing::error!(
            %error,
            "Embedded leader election service encountered a fatal error. Shutting down service."
        );
        self.shutdown_locked(state, Error::Fatal(Box::new(error)));
    }

    fn shutdown_locked(&self, state: &mut ElectionState, cause: Error) {
        if state.shutdown {
            return;
        }

        self.clear_leader(state);
        let cause = Arc::new(cause);

        for entry in state.membership.drain_contenders() {
            let was_leader = entry.registration.is_leader();
            entry.registration.set_active(false);
            entry.registration.set_leader(false);

            let component_id = entry.registration.component_id.clone();
            if let Err(error) = self.dispatcher.submit(contender_shutdown_call(
                component_id.clone(),
                entry.contender,
                was_leader,
                Arc::clone(&cause),
            )) {
                tracing::warn!(%component_id, %error, "Could not notify contender of shutdown");
            }
        }

        for entry in state.membership.drain_listeners() {
            entry.registration.set_active(false);

            if let Err(error) = self
                .dispatcher
                .submit(listener_shutdown_call(entry.listener, Arc::clone(&cause)))
            {
                tracing::warn!(
                    listener_id = entry.registration.id,
                    %error,
                    "Could not notify listener of shutdown"
                );
            }
        }

        state.shutdown = true;
        tracing::info!(cause = %cause, "Leader election service shut down");
    }
}

/// In-process leader election service.
///
/// Cloning yields another handle to the same service.
#[derive(Clone)]
pub struct EmbeddedLeaderService {
    inner: Arc<ServiceInner>,
}

impl EmbeddedLeaderService {
    /// Create a service dispatching callbacks on `executor`
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        let dispatcher = Dispatcher::new(executor);
        let (published_token, _) = watch::channel(None);

        tracing::debug!(
            executor = dispatcher.executor_name(),
            "Created embedded leader election service"
        );

        Self {
            inner: Arc::new(ServiceInner {
                state: Mutex::new(ElectionState::default()),
                dispatcher,
                published_token,
            }),
        }
    }

    /// Create a service with the configured executor on the current runtime
    pub fn from_config(config: &WolfLeaderConfig) -> Result<Self> {
        Ok(Self::new(executor::from_kind(config.service.executor)?))
    }

    /// Create a contender registration for `component_id`
    pub async fn create_leader_election(
        &self,
        component_id: impl Into<String>,
    ) -> Result<ContenderHandle> {
        self.ensure_running().await?;
        let registration = ContenderRegistration::new(next_registration_id(), component_id.into());
        Ok(ContenderHandle::new(registration, Arc::clone(&self.inner)))
    }

    /// Create a listener registration
    pub async fn create_leader_retrieval(&self) -> Result<ListenerHandle> {
        self.ensure_running().await?;
        let registration = ListenerRegistration::new(next_registration_id());
        Ok(ListenerHandle::new(registration, Arc::clone(&self.inner)))
    }

    /// Create and start a contender registration
    pub async fn register_contender(
        &self,
        component_id: impl Into<String>,
        contender: Arc<dyn LeaderContender>,
    ) -> Result<ContenderHandle> {
        let handle = self.create_leader_election(component_id).await?;
        handle.start(contender).await?;
        Ok(handle)
    }

    /// Remove a contender; revokes its leadership if it held it
    pub async fn deregister_contender(&self, handle: &ContenderHandle) {
        self.inner.remove_contender(handle.registration()).await
    }

    /// Create and start a listener registration
    pub async fn register_listener(
        &self,
        listener: Arc<dyn LeaderListener>,
    ) -> Result<ListenerHandle> {
        let handle = self.create_leader_retrieval().await?;
        handle.start(listener).await?;
        Ok(handle)
    }

    pub async fn deregister_listener(&self, handle: &ListenerHandle) {
        self.inner.remove_listener(handle.registration()).await
    }

    /// Propose a leader now if none is proposed or confirmed
    pub async fn grant_leadership(&self) -> Result<Completion> {
        self.inner.grant_leadership().await
    }

    /// Take leadership away from the current leader and tell all listeners
    /// there is no leader. No new leader is proposed until the next
    /// membership change or [`grant_leadership`](Self::grant_leadership).
    pub async fn revoke_leadership(&self) -> Result<Completion> {
        self.inner.revoke_leadership().await
    }

    /// Shut the service down. Idempotent.
    ///
    /// There is no clean revocation round: every party is simply told that
    /// the service is gone.
    pub async fn shutdown(&self) {
        self.shutdown_with(Error::ServiceShutdown).await
    }

    /// Shut the service down, handing `cause` to every party. Idempotent.
    pub async fn shutdown_with(&self, cause: Error) {
        let mut state = self.inner.state.lock().await;
        self.inner.shutdown_locked(&mut state, cause);
    }

    pub async fn is_shutdown(&self) -> bool {
        self.inner.state.lock().await.shutdown
    }

    /// Current token, read without taking the lock
    pub fn current_token(&self) -> Option<FencingToken> {
        self.inner.current_token()
    }

    /// Snapshot of the election state
    pub async fn summary(&self) -> ArbiterSummary {
        let state = self.inner.state.lock().await;
        ArbiterSummary {
            contenders: state.membership.contender_count(),
            listeners: state.membership.listener_count(),
            proposed_leader: state.component_id(state.proposed),
            confirmed_leader: state.component_id(state.confirmed),
            token: state.token,
            address: state.address.clone(),
            confirmed_at: state.confirmed_at,
            shutdown: state.shutdown,
        }
    }

    async fn ensure_running(&self) -> Result<()> {
        if self.inner.state.lock().await.shutdown {
            return Err(Error::AlreadyShutdown);
        }
        Ok(())
    }
}
