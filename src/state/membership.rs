//! Contender and Listener Membership
//!
//! Registrations are the per-party records the election service keeps,
//! and the handles are what the parties hold to talk back to it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::election::ServiceInner;
use crate::error::Result;
use crate::executor::Completion;
use crate::leader::{LeaderContender, LeaderListener};
use crate::token::FencingToken;

/// Identity of a registration, unique across every service in the process
pub(crate) type RegistrationId = u64;

static NEXT_REGISTRATION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_registration_id() -> RegistrationId {
    NEXT_REGISTRATION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Per-contender record.
///
/// The flags are only written while the service lock is held. `is_leader`
/// is read without it by [`ContenderHandle::has_leadership`].
#[derive(Debug)]
pub(crate) struct ContenderRegistration {
    pub(crate) id: RegistrationId,
    pub(crate) component_id: String,
    active: AtomicBool,
    is_leader: AtomicBool,
}

impl ContenderRegistration {
    pub(crate) fn new(id: RegistrationId, component_id: String) -> Self {
        Self {
            id,
            component_id,
            active: AtomicBool::new(false),
            is_leader: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub(crate) fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Acquire)
    }

    pub(crate) fn set_leader(&self, leader: bool) {
        self.is_leader.store(leader, Ordering::Release);
    }
}

/// Per-listener record
#[derive(Debug)]
pub(crate) struct ListenerRegistration {
    pub(crate) id: RegistrationId,
    active: AtomicBool,
}

impl ListenerRegistration {
    pub(crate) fn new(id: RegistrationId) -> Self {
        Self {
            id,
            active: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }
}

/// Active contender together with the party behind it
#[derive(Clone)]
pub(crate) struct ContenderEntry {
    pub(crate) registration: Arc<ContenderRegistration>,
    pub(crate) contender: Arc<dyn LeaderContender>,
}

/// Active listener together with the party behind it
#[derive(Clone)]
pub(crate) struct ListenerEntry {
    pub(crate) registration: Arc<ListenerRegistration>,
    pub(crate) listener: Arc<dyn LeaderListener>,
}

/// The active contender and listener sets.
///
/// Not synchronized on its own; it lives inside the election state.
#[derive(Default)]
pub(crate) struct Membership {
    contenders: HashMap<RegistrationId, ContenderEntry>,
    listeners: HashMap<RegistrationId, ListenerEntry>,
}

impl Membership {
    /// Add a contender; `false` if it is already present
    pub(crate) fn add_contender(&mut self, entry: ContenderEntry) -> bool {
        let id = entry.registration.id;
        if self.contenders.contains_key(&id) {
            return false;
        }
        self.contenders.insert(id, entry);
        true
    }

    /// Remove exactly this registration. An entry under the same id that
    /// belongs to another registration is left in place.
    pub(crate) fn remove_contender(
        &mut self,
        registration: &Arc<ContenderRegistration>,
    ) -> Option<ContenderEntry> {
        let entry = self.contenders.get(&registration.id)?;
        if !Arc::ptr_eq(&entry.registration, registration) {
            return None;
        }
        self.contenders.remove(&registration.id)
    }

    pub(crate) fn contender(&self, id: RegistrationId) -> Option<&ContenderEntry> {
        self.contenders.get(&id)
    }

    /// Any active contender. No ordering or priority is implied.
    pub(crate) fn any_contender(&self) -> Option<ContenderEntry> {
        self.contenders.values().next().cloned()
    }

    pub(crate) fn drain_contenders(&mut self) -> Vec<ContenderEntry> {
        self.contenders.drain().map(|(_, entry)| entry).collect()
    }

    pub(crate) fn contender_count(&self) -> usize {
        self.contenders.len()
    }

    /// Add a listener; `false` if it is already present
    pub(crate) fn add_listener(&mut self, entry: ListenerEntry) -> bool {
        let id = entry.registration.id;
        if self.listeners.contains_key(&id) {
            return false;
        }
        self.listeners.insert(id, entry);
        true
    }

    /// Remove exactly this registration, see [`Membership::remove_contender`]
    pub(crate) fn remove_listener(
        &mut self,
        registration: &Arc<ListenerRegistration>,
    ) -> Option<ListenerEntry> {
        let entry = self.listeners.get(&registration.id)?;
        if !Arc::ptr_eq(&entry.registration, registration) {
            return None;
        }
        self.listeners.remove(&registration.id)
    }

    pub(crate) fn listeners(&self) -> impl Iterator<Item = &ListenerEntry> {
        self.listeners.values()
    }

    pub(crate) fn drain_listeners(&mut self) -> Vec<ListenerEntry> {
        self.listeners.drain().map(|(_, entry)| entry).collect()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Handle a contender uses to take part in the election.
///
/// Cloning yields another handle to the same registration.
#[derive(Clone)]
pub struct ContenderHandle {
    registration: Arc<ContenderRegistration>,
    service: Arc<ServiceInner>,
}

impl ContenderHandle {
    pub(crate) fn new(registration: ContenderRegistration, service: Arc<ServiceInner>) -> Self {
        Self {
            registration: Arc::new(registration),
            service,
        }
    }

    pub(crate) fn registration(&self) -> &Arc<ContenderRegistration> {
        &self.registration
    }

    /// Component ID this registration was created for
    pub fn component_id(&self) -> &str {
        &self.registration.component_id
    }

    /// Whether the contender is currently registered
    pub fn is_active(&self) -> bool {
        self.registration.is_active()
    }

    /// Whether this contender is proposed or confirmed leader.
    /// May be momentarily stale.
    pub fn is_leader(&self) -> bool {
        self.registration.is_leader()
    }

    /// Register `contender` with the service and trigger an election.
    ///
    /// Starting a handle that is already started is a protocol violation
    /// and shuts the service down.
    pub async fn start(&self, contender: Arc<dyn LeaderContender>) -> Result<()> {
        self.service.add_contender(&self.registration, contender).await
    }

    /// Withdraw from the election. No-op if not started.
    pub async fn close(&self) {
        self.service.remove_contender(&self.registration).await
    }

    /// Confirm a leadership grant.
    ///
    /// Stale confirmations are ignored. The returned signal completes once
    /// every listener notification has run.
    pub async fn confirm_leadership(
        &self,
        token: FencingToken,
        address: impl Into<String>,
    ) -> Completion {
        self.service
            .confirm_leader(&self.registration, token, address.into())
            .await
    }

    /// Best-effort check that this contender leads under `token`.
    ///
    /// Does not take the service lock, so it may race with a concurrent
    /// transition. Treat a `true` as advisory.
    pub fn has_leadership(&self, token: FencingToken) -> bool {
        self.registration.is_leader() && self.service.current_token() == Some(token)
    }
}

impl std::fmt::Debug for ContenderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContenderHandle")
            .field("component_id", &self.registration.component_id)
            .field("active", &self.registration.is_active())
            .field("leader", &self.registration.is_leader())
            .finish()
    }
}

/// Handle a listener uses to observe the leader
#[derive(Clone)]
pub struct ListenerHandle {
    registration: Arc<ListenerRegistration>,
    service: Arc<ServiceInner>,
}

impl ListenerHandle {
    pub(crate) fn new(registration: ListenerRegistration, service: Arc<ServiceInner>) -> Self {
        Self {
            registration: Arc::new(registration),
            service,
        }
    }

    pub(crate) fn registration(&self) -> &Arc<ListenerRegistration> {
        &self.registration
    }

    /// Whether the listener is currently registered
    pub fn is_active(&self) -> bool {
        self.registration.is_active()
    }

    /// Register `listener`. If a leader is already confirmed it is told
    /// right away.
    pub async fn start(&self, listener: Arc<dyn LeaderListener>) -> Result<()> {
        self.service.add_listener(&self.registration, listener).await
    }

    /// Stop receiving notifications. No-op if not started.
    pub async fn stop(&self) {
        self.service.remove_listener(&self.registration).await
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.registration.id)
            .field("active", &self.registration.is_active())
            .finish()
    }
}

/// Election state summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbiterSummary {
    pub contenders: usize,
    pub listeners: usize,
    /// Component ID of the proposed, not yet confirmed, leader
    pub proposed_leader: Option<String>,
    /// Component ID of the confirmed leader
    pub confirmed_leader: Option<String>,
    pub token: Option<FencingToken>,
    pub address: Option<String>,
    pub confirmed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub shutdown: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingContender, RecordingListener};

    fn contender_entry(id: RegistrationId) -> ContenderEntry {
        let (contender, _events) = RecordingContender::new();
        ContenderEntry {
            registration: Arc::new(ContenderRegistration::new(id, format!("c-{}", id))),
            contender,
        }
    }

    #[test]
    fn test_contender_membership() {
        let mut membership = Membership::default();
        assert!(membership.any_contender().is_none());

        assert!(membership.add_contender(contender_entry(1)));
        assert!(membership.add_contender(contender_entry(2)));
        assert!(!membership.add_contender(contender_entry(1)));
        assert_eq!(membership.contender_count(), 2);

        let any = membership.any_contender().unwrap();
        assert!(membership.contender(any.registration.id).is_some());

        let first = membership.contender(1).unwrap().registration.clone();
        assert!(membership.remove_contender(&first).is_some());
        assert!(membership.remove_contender(&first).is_none());
        assert_eq!(membership.drain_contenders().len(), 1);
        assert_eq!(membership.contender_count(), 0);
    }

    #[test]
    fn test_listener_membership() {
        let mut membership = Membership::default();
        let (listener, _events) = RecordingListener::new();
        let entry = ListenerEntry {
            registration: Arc::new(ListenerRegistration::new(9)),
            listener,
        };

        assert!(membership.add_listener(entry.clone()));
        assert!(!membership.add_listener(entry.clone()));
        assert_eq!(membership.listeners().count(), 1);
        assert!(membership.remove_listener(&entry.registration).is_some());
        assert_eq!(membership.listener_count(), 0);
        assert!(membership.drain_listeners().is_empty());
    }

    #[test]
    fn test_removal_requires_same_registration() {
        let mut membership = Membership::default();
        let ours = contender_entry(4);
        assert!(membership.add_contender(ours.clone()));

        // same id, different registration
        let other = Arc::new(ContenderRegistration::new(4, "c-4".into()));
        assert!(membership.remove_contender(&other).is_none());
        assert_eq!(membership.contender_count(), 1);
        assert!(membership.remove_contender(&ours.registration).is_some());

        let (listener, _events) = RecordingListener::new();
        let registration = Arc::new(ListenerRegistration::new(4));
        assert!(membership.add_listener(ListenerEntry {
            registration: Arc::clone(&registration),
            listener,
        }));
        assert!(membership
            .remove_listener(&Arc::new(ListenerRegistration::new(4)))
            .is_none());
        assert_eq!(membership.listener_count(), 1);
        assert!(membership.remove_listener(&registration).is_some());
    }

    #[test]
    fn test_registration_ids_are_process_unique() {
        let first = next_registration_id();
        let second = next_registration_id();
        assert!(second > first);
    }

    #[test]
    fn test_registration_flags() {
        let registration = ContenderRegistration::new(1, "a".into());
        assert!(!registration.is_active());
        assert!(!registration.is_leader());

        registration.set_active(true);
        registration.set_leader(true);
        assert!(registration.is_active());
        assert!(registration.is_leader());
    }
}
