//! Session state and its single writer

use crate::error::{ErrorKind, SessionError};
use crate::identity::Identity;
use crate::mutation::PendingMutation;
use crate::snapshot::AllowanceSnapshot;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub phase: ConnectionPhase,
    pub identity: Option<Identity>,
    pub latest_snapshot: Option<AllowanceSnapshot>,
    pub pending_mutation: Option<PendingMutation>,
    pub last_error: Option<SessionError>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            identity: None,
            latest_snapshot: None,
            pending_mutation: None,
            last_error: None,
        }
    }
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }
}

/// Owns `SessionState`. Every write goes through here and is published to
/// subscribers.
///
/// Snapshot writes are ordered by an epoch: full fetches bump it before they
/// start, and a poll result is dropped if the epoch moved while it was in
/// flight.
pub(crate) struct StateStore {
    tx: watch::Sender<SessionState>,
    snapshot_epoch: AtomicU64,
}

impl StateStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::default());
        Self {
            tx,
            snapshot_epoch: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.tx.borrow().phase
    }

    pub fn identity(&self) -> Option<Identity> {
        self.tx.borrow().identity.clone()
    }

    pub fn latest_snapshot(&self) -> Option<AllowanceSnapshot> {
        self.tx.borrow().latest_snapshot.clone()
    }

    /// Disconnected -> Connecting. Returns false if not disconnected.
    pub fn begin_connecting(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if state.phase != ConnectionPhase::Disconnected {
                return false;
            }
            state.phase = ConnectionPhase::Connecting;
            true
        })
    }

    /// Connecting -> Connected. Returns false if the attempt was cancelled
    /// (e.g. by a disconnect) while the identity was being requested.
    pub fn set_connected(&self, identity: Identity) -> bool {
        let address = identity.address;
        let connected = self.tx.send_if_modified(|state| {
            if state.phase != ConnectionPhase::Connecting {
                return false;
            }
            state.phase = ConnectionPhase::Connected;
            state.identity = Some(identity);
            state.last_error = None;
            true
        });
        if connected {
            info!("Session connected as {}", address);
        }
        connected
    }

    /// Drops the identity and snapshot. `error`, if any, becomes `last_error`.
    pub fn set_disconnected(&self, error: Option<SessionError>) {
        self.snapshot_epoch.fetch_add(1, Ordering::SeqCst);
        self.tx.send_modify(|state| {
            state.phase = ConnectionPhase::Disconnected;
            state.identity = None;
            state.latest_snapshot = None;
            if error.is_some() {
                state.last_error = error;
            }
        });
        info!("Session disconnected");
    }

    /// Marks the start of a full fetch; later poll results from before this
    /// point are discarded.
    pub fn invalidate_polls(&self) -> u64 {
        self.snapshot_epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn poll_epoch(&self) -> u64 {
        self.snapshot_epoch.load(Ordering::SeqCst)
    }

    /// Applies a full snapshot whose fetch began at `started_at_epoch`, unless
    /// a newer full fetch has started since.
    pub fn apply_snapshot(&self, started_at_epoch: u64, snapshot: AllowanceSnapshot) -> bool {
        self.tx.send_if_modified(|state| {
            if state.phase != ConnectionPhase::Connected
                || self.snapshot_epoch.load(Ordering::SeqCst) != started_at_epoch
            {
                return false;
            }
            state.latest_snapshot = Some(snapshot);
            clear_read_error(state);
            true
        })
    }

    /// Applies a polled cooldown on top of the latest snapshot, unless a full
    /// fetch was started after the poll began.
    pub fn apply_polled_cooldown(&self, started_at_epoch: u64, cooldown: u64) -> bool {
        self.tx.send_if_modified(|state| {
            if state.phase != ConnectionPhase::Connected
                || self.snapshot_epoch.load(Ordering::SeqCst) != started_at_epoch
            {
                return false;
            }
            let Some(latest) = &state.latest_snapshot else {
                return false;
            };
            state.latest_snapshot = Some(latest.with_cooldown(cooldown));
            clear_read_error(state);
            true
        })
    }

    /// Sets `pending_mutation` if it is empty. Returns false when another
    /// mutation already holds it.
    pub fn try_begin_mutation(&self, pending: PendingMutation) -> bool {
        self.tx.send_if_modified(|state| {
            if state.pending_mutation.is_some() {
                return false;
            }
            state.pending_mutation = Some(pending);
            true
        })
    }

    pub fn finish_mutation(&self) {
        self.tx.send_modify(|state| state.pending_mutation = None);
    }

    pub fn record_error(&self, error: SessionError) {
        self.tx.send_modify(|state| state.last_error = Some(error));
    }

    pub fn clear_error(&self) {
        self.tx.send_if_modified(|state| state.last_error.take().is_some());
    }
}

/// A successful read supersedes a previous read failure only.
fn clear_read_error(state: &mut SessionState) {
    if matches!(&state.last_error, Some(e) if e.kind == ErrorKind::LedgerRead) {
        state.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::error::ReadKind;
    use crate::mutation::{MutationKind, MutationRequest};
    use spout_common::{Address, TokenAmount};

    fn connected_store() -> StateStore {
        let store = StateStore::new();
        assert!(store.begin_connecting());
        assert!(store.set_connected(Identity::new(Address([1; 20]))));
        store
    }

    fn snapshot(cooldown: u64) -> AllowanceSnapshot {
        AllowanceSnapshot::new(TokenAmount::from_tokens(1000), TokenAmount::from_tokens(50), cooldown)
    }

    #[test]
    fn test_connecting_only_from_disconnected() {
        let store = StateStore::new();
        assert!(store.begin_connecting());
        assert!(!store.begin_connecting());
        assert!(store.set_connected(Identity::new(Address([1; 20]))));
        assert!(!store.begin_connecting());
        store.set_disconnected(None);
        assert!(store.begin_connecting());
    }

    #[test]
    fn test_snapshot_ignored_when_disconnected() {
        let store = StateStore::new();
        assert!(!store.apply_snapshot(store.invalidate_polls(), snapshot(0)));
        assert!(store.current().latest_snapshot.is_none());
    }

    #[test]
    fn test_stale_poll_is_discarded() {
        let store = connected_store();
        store.apply_snapshot(store.invalidate_polls(), snapshot(100));

        let poll_epoch = store.poll_epoch();
        let fetch_epoch = store.invalidate_polls();
        store.apply_snapshot(fetch_epoch, snapshot(0));

        assert!(!store.apply_polled_cooldown(poll_epoch, 100));
        assert_eq!(store.current().latest_snapshot.unwrap().cooldown_seconds_remaining(), 0);

        let fresh = store.poll_epoch();
        assert!(store.apply_polled_cooldown(fresh, 42));
        assert_eq!(store.current().latest_snapshot.unwrap().cooldown_seconds_remaining(), 42);
    }

    #[test]
    fn test_older_full_fetch_is_discarded() {
        let store = connected_store();
        let early = store.invalidate_polls();
        let late = store.invalidate_polls();

        assert!(store.apply_snapshot(late, snapshot(0)));
        assert!(!store.apply_snapshot(early, snapshot(500)));
        assert_eq!(store.current().latest_snapshot.unwrap().cooldown_seconds_remaining(), 0);
    }

    #[test]
    fn test_connect_cancelled_by_disconnect() {
        let store = StateStore::new();
        assert!(store.begin_connecting());
        store.set_disconnected(None);

        assert!(!store.set_connected(Identity::new(Address([1; 20]))));
        let state = store.current();
        assert_eq!(state.phase, ConnectionPhase::Disconnected);
        assert!(state.identity.is_none());
    }

    #[test]
    fn test_busy_guard() {
        let store = connected_store();
        let pending = PendingMutation::for_request(&MutationRequest::AutoMint);
        assert!(store.try_begin_mutation(pending.clone()));
        assert!(!store.try_begin_mutation(pending));
        assert_eq!(store.current().pending_mutation.unwrap().kind, MutationKind::AutoMint);
        store.finish_mutation();
        assert!(store.current().pending_mutation.is_none());
    }

    #[test]
    fn test_successful_read_clears_only_read_errors() {
        let store = connected_store();
        let read_error = ClientError::LedgerRead {
            read: ReadKind::Cooldown,
            message: "timeout".into(),
            fatal: false,
        };
        store.record_error(read_error.to_session_error());
        store.apply_snapshot(store.invalidate_polls(), snapshot(0));
        assert!(store.current().last_error.is_none());

        store.record_error(ClientError::MutationRejected("limit".into()).to_session_error());
        store.apply_snapshot(store.invalidate_polls(), snapshot(0));
        assert_eq!(store.current().last_error.unwrap().kind, ErrorKind::MutationRejected);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let store = StateStore::new();
        let mut rx = store.subscribe();
        store.begin_connecting();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().phase, ConnectionPhase::Connecting);
    }
}
