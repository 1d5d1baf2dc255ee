//! Session manager: connection state machine and background polling

use crate::config::ClientConfig;
use crate::database::{MutationRecord, SessionDatabase};
use crate::error::{ClientError, ClientResult, SessionError};
use crate::gateway::{FaucetInfo, LedgerGateway};
use crate::identity::{Identity, IdentityProvider};
use crate::mutation::{Confirmation, MutationRequest};
use crate::queue::ActionQueue;
use crate::snapshot::AllowanceSnapshot;
use crate::state::{ConnectionPhase, SessionState, StateStore};
use spout_common::utils::metrics::SessionMetrics;
use spout_common::TokenAmount;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Timing and network settings of a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    /// Connect fails with `WrongNetwork` if the provider reports another chain
    pub expected_chain_id: Option<u64>,
    /// Lifetime of the success marker returned by mutations
    pub confirmation_display: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            expected_chain_id: None,
            confirmation_display: Duration::from_secs(3),
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            expected_chain_id: config.expected_chain_id,
            confirmation_display: config.confirmation_display(),
        }
    }
}

/// State and collaborators shared by the manager, the action queue and the
/// polling task.
pub(crate) struct SessionCore {
    pub(crate) store: StateStore,
    pub(crate) gateway: Arc<dyn LedgerGateway>,
    pub(crate) identity_provider: Arc<dyn IdentityProvider>,
    pub(crate) metrics: Arc<SessionMetrics>,
    pub(crate) journal: Option<Arc<SessionDatabase>>,
    pub(crate) settings: SessionSettings,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionCore {
    /// Full snapshot fetch. Supersedes any poll or fetch that is still in
    /// flight; if a newer fetch starts before this one lands, the result is
    /// returned but not applied.
    pub(crate) async fn refresh_snapshot(&self, identity: &Identity) -> ClientResult<AllowanceSnapshot> {
        let epoch = self.store.invalidate_polls();
        self.metrics.snapshot_fetches_total.inc();
        match self.gateway.fetch_snapshot(identity).await {
            Ok(snapshot) => {
                if self.store.apply_snapshot(epoch, snapshot.clone()) {
                    debug!(
                        balance = %snapshot.faucet_balance(),
                        allowance = %snapshot.caller_allowance_remaining(),
                        cooldown = snapshot.cooldown_seconds_remaining(),
                        "Snapshot fetched"
                    );
                } else {
                    debug!("Snapshot superseded by a newer fetch");
                }
                Ok(snapshot)
            }
            Err(e) if !e.is_fatal_read() && self.store.poll_epoch() != epoch => {
                debug!("Superseded snapshot fetch failed: {}", e);
                Err(e)
            }
            Err(e) => {
                self.read_failed(&e);
                Err(e)
            }
        }
    }

    /// Stale values stay in place; only a fatal read tears the connection down.
    fn read_failed(&self, err: &ClientError) {
        self.metrics.read_failures_total.inc();
        warn!("Ledger read failed: {}", err);
        if err.is_fatal_read() {
            self.drop_connection(Some(err.to_session_error()));
        } else {
            self.store.record_error(err.to_session_error());
        }
    }

    /// Opportunistic revocation check. Disconnects when the provider no
    /// longer reports `identity` as authorized.
    pub(crate) async fn identity_still_bound(&self, identity: &Identity) -> bool {
        match self.identity_provider.active_identity().await {
            Ok(Some(active)) if active.address == identity.address => true,
            Ok(_) => {
                warn!("Authorization for {} was revoked", identity.address);
                let err = ClientError::AccessDenied(format!("access for {} was revoked", identity.address));
                self.drop_connection(Some(err.to_session_error()));
                false
            }
            Err(e) => {
                debug!("Identity check failed, keeping connection: {}", e);
                true
            }
        }
    }

    fn drop_connection(&self, error: Option<SessionError>) {
        self.stop_polling();
        self.store.set_disconnected(error);
        self.metrics.set_connected(false);
    }

    fn stop_polling(&self) {
        let handle = self.poll_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("Polling stopped");
        }
    }

    fn start_polling(core: &Arc<SessionCore>) {
        let interval = core.settings.poll_interval;
        let weak = Arc::downgrade(core);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(core) = weak.upgrade() else {
                    break;
                };
                if !core.poll_once().await {
                    break;
                }
            }
        });

        let previous = core
            .poll_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        info!(interval_secs = interval.as_secs(), "Polling started");
    }

    /// One poll tick. Returns false when the loop should stop.
    async fn poll_once(&self) -> bool {
        self.metrics.poll_ticks_total.inc();
        if self.store.phase() != ConnectionPhase::Connected {
            return false;
        }
        let Some(identity) = self.store.identity() else {
            return false;
        };
        if !self.identity_still_bound(&identity).await {
            return false;
        }

        // Nothing to patch yet; the initial fetch must have failed.
        if self.store.latest_snapshot().is_none() {
            return !matches!(self.refresh_snapshot(&identity).await, Err(e) if e.is_fatal_read());
        }

        let epoch = self.store.poll_epoch();
        match self.gateway.fetch_cooldown().await {
            Ok(cooldown) => {
                if self.store.apply_polled_cooldown(epoch, cooldown) {
                    debug!(cooldown, "Cooldown polled");
                } else {
                    debug!("Poll result superseded by a newer fetch");
                }
                true
            }
            Err(e) => {
                self.read_failed(&e);
                !e.is_fatal_read()
            }
        }
    }
}

/// Drives one user's session against the faucet.
pub struct SessionManager {
    core: Arc<SessionCore>,
    queue: ActionQueue,
}

impl SessionManager {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        identity_provider: Arc<dyn IdentityProvider>,
        settings: SessionSettings,
        metrics: Arc<SessionMetrics>,
        journal: Option<Arc<SessionDatabase>>,
    ) -> Self {
        let core = Arc::new(SessionCore {
            store: StateStore::new(),
            gateway,
            identity_provider,
            metrics,
            journal,
            settings,
            poll_task: Mutex::new(None),
        });
        let queue = ActionQueue::new(core.clone());
        Self { core, queue }
    }

    /// Reconnects without prompting if the provider already holds an
    /// authorization.
    pub async fn start(&self) -> ClientResult<ConnectionPhase> {
        match self.core.identity_provider.active_identity().await {
            Ok(Some(identity)) => {
                if !self.core.store.begin_connecting() {
                    return Ok(self.core.store.phase());
                }
                info!("Resuming session for {}", identity.address);
                self.establish(identity).await?;
                Ok(ConnectionPhase::Connected)
            }
            Ok(None) => {
                info!("No existing authorization; waiting for connect");
                Ok(ConnectionPhase::Disconnected)
            }
            Err(e) => self.reject(e),
        }
    }

    /// Asks the identity provider for access and binds the session.
    ///
    /// Already connected: returns the bound identity. Connecting: `Busy`.
    pub async fn connect(&self) -> ClientResult<Identity> {
        self.core.metrics.connect_attempts_total.inc();
        if !self.core.store.begin_connecting() {
            return match self.core.store.identity() {
                Some(identity) if self.core.store.phase() == ConnectionPhase::Connected => Ok(identity),
                _ => self.reject(ClientError::Busy),
            };
        }

        info!("Requesting access from identity provider");
        match self.core.identity_provider.request_access().await {
            Ok(identity) => self.establish(identity).await,
            Err(e) => self.abort_connect(e),
        }
    }

    async fn establish(&self, identity: Identity) -> ClientResult<Identity> {
        if let Some(expected) = self.core.settings.expected_chain_id {
            let actual = match self.core.gateway.chain_id().await {
                Ok(actual) => actual,
                Err(e) => return self.abort_connect(e),
            };
            if actual != expected {
                return self.abort_connect(ClientError::WrongNetwork { expected, actual });
            }
            info!(chain_id = actual, "Network verified");
        }

        if !self.core.store.set_connected(identity.clone()) {
            info!("Connect for {} was cancelled", identity.address);
            return Err(ClientError::NotConnected);
        }
        self.core.metrics.set_connected(true);

        if let Err(e) = self.core.refresh_snapshot(&identity).await {
            if e.is_fatal_read() {
                return Err(e);
            }
        }
        SessionCore::start_polling(&self.core);
        Ok(identity)
    }

    fn abort_connect<T>(&self, err: ClientError) -> ClientResult<T> {
        warn!("Connect failed: {}", err);
        self.core.drop_connection(Some(err.to_session_error()));
        Err(err)
    }

    /// Records `err` as the last error and returns it.
    fn reject<T>(&self, err: ClientError) -> ClientResult<T> {
        self.core.store.record_error(err.to_session_error());
        Err(err)
    }

    fn connected_identity(&self) -> ClientResult<Identity> {
        match self.core.store.identity() {
            Some(identity) if self.core.store.phase() == ConnectionPhase::Connected => Ok(identity),
            _ => self.reject(ClientError::NotConnected),
        }
    }

    async fn bound_identity(&self) -> ClientResult<Identity> {
        let identity = self.connected_identity()?;
        if !self.core.identity_still_bound(&identity).await {
            return Err(ClientError::AccessDenied(format!(
                "access for {} was revoked",
                identity.address
            )));
        }
        Ok(identity)
    }

    /// Manual full re-read.
    pub async fn refresh(&self) -> ClientResult<AllowanceSnapshot> {
        let identity = self.bound_identity().await?;
        self.core.refresh_snapshot(&identity).await
    }

    /// Withdraws `amount` (decimal token units).
    ///
    /// Malformed, non-positive, or above-allowance amounts fail with
    /// `InvalidAmount` before any network call.
    pub async fn request_tokens(&self, amount: &str) -> ClientResult<Confirmation> {
        let amount = match TokenAmount::parse(amount) {
            Ok(amount) if amount.is_zero() => {
                return self.reject(ClientError::InvalidAmount("amount must be greater than zero".to_string()))
            }
            Ok(amount) => amount,
            Err(e) => return self.reject(ClientError::InvalidAmount(e.to_string())),
        };

        self.connected_identity()?;
        if let Some(snapshot) = self.core.store.latest_snapshot() {
            let allowance = snapshot.caller_allowance_remaining();
            if amount > allowance {
                return self.reject(ClientError::InvalidAmount(format!(
                    "{} exceeds remaining allowance of {}",
                    amount, allowance
                )));
            }
        }

        let identity = self.bound_identity().await?;
        self.queue.submit(&identity, MutationRequest::Withdraw(amount)).await
    }

    /// Triggers replenishment. Gated locally on the latest snapshot's
    /// availability flag.
    pub async fn trigger_replenishment(&self) -> ClientResult<Confirmation> {
        self.connected_identity()?;
        match self.core.store.latest_snapshot() {
            Some(snapshot) if snapshot.is_auto_mint_available() => {}
            Some(snapshot) => {
                return self.reject(ClientError::AutoMintUnavailable {
                    cooldown_remaining: Some(snapshot.cooldown_seconds_remaining()),
                })
            }
            None => return self.reject(ClientError::AutoMintUnavailable { cooldown_remaining: None }),
        }

        let identity = self.bound_identity().await?;
        self.queue.submit(&identity, MutationRequest::AutoMint).await
    }

    /// Replenishes regardless of the cooldown. Only the faucet owner may do
    /// this; anyone else is refused with `NotOwner` before anything is signed.
    pub async fn force_replenishment(&self) -> ClientResult<Confirmation> {
        let identity = self.connected_identity()?;
        let owner = match self.core.gateway.faucet_info().await {
            Ok(info) => info.owner,
            Err(e) => return self.reject(e),
        };
        if owner != identity.address {
            return self.reject(ClientError::NotOwner {
                caller: identity.address,
                owner,
            });
        }

        let identity = self.bound_identity().await?;
        self.queue.submit(&identity, MutationRequest::ForceAutoMint).await
    }

    /// Unbinds the session locally. The provider's authorization is kept.
    pub fn disconnect(&self) {
        info!("Disconnect requested");
        self.core.drop_connection(None);
    }

    pub fn state(&self) -> SessionState {
        self.core.store.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.core.store.subscribe()
    }

    pub async fn faucet_info(&self) -> ClientResult<FaucetInfo> {
        self.core.gateway.faucet_info().await
    }

    /// Journaled mutations, newest first.
    pub fn history(&self, limit: usize) -> ClientResult<Vec<MutationRecord>> {
        match &self.core.journal {
            Some(journal) => journal.recent_mutations(limit),
            None => Ok(Vec::new()),
        }
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.core.metrics
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.core.stop_polling();
    }
}
