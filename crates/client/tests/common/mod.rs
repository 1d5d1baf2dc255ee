//! Test doubles for the session's collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use spout_client::{
    AllowanceSnapshot, ClientError, ClientResult, ContractCall, FaucetInfo, Identity,
    IdentityProvider, LedgerGateway, MutationKind, MutationOutcome, MutationReceipt,
    PendingTransaction, ReadKind, ReceiptStatus, SessionManager, SessionSettings,
    TransactionReceipt,
};
use spout_common::utils::metrics::SessionMetrics;
use spout_common::{Address, TokenAmount, TxHash};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CHAIN_ID: u64 = 17000;
pub const COOLDOWN_PERIOD: u64 = 86_400;

pub fn user() -> Address {
    Address([0xaa; 20])
}

/// Faucet state as the ledger sees it.
#[derive(Debug, Clone)]
pub struct LedgerState {
    pub balance: TokenAmount,
    pub allowance: TokenAmount,
    pub cooldown: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFailure {
    None,
    Transient,
    Fatal,
}

/// In-memory ledger behind the `LedgerGateway` seam. Counts every call.
pub struct MockLedger {
    pub state: Mutex<LedgerState>,
    pub chain_id: AtomicU64,
    pub read_failure: Mutex<ReadFailure>,
    pub reject_with: Mutex<Option<String>>,
    pub owner: Mutex<Address>,
    /// Taken by the next snapshot fetch, which waits on it after reading
    snapshot_hold: Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
    /// Held by a test to keep submissions pending
    pub submit_gate: tokio::sync::Mutex<()>,
    /// Held by a test to keep cooldown polls in flight
    pub cooldown_gate: tokio::sync::Mutex<()>,
    pub snapshot_fetches: AtomicUsize,
    pub cooldown_fetches: AtomicUsize,
    pub withdrawals: AtomicUsize,
    pub auto_mints: AtomicUsize,
    pub forced_mints: AtomicUsize,
    pub info_reads: AtomicUsize,
    next_tx: AtomicU64,
}

impl MockLedger {
    pub fn new(balance: u64, allowance: u64, cooldown: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LedgerState {
                balance: TokenAmount::from_tokens(balance),
                allowance: TokenAmount::from_tokens(allowance),
                cooldown,
            }),
            chain_id: AtomicU64::new(CHAIN_ID),
            read_failure: Mutex::new(ReadFailure::None),
            reject_with: Mutex::new(None),
            owner: Mutex::new(Address([0x01; 20])),
            snapshot_hold: Mutex::new(None),
            submit_gate: tokio::sync::Mutex::new(()),
            cooldown_gate: tokio::sync::Mutex::new(()),
            snapshot_fetches: AtomicUsize::new(0),
            cooldown_fetches: AtomicUsize::new(0),
            withdrawals: AtomicUsize::new(0),
            auto_mints: AtomicUsize::new(0),
            forced_mints: AtomicUsize::new(0),
            info_reads: AtomicUsize::new(0),
            next_tx: AtomicU64::new(1),
        })
    }

    /// Every gateway call except `chain_id`.
    pub fn total_calls(&self) -> usize {
        self.snapshot_fetches.load(Ordering::SeqCst)
            + self.cooldown_fetches.load(Ordering::SeqCst)
            + self.withdrawals.load(Ordering::SeqCst)
            + self.auto_mints.load(Ordering::SeqCst)
            + self.forced_mints.load(Ordering::SeqCst)
            + self.info_reads.load(Ordering::SeqCst)
    }

    pub fn set_cooldown(&self, cooldown: u64) {
        self.state.lock().unwrap().cooldown = cooldown;
    }

    pub fn fail_reads(&self, failure: ReadFailure) {
        *self.read_failure.lock().unwrap() = failure;
    }

    /// The next snapshot fetch reads the ledger, then stalls until the
    /// returned sender fires or is dropped.
    pub fn hold_next_snapshot(&self) -> tokio::sync::oneshot::Sender<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        *self.snapshot_hold.lock().unwrap() = Some(rx);
        tx
    }

    pub fn set_owner(&self, owner: Address) {
        *self.owner.lock().unwrap() = owner;
    }

    fn replenish(&self) {
        let mut state = self.state.lock().unwrap();
        state.balance = state
            .balance
            .checked_add(TokenAmount::from_tokens(1000))
            .unwrap_or(state.balance);
        state.cooldown = COOLDOWN_PERIOD;
    }

    pub fn reject_next(&self, reason: &str) {
        *self.reject_with.lock().unwrap() = Some(reason.to_string());
    }

    fn check_read(&self, read: ReadKind) -> ClientResult<()> {
        match *self.read_failure.lock().unwrap() {
            ReadFailure::None => Ok(()),
            ReadFailure::Transient => Err(ClientError::LedgerRead {
                read,
                message: "connection reset".to_string(),
                fatal: false,
            }),
            ReadFailure::Fatal => Err(ClientError::LedgerRead {
                read,
                message: "call returned no data".to_string(),
                fatal: true,
            }),
        }
    }

    fn receipt(&self, kind: MutationKind, outcome: MutationOutcome) -> MutationReceipt {
        let n = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let mut hash = [0u8; 32];
        hash[24..].copy_from_slice(&n.to_be_bytes());
        MutationReceipt {
            kind,
            tx_hash: TxHash(hash),
            block_number: 100 + n,
            outcome,
        }
    }
}

#[async_trait]
impl LedgerGateway for MockLedger {
    async fn chain_id(&self) -> ClientResult<u64> {
        Ok(self.chain_id.load(Ordering::SeqCst))
    }

    async fn fetch_snapshot(&self, _identity: &Identity) -> ClientResult<AllowanceSnapshot> {
        self.snapshot_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_read(ReadKind::Balance)?;
        let state = self.state.lock().unwrap().clone();
        let hold = self.snapshot_hold.lock().unwrap().take();
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        Ok(AllowanceSnapshot::new(state.balance, state.allowance, state.cooldown))
    }

    async fn fetch_cooldown(&self) -> ClientResult<u64> {
        self.cooldown_fetches.fetch_add(1, Ordering::SeqCst);
        // Value is read before waiting so a held gate yields a stale result.
        let cooldown = self.state.lock().unwrap().cooldown;
        let _gate = self.cooldown_gate.lock().await;
        self.check_read(ReadKind::Cooldown)?;
        Ok(cooldown)
    }

    async fn submit_withdrawal(&self, amount: TokenAmount) -> ClientResult<MutationReceipt> {
        self.withdrawals.fetch_add(1, Ordering::SeqCst);
        let _gate = self.submit_gate.lock().await;
        if let Some(reason) = self.reject_with.lock().unwrap().take() {
            return Err(ClientError::MutationRejected(reason));
        }

        {
            let mut state = self.state.lock().unwrap();
            let (Some(allowance), Some(balance)) =
                (state.allowance.checked_sub(amount), state.balance.checked_sub(amount))
            else {
                return Err(ClientError::MutationRejected("Exceeds daily limit".to_string()));
            };
            state.allowance = allowance;
            state.balance = balance;
        }
        Ok(self.receipt(MutationKind::Withdraw, MutationOutcome::Applied))
    }

    async fn submit_auto_mint(&self) -> ClientResult<MutationReceipt> {
        self.auto_mints.fetch_add(1, Ordering::SeqCst);
        let _gate = self.submit_gate.lock().await;
        let cooldown = self.state.lock().unwrap().cooldown;
        if cooldown == 0 {
            self.replenish();
        }
        Ok(self.receipt(MutationKind::AutoMint, MutationOutcome::Applied))
    }

    async fn submit_force_auto_mint(&self) -> ClientResult<MutationReceipt> {
        self.forced_mints.fetch_add(1, Ordering::SeqCst);
        let _gate = self.submit_gate.lock().await;
        self.replenish();
        Ok(self.receipt(MutationKind::ForceAutoMint, MutationOutcome::Applied))
    }

    async fn faucet_info(&self) -> ClientResult<FaucetInfo> {
        self.info_reads.fetch_add(1, Ordering::SeqCst);
        self.check_read(ReadKind::FaucetInfo)?;
        Ok(FaucetInfo {
            faucet: Address([0x12; 20]),
            owner: *self.owner.lock().unwrap(),
            token: Address([0x02; 20]),
            max_tokens_per_day: TokenAmount::from_tokens(50),
            last_auto_mint: None,
        })
    }
}

/// Wallet stand-in. Access is granted unless `deny` is set.
pub struct MockIdentity {
    pub bound: Mutex<Option<Identity>>,
    pub deny: Mutex<bool>,
    /// Held by a test to keep `request_access` pending
    pub access_gate: tokio::sync::Mutex<()>,
    pub access_requests: AtomicUsize,
}

impl MockIdentity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            bound: Mutex::new(None),
            deny: Mutex::new(false),
            access_gate: tokio::sync::Mutex::new(()),
            access_requests: AtomicUsize::new(0),
        })
    }

    /// Already authorized from an earlier run.
    pub fn pre_authorized() -> Arc<Self> {
        let identity = Self::new();
        *identity.bound.lock().unwrap() = Some(Identity::new(user()));
        identity
    }

    pub fn denying() -> Arc<Self> {
        let identity = Self::new();
        *identity.deny.lock().unwrap() = true;
        identity
    }

    pub fn revoke(&self) {
        *self.bound.lock().unwrap() = None;
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn request_access(&self) -> ClientResult<Identity> {
        self.access_requests.fetch_add(1, Ordering::SeqCst);
        let _gate = self.access_gate.lock().await;
        if *self.deny.lock().unwrap() {
            return Err(ClientError::AccessDenied("user rejected the request".to_string()));
        }
        let identity = Identity::new(user());
        *self.bound.lock().unwrap() = Some(identity.clone());
        Ok(identity)
    }

    async fn active_identity(&self) -> ClientResult<Option<Identity>> {
        Ok(self.bound.lock().unwrap().clone())
    }

    async fn sign_and_submit(&self, _call: ContractCall) -> ClientResult<PendingTransaction> {
        Err(ClientError::Internal("mock identity does not sign".to_string()))
    }

    async fn await_confirmation(&self, pending: &PendingTransaction) -> ClientResult<TransactionReceipt> {
        Ok(TransactionReceipt {
            tx_hash: pending.tx_hash,
            block_number: 1,
            gas_used: 21_000,
            status: ReceiptStatus::Success,
        })
    }
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        poll_interval: Duration::from_secs(60),
        expected_chain_id: Some(CHAIN_ID),
        confirmation_display: Duration::from_secs(3),
    }
}

pub fn session(ledger: &Arc<MockLedger>, identity: &Arc<MockIdentity>) -> SessionManager {
    spout_common::utils::logging::init_test_logging();
    SessionManager::new(
        ledger.clone(),
        identity.clone(),
        settings(),
        Arc::new(SessionMetrics::new().unwrap()),
        None,
    )
}

/// Yields until `condition` holds on the session state.
pub async fn wait_for<F>(session: &SessionManager, condition: F)
where
    F: Fn(&spout_client::SessionState) -> bool,
{
    let mut rx = session.subscribe();
    loop {
        if condition(&*rx.borrow_and_update()) {
            return;
        }
        rx.changed().await.unwrap();
    }
}
