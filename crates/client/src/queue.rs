//! Mutation serializer
//!
//! At most one mutation is in flight per session. Every resolved mutation,
//! successful or not, is followed by exactly one full snapshot fetch.

use crate::database::MutationRecord;
use crate::error::{ClientError, ClientResult};
use crate::identity::Identity;
use crate::mutation::{Confirmation, MutationReceipt, MutationRequest, PendingMutation};
use crate::session::SessionCore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct ActionQueue {
    core: Arc<SessionCore>,
}

impl ActionQueue {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self { core }
    }

    /// True while a mutation holds the queue.
    pub fn is_busy(&self) -> bool {
        self.core.store.current().pending_mutation.is_some()
    }

    /// Dispatches `request` on behalf of `identity`.
    ///
    /// Fails with `Busy` without touching the gateway if another mutation is
    /// pending. Never retries.
    pub async fn submit(&self, identity: &Identity, request: MutationRequest) -> ClientResult<Confirmation> {
        let core = &self.core;
        let kind = request.kind();

        if !core.store.try_begin_mutation(PendingMutation::for_request(&request)) {
            core.metrics.busy_rejections_total.inc();
            debug!("Rejected {} while another mutation is pending", kind.label());
            let err = ClientError::Busy;
            core.store.record_error(err.to_session_error());
            return Err(err);
        }

        core.metrics.mutations_submitted_total.with_label_values(&[kind.label()]).inc();
        info!("Dispatching {} for {}", kind.label(), identity.address);
        let started = Instant::now();
        let result = match &request {
            MutationRequest::Withdraw(amount) => core.gateway.submit_withdrawal(*amount).await,
            MutationRequest::AutoMint => core.gateway.submit_auto_mint().await,
            MutationRequest::ForceAutoMint => core.gateway.submit_force_auto_mint().await,
        };
        core.metrics.record_mutation(kind.label(), started.elapsed(), result.is_ok());

        core.store.finish_mutation();
        self.journal(identity, &request, &result);

        let refreshed = core.refresh_snapshot(identity).await.is_ok();

        match result {
            Ok(receipt) => {
                info!("{} confirmed: {}", kind.label(), receipt.tx_hash);
                if refreshed {
                    core.store.clear_error();
                }
                Ok(Confirmation::new(receipt, core.settings.confirmation_display))
            }
            Err(err) => {
                warn!("{} failed: {}", kind.label(), err);
                core.store.record_error(err.to_session_error());
                Err(err)
            }
        }
    }

    fn journal(&self, identity: &Identity, request: &MutationRequest, result: &ClientResult<MutationReceipt>) {
        let Some(database) = &self.core.journal else {
            return;
        };

        let (tx_hash, outcome, error) = match result {
            Ok(receipt) => (Some(receipt.tx_hash), Some(receipt.outcome), None),
            Err(e @ ClientError::TransactionReverted { tx_hash, .. }) => (Some(*tx_hash), None, Some(e.to_string())),
            Err(e) => (None, None, Some(e.to_string())),
        };
        let record = MutationRecord {
            address: identity.address,
            kind: request.kind(),
            amount: request.amount(),
            tx_hash,
            outcome,
            error,
            timestamp: Utc::now().timestamp(),
        };

        if let Err(e) = database.add_mutation_record(&record) {
            warn!("Failed to journal mutation: {}", e);
        }
    }
}
