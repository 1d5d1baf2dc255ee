//! State-changing requests and their results

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use spout_common::{TokenAmount, TxHash};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Withdraw,
    AutoMint,
    ForceAutoMint,
}

impl MutationKind {
    /// Metric label and log name.
    pub fn label(&self) -> &'static str {
        match self {
            MutationKind::Withdraw => "withdraw",
            MutationKind::AutoMint => "auto_mint",
            MutationKind::ForceAutoMint => "force_auto_mint",
        }
    }
}

/// One user intent. Consumed once by the action queue and never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRequest {
    Withdraw(TokenAmount),
    AutoMint,
    /// Owner-only replenishment that skips the cooldown
    ForceAutoMint,
}

impl MutationRequest {
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationRequest::Withdraw(_) => MutationKind::Withdraw,
            MutationRequest::AutoMint => MutationKind::AutoMint,
            MutationRequest::ForceAutoMint => MutationKind::ForceAutoMint,
        }
    }

    pub fn amount(&self) -> Option<TokenAmount> {
        match self {
            MutationRequest::Withdraw(amount) => Some(*amount),
            MutationRequest::AutoMint | MutationRequest::ForceAutoMint => None,
        }
    }
}

/// The mutation currently in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMutation {
    pub kind: MutationKind,
    pub amount: Option<TokenAmount>,
    pub submitted_at: DateTime<Utc>,
}

impl PendingMutation {
    pub fn for_request(request: &MutationRequest) -> Self {
        Self {
            kind: request.kind(),
            amount: request.amount(),
            submitted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOutcome {
    /// The ledger applied the mutation (for auto-mint this includes a
    /// confirmed no-op).
    Applied,
    /// Another party replenished the faucet first.
    AlreadyReplenished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationReceipt {
    pub kind: MutationKind,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub outcome: MutationOutcome,
}

/// Success marker handed to the presentation layer. Not part of session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub receipt: MutationReceipt,
    pub display_until: DateTime<Utc>,
}

impl Confirmation {
    pub fn new(receipt: MutationReceipt, display_for: Duration) -> Self {
        let display_for = ChronoDuration::from_std(display_for).unwrap_or_else(|_| ChronoDuration::zero());
        Self {
            receipt,
            display_until: Utc::now() + display_for,
        }
    }

    pub fn is_displayable(&self) -> bool {
        Utc::now() < self.display_until
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt() -> MutationReceipt {
        MutationReceipt {
            kind: MutationKind::Withdraw,
            tx_hash: TxHash([1; 32]),
            block_number: 7,
            outcome: MutationOutcome::Applied,
        }
    }

    #[test]
    fn test_request_kind_and_amount() {
        let amount = TokenAmount::from_tokens(5);
        assert_eq!(MutationRequest::Withdraw(amount).kind(), MutationKind::Withdraw);
        assert_eq!(MutationRequest::Withdraw(amount).amount(), Some(amount));
        assert_eq!(MutationRequest::AutoMint.amount(), None);
        assert_eq!(MutationKind::AutoMint.label(), "auto_mint");
        assert_eq!(MutationRequest::ForceAutoMint.kind(), MutationKind::ForceAutoMint);
        assert_eq!(MutationRequest::ForceAutoMint.amount(), None);
    }

    #[test]
    fn test_confirmation_expires() {
        assert!(Confirmation::new(receipt(), Duration::from_secs(3)).is_displayable());
        assert!(!Confirmation::new(receipt(), Duration::ZERO).is_displayable());
    }
}
