//! Observed faucet state at a point in time

use chrono::{DateTime, Utc};
use serde::Serialize;
use spout_common::TokenAmount;

/// Renders a cooldown as `"{d} days, {h} hours, {m} minutes"`.
pub fn format_cooldown(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    format!("{} days, {} hours, {} minutes", days, hours, minutes)
}

/// Immutable read of the faucet. Superseded by the next read, never mutated.
///
/// The availability flag and the formatted cooldown are derived in the
/// constructor; there is no way to set them independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowanceSnapshot {
    faucet_balance: TokenAmount,
    caller_allowance_remaining: TokenAmount,
    cooldown_seconds_remaining: u64,
    cooldown_formatted: String,
    is_auto_mint_available: bool,
    fetched_at: DateTime<Utc>,
}

impl AllowanceSnapshot {
    pub fn new(
        faucet_balance: TokenAmount,
        caller_allowance_remaining: TokenAmount,
        cooldown_seconds_remaining: u64,
    ) -> Self {
        Self {
            faucet_balance,
            caller_allowance_remaining,
            cooldown_seconds_remaining,
            cooldown_formatted: format_cooldown(cooldown_seconds_remaining),
            is_auto_mint_available: cooldown_seconds_remaining == 0,
            fetched_at: Utc::now(),
        }
    }

    /// A newer snapshot that only replaces the cooldown portion.
    pub fn with_cooldown(&self, cooldown_seconds_remaining: u64) -> Self {
        Self::new(
            self.faucet_balance,
            self.caller_allowance_remaining,
            cooldown_seconds_remaining,
        )
    }

    pub fn faucet_balance(&self) -> TokenAmount {
        self.faucet_balance
    }

    pub fn caller_allowance_remaining(&self) -> TokenAmount {
        self.caller_allowance_remaining
    }

    pub fn cooldown_seconds_remaining(&self) -> u64 {
        self.cooldown_seconds_remaining
    }

    pub fn cooldown_formatted(&self) -> &str {
        &self.cooldown_formatted
    }

    pub fn is_auto_mint_available(&self) -> bool {
        self.is_auto_mint_available
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}
