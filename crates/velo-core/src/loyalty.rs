//! Loyalty accounts and the flex-dollar ledger.
//!
//! The flex-dollar balance is never stored as a mutable field: it is always
//! the running sum of immutable transaction rows, so ledger and balance
//! cannot drift apart. Tier is re-derived from the trip count on every
//! completed trip; a change in either direction is reported so the engine
//! can emit `TierChanged`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::config::LoyaltyConfig;
use crate::error::{Result, VeloError};
use crate::types::{Cents, LoyaltyTier, UserId};

/// A rider's loyalty standing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoyaltyAccount {
    /// Rider.
    pub user: UserId,
    /// Completed trips, cumulative.
    pub trips: u32,
    /// Current tier, derived from `trips`.
    pub tier: LoyaltyTier,
}

/// Direction of a flex-dollar transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FlexTransactionKind {
    /// Balance increased.
    Credit,
    /// Balance decreased.
    Debit,
}

/// One immutable ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FlexTransaction {
    /// Rider.
    pub user: UserId,
    /// When the row was appended.
    pub at: DateTime<Utc>,
    /// Credit or debit.
    pub kind: FlexTransactionKind,
    /// Human-readable reason ("low-occupancy return at Harbor", "applied to
    /// rental ...").
    pub reason: String,
    /// Signed amount in cents: positive for credits, negative for debits.
    pub amount_cents: Cents,
    /// Running balance after this row.
    pub balance_after_cents: Cents,
}

/// A tier change produced by a completed trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TierChange {
    /// Tier before the trip.
    pub old: LoyaltyTier,
    /// Tier after the trip.
    pub new: LoyaltyTier,
}

/// All loyalty accounts and the append-only flex-dollar ledger.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LoyaltyLedger {
    accounts: HashMap<UserId, LoyaltyAccount>,
    transactions: Vec<FlexTransaction>,
}

impl LoyaltyLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The rider's tier without creating an account.
    #[must_use]
    pub fn tier(&self, user: &UserId) -> LoyaltyTier {
        self.accounts
            .get(user)
            .map_or(LoyaltyTier::None, |a| a.tier)
    }

    /// Current flex-dollar balance: the running sum of the rider's rows.
    #[must_use]
    pub fn balance(&self, user: &UserId) -> Cents {
        self.transactions
            .iter()
            .filter(|t| t.user == *user)
            .map(|t| t.amount_cents)
            .sum()
    }

    /// The rider's ledger rows, oldest first.
    #[must_use]
    pub fn transactions(&self, user: &UserId) -> Vec<&FlexTransaction> {
        self.transactions
            .iter()
            .filter(|t| t.user == *user)
            .collect()
    }

    /// Count a completed trip and re-derive the tier. Returns the change if
    /// the tier moved (in either direction).
    pub fn record_completed_trip(
        &mut self,
        user: &UserId,
        loyalty: &LoyaltyConfig,
    ) -> Option<TierChange> {
        let trips;
        let old;
        {
            let account = self
                .accounts
                .entry(user.clone())
                .or_insert_with(|| LoyaltyAccount {
                    user: user.clone(),
                    trips: 0,
                    tier: LoyaltyTier::None,
                });
            account.trips += 1;
            trips = account.trips;
            old = account.tier;
        }
        let new = loyalty.tier_for(trips);
        if new == old {
            return None;
        }
        if let Some(account) = self.accounts.get_mut(user) {
            account.tier = new;
        }
        Some(TierChange { old, new })
    }

    /// Append a credit row. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::Validation`] for a non-positive amount.
    pub fn credit(
        &mut self,
        user: &UserId,
        amount_cents: Cents,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<Cents> {
        if amount_cents <= 0 {
            return Err(VeloError::Validation(format!(
                "credit amount must be positive, got {amount_cents}"
            )));
        }
        let balance_after_cents = self.balance(user) + amount_cents;
        self.transactions.push(FlexTransaction {
            user: user.clone(),
            at,
            kind: FlexTransactionKind::Credit,
            reason: reason.into(),
            amount_cents,
            balance_after_cents,
        });
        Ok(balance_after_cents)
    }

    /// Append a debit row. The balance can never go negative.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::Validation`] for a non-positive amount or one
    /// exceeding the current balance.
    pub fn debit(
        &mut self,
        user: &UserId,
        amount_cents: Cents,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<Cents> {
        if amount_cents <= 0 {
            return Err(VeloError::Validation(format!(
                "debit amount must be positive, got {amount_cents}"
            )));
        }
        let balance = self.balance(user);
        if amount_cents > balance {
            return Err(VeloError::Validation(format!(
                "debit of {amount_cents} exceeds balance {balance}"
            )));
        }
        let balance_after_cents = balance - amount_cents;
        self.transactions.push(FlexTransaction {
            user: user.clone(),
            at,
            kind: FlexTransactionKind::Debit,
            reason: reason.into(),
            amount_cents: -amount_cents,
            balance_after_cents,
        });
        Ok(balance_after_cents)
    }
}
