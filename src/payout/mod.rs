//! Pure settlement arithmetic.
//!
//! Nothing in here touches storage: every function takes the bet's pool,
//! its wagers and the final outcome, and returns a [`SettlementPlan`] the
//! settlement service then applies atomically.

pub mod arcade;
pub mod odds;
pub mod parimutuel;
pub mod tiered;
pub mod tiers;

pub use arcade::settle_arcade;
pub use odds::{option_odds, selection_odds, OptionOdds, SelectionOdds};
pub use parimutuel::settle_pool;
pub use tiered::settle_match_pool;
pub use tiers::{MatchTier, TierHits};

use crate::models::{ArcadePoints, BetKind, LeagueMode, Outcome, Wager, WagerStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error types for payout calculation
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PayoutError {
    #[error("Wager {wager_id} holds a {found:?} selection but the result is {expected:?}")]
    KindMismatch {
        wager_id: Uuid,
        expected: BetKind,
        found: BetKind,
    },

    #[error("Payout arithmetic overflow")]
    Overflow,
}

/// Result type for payout operations
pub type PayoutResult<T> = Result<T, PayoutError>;

/// How a plan moves points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    /// Pool split among winners
    Distributed,
    /// Every stake returned
    Refunded,
    /// Fixed arcade awards, independent of the pool
    Awarded,
}

/// Terminal status and payout for one wager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerPayout {
    pub wager_id: Uuid,
    pub user_id: Uuid,
    pub stake: u64,
    pub status: WagerStatus,
    pub payout: u64,
}

/// Full result of settling one bet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPlan {
    pub kind: SettlementKind,
    pub total_pool: u64,
    pub entries: Vec<WagerPayout>,
}

impl SettlementPlan {
    pub fn total_paid(&self) -> u64 {
        self.entries.iter().map(|e| e.payout).sum()
    }

    /// Points left undistributed by integer flooring
    pub fn rounding_loss(&self) -> u64 {
        match self.kind {
            SettlementKind::Distributed => self.total_pool.saturating_sub(self.total_paid()),
            _ => 0,
        }
    }

    pub fn winners(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == WagerStatus::Won)
            .count()
    }

    pub fn entry(&self, wager_id: Uuid) -> Option<&WagerPayout> {
        self.entries.iter().find(|e| e.wager_id == wager_id)
    }
}

/// Return every stake: status PUSH, payout = amount
pub fn refund_all(total_pool: u64, wagers: &[Wager]) -> SettlementPlan {
    SettlementPlan {
        kind: SettlementKind::Refunded,
        total_pool,
        entries: wagers
            .iter()
            .map(|w| WagerPayout {
                wager_id: w.id,
                user_id: w.user_id,
                stake: w.amount,
                status: WagerStatus::Push,
                payout: w.amount,
            })
            .collect(),
    }
}

/// Pick the settlement rule for the league mode and outcome kind
pub fn settle(
    mode: LeagueMode,
    arcade_points: &ArcadePoints,
    total_pool: u64,
    wagers: &[Wager],
    outcome: &Outcome,
) -> PayoutResult<SettlementPlan> {
    ensure_kinds(wagers, outcome)?;
    match (mode, outcome) {
        (LeagueMode::Standard, _) => Ok(settle_arcade(arcade_points, total_pool, wagers, outcome)),
        (LeagueMode::ZeroSum, Outcome::Match(score)) => settle_match_pool(total_pool, wagers, *score),
        (LeagueMode::ZeroSum, _) => settle_pool(total_pool, wagers, outcome),
    }
}

fn ensure_kinds(wagers: &[Wager], outcome: &Outcome) -> PayoutResult<()> {
    let expected = outcome.kind();
    match wagers.iter().find(|w| w.selection.kind() != expected) {
        Some(w) => Err(PayoutError::KindMismatch {
            wager_id: w.id,
            expected,
            found: w.selection.kind(),
        }),
        None => Ok(()),
    }
}

/// floor(numerator_a * numerator_b / denominator) without intermediate overflow
pub(crate) fn mul_div_floor(a: u64, b: u64, denominator: u128) -> PayoutResult<u64> {
    if denominator == 0 {
        return Err(PayoutError::Overflow);
    }
    let product = u128::from(a) * u128::from(b);
    u64::try_from(product / denominator).map_err(|_| PayoutError::Overflow)
}
