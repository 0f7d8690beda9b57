use super::tiers::TierHits;
use super::{mul_div_floor, refund_all, PayoutResult, SettlementKind, SettlementPlan, WagerPayout};
use crate::models::{Outcome, Score, Wager, WagerStatus};

/// Multi-tier parimutuel for MATCH bets in zero-sum leagues.
///
/// A wager's effective shares are `stake * weight`, where the weight is 5, 3
/// or 1 for its single best tier (exact, differential, winner) and 0 for a
/// miss. The pool is split by shares:
/// `payout = floor(shares * total_pool / total_shares)`. With no shares at
/// all every stake is refunded.
pub fn settle_match_pool(
    total_pool: u64,
    wagers: &[Wager],
    actual: Score,
) -> PayoutResult<SettlementPlan> {
    let mut weighted = Vec::with_capacity(wagers.len());
    let mut total_shares: u128 = 0;

    for w in wagers {
        let weight = match &w.selection {
            Outcome::Match(predicted) => TierHits::evaluate(*predicted, actual).best().share_weight(),
            _ => 0,
        };
        let shares = u128::from(w.amount) * u128::from(weight);
        total_shares += shares;
        weighted.push((w, weight, shares));
    }

    if total_shares == 0 {
        return Ok(refund_all(total_pool, wagers));
    }

    let mut entries = Vec::with_capacity(wagers.len());
    for (w, weight, shares) in weighted {
        let (status, payout) = if weight > 0 {
            let shares = u64::try_from(shares).map_err(|_| super::PayoutError::Overflow)?;
            (WagerStatus::Won, mul_div_floor(shares, total_pool, total_shares)?)
        } else {
            (WagerStatus::Lost, 0)
        };
        entries.push(WagerPayout {
            wager_id: w.id,
            user_id: w.user_id,
            stake: w.amount,
            status,
            payout,
        });
    }

    Ok(SettlementPlan {
        kind: SettlementKind::Distributed,
        total_pool,
        entries,
    })
}
