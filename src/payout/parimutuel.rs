use super::{mul_div_floor, refund_all, PayoutResult, SettlementKind, SettlementPlan, WagerPayout};
use crate::models::{Outcome, Wager, WagerStatus};

/// Split the pool among wagers whose selection equals the winning outcome.
///
/// Each winner receives `floor(total_pool * stake / winner_pool)`; the
/// flooring remainder stays undistributed. When nobody picked the winning
/// outcome every stake is refunded.
pub fn settle_pool(
    total_pool: u64,
    wagers: &[Wager],
    winning: &Outcome,
) -> PayoutResult<SettlementPlan> {
    let winner_pool: u128 = wagers
        .iter()
        .filter(|w| w.selection == *winning)
        .map(|w| u128::from(w.amount))
        .sum();

    if winner_pool == 0 {
        return Ok(refund_all(total_pool, wagers));
    }

    let mut entries = Vec::with_capacity(wagers.len());
    for w in wagers {
        let entry = if w.selection == *winning {
            WagerPayout {
                wager_id: w.id,
                user_id: w.user_id,
                stake: w.amount,
                status: WagerStatus::Won,
                payout: mul_div_floor(total_pool, w.amount, winner_pool)?,
            }
        } else {
            WagerPayout {
                wager_id: w.id,
                user_id: w.user_id,
                stake: w.amount,
                status: WagerStatus::Lost,
                payout: 0,
            }
        };
        entries.push(entry);
    }

    Ok(SettlementPlan {
        kind: SettlementKind::Distributed,
        total_pool,
        entries,
    })
}
