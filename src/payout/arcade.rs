use super::tiers::TierHits;
use super::{SettlementKind, SettlementPlan, WagerPayout};
use crate::models::{ArcadePoints, Outcome, Score, Wager, WagerStatus};

/// Base award for a MATCH prediction: the largest configured value among the
/// tiers it reaches. Tiers never stack, and a zero-valued tier never beats a
/// non-zero one.
pub fn match_award(points: &ArcadePoints, predicted: Score, actual: Score) -> u64 {
    let hits = TierHits::evaluate(predicted, actual);
    let diff_counts = hits.diff && !(points.exclude_draw_diff && hits.both_draws);

    [
        (hits.exact, points.exact),
        (diff_counts, points.diff),
        (hits.winner, points.winner),
    ]
    .iter()
    .filter(|(hit, _)| *hit)
    .map(|(_, value)| *value)
    .max()
    .unwrap_or(0)
}

/// Base award for any selection against the final outcome
pub fn base_award(points: &ArcadePoints, selection: &Outcome, outcome: &Outcome) -> u64 {
    match (selection, outcome) {
        (Outcome::Choice(picked), Outcome::Choice(actual)) if picked == actual => points.choice,
        (Outcome::Range(picked), Outcome::Range(actual)) if picked == actual => points.range,
        (Outcome::Match(predicted), Outcome::Match(actual)) => {
            match_award(points, *predicted, *actual)
        }
        _ => 0,
    }
}

/// Fixed-award settlement: every wager earns `base_award * multiplier`,
/// where the multiplier is the power-up recorded at placement.
pub fn settle_arcade(
    points: &ArcadePoints,
    total_pool: u64,
    wagers: &[Wager],
    outcome: &Outcome,
) -> SettlementPlan {
    let entries = wagers
        .iter()
        .map(|w| {
            let payout = base_award(points, &w.selection, outcome).saturating_mul(w.multiplier());
            WagerPayout {
                wager_id: w.id,
                user_id: w.user_id,
                stake: w.amount,
                status: if payout > 0 {
                    WagerStatus::Won
                } else {
                    WagerStatus::Lost
                },
                payout,
            }
        })
        .collect();

    SettlementPlan {
        kind: SettlementKind::Awarded,
        total_pool,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PowerUp;
    use crate::payout::test_support::{powered, wager};

    fn points(exact: u64, diff: u64, winner: u64, exclude_draw_diff: bool) -> ArcadePoints {
        ArcadePoints {
            exact,
            diff,
            winner,
            choice: 2,
            range: 5,
            exclude_draw_diff,
        }
    }

    #[test]
    fn test_excluded_draw_diff_falls_back_to_winner() {
        let cfg = points(3, 1, 2, true);
        let wagers = vec![powered(Outcome::Match(Score::new(1, 1)), PowerUp::X3)];
        let plan = settle_arcade(&cfg, 0, &wagers, &Outcome::Match(Score::new(0, 0)));
        assert_eq!(plan.entries[0].payout, 2 * 3);
    }

    #[test]
    fn test_exact_takes_only_the_maximum() {
        let cfg = points(3, 1, 2, false);
        assert_eq!(match_award(&cfg, Score::new(2, 1), Score::new(2, 1)), 3);
        // diff tier reached, but the configured winner value is larger
        assert_eq!(match_award(&cfg, Score::new(3, 2), Score::new(2, 1)), 2);
        assert_eq!(match_award(&cfg, Score::new(0, 1), Score::new(2, 1)), 0);
    }

    #[test]
    fn test_zero_valued_higher_tier_does_not_hide_lower_one() {
        let cfg = points(0, 0, 1, false);
        assert_eq!(match_award(&cfg, Score::new(2, 1), Score::new(2, 1)), 1);
    }

    #[test]
    fn test_choice_and_range_awards() {
        let cfg = points(3, 1, 2, false);
        let wagers = vec![
            wager(0, Outcome::Choice(1)),
            wager(0, Outcome::Choice(0)),
            powered(Outcome::Choice(1), PowerUp::X4),
        ];
        let plan = settle_arcade(&cfg, 0, &wagers, &Outcome::Choice(1));
        assert_eq!(plan.entries[0].payout, 2);
        assert_eq!(plan.entries[1].status, WagerStatus::Lost);
        assert_eq!(plan.entries[2].payout, 8);
        assert_eq!(plan.kind, SettlementKind::Awarded);
        assert_eq!(plan.rounding_loss(), 0);

        let exact = rust_decimal::Decimal::new(42, 0);
        assert_eq!(base_award(&cfg, &Outcome::Range(exact), &Outcome::Range(exact)), 5);
    }
}
