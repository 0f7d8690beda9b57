use crate::models::{Bet, BetPayload, Outcome, Wager};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Parimutuel odds `pool / stake`, unrounded; 1.0 when nothing is staked
pub fn odds(total_pool: u64, stake: u64) -> Decimal {
    if stake == 0 {
        return Decimal::ONE;
    }
    Decimal::from(total_pool) / Decimal::from(stake)
}

/// Odds rounded to two decimals, for display only
pub fn display_odds(total_pool: u64, stake: u64) -> Decimal {
    odds(total_pool, stake).round_dp(2)
}

/// Display row for one CHOICE option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionOdds {
    pub index: usize,
    pub label: String,
    pub stake: u64,
    pub odds: Decimal,
    pub display: Decimal,
}

/// Display row for one distinct selection (RANGE values, MATCH scores)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionOdds {
    pub selection: Outcome,
    pub stake: u64,
    pub odds: Decimal,
    pub display: Decimal,
}

/// Current odds per option, from the option totals kept on the bet
pub fn option_odds(bet: &Bet) -> Vec<OptionOdds> {
    match &bet.payload {
        BetPayload::Choice { options } => options
            .iter()
            .enumerate()
            .map(|(index, option)| OptionOdds {
                index,
                label: option.label.clone(),
                stake: option.total_wagered,
                odds: odds(bet.total_pool, option.total_wagered),
                display: display_odds(bet.total_pool, option.total_wagered),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Current odds per distinct selection found among the wagers, in first-seen order
pub fn selection_odds(total_pool: u64, wagers: &[Wager]) -> Vec<SelectionOdds> {
    let mut stakes: Vec<(Outcome, u64)> = Vec::new();
    for w in wagers {
        match stakes.iter_mut().find(|(selection, _)| *selection == w.selection) {
            Some((_, stake)) => *stake += w.amount,
            None => stakes.push((w.selection.clone(), w.amount)),
        }
    }

    stakes
        .into_iter()
        .map(|(selection, stake)| SelectionOdds {
            selection,
            stake,
            odds: odds(total_pool, stake),
            display: display_odds(total_pool, stake),
        })
        .collect()
}
