//! League member balances and the mutation rules applied to them.

use super::league::{LeagueSettings, PowerUpInventory};
use super::wager::{PowerUp, WagerStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How many settled results a member keeps for streak displays
pub const RESULT_HISTORY_LEN: usize = 10;

/// Per-wager result character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultMark {
    W,
    P,
    L,
}

impl ResultMark {
    /// 'W' if anything was won, 'P' for a refund, 'L' otherwise
    pub fn for_settlement(status: WagerStatus, payout: u64) -> Self {
        match status {
            WagerStatus::Push => ResultMark::P,
            _ if payout > 0 => ResultMark::W,
            _ => ResultMark::L,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            ResultMark::W => 'W',
            ResultMark::P => 'P',
            ResultMark::L => 'L',
        }
    }
}

impl PowerUpInventory {
    pub fn count(&self, power_up: PowerUp) -> u32 {
        match power_up {
            PowerUp::X2 => self.x2,
            PowerUp::X3 => self.x3,
            PowerUp::X4 => self.x4,
        }
    }

    /// Consume one unit, false if none is left
    pub fn take(&mut self, power_up: PowerUp) -> bool {
        let slot = match power_up {
            PowerUp::X2 => &mut self.x2,
            PowerUp::X3 => &mut self.x3,
            PowerUp::X4 => &mut self.x4,
        };
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }
}

/// A member's wallet inside one league
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueMember {
    pub league_id: Uuid,
    pub user_id: Uuid,
    /// Spendable balance
    pub points: u64,
    /// Lifetime stake placed, refunds excluded
    pub total_invested: u64,
    /// Lifetime capital injected by starting grant or rebuy
    pub total_bought: u64,
    pub power_ups: PowerUpInventory,
    /// Most recent first
    pub recent_results: Vec<ResultMark>,
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    pub updated_at: DateTime<Utc>,
}

impl LeagueMember {
    /// A new member with the league's starting grant and starter power-ups
    pub fn join(league: &LeagueSettings, user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            league_id: league.id,
            user_id,
            points: league.starting_points,
            total_invested: 0,
            total_bought: league.starting_points,
            power_ups: league.starter_power_ups,
            recent_results: Vec::new(),
            wins: 0,
            losses: 0,
            pushes: 0,
            updated_at: now,
        }
    }

    /// Take a stake out of the wallet
    pub fn debit_stake(&mut self, amount: u64) -> Result<(), (u64, u64)> {
        if self.points < amount {
            return Err((self.points, amount));
        }
        self.points -= amount;
        self.total_invested += amount;
        Ok(())
    }

    /// Apply one settled wager to the wallet and the result history
    pub fn apply_settlement(&mut self, status: WagerStatus, payout: u64, refunded_stake: u64) {
        self.points += payout;
        if status == WagerStatus::Push {
            self.total_invested = self.total_invested.saturating_sub(refunded_stake);
        }

        let mark = ResultMark::for_settlement(status, payout);
        match mark {
            ResultMark::W => self.wins += 1,
            ResultMark::P => self.pushes += 1,
            ResultMark::L => self.losses += 1,
        }
        self.recent_results.insert(0, mark);
        self.recent_results.truncate(RESULT_HISTORY_LEN);
    }

    /// Streak string for displays, e.g. "WWLP"
    pub fn form(&self) -> String {
        self.recent_results.iter().map(ResultMark::as_char).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeagueMode;

    fn member() -> LeagueMember {
        let league = LeagueSettings::new("Office", LeagueMode::ZeroSum);
        LeagueMember::join(&league, Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_debit_rejects_overdraw() {
        let mut m = member();
        assert_eq!(m.debit_stake(1500), Err((1000, 1500)));
        assert!(m.debit_stake(400).is_ok());
        assert_eq!(m.points, 600);
        assert_eq!(m.total_invested, 400);
    }

    #[test]
    fn test_refund_restores_invested() {
        let mut m = member();
        m.debit_stake(300).unwrap();
        m.apply_settlement(WagerStatus::Push, 300, 300);
        assert_eq!(m.points, 1000);
        assert_eq!(m.total_invested, 0);
        assert_eq!(m.form(), "P");
    }

    #[test]
    fn test_history_keeps_ten_most_recent_first() {
        let mut m = member();
        for _ in 0..10 {
            m.apply_settlement(WagerStatus::Lost, 0, 0);
        }
        m.apply_settlement(WagerStatus::Won, 50, 0);
        assert_eq!(m.recent_results.len(), RESULT_HISTORY_LEN);
        assert_eq!(m.recent_results[0], ResultMark::W);
        assert_eq!(m.wins, 1);
        assert_eq!(m.losses, 10);
    }

    #[test]
    fn test_power_up_take() {
        let mut inv = PowerUpInventory { x2: 1, x3: 0, x4: 0 };
        assert!(inv.take(PowerUp::X2));
        assert!(!inv.take(PowerUp::X2));
        assert!(!inv.take(PowerUp::X3));
    }
}
