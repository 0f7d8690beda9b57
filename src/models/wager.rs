use super::outcome::Outcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wager settlement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WagerStatus {
    Pending,
    Won,
    Lost,
    Push,
}

impl WagerStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(WagerStatus::Pending),
            "WON" => Ok(WagerStatus::Won),
            "LOST" => Ok(WagerStatus::Lost),
            "PUSH" => Ok(WagerStatus::Push),
            _ => Err(format!("Invalid wager status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            WagerStatus::Pending => "PENDING",
            WagerStatus::Won => "WON",
            WagerStatus::Lost => "LOST",
            WagerStatus::Push => "PUSH",
        }
    }
}

/// Single-use arcade multiplier attached at placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerUp {
    X2,
    X3,
    X4,
}

impl PowerUp {
    pub fn multiplier(&self) -> u64 {
        match self {
            PowerUp::X2 => 2,
            PowerUp::X3 => 3,
            PowerUp::X4 => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerUp::X2 => "x2",
            PowerUp::X3 => "x3",
            PowerUp::X4 => "x4",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "x2" => Ok(PowerUp::X2),
            "x3" => Ok(PowerUp::X3),
            "x4" => Ok(PowerUp::X4),
            _ => Err(format!("Invalid power-up: {}", s)),
        }
    }
}

/// A member's stake on a bet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub id: Uuid,
    pub bet_id: Uuid,
    pub user_id: Uuid,
    pub amount: u64,
    pub selection: Outcome,
    pub power_up: Option<PowerUp>,
    pub placed_at: DateTime<Utc>,
    pub status: WagerStatus,
    /// Points credited at settlement, 0 while pending or lost
    pub payout: u64,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Wager {
    /// Create a new pending wager
    pub fn new(
        bet_id: Uuid,
        user_id: Uuid,
        amount: u64,
        selection: Outcome,
        power_up: Option<PowerUp>,
        placed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            bet_id,
            user_id,
            amount,
            selection,
            power_up,
            placed_at,
            status: WagerStatus::Pending,
            payout: 0,
            settled_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == WagerStatus::Pending
    }

    /// Multiplier recorded at placement, 1 when none was used
    pub fn multiplier(&self) -> u64 {
        self.power_up.map_or(1, |p| p.multiplier())
    }
}
