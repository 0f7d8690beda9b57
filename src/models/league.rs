use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payout philosophy of a league
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeagueMode {
    /// Parimutuel: the pool is redistributed among winners
    ZeroSum,
    /// Arcade: fixed awards per correct tier
    Standard,
}

impl LeagueMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeagueMode::ZeroSum => "ZERO_SUM",
            LeagueMode::Standard => "STANDARD",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_uppercase().as_str() {
            "ZERO_SUM" => Ok(LeagueMode::ZeroSum),
            "STANDARD" | "ARCADE" => Ok(LeagueMode::Standard),
            _ => Err(format!("Invalid league mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuyInType {
    /// Single starting grant
    Fixed,
    /// Members may rebuy
    Flexible,
}

impl BuyInType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuyInType::Fixed => "FIXED",
            BuyInType::Flexible => "FLEXIBLE",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_uppercase().as_str() {
            "FIXED" => Ok(BuyInType::Fixed),
            "FLEXIBLE" => Ok(BuyInType::Flexible),
            _ => Err(format!("Invalid buy-in type: {}", s)),
        }
    }
}

/// Fixed awards used in arcade mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcadePoints {
    pub exact: u64,
    pub diff: u64,
    pub winner: u64,
    pub choice: u64,
    pub range: u64,
    /// A correct differential between two draws earns no diff award
    pub exclude_draw_diff: bool,
}

impl Default for ArcadePoints {
    fn default() -> Self {
        Self {
            exact: 3,
            diff: 2,
            winner: 1,
            choice: 1,
            range: 1,
            exclude_draw_diff: false,
        }
    }
}

/// Starting counts of each power-up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerUpInventory {
    pub x2: u32,
    pub x3: u32,
    pub x4: u32,
}

/// League settings, owned by league management and read-only to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueSettings {
    pub id: Uuid,
    pub name: String,
    pub mode: LeagueMode,
    pub buy_in: BuyInType,
    pub starting_points: u64,
    pub arcade_points: ArcadePoints,
    pub starter_power_ups: PowerUpInventory,
    pub dispute_window_hours: i64,
}

impl LeagueSettings {
    pub fn new(name: impl Into<String>, mode: LeagueMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            mode,
            buy_in: BuyInType::Fixed,
            starting_points: 1000,
            arcade_points: ArcadePoints::default(),
            starter_power_ups: PowerUpInventory::default(),
            dispute_window_hours: 24,
        }
    }

    pub fn dispute_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.dispute_window_hours)
    }

    pub fn is_zero_sum(&self) -> bool {
        self.mode == LeagueMode::ZeroSum
    }
}
