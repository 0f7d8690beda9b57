//! Domain models for the league settlement engine.
//!
//! Bets own their wagers; wagers reference member wallets which the
//! engine mutates during settlement.

pub mod activity;
pub mod bet;
pub mod league;
pub mod member;
pub mod outcome;
pub mod wager;

pub use activity::{ActivityEntry, ActivityKind, Actor};
pub use bet::{Bet, BetOption, BetPayload, BetStatus, NewBet, Vote};
pub use league::{ArcadePoints, BuyInType, LeagueMode, LeagueSettings, PowerUpInventory};
pub use member::{LeagueMember, ResultMark, RESULT_HISTORY_LEN};
pub use outcome::{BetKind, Confidence, Outcome, Score, Verification, VerificationMethod};
pub use wager::{PowerUp, Wager, WagerStatus};
