use super::activity::Actor;
use super::outcome::{BetKind, Outcome, Verification};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Bet lifecycle status.
///
/// `Locked` is never persisted: it is derived from `Open` once `closes_at` has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetStatus {
    Draft,
    Open,
    Locked,
    Proofing,
    Disputed,
    Resolved,
    Invalid,
    Cancelled,
}

impl BetStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(BetStatus::Draft),
            "OPEN" => Ok(BetStatus::Open),
            "LOCKED" => Ok(BetStatus::Locked),
            "PROOFING" => Ok(BetStatus::Proofing),
            "DISPUTED" => Ok(BetStatus::Disputed),
            "RESOLVED" => Ok(BetStatus::Resolved),
            "INVALID" => Ok(BetStatus::Invalid),
            "CANCELLED" => Ok(BetStatus::Cancelled),
            _ => Err(format!("Invalid bet status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Draft => "DRAFT",
            BetStatus::Open => "OPEN",
            BetStatus::Locked => "LOCKED",
            BetStatus::Proofing => "PROOFING",
            BetStatus::Disputed => "DISPUTED",
            BetStatus::Resolved => "RESOLVED",
            BetStatus::Invalid => "INVALID",
            BetStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BetStatus::Resolved | BetStatus::Invalid | BetStatus::Cancelled
        )
    }
}

impl std::fmt::Display for BetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One answer of a CHOICE bet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetOption {
    pub label: String,
    pub total_wagered: u64,
}

impl BetOption {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            total_wagered: 0,
        }
    }
}

/// Kind-specific part of a bet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetPayload {
    Choice { options: Vec<BetOption> },
    Range { min: Decimal, max: Decimal, unit: String },
    Match { home_team: String, away_team: String },
}

impl BetPayload {
    pub fn kind(&self) -> BetKind {
        match self {
            BetPayload::Choice { .. } => BetKind::Choice,
            BetPayload::Range { .. } => BetKind::Range,
            BetPayload::Match { .. } => BetKind::Match,
        }
    }

    /// Check the payload is publishable
    pub fn validate(&self) -> Result<(), String> {
        match self {
            BetPayload::Choice { options } => {
                if options.len() < 2 {
                    return Err("A choice bet needs at least two options".to_string());
                }
                if options.iter().any(|o| o.label.trim().is_empty()) {
                    return Err("Option labels must not be empty".to_string());
                }
            }
            BetPayload::Range { min, max, .. } => {
                if min >= max {
                    return Err(format!("Range minimum {} must be below maximum {}", min, max));
                }
            }
            BetPayload::Match {
                home_team,
                away_team,
            } => {
                if home_team.trim().is_empty() || away_team.trim().is_empty() {
                    return Err("Both teams are required".to_string());
                }
                if home_team.trim().eq_ignore_ascii_case(away_team.trim()) {
                    return Err("Home and away teams must differ".to_string());
                }
            }
        }
        Ok(())
    }

    /// Check a selection or proposed result fits this payload
    pub fn validate_outcome(&self, outcome: &Outcome) -> Result<(), String> {
        match (self, outcome) {
            (BetPayload::Choice { options }, Outcome::Choice(index)) => {
                if *index >= options.len() {
                    return Err(format!(
                        "Option {} does not exist ({} options)",
                        index,
                        options.len()
                    ));
                }
                Ok(())
            }
            (BetPayload::Range { min, max, .. }, Outcome::Range(value)) => {
                if value < min || value > max {
                    return Err(format!("Value {} is outside [{}, {}]", value, min, max));
                }
                Ok(())
            }
            (BetPayload::Match { .. }, Outcome::Match(_)) => Ok(()),
            (payload, outcome) => Err(format!(
                "A {} outcome does not fit a {} bet",
                outcome.kind().as_str(),
                payload.kind().as_str()
            )),
        }
    }
}

/// A member's verdict on a disputed result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Approve,
    Reject,
}

/// Input for creating a draft bet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBet {
    pub league_id: Uuid,
    pub creator_id: Uuid,
    pub question: String,
    pub payload: BetPayload,
    pub event_date: DateTime<Utc>,
    pub auto_confirm: bool,
    pub auto_confirm_delay_minutes: i64,
}

/// A wagering event inside a league
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub id: Uuid,
    pub league_id: Uuid,
    pub creator_id: Uuid,
    pub question: String,
    pub payload: BetPayload,
    pub status: BetStatus,
    /// Sum of every stake ever placed; never decreases
    pub total_pool: u64,
    /// Betting cutoff, set when the bet is published
    pub closes_at: Option<DateTime<Utc>>,
    pub event_date: DateTime<Utc>,
    pub winning_outcome: Option<Outcome>,
    pub verification: Option<Verification>,
    pub proposed_by: Option<Actor>,
    pub proposed_at: Option<DateTime<Utc>>,
    pub dispute_deadline: Option<DateTime<Utc>>,
    pub dispute_active: bool,
    /// Members who have filed a dispute on this bet, across all proposal cycles
    pub disputed_by: BTreeSet<Uuid>,
    pub vote_deadline: Option<DateTime<Utc>>,
    pub votes: BTreeMap<Uuid, Vote>,
    pub auto_confirm: bool,
    pub auto_confirm_delay_minutes: i64,
    /// Terminal status being written in batches, set until the final status flip
    pub settling: Option<BetStatus>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Actor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bet {
    /// Create a new draft bet
    pub fn draft(new: NewBet, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            league_id: new.league_id,
            creator_id: new.creator_id,
            question: new.question,
            payload: new.payload,
            status: BetStatus::Draft,
            total_pool: 0,
            closes_at: None,
            event_date: new.event_date,
            winning_outcome: None,
            verification: None,
            proposed_by: None,
            proposed_at: None,
            dispute_deadline: None,
            dispute_active: false,
            disputed_by: BTreeSet::new(),
            vote_deadline: None,
            votes: BTreeMap::new(),
            auto_confirm: new.auto_confirm,
            auto_confirm_delay_minutes: new.auto_confirm_delay_minutes,
            settling: None,
            resolved_at: None,
            resolved_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> BetKind {
        self.payload.kind()
    }

    /// True once betting has closed on an open bet
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.status == BetStatus::Open && self.closes_at.map_or(false, |closes| now >= closes)
    }

    /// Status as seen by callers, with `Locked` derived from the clock
    pub fn effective_status(&self, now: DateTime<Utc>) -> BetStatus {
        if self.is_locked(now) {
            BetStatus::Locked
        } else {
            self.status
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// When the oracle may first be asked for a result. `None` when auto-confirm
    /// is off or the delay does not fit the calendar.
    pub fn auto_confirm_due_at(&self) -> Option<DateTime<Utc>> {
        if !self.auto_confirm {
            return None;
        }
        let delay = chrono::Duration::try_minutes(self.auto_confirm_delay_minutes)?;
        self.event_date.checked_add_signed(delay)
    }

    /// Stake per option for CHOICE bets, empty otherwise
    pub fn option_totals(&self) -> Vec<u64> {
        match &self.payload {
            BetPayload::Choice { options } => options.iter().map(|o| o.total_wagered).collect(),
            _ => Vec::new(),
        }
    }

    /// Forget the current proposal and every trace of its dispute cycle
    pub fn clear_proposal(&mut self) {
        self.winning_outcome = None;
        self.verification = None;
        self.proposed_by = None;
        self.proposed_at = None;
        self.dispute_deadline = None;
        self.dispute_active = false;
        self.vote_deadline = None;
        self.votes.clear();
    }
}
