use super::bet::BetStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who triggered an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Actor {
    User(Uuid),
    /// External result lookup, acting with creator authority
    Oracle,
    /// Periodic sweep, acting with creator authority
    Scheduler,
}

impl Actor {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::User(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_automated(&self) -> bool {
        !matches!(self, Actor::User(_))
    }

    /// Text form used in the database and logs
    pub fn label(&self) -> String {
        match self {
            Actor::User(id) => format!("user:{}", id),
            Actor::Oracle => "oracle".to_string(),
            Actor::Scheduler => "scheduler".to_string(),
        }
    }

    pub fn from_label(s: &str) -> Result<Self, String> {
        match s {
            "oracle" => Ok(Actor::Oracle),
            "scheduler" => Ok(Actor::Scheduler),
            other => other
                .strip_prefix("user:")
                .and_then(|id| Uuid::parse_str(id).ok())
                .map(Actor::User)
                .ok_or_else(|| format!("Invalid actor: {}", s)),
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    BetPublished,
    BetCancelled,
    WagerPlaced,
    ResultProposed,
    DisputeFiled,
    VoteCast,
    DisputeUpheld,
    DisputeRejected,
    PayoutBatch,
    BetResolved,
    BetInvalidated,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::BetPublished => "bet_published",
            ActivityKind::BetCancelled => "bet_cancelled",
            ActivityKind::WagerPlaced => "wager_placed",
            ActivityKind::ResultProposed => "result_proposed",
            ActivityKind::DisputeFiled => "dispute_filed",
            ActivityKind::VoteCast => "vote_cast",
            ActivityKind::DisputeUpheld => "dispute_upheld",
            ActivityKind::DisputeRejected => "dispute_rejected",
            ActivityKind::PayoutBatch => "payout_batch",
            ActivityKind::BetResolved => "bet_resolved",
            ActivityKind::BetInvalidated => "bet_invalidated",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("Invalid activity kind: {}", s))
    }
}

/// Append-only audit record, one per transition or resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub bet_id: Uuid,
    pub league_id: Uuid,
    pub actor: Actor,
    pub kind: ActivityKind,
    pub from_status: Option<BetStatus>,
    pub to_status: Option<BetStatus>,
    /// Outcome, source and other kind-specific details
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(
        bet_id: Uuid,
        league_id: Uuid,
        actor: Actor,
        kind: ActivityKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            bet_id,
            league_id,
            actor,
            kind,
            from_status: None,
            to_status: None,
            details: serde_json::Value::Null,
            created_at,
        }
    }

    pub fn transition(mut self, from: BetStatus, to: BetStatus) -> Self {
        self.from_status = Some(from);
        self.to_status = Some(to);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}
