//! Typed outcomes and selections, plus the provenance attached to a proposed result.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Kind of wagering event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetKind {
    Choice,
    Range,
    Match,
}

impl BetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetKind::Choice => "CHOICE",
            BetKind::Range => "RANGE",
            BetKind::Match => "MATCH",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_uppercase().as_str() {
            "CHOICE" => Ok(BetKind::Choice),
            "RANGE" => Ok(BetKind::Range),
            "MATCH" => Ok(BetKind::Match),
            _ => Err(format!("Invalid bet kind: {}", s)),
        }
    }
}

/// Final or predicted score of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    /// Home goals minus away goals
    pub fn differential(&self) -> i64 {
        i64::from(self.home) - i64::from(self.away)
    }

    /// Which side won, or `Equal` for a draw
    pub fn tendency(&self) -> Ordering {
        self.home.cmp(&self.away)
    }

    pub fn is_draw(&self) -> bool {
        self.home == self.away
    }
}

/// A result (or a wager's selection) typed per bet kind.
///
/// Wager selections and winning outcomes share this shape so that
/// winner detection is plain structural equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Index into the bet's option list
    Choice(usize),
    Range(Decimal),
    Match(Score),
}

impl Outcome {
    pub fn kind(&self) -> BetKind {
        match self {
            Outcome::Choice(_) => BetKind::Choice,
            Outcome::Range(_) => BetKind::Range,
            Outcome::Match(_) => BetKind::Match,
        }
    }
}

/// How a proposed result was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Manual,
    ExternalOracle,
    AiGrounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Provenance tag for a proposed or resolved outcome. Display and audit only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub source: String,
    pub method: VerificationMethod,
    pub confidence: Confidence,
    pub url: Option<String>,
    pub verified_at: DateTime<Utc>,
}

impl Verification {
    /// Provenance for a result typed in by the bet creator
    pub fn manual(verified_at: DateTime<Utc>) -> Self {
        Self {
            source: "creator".to_string(),
            method: VerificationMethod::Manual,
            confidence: Confidence::High,
            url: None,
            verified_at,
        }
    }
}
