use crate::error::{AppError, AppResult};
use crate::models::{
    Bet, BetKind, BetPayload, Confidence, Outcome, Score, Verification, VerificationMethod,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// What the oracle is asked about a bet
#[derive(Debug, Clone, Serialize)]
pub struct OracleQuery {
    pub bet_id: Uuid,
    pub kind: BetKind,
    pub description: String,
    /// Options, range bounds or teams
    pub payload: BetPayload,
    pub event_time: DateTime<Utc>,
}

impl OracleQuery {
    pub fn for_bet(bet: &Bet) -> Self {
        Self {
            bet_id: bet.id,
            kind: bet.kind(),
            description: bet.question.clone(),
            payload: bet.payload.clone(),
            event_time: bet.event_date,
        }
    }
}

/// A candidate result with provenance.
///
/// `outcome` is untyped on the wire: an option index or label for CHOICE,
/// a number for RANGE, `{"home": n, "away": m}` for MATCH.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleAnswer {
    pub outcome: Value,
    pub source: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<VerificationMethod>,
}

impl OracleAnswer {
    /// Interpret the wire outcome against the bet's payload
    pub fn outcome_for(&self, payload: &BetPayload) -> AppResult<Outcome> {
        let invalid = || {
            AppError::Validation(format!(
                "Oracle outcome {} does not fit a {} bet",
                self.outcome,
                payload.kind().as_str()
            ))
        };

        let outcome = match payload {
            BetPayload::Choice { options } => match &self.outcome {
                Value::Number(n) => n
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .map(Outcome::Choice)
                    .ok_or_else(invalid)?,
                Value::String(label) => options
                    .iter()
                    .position(|o| o.label.trim().eq_ignore_ascii_case(label.trim()))
                    .map(Outcome::Choice)
                    .ok_or_else(invalid)?,
                _ => return Err(invalid()),
            },
            BetPayload::Range { .. } => {
                let text = match &self.outcome {
                    Value::Number(n) => n.to_string(),
                    Value::String(s) => s.clone(),
                    _ => return Err(invalid()),
                };
                Outcome::Range(text.trim().parse::<Decimal>().map_err(|_| invalid())?)
            }
            BetPayload::Match { .. } => {
                let score: Score = serde_json::from_value(self.outcome.clone()).map_err(|_| invalid())?;
                Outcome::Match(score)
            }
        };

        payload
            .validate_outcome(&outcome)
            .map_err(AppError::Validation)?;
        Ok(outcome)
    }

    pub fn verification(&self, verified_at: DateTime<Utc>) -> Verification {
        Verification {
            source: self.source.clone(),
            method: self.method.unwrap_or(VerificationMethod::AiGrounded),
            confidence: self.confidence,
            url: self.url.clone(),
            verified_at,
        }
    }
}

/// External result lookup. `Ok(None)` means the oracle does not know yet.
#[async_trait]
pub trait ResultOracle: Send + Sync {
    async fn lookup(&self, query: &OracleQuery) -> AppResult<Option<OracleAnswer>>;
}

/// Oracle that never knows; auto-confirm bets wait for manual entry
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOracle;

#[async_trait]
impl ResultOracle for NoOracle {
    async fn lookup(&self, _query: &OracleQuery) -> AppResult<Option<OracleAnswer>> {
        Ok(None)
    }
}

/// Oracle reached over HTTP: `POST {base_url}/resolve` with the query as
/// JSON. 204 and 404 mean unknown.
pub struct HttpOracle {
    base_url: String,
    client: reqwest::Client,
}

impl HttpOracle {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl ResultOracle for HttpOracle {
    async fn lookup(&self, query: &OracleQuery) -> AppResult<Option<OracleAnswer>> {
        let url = format!("{}/resolve", self.base_url);
        debug!("Asking oracle about bet {}", query.bet_id);

        let response = self
            .client
            .post(&url)
            .json(query)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Oracle request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            warn!("Oracle answered {} for bet {}", status, query.bet_id);
            return Err(AppError::ExternalService(format!(
                "Oracle returned status {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("Invalid oracle response: {}", e)))?;
        if body.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(body)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BetOption;
    use serde_json::json;

    fn answer(outcome: Value) -> OracleAnswer {
        OracleAnswer {
            outcome,
            source: "league-table.example".into(),
            confidence: Confidence::Medium,
            url: None,
            method: None,
        }
    }

    #[test]
    fn test_choice_by_index_or_label() {
        let payload = BetPayload::Choice {
            options: vec![BetOption::new("Yes"), BetOption::new("No")],
        };
        assert_eq!(answer(json!(1)).outcome_for(&payload).unwrap(), Outcome::Choice(1));
        assert_eq!(answer(json!(" no ")).outcome_for(&payload).unwrap(), Outcome::Choice(1));
        assert!(answer(json!(5)).outcome_for(&payload).is_err());
        assert!(answer(json!("Maybe")).outcome_for(&payload).is_err());
    }

    #[test]
    fn test_range_and_match_shapes() {
        let range = BetPayload::Range {
            min: Decimal::new(0, 0),
            max: Decimal::new(100, 0),
            unit: "mm".into(),
        };
        assert_eq!(
            answer(json!(12.5)).outcome_for(&range).unwrap(),
            Outcome::Range(Decimal::new(125, 1))
        );
        assert!(answer(json!(101)).outcome_for(&range).is_err());

        let game = BetPayload::Match {
            home_team: "Lions".into(),
            away_team: "Tigers".into(),
        };
        assert_eq!(
            answer(json!({"home": 2, "away": 1})).outcome_for(&game).unwrap(),
            Outcome::Match(Score::new(2, 1))
        );
        assert!(answer(json!({"home": -1, "away": 1})).outcome_for(&game).is_err());
    }

    #[test]
    fn test_verification_defaults_to_ai_grounded() {
        let v = answer(json!(0)).verification(Utc::now());
        assert_eq!(v.method, VerificationMethod::AiGrounded);
        assert_eq!(v.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn test_no_oracle_never_knows() {
        let bet_query = OracleQuery {
            bet_id: Uuid::new_v4(),
            kind: BetKind::Choice,
            description: "?".into(),
            payload: BetPayload::Choice { options: vec![] },
            event_time: Utc::now(),
        };
        assert!(NoOracle.lookup(&bet_query).await.unwrap().is_none());
    }
}
