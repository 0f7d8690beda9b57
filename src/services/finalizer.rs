use super::{DisputeDecision, DisputeService, OracleQuery, ResultOracle, SettlementService};
use crate::clock::Clock;
use crate::error::AppResult;
use crate::models::{Actor, Bet, BetStatus};
use crate::repositories::LedgerStore;
use crate::state_machine::{is_due_for_auto_confirm, is_due_for_finalization, is_vote_due_to_close};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Work the sweep can do for one bet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStage {
    /// Ask the oracle and propose its answer
    AutoConfirm,
    /// Apply the tally of an overdue vote
    CloseVote,
    /// Resolve after the dispute window
    Finalize,
    /// Finish an invalidation interrupted between batches
    ResumeInvalidation,
}

impl SweepStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepStage::AutoConfirm => "auto_confirm",
            SweepStage::CloseVote => "close_vote",
            SweepStage::Finalize => "finalize",
            SweepStage::ResumeInvalidation => "resume_invalidation",
        }
    }

    /// The stage due for `bet` at `now`, if any
    pub fn due(bet: &Bet, now: DateTime<Utc>) -> Option<Self> {
        if bet.settling == Some(BetStatus::Invalid) {
            Some(SweepStage::ResumeInvalidation)
        } else if is_vote_due_to_close(bet, now) {
            Some(SweepStage::CloseVote)
        } else if is_due_for_finalization(bet, now) {
            Some(SweepStage::Finalize)
        } else if is_due_for_auto_confirm(bet, now) {
            Some(SweepStage::AutoConfirm)
        } else {
            None
        }
    }
}

/// One bet the sweep failed on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub bet_id: Uuid,
    pub stage: SweepStage,
    /// Machine-readable reason, see `AppError::kind`
    pub kind: String,
    pub error: String,
}

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub proposed: Vec<Uuid>,
    pub oracle_unknown: Vec<Uuid>,
    pub votes_closed: Vec<Uuid>,
    pub finalized: Vec<Uuid>,
    pub invalidated: Vec<Uuid>,
    /// Disputed bets held back until their vote closes
    pub skipped_disputed: Vec<Uuid>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        self.proposed.is_empty()
            && self.votes_closed.is_empty()
            && self.finalized.is_empty()
            && self.invalidated.is_empty()
            && self.failures.is_empty()
    }
}

/// Background task that auto-confirms, closes overdue votes and resolves
/// bets whose dispute window has passed
pub struct AutoFinalizer<S: LedgerStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    oracle: Arc<dyn ResultOracle>,
    settlement: Arc<SettlementService<S>>,
    disputes: Arc<DisputeService<S>>,
    interval: Duration,
}

impl<S: LedgerStore> AutoFinalizer<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        oracle: Arc<dyn ResultOracle>,
        settlement: Arc<SettlementService<S>>,
        disputes: Arc<DisputeService<S>>,
    ) -> Self {
        Self {
            store,
            clock,
            oracle,
            settlement,
            disputes,
            interval: Duration::from_secs(15 * 60),
        }
    }

    /// Set sweep interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start the sweep loop
    pub async fn start(self: Arc<Self>) {
        let mut interval = time::interval(self.interval);
        info!("Auto-finalizer started, sweeping every {:?}", self.interval);

        loop {
            interval.tick().await;

            match self.run_once().await {
                Ok(report) if report.is_idle() => debug!("Sweep found nothing due"),
                Ok(report) => info!(
                    "Sweep: {} proposed, {} votes closed, {} finalized, {} invalidated, {} disputed, {} failed",
                    report.proposed.len(),
                    report.votes_closed.len(),
                    report.finalized.len(),
                    report.invalidated.len(),
                    report.skipped_disputed.len(),
                    report.failures.len()
                ),
                Err(e) => error!("Error in auto-finalizer sweep: {}", e),
            }
        }
    }

    /// One pass over every non-terminal, non-draft bet. A failing bet is
    /// recorded and the sweep moves on.
    pub async fn run_once(&self) -> AppResult<SweepReport> {
        let now = self.clock.now();
        let bets = self
            .store
            .find_bets_by_status(&[BetStatus::Open, BetStatus::Proofing, BetStatus::Disputed])
            .await?;

        let mut report = SweepReport {
            examined: bets.len(),
            ..SweepReport::default()
        };

        for bet in &bets {
            let stage = match SweepStage::due(bet, now) {
                Some(stage) => stage,
                None => {
                    if bet.status == BetStatus::Disputed {
                        report.skipped_disputed.push(bet.id);
                    }
                    continue;
                }
            };

            if let Err(e) = self.run_stage(bet, stage, now, &mut report).await {
                warn!("Sweep {} failed for bet {}: {}", stage.as_str(), bet.id, e);
                report.failures.push(SweepFailure {
                    bet_id: bet.id,
                    stage,
                    kind: e.kind().to_string(),
                    error: e.to_string(),
                });
            }
        }

        Ok(report)
    }

    async fn run_stage(
        &self,
        bet: &Bet,
        stage: SweepStage,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> AppResult<()> {
        match stage {
            SweepStage::AutoConfirm => {
                let answer = match self.oracle.lookup(&OracleQuery::for_bet(bet)).await? {
                    Some(answer) => answer,
                    None => {
                        debug!("Oracle has no result for bet {} yet", bet.id);
                        report.oracle_unknown.push(bet.id);
                        return Ok(());
                    }
                };
                let outcome = answer.outcome_for(&bet.payload)?;
                self.settlement
                    .propose_result(bet.id, Actor::Oracle, outcome, Some(answer.verification(now)))
                    .await?;
                report.proposed.push(bet.id);
            }
            SweepStage::CloseVote => {
                let receipt = self.disputes.close_vote(bet.id, Actor::Scheduler).await?;
                report.votes_closed.push(bet.id);
                if receipt.decision == Some(DisputeDecision::Upheld) && receipt.resolution.is_some() {
                    report.finalized.push(bet.id);
                }
            }
            SweepStage::Finalize => {
                self.settlement.finalize(bet.id, Actor::Scheduler).await?;
                report.finalized.push(bet.id);
            }
            SweepStage::ResumeInvalidation => {
                self.settlement
                    .mark_invalid(bet.id, Actor::Scheduler, "resuming interrupted invalidation")
                    .await?;
                report.invalidated.push(bet.id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BetOption, BetPayload, NewBet, Outcome};
    use chrono::Duration as ChronoDuration;

    fn bet(now: DateTime<Utc>) -> Bet {
        let mut bet = Bet::draft(
            NewBet {
                league_id: Uuid::new_v4(),
                creator_id: Uuid::new_v4(),
                question: "Rain at kickoff?".into(),
                payload: BetPayload::Choice {
                    options: vec![BetOption::new("Yes"), BetOption::new("No")],
                },
                event_date: now,
                auto_confirm: true,
                auto_confirm_delay_minutes: 30,
            },
            now,
        );
        bet.status = BetStatus::Open;
        bet.closes_at = Some(now - ChronoDuration::minutes(5));
        bet
    }

    #[test]
    fn test_auto_confirm_waits_for_delay() {
        let now = Utc::now();
        let bet = bet(now);
        assert_eq!(SweepStage::due(&bet, now), None);
        assert_eq!(
            SweepStage::due(&bet, now + ChronoDuration::minutes(30)),
            Some(SweepStage::AutoConfirm)
        );
    }

    #[test]
    fn test_stage_precedence() {
        let now = Utc::now();
        let mut bet = bet(now);
        bet.status = BetStatus::Proofing;
        bet.winning_outcome = Some(Outcome::Choice(0));
        bet.dispute_deadline = Some(now);
        assert_eq!(SweepStage::due(&bet, now), Some(SweepStage::Finalize));

        bet.status = BetStatus::Disputed;
        bet.dispute_active = true;
        assert_eq!(SweepStage::due(&bet, now), None);
        bet.vote_deadline = Some(now);
        assert_eq!(SweepStage::due(&bet, now), Some(SweepStage::CloseVote));

        bet.settling = Some(BetStatus::Invalid);
        assert_eq!(SweepStage::due(&bet, now), Some(SweepStage::ResumeInvalidation));
    }
}
