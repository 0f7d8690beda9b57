use super::{commit, ActivityFeed};
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::models::{
    ActivityEntry, ActivityKind, Actor, Bet, BetStatus, Outcome, Verification, WagerStatus,
};
use crate::payout::{self, SettlementKind, SettlementPlan};
use crate::repositories::{BetLedger, LedgerStore};
use crate::state_machine::{authorize, GuardContext, Transition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Summary of a finished resolution or invalidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub bet_id: Uuid,
    /// RESOLVED or INVALID
    pub status: BetStatus,
    pub kind: SettlementKind,
    pub total_pool: u64,
    pub total_paid: u64,
    /// Points lost to integer flooring
    pub rounding_loss: u64,
    pub winners: usize,
    pub wagers: usize,
    /// Store transactions the settlement took
    pub batches: usize,
}

impl ResolutionReport {
    fn from_plan(bet_id: Uuid, status: BetStatus, plan: &SettlementPlan) -> Self {
        Self {
            bet_id,
            status,
            kind: plan.kind,
            total_pool: plan.total_pool,
            total_paid: plan.total_paid(),
            rounding_loss: plan.rounding_loss(),
            winners: plan.winners(),
            wagers: plan.entries.len(),
            batches: 0,
        }
    }
}

/// Settlement service: result proposals, resolution and invalidation
pub struct SettlementService<S: LedgerStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    feed: ActivityFeed,
    batch_size: usize,
}

impl<S: LedgerStore> SettlementService<S> {
    /// Create a new settlement service
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, feed: ActivityFeed, batch_size: usize) -> Self {
        Self {
            store,
            clock,
            feed,
            batch_size: batch_size.max(1),
        }
    }

    /// Wagers settled per transaction, shrunk to fit the store's write limit.
    /// A batch writes each wager, each of their members and the bet.
    pub fn batch_size(&self) -> usize {
        match self.store.write_limit() {
            Some(limit) => self.batch_size.min(limit.saturating_sub(1) / 2).max(1),
            None => self.batch_size,
        }
    }

    /// Record a proposed result and open (or restart) the dispute window
    pub async fn propose_result(
        &self,
        bet_id: Uuid,
        actor: Actor,
        outcome: Outcome,
        verification: Option<Verification>,
    ) -> AppResult<Bet> {
        let now = self.clock.now();
        info!("Proposing result for bet {} by {}", bet_id, actor);

        commit(&*self.store, &self.feed, bet_id, move |ledger| {
            authorize(ledger.bet(), Transition::ProposeResult, &GuardContext::new(now, actor))?;
            ledger
                .bet()
                .payload
                .validate_outcome(&outcome)
                .map_err(AppError::Validation)?;

            let from = ledger.bet().effective_status(now);
            let deadline = now + ledger.league().dispute_window();
            let verification = verification.unwrap_or_else(|| Verification::manual(now));

            let bet = ledger.bet_mut();
            bet.clear_proposal();
            bet.disputed_by.clear();
            bet.status = BetStatus::Proofing;
            bet.winning_outcome = Some(outcome.clone());
            bet.verification = Some(verification.clone());
            bet.proposed_by = Some(actor);
            bet.proposed_at = Some(now);
            bet.dispute_deadline = Some(deadline);
            bet.updated_at = now;
            let proposed = bet.clone();

            ledger.record(
                ActivityEntry::new(bet_id, proposed.league_id, actor, ActivityKind::ResultProposed, now)
                    .transition(from, BetStatus::Proofing)
                    .with_details(serde_json::json!({
                        "outcome": outcome,
                        "verification": verification,
                        "dispute_deadline": deadline,
                    })),
            );
            Ok(proposed)
        })
        .await
    }

    /// Resolve a PROOFING bet whose dispute window has closed
    pub async fn finalize(&self, bet_id: Uuid, actor: Actor) -> AppResult<ResolutionReport> {
        info!("Finalizing bet {} by {}", bet_id, actor);
        self.settle(bet_id, actor, Transition::Finalize, None).await
    }

    /// Void a bet and refund every stake
    pub async fn mark_invalid(
        &self,
        bet_id: Uuid,
        actor: Actor,
        reason: impl Into<String>,
    ) -> AppResult<ResolutionReport> {
        let reason = reason.into();
        info!("Invalidating bet {} by {}: {}", bet_id, actor, reason);
        self.settle(bet_id, actor, Transition::MarkInvalid, Some(reason))
            .await
    }

    /// Run settlement transactions until the terminal status is written.
    ///
    /// Every transaction re-checks the guard, recomputes the full plan and
    /// settles the next batch of PENDING wagers; the one that settles the
    /// last of them also flips the status. A crash between batches leaves
    /// `bet.settling` set and a rerun continues where it stopped.
    async fn settle(
        &self,
        bet_id: Uuid,
        actor: Actor,
        transition: Transition,
        reason: Option<String>,
    ) -> AppResult<ResolutionReport> {
        let batch_size = self.batch_size();
        let mut batches = 0;

        loop {
            let now = self.clock.now();
            let reason = reason.clone();
            let step = commit(&*self.store, &self.feed, bet_id, move |ledger| {
                settle_batch(ledger, transition, actor, now, batch_size, reason)
            })
            .await?;
            batches += 1;

            match step {
                Some(mut report) => {
                    report.batches = batches;
                    info!(
                        "Bet {} is {}: paid {} of {} ({} winners, {} wagers, {} batches)",
                        bet_id,
                        report.status,
                        report.total_paid,
                        report.total_pool,
                        report.winners,
                        report.wagers,
                        report.batches
                    );
                    return Ok(report);
                }
                None => debug!("Bet {}: payout batch {} committed", bet_id, batches),
            }
        }
    }
}

/// One settlement transaction. Returns the report once the bet is sealed.
fn settle_batch(
    ledger: &mut BetLedger,
    transition: Transition,
    actor: Actor,
    now: DateTime<Utc>,
    batch_size: usize,
    reason: Option<String>,
) -> AppResult<Option<ResolutionReport>> {
    authorize(ledger.bet(), transition, &GuardContext::new(now, actor))?;
    let target = transition.settles_to().ok_or_else(|| {
        AppError::Message(format!("{} does not settle a bet", transition))
    })?;

    let bet = ledger.bet();
    let plan = match target {
        BetStatus::Invalid => payout::refund_all(bet.total_pool, ledger.wagers()),
        _ => {
            let outcome = bet.winning_outcome.as_ref().ok_or_else(|| {
                AppError::InvalidState(format!("Bet {} has no proposed result", bet.id))
            })?;
            let league = ledger.league();
            payout::settle(
                league.mode,
                &league.arcade_points,
                bet.total_pool,
                ledger.wagers(),
                outcome,
            )?
        }
    };

    let batch: Vec<Uuid> = ledger
        .pending_wagers()
        .take(batch_size)
        .map(|w| w.id)
        .collect();
    for wager_id in &batch {
        let entry = plan.entry(*wager_id).ok_or_else(|| {
            AppError::Message(format!("Wager {} is missing from the settlement plan", wager_id))
        })?;
        let (status, payout, stake, user_id) = (entry.status, entry.payout, entry.stake, entry.user_id);

        if let Some(wager) = ledger.wager_mut(*wager_id) {
            wager.status = status;
            wager.payout = payout;
            wager.settled_at = Some(now);
        }

        let league_id = ledger.league().id;
        let member = ledger.member_mut(user_id).ok_or_else(|| {
            AppError::Message(format!(
                "Member {} of wager {} is missing from league {}",
                user_id, wager_id, league_id
            ))
        })?;
        let refunded = if status == WagerStatus::Push { stake } else { 0 };
        member.apply_settlement(status, payout, refunded);
        member.updated_at = now;
    }

    let bet_id = ledger.bet().id;
    let league_id = ledger.bet().league_id;
    let remaining = ledger.pending_wagers().count();

    if remaining > 0 {
        let bet = ledger.bet_mut();
        bet.settling = Some(target);
        bet.updated_at = now;
        ledger.record(
            ActivityEntry::new(bet_id, league_id, actor, ActivityKind::PayoutBatch, now)
                .with_details(serde_json::json!({
                    "target": target,
                    "settled": batch.len(),
                    "remaining": remaining,
                })),
        );
        return Ok(None);
    }

    let from = ledger.bet().effective_status(now);
    let outcome = ledger.bet().winning_outcome.clone();
    let bet = ledger.bet_mut();
    bet.status = target;
    bet.settling = None;
    bet.dispute_active = false;
    bet.vote_deadline = None;
    bet.resolved_at = Some(now);
    bet.resolved_by = Some(actor);
    bet.updated_at = now;

    let report = ResolutionReport::from_plan(bet_id, target, &plan);
    let kind = match target {
        BetStatus::Invalid => ActivityKind::BetInvalidated,
        _ => ActivityKind::BetResolved,
    };
    ledger.record(
        ActivityEntry::new(bet_id, league_id, actor, kind, now)
            .transition(from, target)
            .with_details(serde_json::json!({
                "outcome": outcome,
                "settlement": report.kind,
                "total_pool": report.total_pool,
                "total_paid": report.total_paid,
                "rounding_loss": report.rounding_loss,
                "winners": report.winners,
                "wagers": report.wagers,
                "reason": reason,
            })),
    );

    Ok(Some(report))
}
