use super::{commit, ActivityFeed, ResolutionReport, SettlementService};
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::models::{ActivityEntry, ActivityKind, Actor, Bet, BetStatus, Vote};
use crate::repositories::{BetLedger, LedgerStore};
use crate::state_machine::{authorize, GuardContext, Transition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Votes counted against the eligible electorate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub approve: usize,
    pub reject: usize,
    pub eligible: usize,
}

/// What a closed vote does to the proposed result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeDecision {
    /// The proposal stands and the bet returns to PROOFING
    Upheld,
    /// The proposal is discarded and the creator must propose again
    Rejected,
}

impl VoteTally {
    pub fn cast(&self) -> usize {
        self.approve + self.reject
    }

    /// Simple majority of cast votes; a tie or no votes keeps the proposal
    pub fn decision(&self) -> DisputeDecision {
        if self.reject > self.approve {
            DisputeDecision::Rejected
        } else {
            DisputeDecision::Upheld
        }
    }

    /// Every eligible voter has voted
    pub fn is_complete(&self) -> bool {
        self.eligible > 0 && self.cast() >= self.eligible
    }
}

/// Count the votes of eligible members only
pub fn tally(votes: &BTreeMap<Uuid, Vote>, eligible: &BTreeSet<Uuid>) -> VoteTally {
    let mut approve = 0;
    let mut reject = 0;
    for (user, vote) in votes {
        if !eligible.contains(user) {
            continue;
        }
        match vote {
            Vote::Approve => approve += 1,
            Vote::Reject => reject += 1,
        }
    }
    VoteTally {
        approve,
        reject,
        eligible: eligible.len(),
    }
}

/// State of a dispute after a filing or vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub bet_id: Uuid,
    pub tally: VoteTally,
    /// Set once the vote has closed
    pub decision: Option<DisputeDecision>,
    /// Set when an upheld vote resolved the bet straight away
    pub resolution: Option<ResolutionReport>,
}

/// Service for disputes on proposed results and the votes that settle them
pub struct DisputeService<S: LedgerStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    feed: ActivityFeed,
    settlement: Arc<SettlementService<S>>,
    finalize_on_upheld: bool,
}

impl<S: LedgerStore> DisputeService<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        feed: ActivityFeed,
        settlement: Arc<SettlementService<S>>,
        finalize_on_upheld: bool,
    ) -> Self {
        Self {
            store,
            clock,
            feed,
            settlement,
            finalize_on_upheld,
        }
    }

    /// PROOFING -> DISPUTED. The filer's vote counts as a reject, so a sole
    /// wager holder disputing closes the vote at once as rejected.
    pub async fn file_dispute(
        &self,
        bet_id: Uuid,
        user_id: Uuid,
        reason: impl Into<String>,
    ) -> AppResult<VoteReceipt> {
        let now = self.clock.now();
        let reason = reason.into();
        let finalize_on_upheld = self.finalize_on_upheld;
        info!("User {} disputes the result of bet {}", user_id, bet_id);

        let receipt = commit(&*self.store, &self.feed, bet_id, move |ledger| {
            let actor = Actor::User(user_id);
            let ctx = GuardContext::new(now, actor).with_wager(ledger.wager_of(user_id).is_some());
            authorize(ledger.bet(), Transition::FileDispute, &ctx)?;

            let vote_deadline = now + ledger.league().dispute_window();
            let bet = ledger.bet_mut();
            bet.status = BetStatus::Disputed;
            bet.dispute_active = true;
            bet.disputed_by.insert(user_id);
            bet.vote_deadline = Some(vote_deadline);
            bet.votes.clear();
            bet.votes.insert(user_id, Vote::Reject);
            bet.updated_at = now;
            let league_id = bet.league_id;

            ledger.record(
                ActivityEntry::new(bet_id, league_id, actor, ActivityKind::DisputeFiled, now)
                    .transition(BetStatus::Proofing, BetStatus::Disputed)
                    .with_details(serde_json::json!({
                        "reason": reason,
                        "vote_deadline": vote_deadline,
                    })),
            );

            Ok(close_if_complete(ledger, actor, now, finalize_on_upheld))
        })
        .await?;

        self.after_vote(receipt).await
    }

    /// Record or overwrite one member's vote
    pub async fn cast_vote(&self, bet_id: Uuid, user_id: Uuid, vote: Vote) -> AppResult<VoteReceipt> {
        let now = self.clock.now();
        let finalize_on_upheld = self.finalize_on_upheld;

        let receipt = commit(&*self.store, &self.feed, bet_id, move |ledger| {
            let actor = Actor::User(user_id);
            let ctx = GuardContext::new(now, actor).with_wager(ledger.wager_of(user_id).is_some());
            authorize(ledger.bet(), Transition::CastVote, &ctx)?;

            let bet = ledger.bet_mut();
            let previous = bet.votes.insert(user_id, vote);
            bet.updated_at = now;
            let league_id = bet.league_id;

            ledger.record(
                ActivityEntry::new(bet_id, league_id, actor, ActivityKind::VoteCast, now)
                    .with_details(serde_json::json!({
                        "vote": vote,
                        "replaced": previous,
                    })),
            );

            Ok(close_if_complete(ledger, actor, now, finalize_on_upheld))
        })
        .await?;

        info!(
            "Vote on bet {} by {}: {}/{} cast",
            bet_id,
            user_id,
            receipt.tally.cast(),
            receipt.tally.eligible
        );
        self.after_vote(receipt).await
    }

    /// Apply the tally now: the creator at any time, the scheduler once the
    /// vote deadline has passed
    pub async fn close_vote(&self, bet_id: Uuid, actor: Actor) -> AppResult<VoteReceipt> {
        let now = self.clock.now();
        let finalize_on_upheld = self.finalize_on_upheld;

        let receipt = commit(&*self.store, &self.feed, bet_id, move |ledger| {
            authorize(ledger.bet(), Transition::CloseVote, &GuardContext::new(now, actor))?;
            let counted = tally(&ledger.bet().votes, &ledger.wager_holders());
            let decision = apply_decision(ledger, counted, actor, now, finalize_on_upheld);
            Ok(VoteReceipt {
                bet_id,
                tally: counted,
                decision: Some(decision),
                resolution: None,
            })
        })
        .await?;

        self.after_vote(receipt).await
    }

    /// Resolve an upheld bet immediately when configured to
    async fn after_vote(&self, mut receipt: VoteReceipt) -> AppResult<VoteReceipt> {
        match receipt.decision {
            Some(DisputeDecision::Upheld) => {
                info!("Dispute on bet {} upheld the proposed result", receipt.bet_id);
                if self.finalize_on_upheld {
                    match self
                        .settlement
                        .finalize(receipt.bet_id, Actor::Scheduler)
                        .await
                    {
                        Ok(report) => receipt.resolution = Some(report),
                        // The scheduler picks the bet up on its next sweep
                        Err(e) => warn!(
                            "Bet {} could not be resolved after its dispute: {}",
                            receipt.bet_id, e
                        ),
                    }
                }
            }
            Some(DisputeDecision::Rejected) => {
                info!("Dispute on bet {} rejected the proposed result", receipt.bet_id)
            }
            None => {}
        }
        Ok(receipt)
    }

    /// Current tally of a disputed bet
    pub async fn tally_for(&self, bet_id: Uuid) -> AppResult<VoteTally> {
        let bet: Bet = self
            .store
            .find_bet(bet_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bet {} not found", bet_id)))?;
        let eligible: BTreeSet<Uuid> = self
            .store
            .find_wagers(bet_id)
            .await?
            .iter()
            .map(|w| w.user_id)
            .collect();
        Ok(tally(&bet.votes, &eligible))
    }
}

fn close_if_complete(
    ledger: &mut BetLedger,
    actor: Actor,
    now: DateTime<Utc>,
    finalize_on_upheld: bool,
) -> VoteReceipt {
    let bet_id = ledger.bet().id;
    let counted = tally(&ledger.bet().votes, &ledger.wager_holders());
    let decision = counted
        .is_complete()
        .then(|| apply_decision(ledger, counted, actor, now, finalize_on_upheld));
    VoteReceipt {
        bet_id,
        tally: counted,
        decision,
        resolution: None,
    }
}

/// Close the vote inside the current transaction
fn apply_decision(
    ledger: &mut BetLedger,
    counted: VoteTally,
    actor: Actor,
    now: DateTime<Utc>,
    finalize_on_upheld: bool,
) -> DisputeDecision {
    let decision = counted.decision();
    let window = ledger.league().dispute_window();
    let bet = ledger.bet_mut();
    let league_id = bet.league_id;
    let bet_id = bet.id;

    let (kind, to) = match decision {
        DisputeDecision::Upheld => {
            bet.status = BetStatus::Proofing;
            bet.dispute_active = false;
            bet.votes.clear();
            bet.vote_deadline = None;
            bet.dispute_deadline = Some(if finalize_on_upheld { now } else { now + window });
            (ActivityKind::DisputeUpheld, BetStatus::Proofing)
        }
        DisputeDecision::Rejected => {
            bet.clear_proposal();
            bet.status = BetStatus::Open;
            // the oracle's answer was voted down; the creator proposes next
            bet.auto_confirm = false;
            (ActivityKind::DisputeRejected, BetStatus::Locked)
        }
    };
    bet.updated_at = now;

    ledger.record(
        ActivityEntry::new(bet_id, league_id, actor, kind, now)
            .transition(BetStatus::Disputed, to)
            .with_details(serde_json::json!({
                "approve": counted.approve,
                "reject": counted.reject,
                "eligible": counted.eligible,
            })),
    );
    decision
}
