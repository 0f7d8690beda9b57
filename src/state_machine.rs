//! Bet lifecycle transitions and their guards.
//!
//! Every state-changing operation names its [`Transition`] and calls
//! [`authorize`] inside the store transaction, against the freshly loaded
//! bet. The stored status is one of DRAFT, OPEN, PROOFING, DISPUTED or a
//! terminal state; LOCKED is always derived from `closes_at` and the clock.

use crate::error::{AppError, AppResult};
use crate::models::{Actor, Bet, BetStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// DRAFT -> OPEN
    Publish,
    /// DRAFT -> CANCELLED
    CancelDraft,
    /// OPEN -> OPEN, adds a wager
    PlaceWager,
    /// LOCKED | PROOFING | DISPUTED -> PROOFING
    ProposeResult,
    /// PROOFING -> DISPUTED
    FileDispute,
    /// DISPUTED -> DISPUTED
    CastVote,
    /// DISPUTED -> PROOFING | LOCKED
    CloseVote,
    /// PROOFING -> RESOLVED
    Finalize,
    /// any non-terminal, non-draft -> INVALID
    MarkInvalid,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Publish => "publish",
            Transition::CancelDraft => "cancel_draft",
            Transition::PlaceWager => "place_wager",
            Transition::ProposeResult => "propose_result",
            Transition::FileDispute => "file_dispute",
            Transition::CastVote => "cast_vote",
            Transition::CloseVote => "close_vote",
            Transition::Finalize => "finalize",
            Transition::MarkInvalid => "mark_invalid",
        }
    }

    /// Only the creator, or an automated actor on its behalf, may trigger these
    pub fn requires_creator(&self) -> bool {
        matches!(
            self,
            Transition::Publish
                | Transition::CancelDraft
                | Transition::ProposeResult
                | Transition::CloseVote
                | Transition::Finalize
                | Transition::MarkInvalid
        )
    }

    /// The terminal status a batched settlement of this transition writes
    pub fn settles_to(&self) -> Option<BetStatus> {
        match self {
            Transition::Finalize => Some(BetStatus::Resolved),
            Transition::MarkInvalid => Some(BetStatus::Invalid),
            _ => None,
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts about the caller the guard needs beyond the bet itself
#[derive(Debug, Clone, Copy)]
pub struct GuardContext {
    pub now: DateTime<Utc>,
    pub actor: Actor,
    /// The acting user holds a wager on this bet
    pub has_wager: bool,
}

impl GuardContext {
    pub fn new(now: DateTime<Utc>, actor: Actor) -> Self {
        Self {
            now,
            actor,
            has_wager: false,
        }
    }

    pub fn with_wager(mut self, has_wager: bool) -> Self {
        self.has_wager = has_wager;
        self
    }
}

/// True when the actor carries creator authority on this bet
pub fn has_creator_authority(bet: &Bet, actor: &Actor) -> bool {
    match actor {
        Actor::User(id) => *id == bet.creator_id,
        Actor::Oracle | Actor::Scheduler => true,
    }
}

fn invalid_state(bet: &Bet, transition: Transition, now: DateTime<Utc>) -> AppError {
    AppError::InvalidState(format!(
        "Cannot {} bet {} while it is {}",
        transition,
        bet.id,
        bet.effective_status(now)
    ))
}

fn participant(ctx: &GuardContext, what: &str) -> AppResult<Uuid> {
    match ctx.actor {
        Actor::User(id) if ctx.has_wager => Ok(id),
        Actor::User(_) => Err(AppError::Unauthorized(format!(
            "Only members with a wager on this bet may {}",
            what
        ))),
        _ => Err(AppError::Unauthorized(format!(
            "Automated actors may not {}",
            what
        ))),
    }
}

/// Single authorization and precondition check for every transition.
///
/// Returns `Unauthorized` when the actor lacks authority, `InvalidState`
/// when the bet's current state does not allow the transition, and
/// `Conflict` for a repeated dispute.
pub fn authorize(bet: &Bet, transition: Transition, ctx: &GuardContext) -> AppResult<()> {
    let now = ctx.now;

    if bet.is_terminal() {
        return Err(AppError::InvalidState(format!(
            "Bet {} is already {}",
            bet.id, bet.status
        )));
    }

    if transition.requires_creator() && !has_creator_authority(bet, &ctx.actor) {
        return Err(AppError::Unauthorized(format!(
            "Only the creator of bet {} may {}",
            bet.id, transition
        )));
    }

    // Once batched writes have started only the same settlement may continue
    if let Some(target) = bet.settling {
        if transition.settles_to() != Some(target) {
            return Err(AppError::InvalidState(format!(
                "Bet {} is being settled to {}",
                bet.id, target
            )));
        }
    }

    match transition {
        Transition::Publish | Transition::CancelDraft => {
            if bet.status != BetStatus::Draft {
                return Err(invalid_state(bet, transition, now));
            }
        }

        Transition::PlaceWager => {
            if bet.effective_status(now) != BetStatus::Open {
                return Err(invalid_state(bet, transition, now));
            }
            if ctx.actor.user_id().is_none() {
                return Err(AppError::Unauthorized(
                    "Only members may place wagers".to_string(),
                ));
            }
        }

        Transition::ProposeResult => match bet.effective_status(now) {
            BetStatus::Locked | BetStatus::Proofing | BetStatus::Disputed => {}
            _ => return Err(invalid_state(bet, transition, now)),
        },

        Transition::FileDispute => {
            if bet.status != BetStatus::Proofing {
                return Err(invalid_state(bet, transition, now));
            }
            let user = participant(ctx, "dispute a result")?;
            if bet.disputed_by.contains(&user) {
                return Err(AppError::Conflict(format!(
                    "User {} has already disputed bet {}",
                    user, bet.id
                )));
            }
            if bet.dispute_deadline.map_or(false, |deadline| now >= deadline) {
                return Err(AppError::InvalidState(format!(
                    "The dispute window of bet {} has closed",
                    bet.id
                )));
            }
        }

        Transition::CastVote => {
            if bet.status != BetStatus::Disputed {
                return Err(invalid_state(bet, transition, now));
            }
            participant(ctx, "vote")?;
            if bet.vote_deadline.map_or(false, |deadline| now >= deadline) {
                return Err(AppError::InvalidState(format!(
                    "Voting on bet {} has closed",
                    bet.id
                )));
            }
        }

        Transition::CloseVote => {
            if bet.status != BetStatus::Disputed {
                return Err(invalid_state(bet, transition, now));
            }
            if ctx.actor == Actor::Scheduler && !is_vote_due_to_close(bet, now) {
                return Err(AppError::InvalidState(format!(
                    "Voting on bet {} is still open",
                    bet.id
                )));
            }
        }

        Transition::Finalize => {
            if bet.status != BetStatus::Proofing {
                return Err(invalid_state(bet, transition, now));
            }
            if bet.winning_outcome.is_none() {
                return Err(AppError::InvalidState(format!(
                    "Bet {} has no proposed result",
                    bet.id
                )));
            }
            if bet.dispute_active {
                return Err(AppError::InvalidState(format!(
                    "Bet {} has an active dispute",
                    bet.id
                )));
            }
            if !bet.dispute_deadline.map_or(false, |deadline| now >= deadline) {
                return Err(AppError::InvalidState(format!(
                    "The dispute window of bet {} is still open",
                    bet.id
                )));
            }
        }

        Transition::MarkInvalid => {
            if bet.status == BetStatus::Draft {
                return Err(invalid_state(bet, transition, now));
            }
        }
    }

    Ok(())
}

/// PROOFING, undisputed, and past its dispute deadline
pub fn is_due_for_finalization(bet: &Bet, now: DateTime<Utc>) -> bool {
    bet.status == BetStatus::Proofing
        && !bet.dispute_active
        && bet.winning_outcome.is_some()
        && bet.settling != Some(BetStatus::Invalid)
        && bet.dispute_deadline.map_or(false, |deadline| now >= deadline)
}

/// LOCKED with auto-confirm enabled and the oracle delay elapsed
pub fn is_due_for_auto_confirm(bet: &Bet, now: DateTime<Utc>) -> bool {
    bet.is_locked(now)
        && bet.winning_outcome.is_none()
        && bet.settling.is_none()
        && bet.auto_confirm_due_at().map_or(false, |due| now >= due)
}

/// DISPUTED and past its vote deadline
pub fn is_vote_due_to_close(bet: &Bet, now: DateTime<Utc>) -> bool {
    bet.status == BetStatus::Disputed && bet.vote_deadline.map_or(false, |deadline| now >= deadline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BetOption, BetPayload, NewBet, Outcome};
    use chrono::Duration;

    fn open_bet(now: DateTime<Utc>) -> Bet {
        let mut bet = Bet::draft(
            NewBet {
                league_id: Uuid::new_v4(),
                creator_id: Uuid::new_v4(),
                question: "Who scores first?".into(),
                payload: BetPayload::Choice {
                    options: vec![BetOption::new("Home"), BetOption::new("Away")],
                },
                event_date: now + Duration::hours(2),
                auto_confirm: false,
                auto_confirm_delay_minutes: 0,
            },
            now,
        );
        bet.status = BetStatus::Open;
        bet.closes_at = Some(now + Duration::hours(1));
        bet
    }

    fn proofing(bet: &mut Bet, deadline: DateTime<Utc>) {
        bet.status = BetStatus::Proofing;
        bet.winning_outcome = Some(Outcome::Choice(0));
        bet.dispute_deadline = Some(deadline);
    }

    #[test]
    fn test_wagers_only_while_open() {
        let now = Utc::now();
        let bet = open_bet(now);
        let member = Actor::User(Uuid::new_v4());

        assert!(authorize(&bet, Transition::PlaceWager, &GuardContext::new(now, member)).is_ok());

        let later = GuardContext::new(now + Duration::hours(1), member);
        let err = authorize(&bet, Transition::PlaceWager, &later).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(err.to_string().contains("LOCKED"));
    }

    #[test]
    fn test_proposal_needs_lock_and_creator() {
        let now = Utc::now();
        let bet = open_bet(now);
        let creator = Actor::User(bet.creator_id);
        let locked = now + Duration::hours(1);

        assert!(authorize(&bet, Transition::ProposeResult, &GuardContext::new(now, creator)).is_err());
        assert!(authorize(&bet, Transition::ProposeResult, &GuardContext::new(locked, creator)).is_ok());
        assert!(authorize(&bet, Transition::ProposeResult, &GuardContext::new(locked, Actor::Oracle)).is_ok());

        let stranger = GuardContext::new(locked, Actor::User(Uuid::new_v4()));
        assert!(matches!(
            authorize(&bet, Transition::ProposeResult, &stranger),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_dispute_rules() {
        let now = Utc::now();
        let mut bet = open_bet(now);
        proofing(&mut bet, now + Duration::hours(24));
        let user = Uuid::new_v4();

        let no_wager = GuardContext::new(now, Actor::User(user));
        assert!(matches!(
            authorize(&bet, Transition::FileDispute, &no_wager),
            Err(AppError::Unauthorized(_))
        ));

        let ctx = no_wager.with_wager(true);
        assert!(authorize(&bet, Transition::FileDispute, &ctx).is_ok());

        bet.disputed_by.insert(user);
        assert!(matches!(
            authorize(&bet, Transition::FileDispute, &ctx),
            Err(AppError::Conflict(_))
        ));

        let late = GuardContext::new(now + Duration::hours(24), Actor::User(Uuid::new_v4())).with_wager(true);
        assert!(matches!(
            authorize(&bet, Transition::FileDispute, &late),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn test_finalize_waits_for_deadline_and_dispute() {
        let now = Utc::now();
        let mut bet = open_bet(now);
        let deadline = now + Duration::hours(24);
        proofing(&mut bet, deadline);

        let early = GuardContext::new(now, Actor::Scheduler);
        assert!(authorize(&bet, Transition::Finalize, &early).is_err());
        assert!(!is_due_for_finalization(&bet, now));

        let due = GuardContext::new(deadline, Actor::Scheduler);
        assert!(authorize(&bet, Transition::Finalize, &due).is_ok());
        assert!(is_due_for_finalization(&bet, deadline));

        bet.dispute_active = true;
        assert!(authorize(&bet, Transition::Finalize, &due).is_err());
        assert!(!is_due_for_finalization(&bet, deadline + Duration::days(30)));
    }

    #[test]
    fn test_terminal_states_are_frozen() {
        let now = Utc::now();
        let mut bet = open_bet(now);
        bet.status = BetStatus::Resolved;
        for transition in [
            Transition::PlaceWager,
            Transition::ProposeResult,
            Transition::Finalize,
            Transition::MarkInvalid,
        ] {
            assert!(matches!(
                authorize(&bet, transition, &GuardContext::new(now, Actor::Scheduler)),
                Err(AppError::InvalidState(_))
            ));
        }
    }

    #[test]
    fn test_settlement_fence_blocks_other_transitions() {
        let now = Utc::now();
        let mut bet = open_bet(now);
        proofing(&mut bet, now);
        bet.settling = Some(BetStatus::Resolved);
        let creator = GuardContext::new(now, Actor::User(bet.creator_id));

        assert!(authorize(&bet, Transition::Finalize, &creator).is_ok());
        assert!(authorize(&bet, Transition::MarkInvalid, &creator).is_err());
        assert!(authorize(&bet, Transition::ProposeResult, &creator).is_err());
    }

    #[test]
    fn test_scheduler_closes_votes_only_after_deadline() {
        let now = Utc::now();
        let mut bet = open_bet(now);
        bet.status = BetStatus::Disputed;
        bet.dispute_active = true;
        bet.vote_deadline = Some(now + Duration::hours(24));

        assert!(authorize(&bet, Transition::CloseVote, &GuardContext::new(now, Actor::Scheduler)).is_err());
        assert!(authorize(&bet, Transition::CloseVote, &GuardContext::new(now, Actor::User(bet.creator_id))).is_ok());
        assert!(is_vote_due_to_close(&bet, now + Duration::hours(24)));
    }

    #[test]
    fn test_auto_confirm_due() {
        let now = Utc::now();
        let mut bet = open_bet(now);
        bet.auto_confirm = true;
        bet.auto_confirm_delay_minutes = 30;

        assert!(!is_due_for_auto_confirm(&bet, now + Duration::hours(2)));
        assert!(is_due_for_auto_confirm(&bet, now + Duration::minutes(150)));
    }
}
