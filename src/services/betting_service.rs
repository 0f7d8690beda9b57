use super::{commit, ActivityFeed};
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::models::{
    ActivityEntry, ActivityKind, Actor, Bet, BetPayload, BetStatus, LeagueMode, NewBet, Outcome,
    PowerUp, Wager,
};
use crate::payout::{option_odds, selection_odds, OptionOdds, SelectionOdds};
use crate::repositories::LedgerStore;
use crate::state_machine::{authorize, GuardContext, Transition};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Longest wait after the event before the oracle is asked, one week
pub const MAX_AUTO_CONFIRM_DELAY_MINUTES: i64 = 7 * 24 * 60;

/// A wager request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceWager {
    pub bet_id: Uuid,
    pub user_id: Uuid,
    /// Points staked; must be 0 in arcade leagues
    pub amount: u64,
    pub selection: Outcome,
    pub power_up: Option<PowerUp>,
}

/// Display snapshot of a bet's odds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetOdds {
    pub bet_id: Uuid,
    pub status: BetStatus,
    pub total_pool: u64,
    /// CHOICE bets, one row per option
    pub options: Vec<OptionOdds>,
    /// RANGE and MATCH bets, one row per distinct selection
    pub selections: Vec<SelectionOdds>,
}

/// Service for drafting, publishing and wagering on bets
pub struct BettingService<S: LedgerStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    feed: ActivityFeed,
    lock_buffer: Duration,
}

impl<S: LedgerStore> BettingService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, feed: ActivityFeed, lock_buffer: Duration) -> Self {
        Self {
            store,
            clock,
            feed,
            lock_buffer,
        }
    }

    pub async fn get_bet(&self, bet_id: Uuid) -> AppResult<Bet> {
        self.store
            .find_bet(bet_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bet {} not found", bet_id)))
    }

    /// Store a new DRAFT bet
    pub async fn create_bet(&self, new: NewBet) -> AppResult<Bet> {
        validate_question(&new.question)?;
        new.payload.validate().map_err(AppError::Validation)?;
        if !(0..=MAX_AUTO_CONFIRM_DELAY_MINUTES).contains(&new.auto_confirm_delay_minutes) {
            return Err(AppError::Validation(format!(
                "Auto-confirm delay must be between 0 and {} minutes",
                MAX_AUTO_CONFIRM_DELAY_MINUTES
            )));
        }

        self.store
            .find_league(new.league_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("League {} not found", new.league_id)))?;
        if self
            .store
            .find_member(new.league_id, new.creator_id)
            .await?
            .is_none()
        {
            return Err(AppError::Unauthorized(format!(
                "User {} is not a member of league {}",
                new.creator_id, new.league_id
            )));
        }

        let bet = Bet::draft(new, self.clock.now());
        self.store.insert_bet(&bet).await?;

        info!("Draft bet {} created in league {}", bet.id, bet.league_id);
        Ok(bet)
    }

    /// DRAFT -> OPEN; betting closes `lock_buffer` before the event
    pub async fn publish(&self, bet_id: Uuid, actor: Actor) -> AppResult<Bet> {
        let now = self.clock.now();
        let lock_buffer = self.lock_buffer;

        let bet = commit(&*self.store, &self.feed, bet_id, move |ledger| {
            let bet = ledger.bet();
            authorize(bet, Transition::Publish, &GuardContext::new(now, actor))?;
            validate_question(&bet.question)?;
            bet.payload.validate().map_err(AppError::Validation)?;

            let closes_at = bet.event_date - lock_buffer;
            if closes_at <= now {
                return Err(AppError::Validation(format!(
                    "Betting would close at {}, which is not in the future",
                    closes_at
                )));
            }

            let bet = ledger.bet_mut();
            bet.status = BetStatus::Open;
            bet.closes_at = Some(closes_at);
            bet.updated_at = now;
            let published = bet.clone();

            ledger.record(
                ActivityEntry::new(bet_id, published.league_id, actor, ActivityKind::BetPublished, now)
                    .transition(BetStatus::Draft, BetStatus::Open)
                    .with_details(serde_json::json!({ "closes_at": closes_at })),
            );
            Ok(published)
        })
        .await?;

        info!("Bet {} published, betting closes at {:?}", bet.id, bet.closes_at);
        Ok(bet)
    }

    /// DRAFT -> CANCELLED
    pub async fn cancel_draft(&self, bet_id: Uuid, actor: Actor) -> AppResult<Bet> {
        let now = self.clock.now();

        let bet = commit(&*self.store, &self.feed, bet_id, move |ledger| {
            authorize(ledger.bet(), Transition::CancelDraft, &GuardContext::new(now, actor))?;

            let bet = ledger.bet_mut();
            bet.status = BetStatus::Cancelled;
            bet.updated_at = now;
            let cancelled = bet.clone();

            ledger.record(
                ActivityEntry::new(bet_id, cancelled.league_id, actor, ActivityKind::BetCancelled, now)
                    .transition(BetStatus::Draft, BetStatus::Cancelled),
            );
            Ok(cancelled)
        })
        .await?;

        info!("Draft bet {} cancelled", bet_id);
        Ok(bet)
    }

    /// Place one wager: debits the stake (zero-sum) or consumes the power-up
    /// (arcade), and grows the pool and option totals, all in one transaction.
    pub async fn place_wager(&self, request: PlaceWager) -> AppResult<Wager> {
        let now = self.clock.now();
        let bet_id = request.bet_id;

        let wager = commit(&*self.store, &self.feed, bet_id, move |ledger| {
            let PlaceWager {
                user_id,
                amount,
                selection,
                power_up,
                ..
            } = request;
            let actor = Actor::User(user_id);

            authorize(ledger.bet(), Transition::PlaceWager, &GuardContext::new(now, actor))?;
            ledger
                .bet()
                .payload
                .validate_outcome(&selection)
                .map_err(AppError::Validation)?;
            if ledger.wager_of(user_id).is_some() {
                return Err(AppError::Conflict(format!(
                    "User {} already has a wager on bet {}",
                    user_id, bet_id
                )));
            }

            let league = ledger.league();
            match league.mode {
                LeagueMode::ZeroSum => {
                    if amount == 0 {
                        return Err(AppError::Validation("Stake must be positive".to_string()));
                    }
                    if power_up.is_some() {
                        return Err(AppError::Validation(
                            "Power-ups are only available in arcade leagues".to_string(),
                        ));
                    }
                }
                LeagueMode::Standard => {
                    if amount != 0 {
                        return Err(AppError::Validation(
                            "Arcade stakes are nominal and must be 0".to_string(),
                        ));
                    }
                }
            }
            let league_id = league.id;

            let member = ledger.member(user_id).ok_or_else(|| {
                AppError::Unauthorized(format!(
                    "User {} is not a member of league {}",
                    user_id, league_id
                ))
            })?;
            if let Some(p) = power_up {
                if member.power_ups.count(p) == 0 {
                    return Err(AppError::Validation(format!(
                        "No {} power-ups left",
                        p.as_str()
                    )));
                }
            }
            let new_pool = ledger
                .bet()
                .total_pool
                .checked_add(amount)
                .ok_or_else(|| AppError::Validation("Stake overflows the pool".to_string()))?;

            let member = ledger
                .member_mut(user_id)
                .ok_or_else(|| AppError::Message(format!("Member {} vanished", user_id)))?;
            member
                .debit_stake(amount)
                .map_err(|(available, required)| AppError::InsufficientBalance {
                    available,
                    required,
                })?;
            if let Some(p) = power_up {
                member.power_ups.take(p);
            }
            member.updated_at = now;

            let bet = ledger.bet_mut();
            bet.total_pool = new_pool;
            if let (BetPayload::Choice { options }, Outcome::Choice(index)) =
                (&mut bet.payload, &selection)
            {
                if let Some(option) = options.get_mut(*index) {
                    option.total_wagered += amount;
                }
            }
            bet.updated_at = now;

            let wager = Wager::new(bet_id, user_id, amount, selection, power_up, now);
            ledger.add_wager(wager.clone());
            ledger.record(
                ActivityEntry::new(bet_id, league_id, actor, ActivityKind::WagerPlaced, now)
                    .with_details(serde_json::json!({
                        "wager_id": wager.id,
                        "amount": wager.amount,
                        "selection": wager.selection,
                        "power_up": wager.power_up,
                    })),
            );
            Ok(wager)
        })
        .await?;

        info!(
            "Wager {} placed on bet {} by {} (stake {})",
            wager.id, bet_id, wager.user_id, wager.amount
        );
        Ok(wager)
    }

    /// Current odds for display; payouts never use these rounded values
    pub async fn odds(&self, bet_id: Uuid) -> AppResult<BetOdds> {
        let bet = self.get_bet(bet_id).await?;
        let now = self.clock.now();

        let selections = match bet.payload {
            BetPayload::Choice { .. } => Vec::new(),
            _ => selection_odds(bet.total_pool, &self.store.find_wagers(bet_id).await?),
        };

        Ok(BetOdds {
            bet_id,
            status: bet.effective_status(now),
            total_pool: bet.total_pool,
            options: option_odds(&bet),
            selections,
        })
    }
}

fn validate_question(question: &str) -> AppResult<()> {
    if question.trim().is_empty() {
        return Err(AppError::Validation("Question text is required".to_string()));
    }
    Ok(())
}
