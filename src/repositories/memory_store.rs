use super::{BetLedger, Committed, LedgerStore};
use crate::error::{AppError, AppResult};
use crate::models::{ActivityEntry, Bet, BetStatus, LeagueMember, LeagueSettings, Wager};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    leagues: HashMap<Uuid, LeagueSettings>,
    members: HashMap<(Uuid, Uuid), LeagueMember>,
    bets: HashMap<Uuid, Bet>,
    wagers: HashMap<Uuid, Vec<Wager>>,
    activity: Vec<ActivityEntry>,
}

/// In-process store; every transaction runs under one lock, so they are
/// serializable. Foreign keys are not enforced.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    write_limit: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any transaction writing more than `limit` records
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Every committed activity entry, oldest first
    pub async fn all_activity(&self) -> Vec<ActivityEntry> {
        self.state.lock().await.activity.clone()
    }

    /// Members of one league
    pub async fn league_members(&self, league_id: Uuid) -> Vec<LeagueMember> {
        let state = self.state.lock().await;
        let mut members: Vec<LeagueMember> = state
            .members
            .values()
            .filter(|m| m.league_id == league_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.user_id);
        members
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_league(&self, league: &LeagueSettings) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.leagues.contains_key(&league.id) {
            return Err(AppError::Conflict(format!("League {} already exists", league.id)));
        }
        state.leagues.insert(league.id, league.clone());
        Ok(())
    }

    async fn find_league(&self, league_id: Uuid) -> AppResult<Option<LeagueSettings>> {
        Ok(self.state.lock().await.leagues.get(&league_id).cloned())
    }

    async fn upsert_member(&self, member: &LeagueMember) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state
            .members
            .insert((member.league_id, member.user_id), member.clone());
        Ok(())
    }

    async fn find_member(&self, league_id: Uuid, user_id: Uuid) -> AppResult<Option<LeagueMember>> {
        Ok(self
            .state
            .lock()
            .await
            .members
            .get(&(league_id, user_id))
            .cloned())
    }

    async fn insert_bet(&self, bet: &Bet) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.bets.contains_key(&bet.id) {
            return Err(AppError::Conflict(format!("Bet {} already exists", bet.id)));
        }
        state.bets.insert(bet.id, bet.clone());
        Ok(())
    }

    async fn find_bet(&self, bet_id: Uuid) -> AppResult<Option<Bet>> {
        Ok(self.state.lock().await.bets.get(&bet_id).cloned())
    }

    async fn find_bets_by_status(&self, statuses: &[BetStatus]) -> AppResult<Vec<Bet>> {
        let state = self.state.lock().await;
        let mut bets: Vec<Bet> = state
            .bets
            .values()
            .filter(|b| statuses.contains(&b.status))
            .cloned()
            .collect();
        bets.sort_by_key(|b| (b.created_at, b.id));
        Ok(bets)
    }

    async fn find_wagers(&self, bet_id: Uuid) -> AppResult<Vec<Wager>> {
        Ok(self
            .state
            .lock()
            .await
            .wagers
            .get(&bet_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_activity(&self, bet_id: Uuid) -> AppResult<Vec<ActivityEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .activity
            .iter()
            .filter(|a| a.bet_id == bet_id)
            .cloned()
            .collect())
    }

    fn write_limit(&self) -> Option<usize> {
        self.write_limit
    }

    async fn transact<T, F>(&self, bet_id: Uuid, f: F) -> AppResult<Committed<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut BetLedger) -> AppResult<T> + Send + 'static,
    {
        let mut state = self.state.lock().await;

        let bet = state
            .bets
            .get(&bet_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Bet {} not found", bet_id)))?;
        let league = state
            .leagues
            .get(&bet.league_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("League {} not found", bet.league_id)))?;
        let wagers = state.wagers.get(&bet_id).cloned().unwrap_or_default();
        let members: Vec<LeagueMember> = state
            .members
            .values()
            .filter(|m| m.league_id == league.id)
            .cloned()
            .collect();

        let mut ledger = BetLedger::new(league, bet, wagers, members);
        let value = f(&mut ledger)?;

        if let Some(limit) = self.write_limit {
            if ledger.write_count() > limit {
                return Err(AppError::Store(format!(
                    "Transaction on bet {} writes {} records, limit is {}",
                    bet_id,
                    ledger.write_count(),
                    limit
                )));
            }
        }

        let changes = ledger.into_changes();
        debug!(
            "Committing bet {}: {} wagers, {} members, {} activity entries",
            bet_id,
            changes.wagers.len(),
            changes.members.len(),
            changes.activity.len()
        );

        if let Some(bet) = changes.bet {
            state.bets.insert(bet.id, bet);
        }
        let stored = state.wagers.entry(bet_id).or_default();
        for wager in changes.wagers {
            match stored.iter_mut().find(|w| w.id == wager.id) {
                Some(existing) => *existing = wager,
                None => stored.push(wager),
            }
        }
        for member in changes.members {
            state
                .members
                .insert((member.league_id, member.user_id), member);
        }
        state.activity.extend(changes.activity.iter().cloned());

        Ok(Committed {
            value,
            activity: changes.activity,
        })
    }
}
