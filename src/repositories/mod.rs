pub mod ledger;
pub mod memory_store;
pub mod postgres_store;

pub use ledger::{BetLedger, LedgerChanges};
pub use memory_store::MemoryStore;
pub use postgres_store::PgStore;

use crate::error::AppResult;
use crate::models::{ActivityEntry, Bet, BetStatus, LeagueMember, LeagueSettings, Wager};
use async_trait::async_trait;
use uuid::Uuid;

/// Value returned by a committed transaction, with the activity it recorded
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    pub activity: Vec<ActivityEntry>,
}

/// Persistent store with atomic read-modify-write over one bet.
///
/// League and member records are owned by league management; the engine
/// only inserts them for fixtures and reads them inside transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    async fn insert_league(&self, league: &LeagueSettings) -> AppResult<()>;

    async fn find_league(&self, league_id: Uuid) -> AppResult<Option<LeagueSettings>>;

    async fn upsert_member(&self, member: &LeagueMember) -> AppResult<()>;

    async fn find_member(&self, league_id: Uuid, user_id: Uuid) -> AppResult<Option<LeagueMember>>;

    /// Store a new bet; used for drafts, which carry no activity
    async fn insert_bet(&self, bet: &Bet) -> AppResult<()>;

    async fn find_bet(&self, bet_id: Uuid) -> AppResult<Option<Bet>>;

    /// Bets whose stored status is one of `statuses`
    async fn find_bets_by_status(&self, statuses: &[BetStatus]) -> AppResult<Vec<Bet>>;

    async fn find_wagers(&self, bet_id: Uuid) -> AppResult<Vec<Wager>>;

    /// Activity of one bet, oldest first
    async fn find_activity(&self, bet_id: Uuid) -> AppResult<Vec<ActivityEntry>>;

    /// Most records a single transaction may write, if the store has a limit
    fn write_limit(&self) -> Option<usize> {
        None
    }

    /// Load the bet's ledger, run `f`, and commit every change it made
    /// atomically. When `f` fails nothing is written.
    async fn transact<T, F>(&self, bet_id: Uuid, f: F) -> AppResult<Committed<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut BetLedger) -> AppResult<T> + Send + 'static;
}
