pub mod audit;
pub mod betting_service;
pub mod dispute;
pub mod finalizer;
pub mod oracle;
pub mod settlement;

pub use audit::{ActivityFeed, ActivitySink, AuditTrailService};
pub use betting_service::{BetOdds, BettingService, PlaceWager};
pub use dispute::{tally, DisputeDecision, DisputeService, VoteReceipt, VoteTally};
pub use finalizer::{AutoFinalizer, SweepFailure, SweepReport, SweepStage};
pub use oracle::{HttpOracle, NoOracle, OracleAnswer, OracleQuery, ResultOracle};
pub use settlement::{ResolutionReport, SettlementService};

use crate::error::AppResult;
use crate::repositories::{BetLedger, LedgerStore};
use uuid::Uuid;

/// Run one store transaction and hand its activity to the feed once committed
pub(crate) async fn commit<S, T, F>(
    store: &S,
    feed: &ActivityFeed,
    bet_id: Uuid,
    f: F,
) -> AppResult<T>
where
    S: LedgerStore,
    T: Send + 'static,
    F: FnOnce(&mut BetLedger) -> AppResult<T> + Send + 'static,
{
    let committed = store.transact(bet_id, f).await?;
    feed.publish_all(&committed.activity).await;
    Ok(committed.value)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{ActivityFeed, BettingService, PlaceWager};
    use crate::clock::{Clock, ManualClock};
    use crate::models::{
        Actor, Bet, BetOption, BetPayload, LeagueMember, LeagueMode, LeagueSettings, NewBet,
        Outcome, Wager,
    };
    use crate::repositories::{LedgerStore, MemoryStore};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    /// A league with a creator and a few funded members over a memory store
    pub struct Fixture {
        pub store: Arc<MemoryStore>,
        pub clock: Arc<ManualClock>,
        pub league: LeagueSettings,
        pub creator: Uuid,
        pub members: Vec<Uuid>,
    }

    impl Fixture {
        pub async fn new(mode: LeagueMode, member_count: usize) -> Self {
            let store = Arc::new(MemoryStore::new());
            let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));
            let league = LeagueSettings::new("Sunday League", mode);
            store.insert_league(&league).await.unwrap();

            let now = clock.now();
            let creator = Uuid::new_v4();
            store
                .upsert_member(&LeagueMember::join(&league, creator, now))
                .await
                .unwrap();
            let mut members = Vec::new();
            for _ in 0..member_count {
                let user = Uuid::new_v4();
                store
                    .upsert_member(&LeagueMember::join(&league, user, now))
                    .await
                    .unwrap();
                members.push(user);
            }

            Self {
                store,
                clock,
                league,
                creator,
                members,
            }
        }

        pub fn betting(&self) -> BettingService<MemoryStore> {
            BettingService::new(
                self.store.clone(),
                self.clock.clone(),
                ActivityFeed::new(),
                Duration::minutes(15),
            )
        }

        pub fn new_bet(&self, payload: BetPayload) -> NewBet {
            NewBet {
                league_id: self.league.id,
                creator_id: self.creator,
                question: "Who wins the derby?".into(),
                payload,
                event_date: self.clock.now() + Duration::hours(2),
                auto_confirm: false,
                auto_confirm_delay_minutes: 0,
            }
        }

        /// Draft and publish a two-option CHOICE bet
        pub async fn open_choice_bet(&self) -> Bet {
            let betting = self.betting();
            let payload = BetPayload::Choice {
                options: vec![BetOption::new("Home"), BetOption::new("Away")],
            };
            let draft = betting.create_bet(self.new_bet(payload)).await.unwrap();
            betting.publish(draft.id, Actor::User(self.creator)).await.unwrap()
        }

        pub async fn wager(&self, bet_id: Uuid, user_id: Uuid, amount: u64, selection: Outcome) -> Wager {
            self.betting()
                .place_wager(PlaceWager {
                    bet_id,
                    user_id,
                    amount,
                    selection,
                    power_up: None,
                })
                .await
                .unwrap()
        }

        /// Move the clock past betting close
        pub fn lock(&self) {
            self.clock.advance(Duration::hours(2));
        }

        pub async fn member(&self, user_id: Uuid) -> LeagueMember {
            self.store
                .find_member(self.league.id, user_id)
                .await
                .unwrap()
                .unwrap()
        }
    }
}
