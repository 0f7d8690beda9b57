//! Postgres store tests. Run with a reachable DATABASE_URL:
//! `cargo test --test database_test -- --ignored`

mod helpers;

use chrono::{Duration, Utc};
use helpers::*;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tipster_backend::clock::ManualClock;
use tipster_backend::models::*;
use tipster_backend::repositories::*;
use tipster_backend::services::{ActivityFeed, NoOracle};
use tipster_backend::{AppError, Engine, EngineConfig};
use uuid::Uuid;

async fn seed(store: &PgStore) -> (LeagueSettings, LeagueMember, Bet) {
    let now = Utc::now();
    let mut league = LeagueSettings::new("Sunday league", LeagueMode::ZeroSum);
    league.starter_power_ups = PowerUpInventory { x2: 1, x3: 0, x4: 0 };
    let creator = LeagueMember::join(&league, Uuid::new_v4(), now);
    let bet = Bet::draft(
        NewBet {
            league_id: league.id,
            creator_id: creator.user_id,
            question: "Final score?".into(),
            payload: BetPayload::Match {
                home_team: "Rovers".into(),
                away_team: "United".into(),
            },
            event_date: now + Duration::days(1),
            auto_confirm: true,
            auto_confirm_delay_minutes: 120,
        },
        now,
    );

    store.insert_league(&league).await.unwrap();
    store.upsert_member(&creator).await.unwrap();
    store.insert_bet(&bet).await.unwrap();
    (league, creator, bet)
}

// ============================================================================
// Migration Tests
// ============================================================================

#[sqlx::test]
#[ignore = "requires Postgres"]
async fn test_migrations_ran(pool: PgPool) {
    for table in ["leagues", "league_members", "bets", "wagers", "bet_activity"] {
        let exists: bool = sqlx::query(
            "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap()
        .get(0);
        assert!(exists, "Table {} should exist", table);
    }
}

// ============================================================================
// Store Round Trips
// ============================================================================

#[sqlx::test]
#[ignore = "requires Postgres"]
async fn test_league_member_and_bet_round_trip(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let (league, creator, bet) = seed(&db.store).await;

    assert_eq!(db.store.find_league(league.id).await.unwrap(), Some(league.clone()));
    let member = db.store.find_member(league.id, creator.user_id).await.unwrap().unwrap();
    assert_eq!(member.points, 1000);
    assert_eq!(member.power_ups.x2, 1);

    let loaded = db.store.find_bet(bet.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, bet.id);
    assert_eq!(loaded.status, BetStatus::Draft);
    assert_eq!(loaded.payload, bet.payload);
    assert_eq!(loaded.auto_confirm_delay_minutes, 120);

    assert!(db.store.find_bet(Uuid::new_v4()).await.unwrap().is_none());
    let drafts = db.store.find_bets_by_status(&[BetStatus::Draft]).await.unwrap();
    assert!(drafts.iter().any(|b| b.id == bet.id));
}

#[sqlx::test]
#[ignore = "requires Postgres"]
async fn test_duplicate_league_is_conflict(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let (league, _, _) = seed(&db.store).await;

    let err = db.store.insert_league(&league).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {:?}", err);
}

#[sqlx::test]
#[ignore = "requires Postgres"]
async fn test_transact_writes_everything_or_nothing(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let (league, creator, bet) = seed(&db.store).await;
    let user = creator.user_id;
    let now = Utc::now();

    let failed = db
        .store
        .transact(bet.id, move |ledger| {
            ledger.bet_mut().status = BetStatus::Open;
            ledger.member_mut(user).unwrap().points = 0;
            Err::<(), _>(AppError::InvalidState("abort".into()))
        })
        .await;
    assert!(failed.is_err());
    assert_eq!(db.store.find_bet(bet.id).await.unwrap().unwrap().status, BetStatus::Draft);

    let committed = db
        .store
        .transact(bet.id, move |ledger| {
            ledger.bet_mut().status = BetStatus::Open;
            ledger.bet_mut().total_pool = 250;
            ledger.member_mut(user).unwrap().points -= 250;
            ledger.add_wager(Wager::new(
                bet.id,
                user,
                250,
                Outcome::Match(Score::new(2, 1)),
                None,
                now,
            ));
            ledger.record(ActivityEntry::new(
                bet.id,
                league.id,
                Actor::User(user),
                ActivityKind::WagerPlaced,
                now,
            ));
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(committed.activity.len(), 1);

    let wagers = db.store.find_wagers(bet.id).await.unwrap();
    assert_eq!(wagers.len(), 1);
    assert_eq!(wagers[0].selection, Outcome::Match(Score::new(2, 1)));
    assert_eq!(wagers[0].status, WagerStatus::Pending);
    assert_eq!(db.store.find_member(league.id, user).await.unwrap().unwrap().points, 750);
    assert_eq!(db.store.find_activity(bet.id).await.unwrap()[0].kind, ActivityKind::WagerPlaced);
}

// ============================================================================
// Engine over Postgres
// ============================================================================

#[sqlx::test]
#[ignore = "requires Postgres"]
async fn test_engine_settles_against_postgres(pool: PgPool) {
    let db = TestDatabase::from_pool(pool).await;
    let store = Arc::new(db.store.clone());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = Engine::new(
        store.clone(),
        clock.clone(),
        Arc::new(NoOracle),
        ActivityFeed::new(),
        &EngineConfig::default(),
    );

    let league = LeagueSettings::new("Pg league", LeagueMode::ZeroSum);
    store.insert_league(&league).await.unwrap();
    let mut users = Vec::new();
    for _ in 0..3 {
        let member = LeagueMember::join(&league, Uuid::new_v4(), Utc::now());
        store.upsert_member(&member).await.unwrap();
        users.push(member.user_id);
    }
    let creator = Actor::User(users[0]);

    let draft = engine
        .betting
        .create_bet(NewBet {
            league_id: league.id,
            creator_id: users[0],
            question: "Who wins?".into(),
            payload: BetPayload::Choice {
                options: vec![BetOption::new("Home"), BetOption::new("Away")],
            },
            event_date: Utc::now() + Duration::hours(1),
            auto_confirm: false,
            auto_confirm_delay_minutes: 0,
        })
        .await
        .unwrap();
    let bet = engine.betting.publish(draft.id, creator).await.unwrap();

    for (user, amount, option) in [(users[0], 100, 0), (users[1], 200, 0), (users[2], 700, 1)] {
        engine
            .betting
            .place_wager(tipster_backend::services::PlaceWager {
                bet_id: bet.id,
                user_id: user,
                amount,
                selection: Outcome::Choice(option),
                power_up: None,
            })
            .await
            .unwrap();
    }

    clock.advance(Duration::hours(2));
    engine
        .settlement
        .propose_result(bet.id, creator, Outcome::Choice(0), None)
        .await
        .unwrap();
    clock.advance(league.dispute_window());
    let report = engine.settlement.finalize(bet.id, creator).await.unwrap();

    assert_eq!(report.total_paid, 999);
    let resolved = store.find_bet(bet.id).await.unwrap().unwrap();
    assert_eq!(resolved.status, BetStatus::Resolved);
    assert_eq!(resolved.settling, None);
    assert_eq!(store.find_member(league.id, users[1]).await.unwrap().unwrap().points, 800 + 666);

    let kinds: Vec<ActivityKind> = store
        .find_activity(bet.id)
        .await
        .unwrap()
        .iter()
        .map(|a| a.kind)
        .collect();
    assert_eq!(kinds.first(), Some(&ActivityKind::BetPublished));
    assert_eq!(kinds.last(), Some(&ActivityKind::BetResolved));
}
