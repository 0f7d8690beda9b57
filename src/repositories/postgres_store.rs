use super::{BetLedger, Committed, LedgerStore};
use crate::error::{AppError, AppResult, RepositoryError};
use crate::models::{
    ActivityEntry, ActivityKind, Actor, ArcadePoints, Bet, BetStatus, BuyInType, LeagueMember,
    LeagueMode, LeagueSettings, PowerUp, PowerUpInventory, ResultMark, Wager, WagerStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

const BET_COLUMNS: &str = r#"
    id, league_id, creator_id, question, payload, status, total_pool, closes_at,
    event_date, winning_outcome, verification, proposed_by, proposed_at,
    dispute_deadline, dispute_active, disputed_by, vote_deadline, votes,
    auto_confirm, auto_confirm_delay_minutes, settling, resolved_at, resolved_by,
    created_at, updated_at
"#;

const WAGER_COLUMNS: &str = r#"
    id, bet_id, user_id, amount, selection, power_up, placed_at, status, payout, settled_at
"#;

const MEMBER_COLUMNS: &str = r#"
    league_id, user_id, points, total_invested, total_bought, power_ups,
    recent_results, wins, losses, pushes, updated_at
"#;

fn corrupt(field: &str, err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Corrupt(format!("{}: {}", field, err))
}

fn to_i64(value: u64, field: &str) -> Result<i64, RepositoryError> {
    i64::try_from(value).map_err(|e| corrupt(field, e))
}

fn to_u64(value: i64, field: &str) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|e| corrupt(field, e))
}

fn to_i32(value: u32, field: &str) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(|e| corrupt(field, e))
}

fn to_u32(value: i32, field: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|e| corrupt(field, e))
}

fn to_json<T: Serialize>(value: &T, field: &str) -> Result<Value, RepositoryError> {
    serde_json::to_value(value).map_err(|e| corrupt(field, e))
}

fn from_json<T: DeserializeOwned>(value: Value, field: &str) -> Result<T, RepositoryError> {
    serde_json::from_value(value).map_err(|e| corrupt(field, e))
}

#[derive(Debug, FromRow)]
struct LeagueRow {
    id: Uuid,
    name: String,
    mode: String,
    buy_in: String,
    starting_points: i64,
    arcade_points: Value,
    starter_power_ups: Value,
    dispute_window_hours: i64,
}

impl TryFrom<LeagueRow> for LeagueSettings {
    type Error = RepositoryError;

    fn try_from(row: LeagueRow) -> Result<Self, Self::Error> {
        Ok(LeagueSettings {
            id: row.id,
            name: row.name,
            mode: LeagueMode::from_str(&row.mode).map_err(|e| corrupt("mode", e))?,
            buy_in: BuyInType::from_str(&row.buy_in).map_err(|e| corrupt("buy_in", e))?,
            starting_points: to_u64(row.starting_points, "starting_points")?,
            arcade_points: from_json::<ArcadePoints>(row.arcade_points, "arcade_points")?,
            starter_power_ups: from_json::<PowerUpInventory>(row.starter_power_ups, "starter_power_ups")?,
            dispute_window_hours: row.dispute_window_hours,
        })
    }
}

#[derive(Debug, FromRow)]
struct MemberRow {
    league_id: Uuid,
    user_id: Uuid,
    points: i64,
    total_invested: i64,
    total_bought: i64,
    power_ups: Value,
    recent_results: String,
    wins: i32,
    losses: i32,
    pushes: i32,
    updated_at: DateTime<Utc>,
}

fn parse_marks(text: &str) -> Result<Vec<ResultMark>, RepositoryError> {
    text.chars()
        .map(|c| match c {
            'W' => Ok(ResultMark::W),
            'P' => Ok(ResultMark::P),
            'L' => Ok(ResultMark::L),
            other => Err(corrupt("recent_results", format!("unknown mark {:?}", other))),
        })
        .collect()
}

impl TryFrom<MemberRow> for LeagueMember {
    type Error = RepositoryError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        Ok(LeagueMember {
            league_id: row.league_id,
            user_id: row.user_id,
            points: to_u64(row.points, "points")?,
            total_invested: to_u64(row.total_invested, "total_invested")?,
            total_bought: to_u64(row.total_bought, "total_bought")?,
            power_ups: from_json(row.power_ups, "power_ups")?,
            recent_results: parse_marks(&row.recent_results)?,
            wins: to_u32(row.wins, "wins")?,
            losses: to_u32(row.losses, "losses")?,
            pushes: to_u32(row.pushes, "pushes")?,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct BetRow {
    id: Uuid,
    league_id: Uuid,
    creator_id: Uuid,
    question: String,
    payload: Value,
    status: String,
    total_pool: i64,
    closes_at: Option<DateTime<Utc>>,
    event_date: DateTime<Utc>,
    winning_outcome: Option<Value>,
    verification: Option<Value>,
    proposed_by: Option<String>,
    proposed_at: Option<DateTime<Utc>>,
    dispute_deadline: Option<DateTime<Utc>>,
    dispute_active: bool,
    disputed_by: Value,
    vote_deadline: Option<DateTime<Utc>>,
    votes: Value,
    auto_confirm: bool,
    auto_confirm_delay_minutes: i64,
    settling: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_actor(label: Option<String>, field: &str) -> Result<Option<Actor>, RepositoryError> {
    label
        .map(|l| Actor::from_label(&l).map_err(|e| corrupt(field, e)))
        .transpose()
}

fn parse_status(text: &str, field: &str) -> Result<BetStatus, RepositoryError> {
    BetStatus::from_str(text).map_err(|e| corrupt(field, e))
}

impl TryFrom<BetRow> for Bet {
    type Error = RepositoryError;

    fn try_from(row: BetRow) -> Result<Self, Self::Error> {
        Ok(Bet {
            id: row.id,
            league_id: row.league_id,
            creator_id: row.creator_id,
            question: row.question,
            payload: from_json(row.payload, "payload")?,
            status: parse_status(&row.status, "status")?,
            total_pool: to_u64(row.total_pool, "total_pool")?,
            closes_at: row.closes_at,
            event_date: row.event_date,
            winning_outcome: row
                .winning_outcome
                .map(|v| from_json(v, "winning_outcome"))
                .transpose()?,
            verification: row
                .verification
                .map(|v| from_json(v, "verification"))
                .transpose()?,
            proposed_by: parse_actor(row.proposed_by, "proposed_by")?,
            proposed_at: row.proposed_at,
            dispute_deadline: row.dispute_deadline,
            dispute_active: row.dispute_active,
            disputed_by: from_json(row.disputed_by, "disputed_by")?,
            vote_deadline: row.vote_deadline,
            votes: from_json(row.votes, "votes")?,
            auto_confirm: row.auto_confirm,
            auto_confirm_delay_minutes: row.auto_confirm_delay_minutes,
            settling: row
                .settling
                .map(|s| parse_status(&s, "settling"))
                .transpose()?,
            resolved_at: row.resolved_at,
            resolved_by: parse_actor(row.resolved_by, "resolved_by")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct WagerRow {
    id: Uuid,
    bet_id: Uuid,
    user_id: Uuid,
    amount: i64,
    selection: Value,
    power_up: Option<String>,
    placed_at: DateTime<Utc>,
    status: String,
    payout: i64,
    settled_at: Option<DateTime<Utc>>,
}

impl TryFrom<WagerRow> for Wager {
    type Error = RepositoryError;

    fn try_from(row: WagerRow) -> Result<Self, Self::Error> {
        Ok(Wager {
            id: row.id,
            bet_id: row.bet_id,
            user_id: row.user_id,
            amount: to_u64(row.amount, "amount")?,
            selection: from_json(row.selection, "selection")?,
            power_up: row
                .power_up
                .map(|p| PowerUp::from_str(&p).map_err(|e| corrupt("power_up", e)))
                .transpose()?,
            placed_at: row.placed_at,
            status: WagerStatus::from_str(&row.status).map_err(|e| corrupt("status", e))?,
            payout: to_u64(row.payout, "payout")?,
            settled_at: row.settled_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ActivityRow {
    id: Uuid,
    bet_id: Uuid,
    league_id: Uuid,
    actor: String,
    kind: String,
    from_status: Option<String>,
    to_status: Option<String>,
    details: Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for ActivityEntry {
    type Error = RepositoryError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        Ok(ActivityEntry {
            id: row.id,
            bet_id: row.bet_id,
            league_id: row.league_id,
            actor: Actor::from_label(&row.actor).map_err(|e| corrupt("actor", e))?,
            kind: ActivityKind::from_str(&row.kind).map_err(|e| corrupt("kind", e))?,
            from_status: row
                .from_status
                .map(|s| parse_status(&s, "from_status"))
                .transpose()?,
            to_status: row
                .to_status
                .map(|s| parse_status(&s, "to_status"))
                .transpose()?,
            details: row.details,
            created_at: row.created_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, RepositoryError>
where
    T: TryFrom<R, Error = RepositoryError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Postgres-backed store. Each `transact` is one SQL transaction holding
/// row locks on the bet, its wagers and the league's members.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn write_bet(tx: &mut Transaction<'_, Postgres>, bet: &Bet) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE bets SET
                question = $2, payload = $3, status = $4, total_pool = $5, closes_at = $6,
                winning_outcome = $7, verification = $8, proposed_by = $9, proposed_at = $10,
                dispute_deadline = $11, dispute_active = $12, disputed_by = $13,
                vote_deadline = $14, votes = $15, settling = $16, resolved_at = $17,
                resolved_by = $18, updated_at = $19, auto_confirm = $20
            WHERE id = $1
            "#,
        )
        .bind(bet.id)
        .bind(&bet.question)
        .bind(to_json(&bet.payload, "payload")?)
        .bind(bet.status.as_str())
        .bind(to_i64(bet.total_pool, "total_pool")?)
        .bind(bet.closes_at)
        .bind(bet.winning_outcome.as_ref().map(|o| to_json(o, "winning_outcome")).transpose()?)
        .bind(bet.verification.as_ref().map(|v| to_json(v, "verification")).transpose()?)
        .bind(bet.proposed_by.map(|a| a.label()))
        .bind(bet.proposed_at)
        .bind(bet.dispute_deadline)
        .bind(bet.dispute_active)
        .bind(to_json(&bet.disputed_by, "disputed_by")?)
        .bind(bet.vote_deadline)
        .bind(to_json(&bet.votes, "votes")?)
        .bind(bet.settling.map(|s| s.as_str()))
        .bind(bet.resolved_at)
        .bind(bet.resolved_by.map(|a| a.label()))
        .bind(bet.updated_at)
        .bind(bet.auto_confirm)
        .execute(&mut *tx)
        .await?;
        Ok(())
    }

    async fn write_wager(tx: &mut Transaction<'_, Postgres>, wager: &Wager) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO wagers (id, bet_id, user_id, amount, selection, power_up, placed_at, status, payout, settled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                payout = EXCLUDED.payout,
                settled_at = EXCLUDED.settled_at
            "#,
        )
        .bind(wager.id)
        .bind(wager.bet_id)
        .bind(wager.user_id)
        .bind(to_i64(wager.amount, "amount")?)
        .bind(to_json(&wager.selection, "selection")?)
        .bind(wager.power_up.map(|p| p.as_str()))
        .bind(wager.placed_at)
        .bind(wager.status.as_str())
        .bind(to_i64(wager.payout, "payout")?)
        .bind(wager.settled_at)
        .execute(&mut *tx)
        .await?;
        Ok(())
    }

    async fn write_member<'e, E>(executor: E, member: &LeagueMember) -> Result<(), RepositoryError>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let marks: String = member.recent_results.iter().map(ResultMark::as_char).collect();
        sqlx::query(
            r#"
            INSERT INTO league_members
                (league_id, user_id, points, total_invested, total_bought, power_ups,
                 recent_results, wins, losses, pushes, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (league_id, user_id) DO UPDATE SET
                points = EXCLUDED.points,
                total_invested = EXCLUDED.total_invested,
                total_bought = EXCLUDED.total_bought,
                power_ups = EXCLUDED.power_ups,
                recent_results = EXCLUDED.recent_results,
                wins = EXCLUDED.wins,
                losses = EXCLUDED.losses,
                pushes = EXCLUDED.pushes,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(member.league_id)
        .bind(member.user_id)
        .bind(to_i64(member.points, "points")?)
        .bind(to_i64(member.total_invested, "total_invested")?)
        .bind(to_i64(member.total_bought, "total_bought")?)
        .bind(to_json(&member.power_ups, "power_ups")?)
        .bind(marks)
        .bind(to_i32(member.wins, "wins")?)
        .bind(to_i32(member.losses, "losses")?)
        .bind(to_i32(member.pushes, "pushes")?)
        .bind(member.updated_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn write_activity(
        tx: &mut Transaction<'_, Postgres>,
        entry: &ActivityEntry,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO bet_activity (id, bet_id, league_id, actor, kind, from_status, to_status, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.bet_id)
        .bind(entry.league_id)
        .bind(entry.actor.label())
        .bind(entry.kind.as_str())
        .bind(entry.from_status.map(|s| s.as_str()))
        .bind(entry.to_status.map(|s| s.as_str()))
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;
        Ok(())
    }

    async fn load_ledger(
        tx: &mut Transaction<'_, Postgres>,
        bet_id: Uuid,
    ) -> Result<BetLedger, RepositoryError> {
        let bet: Bet = sqlx::query_as::<_, BetRow>(&format!(
            "SELECT {} FROM bets WHERE id = $1 FOR UPDATE",
            BET_COLUMNS
        ))
        .bind(bet_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Bet {} not found", bet_id)))?
        .try_into()?;

        let league: LeagueSettings = sqlx::query_as::<_, LeagueRow>(
            r#"
            SELECT id, name, mode, buy_in, starting_points, arcade_points, starter_power_ups, dispute_window_hours
            FROM leagues
            WHERE id = $1
            "#,
        )
        .bind(bet.league_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("League {} not found", bet.league_id)))?
        .try_into()?;

        let wagers = sqlx::query_as::<_, WagerRow>(&format!(
            "SELECT {} FROM wagers WHERE bet_id = $1 ORDER BY placed_at, id FOR UPDATE",
            WAGER_COLUMNS
        ))
        .bind(bet_id)
        .fetch_all(&mut *tx)
        .await?;

        // fixed lock order across concurrent transactions in the same league
        let members = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {} FROM league_members WHERE league_id = $1 ORDER BY user_id FOR UPDATE",
            MEMBER_COLUMNS
        ))
        .bind(league.id)
        .fetch_all(&mut *tx)
        .await?;

        Ok(BetLedger::new(
            league,
            bet,
            convert_all(wagers)?,
            convert_all::<_, LeagueMember>(members)?,
        ))
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert_league(&self, league: &LeagueSettings) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO leagues (id, name, mode, buy_in, starting_points, arcade_points, starter_power_ups, dispute_window_hours)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(league.id)
        .bind(&league.name)
        .bind(league.mode.as_str())
        .bind(league.buy_in.as_str())
        .bind(to_i64(league.starting_points, "starting_points")?)
        .bind(to_json(&league.arcade_points, "arcade_points")?)
        .bind(to_json(&league.starter_power_ups, "starter_power_ups")?)
        .bind(league.dispute_window_hours)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn find_league(&self, league_id: Uuid) -> AppResult<Option<LeagueSettings>> {
        let row = sqlx::query_as::<_, LeagueRow>(
            r#"
            SELECT id, name, mode, buy_in, starting_points, arcade_points, starter_power_ups, dispute_window_hours
            FROM leagues
            WHERE id = $1
            "#,
        )
        .bind(league_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(row.map(LeagueSettings::try_from).transpose()?)
    }

    async fn upsert_member(&self, member: &LeagueMember) -> AppResult<()> {
        Self::write_member(&self.pool, member).await?;
        Ok(())
    }

    async fn find_member(&self, league_id: Uuid, user_id: Uuid) -> AppResult<Option<LeagueMember>> {
        let row = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {} FROM league_members WHERE league_id = $1 AND user_id = $2",
            MEMBER_COLUMNS
        ))
        .bind(league_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(row.map(LeagueMember::try_from).transpose()?)
    }

    async fn insert_bet(&self, bet: &Bet) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bets (id, league_id, creator_id, question, kind, payload, status, total_pool,
                              event_date, disputed_by, votes, auto_confirm, auto_confirm_delay_minutes,
                              created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(bet.id)
        .bind(bet.league_id)
        .bind(bet.creator_id)
        .bind(&bet.question)
        .bind(bet.kind().as_str())
        .bind(to_json(&bet.payload, "payload")?)
        .bind(bet.status.as_str())
        .bind(to_i64(bet.total_pool, "total_pool")?)
        .bind(bet.event_date)
        .bind(to_json(&bet.disputed_by, "disputed_by")?)
        .bind(to_json(&bet.votes, "votes")?)
        .bind(bet.auto_confirm)
        .bind(bet.auto_confirm_delay_minutes)
        .bind(bet.created_at)
        .bind(bet.updated_at)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn find_bet(&self, bet_id: Uuid) -> AppResult<Option<Bet>> {
        let row = sqlx::query_as::<_, BetRow>(&format!("SELECT {} FROM bets WHERE id = $1", BET_COLUMNS))
            .bind(bet_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(row.map(Bet::try_from).transpose()?)
    }

    async fn find_bets_by_status(&self, statuses: &[BetStatus]) -> AppResult<Vec<Bet>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, BetRow>(&format!(
            "SELECT {} FROM bets WHERE status = ANY($1) ORDER BY created_at, id",
            BET_COLUMNS
        ))
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(convert_all(rows)?)
    }

    async fn find_wagers(&self, bet_id: Uuid) -> AppResult<Vec<Wager>> {
        let rows = sqlx::query_as::<_, WagerRow>(&format!(
            "SELECT {} FROM wagers WHERE bet_id = $1 ORDER BY placed_at, id",
            WAGER_COLUMNS
        ))
        .bind(bet_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(convert_all(rows)?)
    }

    async fn find_activity(&self, bet_id: Uuid) -> AppResult<Vec<ActivityEntry>> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, bet_id, league_id, actor, kind, from_status, to_status, details, created_at
            FROM bet_activity
            WHERE bet_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(bet_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(convert_all(rows)?)
    }

    async fn transact<T, F>(&self, bet_id: Uuid, f: F) -> AppResult<Committed<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut BetLedger) -> AppResult<T> + Send + 'static,
    {
        let mut tx = self.pool.begin().await?;
        let mut ledger = Self::load_ledger(&mut tx, bet_id).await?;

        // dropping `tx` on error rolls back
        let value = f(&mut ledger)?;

        let changes = ledger.into_changes();
        if let Some(bet) = &changes.bet {
            Self::write_bet(&mut tx, bet).await?;
        }
        for wager in &changes.wagers {
            Self::write_wager(&mut tx, wager).await?;
        }
        for member in &changes.members {
            Self::write_member(&mut tx, member).await?;
        }
        for entry in &changes.activity {
            Self::write_activity(&mut tx, entry).await?;
        }

        tx.commit().await.map_err(|e| {
            AppError::Store(format!("Commit of bet {} failed: {}", bet_id, e))
        })?;

        debug!(
            "Committed bet {}: {} wagers, {} members",
            bet_id,
            changes.wagers.len(),
            changes.members.len()
        );

        Ok(Committed {
            value,
            activity: changes.activity,
        })
    }
}
