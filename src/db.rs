use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{NewSession, Session, WeeklyAvailability};
use crate::seed;
use crate::store::SessionStore;

const SESSION_QUERY: &str = "SELECT s.id, s.title, s.game, s.host_id, s.host_name, \
     s.location, s.start_time, s.end_time, s.min_players, s.max_players, s.current_players \
     FROM tabletop_matcher.sessions s";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_player(
    pool: &PgPool,
    id: Uuid,
    display_name: &str,
    email: &str,
) -> anyhow::Result<Uuid> {
    let player_id: Uuid = sqlx::query(
        r#"
        INSERT INTO tabletop_matcher.players (id, display_name, email)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE
        SET display_name = EXCLUDED.display_name
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(display_name)
    .bind(email)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(player_id)
}

/// Inserts a session keyed by `source_key`, adding the host as its first
/// participant. Returns false when the key was already imported.
async fn insert_keyed_session(
    pool: &PgPool,
    host_id: Uuid,
    session: &NewSession,
    source_key: &str,
) -> anyhow::Result<bool> {
    let mut tx = pool.begin().await?;
    let session_id = Uuid::new_v4();

    let result = sqlx::query(
        r#"
        INSERT INTO tabletop_matcher.sessions
        (id, title, game, host_id, host_name, location, start_time, end_time,
         min_players, max_players, current_players, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 1, $11)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(session_id)
    .bind(&session.title)
    .bind(&session.game)
    .bind(host_id)
    .bind(&session.host_name)
    .bind(&session.location)
    .bind(session.start_time)
    .bind(session.end_time)
    .bind(session.min_players)
    .bind(session.max_players)
    .bind(source_key)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query(
        "INSERT INTO tabletop_matcher.session_participants (session_id, player_id) VALUES ($1, $2)",
    )
    .bind(session_id)
    .bind(host_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let store = PgStore::new(pool.clone());

    for player in seed::PLAYERS.iter() {
        upsert_player(pool, player.uuid()?, player.display_name, player.email).await?;
        store.upsert_availability(&player.availability()?).await?;
    }

    for entry in seed::sessions(Utc::now())? {
        let host_id: Uuid =
            sqlx::query("SELECT id FROM tabletop_matcher.players WHERE email = $1")
                .bind(entry.host_email)
                .fetch_one(pool)
                .await?
                .get("id");

        let inserted = insert_keyed_session(pool, host_id, &entry.session, entry.source_key).await?;
        debug!(source_key = entry.source_key, inserted, "seed session");
    }

    Ok(())
}

#[derive(Debug, serde::Deserialize)]
pub struct CsvRow {
    pub title: String,
    pub game: String,
    pub host_name: String,
    pub host_email: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub min_players: i32,
    pub max_players: i32,
    pub source_key: Option<String>,
}

impl CsvRow {
    /// The row's `source_key`, or a key derived from host, start and title so
    /// re-importing the same file does not duplicate sessions.
    pub fn import_key(&self) -> String {
        match self.source_key.as_deref() {
            Some(key) => key.to_string(),
            None => {
                let name = format!(
                    "{}|{}|{}",
                    self.host_email.trim().to_lowercase(),
                    self.start_time.to_rfc3339(),
                    self.title.trim()
                );
                format!("import-{}", Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
            }
        }
    }

    fn to_new_session(&self, host_id: Uuid) -> NewSession {
        NewSession {
            title: self.title.clone(),
            game: self.game.clone(),
            host_id,
            host_name: self.host_name.clone(),
            location: self.location.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            min_players: self.min_players,
            max_players: self.max_players,
        }
    }
}

/// Reads and validates every row before anything touches the database.
pub fn read_csv_rows<R: std::io::Read>(reader: R) -> anyhow::Result<Vec<CsvRow>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed CSV row at line {line}"))?;
        row.to_new_session(Uuid::nil())
            .validate()
            .map_err(|reason| anyhow::anyhow!("invalid session at line {line}: {reason}"))?;
        rows.push(row);
    }

    Ok(rows)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = read_csv_rows(file)?;
    let mut inserted = 0usize;

    for row in rows {
        let host_id = upsert_player(pool, Uuid::new_v4(), &row.host_name, &row.host_email).await?;

        if insert_keyed_session(pool, host_id, &row.to_new_session(host_id), &row.import_key()).await? {
            inserted += 1;
        }
    }

    info!(inserted, path = %csv_path.display(), "imported sessions");
    Ok(inserted)
}

fn session_from_row(row: &PgRow) -> Session {
    Session {
        id: row.get("id"),
        title: row.get("title"),
        game: row.get("game"),
        host_id: row.get("host_id"),
        host_name: row.get("host_name"),
        location: row.get("location"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        min_players: row.get("min_players"),
        max_players: row.get("max_players"),
        current_players: row.get("current_players"),
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_session(&self, session_id: Uuid) -> Result<Session, StoreError> {
        self.get_session(session_id)
            .await?
            .ok_or(StoreError::SessionNotFound(session_id))
    }
}

impl SessionStore for PgStore {
    async fn get_availability(
        &self,
        user_id: Uuid,
    ) -> Result<Option<WeeklyAvailability>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, weekday_morning, weekday_afternoon, weekday_evening,
                   weekend_morning, weekend_afternoon, weekend_evening, notes
            FROM tabletop_matcher.weekly_availability
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| WeeklyAvailability {
            user_id: row.get("user_id"),
            weekday_morning: row.get("weekday_morning"),
            weekday_afternoon: row.get("weekday_afternoon"),
            weekday_evening: row.get("weekday_evening"),
            weekend_morning: row.get("weekend_morning"),
            weekend_afternoon: row.get("weekend_afternoon"),
            weekend_evening: row.get("weekend_evening"),
            notes: row.get("notes"),
        }))
    }

    async fn upsert_availability(
        &self,
        availability: &WeeklyAvailability,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tabletop_matcher.weekly_availability
            (user_id, weekday_morning, weekday_afternoon, weekday_evening,
             weekend_morning, weekend_afternoon, weekend_evening, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE
            SET weekday_morning = EXCLUDED.weekday_morning,
                weekday_afternoon = EXCLUDED.weekday_afternoon,
                weekday_evening = EXCLUDED.weekday_evening,
                weekend_morning = EXCLUDED.weekend_morning,
                weekend_afternoon = EXCLUDED.weekend_afternoon,
                weekend_evening = EXCLUDED.weekend_evening,
                notes = EXCLUDED.notes,
                updated_at = now()
            "#,
        )
        .bind(availability.user_id)
        .bind(availability.weekday_morning)
        .bind(availability.weekday_afternoon)
        .bind(availability.weekday_evening)
        .bind(availability.weekend_morning)
        .bind(availability.weekend_afternoon)
        .bind(availability.weekend_evening)
        .bind(&availability.notes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upcoming_sessions(&self, now: DateTime<Utc>) -> Result<Vec<Session>, StoreError> {
        let query = format!("{SESSION_QUERY} WHERE s.start_time > $1 ORDER BY s.start_time");
        let rows = sqlx::query(&query).bind(now).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        let query = format!("{SESSION_QUERY} WHERE s.id = $1");
        let row = sqlx::query(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn create_session(&self, new_session: NewSession) -> Result<Session, StoreError> {
        new_session.validate().map_err(StoreError::InvalidSession)?;

        let session_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tabletop_matcher.sessions
            (id, title, game, host_id, host_name, location, start_time, end_time,
             min_players, max_players, current_players)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 1)
            "#,
        )
        .bind(session_id)
        .bind(&new_session.title)
        .bind(&new_session.game)
        .bind(new_session.host_id)
        .bind(&new_session.host_name)
        .bind(&new_session.location)
        .bind(new_session.start_time)
        .bind(new_session.end_time)
        .bind(new_session.min_players)
        .bind(new_session.max_players)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO tabletop_matcher.session_participants (session_id, player_id) VALUES ($1, $2)",
        )
        .bind(session_id)
        .bind(new_session.host_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(%session_id, title = %new_session.title, "session created");
        self.fetch_session(session_id).await
    }

    async fn join_session(&self, session_id: Uuid, player_id: Uuid) -> Result<Session, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT current_players, max_players FROM tabletop_matcher.sessions WHERE id = $1 FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::SessionNotFound(session_id))?;
        let current_players: i32 = row.get("current_players");
        let max_players: i32 = row.get("max_players");

        let added = sqlx::query(
            r#"
            INSERT INTO tabletop_matcher.session_participants (session_id, player_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(player_id)
        .execute(&mut *tx)
        .await?;

        if added.rows_affected() == 0 {
            return Err(StoreError::AlreadyJoined {
                session_id,
                player_id,
            });
        }
        if current_players >= max_players {
            return Err(StoreError::SessionFull(session_id));
        }

        sqlx::query(
            "UPDATE tabletop_matcher.sessions SET current_players = current_players + 1 WHERE id = $1",
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.fetch_session(session_id).await
    }

    async fn leave_session(
        &self,
        session_id: Uuid,
        player_id: Uuid,
    ) -> Result<Session, StoreError> {
        let mut tx = self.pool.begin().await?;

        let host_id: Uuid =
            sqlx::query("SELECT host_id FROM tabletop_matcher.sessions WHERE id = $1 FOR UPDATE")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::SessionNotFound(session_id))?
                .get("host_id");

        if host_id == player_id {
            return Err(StoreError::HostCannotLeave(session_id));
        }

        let removed = sqlx::query(
            "DELETE FROM tabletop_matcher.session_participants WHERE session_id = $1 AND player_id = $2",
        )
        .bind(session_id)
        .bind(player_id)
        .execute(&mut *tx)
        .await?;

        if removed.rows_affected() == 0 {
            return Err(StoreError::NotJoined {
                session_id,
                player_id,
            });
        }

        sqlx::query(
            "UPDATE tabletop_matcher.sessions SET current_players = GREATEST(current_players - 1, 0) WHERE id = $1",
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.fetch_session(session_id).await
    }
}
