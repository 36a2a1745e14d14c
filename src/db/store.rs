use std::collections::HashSet;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};

use crate::game::models::GameSnapshot;
use crate::game::odds::SecondHalfOdds;
use crate::game::phase::GamePhase;

pub struct Store {
    pool: SqlitePool,
}

/// A persisted snapshot row. Nested structures live in JSON text columns and
/// are decoded on demand via [`SnapshotRecord::to_snapshot`].
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SnapshotRecord {
    pub id: Option<i64>,
    pub game_id: String,
    pub game_date: String,
    pub start_time: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub home_abbr: String,
    pub away_abbr: String,
    pub home_score: i64,
    pub away_score: i64,
    pub quarter: i64,
    pub clock: Option<String>,
    pub phase: String,
    pub status_detail: Option<String>,
    pub venue: Option<String>,
    pub broadcast: Option<String>,
    pub home_stats: Option<String>,
    pub away_stats: Option<String>,
    pub odds: Option<String>,
    pub play_by_play: Option<String>,
    pub home_power: Option<String>,
    pub away_power: Option<String>,
    pub home_standing: Option<String>,
    pub away_standing: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RecipientRecord {
    pub id: Option<i64>,
    pub email: String,
    pub name: Option<String>,
    pub active: bool,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExportRecord {
    pub id: Option<i64>,
    pub game_id: String,
    pub recipient_email: String,
    pub csv_filename: String,
    pub csv_content: Option<String>,
    pub email_status: String,
    pub error_message: Option<String>,
    pub year: Option<i64>,
    pub week: Option<i64>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub game_date: Option<String>,
    pub created_at: Option<String>,
}

/// Filters for the read-only snapshot query surface. `limit` arrives
/// pre-clamped by the export parameter validation.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFilter {
    pub game_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: i64,
}

/// Fixed-width RFC 3339 so string comparison in SQL is chronological.
pub fn fmt_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to serialize snapshot field")
}

fn from_json<T: serde::de::DeserializeOwned>(value: &Option<String>) -> Result<Option<T>> {
    match value {
        Some(text) => serde_json::from_str(text)
            .map(Some)
            .context("Failed to decode snapshot JSON column"),
        None => Ok(None),
    }
}

impl SnapshotRecord {
    pub fn from_snapshot(snap: &GameSnapshot) -> Result<Self> {
        Ok(Self {
            id: None,
            game_id: snap.game_id.clone(),
            game_date: snap.game_date.format("%Y-%m-%d").to_string(),
            start_time: snap.start_time.map(fmt_timestamp),
            home_team: snap.home_team.clone(),
            away_team: snap.away_team.clone(),
            home_abbr: snap.home_abbr.clone(),
            away_abbr: snap.away_abbr.clone(),
            home_score: snap.home_score,
            away_score: snap.away_score,
            quarter: snap.quarter,
            clock: snap.clock.clone(),
            phase: snap.phase.as_str().to_string(),
            status_detail: snap.status_detail.clone(),
            venue: snap.venue.clone(),
            broadcast: snap.broadcast.clone(),
            home_stats: Some(to_json(&snap.home_stats)?),
            away_stats: Some(to_json(&snap.away_stats)?),
            odds: snap.odds.as_ref().map(to_json).transpose()?,
            play_by_play: Some(to_json(&snap.play_by_play)?),
            home_power: snap.home_power.as_ref().map(to_json).transpose()?,
            away_power: snap.away_power.as_ref().map(to_json).transpose()?,
            home_standing: snap.home_standing.as_ref().map(to_json).transpose()?,
            away_standing: snap.away_standing.as_ref().map(to_json).transpose()?,
            created_at: fmt_timestamp(snap.created_at),
        })
    }

    pub fn to_snapshot(&self) -> Result<GameSnapshot> {
        Ok(GameSnapshot {
            game_id: self.game_id.clone(),
            game_date: NaiveDate::parse_from_str(&self.game_date, "%Y-%m-%d")
                .context("Invalid game_date in snapshot row")?,
            start_time: self
                .start_time
                .as_deref()
                .map(|s| {
                    DateTime::parse_from_rfc3339(s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .context("Invalid start_time in snapshot row")
                })
                .transpose()?,
            home_team: self.home_team.clone(),
            away_team: self.away_team.clone(),
            home_abbr: self.home_abbr.clone(),
            away_abbr: self.away_abbr.clone(),
            home_score: self.home_score,
            away_score: self.away_score,
            quarter: self.quarter,
            clock: self.clock.clone(),
            phase: GamePhase::parse(&self.phase)
                .with_context(|| format!("Unknown phase in snapshot row: {}", self.phase))?,
            status_detail: self.status_detail.clone(),
            venue: self.venue.clone(),
            broadcast: self.broadcast.clone(),
            home_stats: from_json(&self.home_stats)?.unwrap_or_default(),
            away_stats: from_json(&self.away_stats)?.unwrap_or_default(),
            odds: from_json(&self.odds)?,
            play_by_play: from_json(&self.play_by_play)?.unwrap_or_default(),
            home_power: from_json(&self.home_power)?,
            away_power: from_json(&self.away_power)?,
            home_standing: from_json(&self.home_standing)?,
            away_standing: from_json(&self.away_standing)?,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .context("Invalid created_at in snapshot row")?,
        })
    }

    pub fn created_at_utc(&self) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .context("Invalid created_at in snapshot row")
    }
}

impl Store {
    /// Create a Store from an existing pool (for sharing between the service
    /// loops and the HTTP server).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))
            .context("Invalid database path")?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let migration_sql = include_str!("../../migrations/001_init.sql");
        // Execute each statement separately (sqlx doesn't support multiple statements in one call)
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("Failed to execute migration: {trimmed}"))?;
            }
        }
        Ok(())
    }

    // --- Snapshot operations (append-only) ---

    pub async fn insert_snapshot(&self, snap: &GameSnapshot) -> Result<i64> {
        let record = SnapshotRecord::from_snapshot(snap)?;
        let result = sqlx::query(
            "INSERT INTO game_snapshots (
                game_id, game_date, start_time, home_team, away_team,
                home_abbr, away_abbr, home_score, away_score, quarter, clock,
                phase, status_detail, venue, broadcast, home_stats, away_stats,
                odds, play_by_play, home_power, away_power, home_standing,
                away_standing, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.game_id)
        .bind(&record.game_date)
        .bind(&record.start_time)
        .bind(&record.home_team)
        .bind(&record.away_team)
        .bind(&record.home_abbr)
        .bind(&record.away_abbr)
        .bind(record.home_score)
        .bind(record.away_score)
        .bind(record.quarter)
        .bind(&record.clock)
        .bind(&record.phase)
        .bind(&record.status_detail)
        .bind(&record.venue)
        .bind(&record.broadcast)
        .bind(&record.home_stats)
        .bind(&record.away_stats)
        .bind(&record.odds)
        .bind(&record.play_by_play)
        .bind(&record.home_power)
        .bind(&record.away_power)
        .bind(&record.home_standing)
        .bind(&record.away_standing)
        .bind(&record.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert snapshot")?;

        Ok(result.last_insert_rowid())
    }

    pub async fn query_snapshots(&self, filter: &SnapshotFilter) -> Result<Vec<SnapshotRecord>> {
        let records = sqlx::query_as::<_, SnapshotRecord>(
            "SELECT * FROM game_snapshots
             WHERE (?1 IS NULL OR game_id = ?1)
               AND (?2 IS NULL OR game_date >= ?2)
               AND (?3 IS NULL OR game_date <= ?3)
             ORDER BY created_at DESC, id DESC
             LIMIT ?4",
        )
        .bind(&filter.game_id)
        .bind(filter.start_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(filter.end_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query snapshots")?;
        Ok(records)
    }

    /// Most recent snapshot for a game regardless of phase.
    pub async fn latest_snapshot(&self, game_id: &str) -> Result<Option<SnapshotRecord>> {
        let record = sqlx::query_as::<_, SnapshotRecord>(
            "SELECT * FROM game_snapshots WHERE game_id = ?
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest snapshot")?;
        Ok(record)
    }

    /// Most recent Halftime snapshot for a game (manual email path).
    pub async fn latest_halftime_snapshot(&self, game_id: &str) -> Result<Option<SnapshotRecord>> {
        let record = sqlx::query_as::<_, SnapshotRecord>(
            "SELECT * FROM game_snapshots WHERE game_id = ? AND phase = 'Halftime'
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest halftime snapshot")?;
        Ok(record)
    }

    /// All snapshots currently classified Halftime, newest first.
    pub async fn halftime_snapshots(&self) -> Result<Vec<SnapshotRecord>> {
        let records = sqlx::query_as::<_, SnapshotRecord>(
            "SELECT * FROM game_snapshots WHERE phase = 'Halftime'
             ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch halftime snapshots")?;
        Ok(records)
    }

    /// Whether a fresh Halftime snapshot for this game already carries
    /// secondary-provider odds (quota gate for the scoreboard-wide fetch).
    pub async fn has_fresh_secondary_odds(
        &self,
        game_id: &str,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let records = self.recent_halftime_snapshots(game_id, since).await?;
        for record in records {
            if let Ok(snap) = record.to_snapshot() {
                if snap.has_secondary_odds() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// A recent non-empty second-half bundle for this game, if one was
    /// already fetched. Stale-but-present beats another upstream call.
    pub async fn fresh_second_half_odds(
        &self,
        game_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<SecondHalfOdds>> {
        let records = self.recent_halftime_snapshots(game_id, since).await?;
        for record in records {
            if let Ok(snap) = record.to_snapshot() {
                if let Some(half) = snap.odds.and_then(|o| o.second_half) {
                    if !half.bookmakers.is_empty() {
                        return Ok(Some(half));
                    }
                }
            }
        }
        Ok(None)
    }

    async fn recent_halftime_snapshots(
        &self,
        game_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SnapshotRecord>> {
        let records = sqlx::query_as::<_, SnapshotRecord>(
            "SELECT * FROM game_snapshots
             WHERE game_id = ? AND phase = 'Halftime' AND created_at >= ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(game_id)
        .bind(fmt_timestamp(since))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent halftime snapshots")?;
        Ok(records)
    }

    pub async fn count_snapshots(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM game_snapshots")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count snapshots")?;
        Ok(row.0)
    }

    /// Retention sweep: delete snapshots created before the cutoff, one batch
    /// at a time. Returns rows deleted in this batch.
    pub async fn delete_snapshots_before(
        &self,
        cutoff: DateTime<Utc>,
        batch_limit: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM game_snapshots WHERE id IN (
                SELECT id FROM game_snapshots WHERE created_at < ? LIMIT ?
             )",
        )
        .bind(fmt_timestamp(cutoff))
        .bind(batch_limit)
        .execute(&self.pool)
        .await
        .context("Failed to delete old snapshots")?;
        Ok(result.rows_affected())
    }

    // --- Recipient operations ---

    pub async fn list_recipients(&self) -> Result<Vec<RecipientRecord>> {
        let recipients =
            sqlx::query_as::<_, RecipientRecord>("SELECT * FROM email_recipients ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .context("Failed to list recipients")?;
        Ok(recipients)
    }

    pub async fn active_recipients(&self) -> Result<Vec<RecipientRecord>> {
        let recipients = sqlx::query_as::<_, RecipientRecord>(
            "SELECT * FROM email_recipients WHERE active = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list active recipients")?;
        Ok(recipients)
    }

    pub async fn insert_recipient(&self, email: &str, name: Option<&str>) -> Result<i64> {
        let result = sqlx::query("INSERT INTO email_recipients (email, name) VALUES (?, ?)")
            .bind(email)
            .bind(name)
            .execute(&self.pool)
            .await
            .context("Failed to insert recipient")?;
        Ok(result.last_insert_rowid())
    }

    pub async fn set_recipient_active(&self, id: i64, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE email_recipients SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update recipient")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_recipient(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM email_recipients WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete recipient")?;
        Ok(result.rows_affected() > 0)
    }

    // --- Export audit operations ---

    pub async fn insert_export(&self, export: &ExportRecord) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO halftime_exports (
                game_id, recipient_email, csv_filename, csv_content,
                email_status, error_message, year, week, home_team, away_team,
                game_date, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&export.game_id)
        .bind(&export.recipient_email)
        .bind(&export.csv_filename)
        .bind(&export.csv_content)
        .bind(&export.email_status)
        .bind(&export.error_message)
        .bind(export.year)
        .bind(export.week)
        .bind(&export.home_team)
        .bind(&export.away_team)
        .bind(&export.game_date)
        .bind(
            export
                .created_at
                .clone()
                .unwrap_or_else(|| fmt_timestamp(Utc::now())),
        )
        .execute(&self.pool)
        .await
        .context("Failed to insert export record")?;
        Ok(result.last_insert_rowid())
    }

    /// Game ids with at least one audit row, success or failure: the
    /// idempotency gate for the scheduled trigger.
    pub async fn exported_game_ids(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT game_id FROM halftime_exports")
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch exported game ids")?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn list_exports(
        &self,
        year: Option<i64>,
        week: Option<i64>,
    ) -> Result<Vec<ExportRecord>> {
        let exports = sqlx::query_as::<_, ExportRecord>(
            "SELECT * FROM halftime_exports
             WHERE (?1 IS NULL OR year = ?1)
               AND (?2 IS NULL OR week = ?2)
             ORDER BY created_at DESC, id DESC",
        )
        .bind(year)
        .bind(week)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list exports")?;
        Ok(exports)
    }

    pub async fn exports_for_game(&self, game_id: &str) -> Result<Vec<ExportRecord>> {
        let exports = sqlx::query_as::<_, ExportRecord>(
            "SELECT * FROM halftime_exports WHERE game_id = ? ORDER BY id",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch exports for game")?;
        Ok(exports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::phase::GamePhase;
    use chrono::TimeZone;

    fn sample_snapshot(game_id: &str, phase: GamePhase, created_at: DateTime<Utc>) -> GameSnapshot {
        GameSnapshot {
            game_id: game_id.to_string(),
            game_date: NaiveDate::from_ymd_opt(2025, 11, 2).unwrap(),
            start_time: Some(Utc.with_ymd_and_hms(2025, 11, 2, 18, 0, 0).unwrap()),
            home_team: "Buffalo Bills".to_string(),
            away_team: "Miami Dolphins".to_string(),
            home_abbr: "BUF".to_string(),
            away_abbr: "MIA".to_string(),
            home_score: 17,
            away_score: 10,
            quarter: 2,
            clock: Some("0:00".to_string()),
            phase,
            status_detail: Some("Halftime".to_string()),
            venue: Some("Highmark Stadium".to_string()),
            broadcast: Some("CBS".to_string()),
            home_stats: [("totalYards".to_string(), "212".to_string())].into(),
            away_stats: [("totalYards".to_string(), "187".to_string())].into(),
            odds: None,
            play_by_play: Vec::new(),
            home_power: None,
            away_power: None,
            home_standing: None,
            away_standing: None,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_store_create_and_migrate() {
        let store = Store::new(":memory:").await.expect("should create store");
        assert_eq!(store.count_snapshots().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let store = Store::new(":memory:").await.unwrap();
        let snap = sample_snapshot("401", GamePhase::Halftime, Utc::now());
        store.insert_snapshot(&snap).await.unwrap();

        let record = store.latest_snapshot("401").await.unwrap().unwrap();
        let decoded = record.to_snapshot().unwrap();
        assert_eq!(decoded.home_team, "Buffalo Bills");
        assert_eq!(decoded.phase, GamePhase::Halftime);
        assert_eq!(decoded.home_stats.get("totalYards").unwrap(), "212");
    }

    #[tokio::test]
    async fn test_query_filters_by_date_and_game() {
        let store = Store::new(":memory:").await.unwrap();
        let mut snap = sample_snapshot("401", GamePhase::Live, Utc::now());
        store.insert_snapshot(&snap).await.unwrap();
        snap.game_id = "402".to_string();
        snap.game_date = NaiveDate::from_ymd_opt(2025, 11, 9).unwrap();
        store.insert_snapshot(&snap).await.unwrap();

        let filter = SnapshotFilter {
            game_id: Some("401".to_string()),
            limit: 100,
            ..Default::default()
        };
        assert_eq!(store.query_snapshots(&filter).await.unwrap().len(), 1);

        let filter = SnapshotFilter {
            start_date: NaiveDate::from_ymd_opt(2025, 11, 5),
            limit: 100,
            ..Default::default()
        };
        let rows = store.query_snapshots(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].game_id, "402");
    }

    #[tokio::test]
    async fn test_recipient_lifecycle() {
        let store = Store::new(":memory:").await.unwrap();
        let id = store
            .insert_recipient("bettor@example.com", Some("Bettor"))
            .await
            .unwrap();

        // Duplicate emails are rejected by the unique constraint.
        assert!(store
            .insert_recipient("bettor@example.com", None)
            .await
            .is_err());

        assert_eq!(store.active_recipients().await.unwrap().len(), 1);
        assert!(store.set_recipient_active(id, false).await.unwrap());
        assert!(store.active_recipients().await.unwrap().is_empty());
        assert!(store.delete_recipient(id).await.unwrap());
        assert!(store.list_recipients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exported_game_ids_include_failures() {
        let store = Store::new(":memory:").await.unwrap();
        let export = ExportRecord {
            id: None,
            game_id: "401".to_string(),
            recipient_email: "a@example.com".to_string(),
            csv_filename: "NFL25_09_BUFvMIA_plays.csv".to_string(),
            csv_content: None,
            email_status: "failed".to_string(),
            error_message: Some("rate limited".to_string()),
            year: Some(2025),
            week: Some(9),
            home_team: Some("Buffalo Bills".to_string()),
            away_team: Some("Miami Dolphins".to_string()),
            game_date: Some("2025-11-02".to_string()),
            created_at: None,
        };
        store.insert_export(&export).await.unwrap();

        let gate = store.exported_game_ids().await.unwrap();
        assert!(gate.contains("401"));
    }

    #[tokio::test]
    async fn test_retention_sweep_deletes_only_old_rows() {
        let store = Store::new(":memory:").await.unwrap();
        let old = Utc::now() - chrono::Duration::days(3);
        store
            .insert_snapshot(&sample_snapshot("401", GamePhase::Final, old))
            .await
            .unwrap();
        store
            .insert_snapshot(&sample_snapshot("402", GamePhase::Live, Utc::now()))
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(2);
        let deleted = store.delete_snapshots_before(cutoff, 100).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count_snapshots().await.unwrap(), 1);
        assert!(store.latest_snapshot("402").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_fresh_second_half_lookup() {
        use crate::game::odds::{BookmakerQuote, MarketConsensus, OddsBundle, OddsSource, SecondHalfOdds};

        let store = Store::new(":memory:").await.unwrap();
        let mut snap = sample_snapshot("401", GamePhase::Halftime, Utc::now());
        snap.odds = Some(OddsBundle {
            source: OddsSource::TheOddsApi,
            last_update: Utc::now(),
            consensus: Some(MarketConsensus::default()),
            bookmakers: vec![BookmakerQuote {
                name: "DraftKings".to_string(),
                ..Default::default()
            }],
            second_half: Some(SecondHalfOdds {
                consensus: MarketConsensus {
                    spread: Some(-1.5),
                    ..Default::default()
                },
                bookmakers: vec![BookmakerQuote {
                    name: "DraftKings".to_string(),
                    home_spread: Some(-1.5),
                    ..Default::default()
                }],
            }),
            espn_fallback: None,
        });
        store.insert_snapshot(&snap).await.unwrap();

        let since = Utc::now() - chrono::Duration::seconds(60);
        assert!(store.has_fresh_secondary_odds("401", since).await.unwrap());
        let half = store
            .fresh_second_half_odds("401", since)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(half.consensus.spread, Some(-1.5));

        // Outside the freshness window nothing is reused.
        let future = Utc::now() + chrono::Duration::seconds(60);
        assert!(!store.has_fresh_secondary_odds("401", future).await.unwrap());
    }
}
