use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{
    params, params_from_iter, types::Type, Connection, OptionalExtension, TransactionBehavior,
};
use serde::Serialize;

use super::traits::{
    CatalogCounts, CatalogWriter, ReportStore, SearchHit, SearchIndexWriter, StorageRead,
};
use crate::report::RunReport;
use crate::trigram::TrigramEntry;
use crate::types::{ArtistRecord, CanonicalCardRecord, RulingRecord, SetRecord};

const DB_SCHEMA_VERSION: i64 = 1;
const MAX_QUERY_FRAGMENTS: usize = 900;

#[derive(Clone, Debug)]
pub struct SqliteStorage {
    pub path: String,
}

fn date_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn json_text<T: Serialize + ?Sized>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))
}

fn db_upsert_set(conn: &Connection, set: &SetRecord) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO sets (id, code, name, set_type, released_at, digital, card_count, parent_code)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            code=excluded.code, name=excluded.name, set_type=excluded.set_type,
            released_at=excluded.released_at, digital=excluded.digital,
            card_count=excluded.card_count, parent_code=excluded.parent_code
        "#,
        params![
            set.id,
            set.code,
            set.name,
            set.set_type,
            date_text(set.released_at),
            set.digital as i64,
            set.card_count as i64,
            set.parent_code
        ],
    )?;
    Ok(())
}

fn db_upsert_cards(conn: &mut Connection, batch: &[CanonicalCardRecord]) -> rusqlite::Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO cards (
                id, oracle_id, set_id, set_code, name, collector_number, rarity,
                nonfoil, foil, etched, artist, artist_ids, type_line, mana_cost,
                released_at, lang, face_names
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            ON CONFLICT(id) DO UPDATE SET
                oracle_id=excluded.oracle_id, set_id=excluded.set_id, set_code=excluded.set_code,
                name=excluded.name, collector_number=excluded.collector_number,
                rarity=excluded.rarity, nonfoil=excluded.nonfoil, foil=excluded.foil,
                etched=excluded.etched, artist=excluded.artist, artist_ids=excluded.artist_ids,
                type_line=excluded.type_line, mana_cost=excluded.mana_cost,
                released_at=excluded.released_at, lang=excluded.lang,
                face_names=excluded.face_names
            "#,
        )?;
        for card in batch {
            stmt.execute(params![
                card.id,
                card.oracle_id,
                card.set_id,
                card.set_code,
                card.name,
                card.collector_number,
                card.rarity,
                card.finishes.nonfoil as i64,
                card.finishes.foil as i64,
                card.finishes.etched as i64,
                card.artist,
                json_text(&card.artist_ids)?,
                card.type_line,
                card.mana_cost,
                date_text(card.released_at),
                card.lang,
                json_text(&card.face_names)?
            ])?;
        }
    }
    tx.commit()
}

fn db_upsert_artists(conn: &mut Connection, batch: &[ArtistRecord]) -> rusqlite::Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO artists (id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name=excluded.name",
        )?;
        for artist in batch {
            stmt.execute(params![artist.id, artist.name])?;
        }
    }
    tx.commit()
}

/// Rulings have no natural key, so a card's rulings are replaced as a group.
fn db_replace_rulings(conn: &mut Connection, batch: &[RulingRecord]) -> rusqlite::Result<()> {
    let card_ids: BTreeSet<&str> = batch.iter().map(|r| r.card_id.as_str()).collect();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    {
        let mut delete = tx.prepare("DELETE FROM rulings WHERE card_id = ?1")?;
        for card_id in &card_ids {
            delete.execute(params![card_id])?;
        }
        let mut insert = tx.prepare(
            "INSERT INTO rulings (card_id, oracle_id, source, published_at, comment)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for ruling in batch {
            insert.execute(params![
                ruling.card_id,
                ruling.oracle_id,
                ruling.source,
                date_text(ruling.published_at),
                ruling.comment
            ])?;
        }
    }
    tx.commit()
}

fn db_replace_trigrams(conn: &mut Connection, batch: &[TrigramEntry]) -> rusqlite::Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    {
        let mut delete = tx.prepare("DELETE FROM trigrams WHERE partition_key = ?1")?;
        let mut insert = tx.prepare(
            "INSERT OR IGNORE INTO trigrams (fragment, partition_key) VALUES (?1, ?2)",
        )?;
        let mut name = tx.prepare(
            "INSERT INTO name_index (partition_key, source, fragment_count) VALUES (?1, ?2, ?3)
                 ON CONFLICT(partition_key) DO UPDATE SET
                     source=excluded.source, fragment_count=excluded.fragment_count",
        )?;
        for entry in batch {
            delete.execute(params![entry.partition_key])?;
            for fragment in &entry.fragments {
                insert.execute(params![fragment, entry.partition_key])?;
            }
            name.execute(params![
                entry.partition_key,
                entry.source,
                entry.fragments.len() as i64
            ])?;
        }
    }
    tx.commit()
}

fn map_hit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchHit> {
    let matched: i64 = row.get(3)?;
    let matched: u32 = matched
        .try_into()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(3, Type::Integer, Box::new(err)))?;
    Ok(SearchHit {
        card_id: row.get(0)?,
        name: row.get(1)?,
        set_code: row.get(2)?,
        matched,
    })
}

fn db_search(conn: &Connection, fragments: &[String], limit: usize) -> rusqlite::Result<Vec<SearchHit>> {
    let fragments: Vec<&String> = fragments
        .iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .take(MAX_QUERY_FRAGMENTS)
        .collect();
    if fragments.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let placeholders = std::iter::repeat("?")
        .take(fragments.len())
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        r#"
        SELECT t.partition_key, COALESCE(c.name, n.source), c.set_code, COUNT(*) AS matched
        FROM trigrams t
        JOIN name_index n ON n.partition_key = t.partition_key
        LEFT JOIN cards c ON c.id = t.partition_key
        WHERE t.fragment IN ({placeholders})
        GROUP BY t.partition_key
        ORDER BY matched DESC, length(n.source) ASC, t.partition_key ASC
        LIMIT {limit}
        "#
    );
    let mut stmt = conn.prepare(&sql)?;
    let hits = stmt
        .query_map(params_from_iter(fragments.iter()), map_hit_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(hits)
}

fn db_counts(conn: &Connection) -> rusqlite::Result<CatalogCounts> {
    let count = |table: &str| -> rusqlite::Result<u64> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    };
    Ok(CatalogCounts {
        sets: count("sets")?,
        cards: count("cards")?,
        artists: count("artists")?,
        rulings: count("rulings")?,
        indexed_names: count("name_index")?,
    })
}

fn db_save_report(conn: &Connection, report: &RunReport) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO runs (id, started_at_ms, state, report) VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(id) DO UPDATE SET state=excluded.state, report=excluded.report
        "#,
        params![
            report.run_id.to_string(),
            report.started_at.timestamp_millis(),
            format!("{:?}", report.state),
            json_text(report)?
        ],
    )?;
    Ok(())
}

fn db_load_last_report(conn: &Connection) -> rusqlite::Result<Option<RunReport>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT report FROM runs ORDER BY started_at_ms DESC, rowid DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|json| {
        serde_json::from_str::<RunReport>(&json)
            .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err)))
    })
    .transpose()
}

impl SqliteStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_string_lossy().to_string(),
        }
    }

    pub fn reset_all(&self) -> Result<()> {
        for suffix in ["", "-wal", "-shm"] {
            let path = format!("{}{}", self.path, suffix);
            if Path::new(&path).exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    pub fn init(&self) -> Result<()> {
        if let Some(parent) = Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.with_conn(|_conn| Ok(()))?;
        Ok(())
    }

    fn with_conn<F, T>(&self, f: F) -> rusqlite::Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        Self::migrate(&conn)?;
        f(&mut conn)
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = self.clone();
        let out = tokio::task::spawn_blocking(move || storage.with_conn(f)).await??;
        Ok(out)
    }

    fn migrate(conn: &Connection) -> rusqlite::Result<()> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version == DB_SCHEMA_VERSION {
            return Ok(());
        }

        if version == 0 {
            log::info!(
                "SQLite schema migration: {} -> {}",
                version,
                DB_SCHEMA_VERSION
            );
            conn.execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS sets (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                name TEXT NOT NULL,
                set_type TEXT,
                released_at TEXT,
                digital INTEGER NOT NULL,
                card_count INTEGER NOT NULL,
                parent_code TEXT
            );
            CREATE INDEX IF NOT EXISTS sets_code_idx ON sets(code);
            CREATE TABLE IF NOT EXISTS cards (
                id TEXT PRIMARY KEY,
                oracle_id TEXT,
                set_id TEXT NOT NULL,
                set_code TEXT NOT NULL,
                name TEXT NOT NULL,
                collector_number TEXT NOT NULL,
                rarity TEXT,
                nonfoil INTEGER NOT NULL,
                foil INTEGER NOT NULL,
                etched INTEGER NOT NULL,
                artist TEXT,
                artist_ids TEXT NOT NULL,
                type_line TEXT,
                mana_cost TEXT,
                released_at TEXT,
                lang TEXT NOT NULL,
                face_names TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS cards_set_idx ON cards(set_id);
            CREATE INDEX IF NOT EXISTS cards_oracle_idx ON cards(oracle_id);
            CREATE TABLE IF NOT EXISTS artists (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS rulings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                card_id TEXT NOT NULL,
                oracle_id TEXT NOT NULL,
                source TEXT NOT NULL,
                published_at TEXT,
                comment TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS rulings_card_idx ON rulings(card_id);
            CREATE TABLE IF NOT EXISTS trigrams (
                fragment TEXT NOT NULL,
                partition_key TEXT NOT NULL,
                PRIMARY KEY (fragment, partition_key)
            ) WITHOUT ROWID;
            CREATE INDEX IF NOT EXISTS trigrams_partition_idx ON trigrams(partition_key);
            CREATE TABLE IF NOT EXISTS name_index (
                partition_key TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                fragment_count INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                started_at_ms INTEGER NOT NULL,
                state TEXT NOT NULL,
                report TEXT NOT NULL
            );
        "#,
            )?;
            conn.pragma_update(None, "user_version", DB_SCHEMA_VERSION)?;
            return Ok(());
        }

        Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::ErrorCode::SchemaChanged as i32),
            Some("database schema version mismatch; please run with --reset option".to_string()),
        ))
    }
}

#[async_trait]
impl CatalogWriter for SqliteStorage {
    async fn write_set_record(&self, set: &SetRecord) -> Result<()> {
        let set = set.clone();
        self.blocking(move |conn| db_upsert_set(conn, &set)).await
    }

    async fn write_card_records(&self, batch: &[CanonicalCardRecord]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let batch = batch.to_vec();
        self.blocking(move |conn| db_upsert_cards(conn, &batch)).await
    }

    async fn write_artist_records(&self, batch: &[ArtistRecord]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let batch = batch.to_vec();
        self.blocking(move |conn| db_upsert_artists(conn, &batch)).await
    }

    async fn write_ruling_records(&self, batch: &[RulingRecord]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let batch = batch.to_vec();
        self.blocking(move |conn| db_replace_rulings(conn, &batch)).await
    }
}

#[async_trait]
impl SearchIndexWriter for SqliteStorage {
    async fn write_trigram_entries(&self, batch: &[TrigramEntry]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let batch = batch.to_vec();
        self.blocking(move |conn| db_replace_trigrams(conn, &batch)).await
    }
}

impl StorageRead for SqliteStorage {
    fn search(&self, fragments: &[String], limit: usize) -> Result<Vec<SearchHit>> {
        let hits = self.with_conn(|conn| db_search(conn, fragments, limit))?;
        Ok(hits)
    }

    fn counts(&self) -> Result<CatalogCounts> {
        let counts = self.with_conn(|conn| db_counts(conn))?;
        Ok(counts)
    }

    fn load_last_report(&self) -> Result<Option<RunReport>> {
        let report = self.with_conn(|conn| db_load_last_report(conn))?;
        Ok(report)
    }
}

impl ReportStore for SqliteStorage {
    fn save_report(&self, report: &RunReport) -> Result<()> {
        self.with_conn(|conn| db_save_report(conn, report))?;
        Ok(())
    }
}
