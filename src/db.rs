//! Database layer for the event log
//!
//! SQLite in WAL mode with `synchronous=FULL`: one file, no server, and a
//! commit is on disk before `append` returns. Three tables:
//! - `events`: the append-only log, hash-chained row to row
//! - `entity_keys`: which event created each entity or one-time transition
//! - `checkpoints`: folded state snapshots keyed by the last applied event

use crate::config::StoreConfig;
use crate::error::Result;
use crate::types::EventId;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// Open (or create) the database at `path` with durability pragmas and schema
pub fn init_db(path: &Path, config: &StoreConfig) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute_batch("PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// In-memory database with the same schema (tests, scratch replays)
pub fn init_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

const SCHEMA: &str = r#"
-- Events: the single source of truth. Rows are never updated or deleted.
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY,
    timestamp TEXT NOT NULL,
    game_year INTEGER NOT NULL,
    action_type TEXT NOT NULL,
    actor_id TEXT,
    payload TEXT NOT NULL,          -- JSON, tagged by action type
    consequences TEXT NOT NULL,     -- JSON array of derived effects
    idempotency_key TEXT UNIQUE,

    -- Hash chain
    prev_hash TEXT NOT NULL,
    content_hash TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_action_type ON events(action_type);
CREATE INDEX IF NOT EXISTS idx_events_game_year ON events(game_year);

-- Entity keys: causal prerequisites. event_id 0 marks campaign genesis.
CREATE TABLE IF NOT EXISTS entity_keys (
    key TEXT PRIMARY KEY,
    event_id INTEGER NOT NULL
);

-- Checkpoints: serialized GameState after applying event_id
CREATE TABLE IF NOT EXISTS checkpoints (
    event_id INTEGER PRIMARY KEY,
    state TEXT NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);
"#;

/// One row of the `events` table, columns exactly as stored
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub id: EventId,
    pub timestamp: String,
    pub game_year: i32,
    pub action_type: String,
    pub actor_id: Option<String>,
    pub payload: String,
    pub consequences: String,
    pub idempotency_key: Option<String>,
    pub prev_hash: String,
    pub content_hash: String,
}

const EVENT_COLUMNS: &str = "id, timestamp, game_year, action_type, actor_id, payload, \
                             consequences, idempotency_key, prev_hash, content_hash";

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: EventId(row.get(0)?),
        timestamp: row.get(1)?,
        game_year: row.get(2)?,
        action_type: row.get(3)?,
        actor_id: row.get(4)?,
        payload: row.get(5)?,
        consequences: row.get(6)?,
        idempotency_key: row.get(7)?,
        prev_hash: row.get(8)?,
        content_hash: row.get(9)?,
    })
}

// ============================================================================
// EVENTS
// ============================================================================

pub fn insert_event(conn: &Connection, row: &EventRow) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO events (id, timestamp, game_year, action_type, actor_id, payload,
                            consequences, idempotency_key, prev_hash, content_hash)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            row.id.0,
            row.timestamp,
            row.game_year,
            row.action_type,
            row.actor_id,
            row.payload,
            row.consequences,
            row.idempotency_key,
            row.prev_hash,
            row.content_hash,
        ],
    )?;
    Ok(())
}

/// Id and content hash of the newest event, for chain linking
pub fn chain_head(conn: &Connection) -> Result<Option<(EventId, String)>> {
    let head = conn
        .query_row(
            "SELECT id, content_hash FROM events ORDER BY id DESC LIMIT 1",
            [],
            |row| Ok((EventId(row.get(0)?), row.get(1)?)),
        )
        .optional()?;
    Ok(head)
}

pub fn latest_event_id(conn: &Connection) -> Result<EventId> {
    let id: Option<i64> = conn.query_row("SELECT MAX(id) FROM events", [], |row| row.get(0))?;
    Ok(EventId(id.unwrap_or(0)))
}

pub fn find_by_idempotency_key(conn: &Connection, key: &str) -> Result<Option<EventId>> {
    let id = conn
        .query_row(
            "SELECT id FROM events WHERE idempotency_key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id.map(EventId))
}

/// Up to `limit` events with `from <= id <= to`, in id order
pub fn read_events(
    conn: &Connection,
    from: EventId,
    to: EventId,
    limit: usize,
) -> Result<Vec<EventRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM events WHERE id >= ?1 AND id <= ?2 ORDER BY id LIMIT ?3",
        EVENT_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![from.0, to.0, limit as i64], row_to_event)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Like `read_events` but restricted to one action type
pub fn read_events_of_type(
    conn: &Connection,
    action_type: &str,
    from: EventId,
    limit: usize,
) -> Result<Vec<EventRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM events WHERE action_type = ?1 AND id >= ?2 ORDER BY id LIMIT ?3",
        EVENT_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![action_type, from.0, limit as i64], row_to_event)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============================================================================
// ENTITY KEYS
// ============================================================================

pub fn entity_key_exists(conn: &Connection, key: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT event_id FROM entity_keys WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn insert_entity_key(conn: &Connection, key: &str, event_id: EventId) -> Result<()> {
    conn.execute(
        "INSERT INTO entity_keys (key, event_id) VALUES (?1, ?2)",
        params![key, event_id.0],
    )?;
    Ok(())
}

/// Record a key that exists before any event (the campaign's opening year)
pub fn seed_genesis_key(conn: &Connection, key: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO entity_keys (key, event_id) VALUES (?1, 0)",
        [key],
    )?;
    Ok(())
}

// ============================================================================
// CHECKPOINTS
// ============================================================================

pub fn insert_checkpoint(conn: &Connection, event_id: EventId, state_json: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO checkpoints (event_id, state) VALUES (?1, ?2)",
        params![event_id.0, state_json],
    )?;
    Ok(())
}

/// Newest checkpoint whose offset is at or before `at_or_before`
pub fn latest_checkpoint(
    conn: &Connection,
    at_or_before: EventId,
) -> Result<Option<(EventId, String)>> {
    let checkpoint = conn
        .query_row(
            "SELECT event_id, state FROM checkpoints WHERE event_id <= ?1 \
             ORDER BY event_id DESC LIMIT 1",
            [at_or_before.0],
            |row| Ok((EventId(row.get(0)?), row.get(1)?)),
        )
        .optional()?;
    Ok(checkpoint)
}

pub fn checkpoint_count(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM checkpoints", [], |row| row.get(0))?;
    Ok(count)
}
