//! Event Store
//!
//! Append-only, durable, totally ordered. Each append is one `BEGIN
//! IMMEDIATE` transaction that:
//! 1. returns the existing id if the idempotency key was seen before
//! 2. checks the payload's required entity keys (`Ordering` if missing)
//! 3. checks its created keys are new (`Validation` if already taken)
//! 4. links the row into the hash chain and inserts it with its keys
//!
//! Busy/locked errors, on reads as well as appends, are retried with bounded
//! exponential backoff and only surface as `Contention` once the retry
//! budget is spent. There is no update or delete.

use crate::config::{RetryPolicy, StoreConfig};
use crate::db::{self, EventRow};
use crate::error::{GameError, Result};
use crate::events::{ActionType, Consequence, Event, EventPayload, NewEvent};
use crate::provenance::{self, ChainLink, ChainVerification, ChainVerifier, GENESIS_HASH};
use crate::types::{EventId, PlayerId};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

pub struct EventStore {
    conn: Mutex<Connection>,
    config: StoreConfig,
    retry: RetryPolicy,
}

impl EventStore {
    /// Open or create the on-disk log
    pub fn open(path: &Path, config: &StoreConfig, retry: &RetryPolicy) -> Result<Self> {
        let conn = db::init_db(path, config)?;
        debug!(path = %path.display(), "opened event store");
        Ok(Self::from_connection(conn, config, retry))
    }

    /// Non-durable store for tests and scratch replays
    pub fn in_memory(config: &StoreConfig, retry: &RetryPolicy) -> Result<Self> {
        Ok(Self::from_connection(db::init_in_memory()?, config, retry))
    }

    fn from_connection(conn: Connection, config: &StoreConfig, retry: &RetryPolicy) -> Self {
        Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            retry: retry.clone(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-append drops the transaction, which rolls it back,
        // so the connection is still usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `op`, retrying SQLite busy/locked failures per the retry policy
    fn with_retry<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Err(err) if err.is_contention() => {
                    if attempt >= self.retry.max_attempts {
                        warn!(what, attempts = attempt, "store contention, giving up");
                        return Err(GameError::Contention { attempts: attempt });
                    }
                    let delay = self.retry.backoff(attempt);
                    warn!(what, attempt, delay_ms = delay.as_millis() as u64, "store busy, retrying");
                    std::thread::sleep(delay);
                }
                other => return other,
            }
        }
    }

    /// Make `year:<start_year>` exist so the first `year_advanced` has its
    /// predecessor. Safe to call on every open.
    pub fn seed_genesis(&self, start_year: i32) -> Result<()> {
        self.with_retry("seed_genesis", || {
            db::seed_genesis_key(&self.conn(), &format!("year:{}", start_year))
        })
    }

    // ========================================================================
    // APPEND
    // ========================================================================

    pub fn append(&self, event: NewEvent) -> Result<EventId> {
        event.validate()?;
        self.with_retry("append", || self.try_append(&event))
    }

    fn try_append(&self, event: &NewEvent) -> Result<EventId> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(key) = &event.idempotency_key {
            if let Some(existing) = db::find_by_idempotency_key(&tx, key)? {
                debug!(idempotency_key = %key, event_id = %existing, "duplicate append ignored");
                return Ok(existing);
            }
        }

        for key in event.payload.requires() {
            if !db::entity_key_exists(&tx, &key)? {
                return Err(GameError::Ordering(format!(
                    "{} requires {}, which has not been recorded",
                    event.action_type(),
                    key
                )));
            }
        }
        let created = event.payload.creates();
        for key in &created {
            if db::entity_key_exists(&tx, key)? {
                return Err(GameError::Validation(format!("{} already exists", key)));
            }
        }

        let (prev_id, prev_hash) = db::chain_head(&tx)?
            .unwrap_or_else(|| (EventId::ZERO, GENESIS_HASH.to_string()));
        let id = prev_id.next();

        let mut row = EventRow {
            id,
            timestamp: event.timestamp.to_rfc3339(),
            game_year: event.game_year,
            action_type: event.action_type().as_str().to_string(),
            actor_id: event.actor_id.as_ref().map(|a| a.0.clone()),
            payload: serde_json::to_string(&event.payload)?,
            consequences: serde_json::to_string(&event.consequences)?,
            idempotency_key: event.idempotency_key.clone(),
            prev_hash,
            content_hash: String::new(),
        };
        row.content_hash = provenance::hash_event(&row);

        db::insert_event(&tx, &row)?;
        for key in &created {
            db::insert_entity_key(&tx, key, id)?;
        }
        tx.commit()?;

        debug!(event_id = %id, action_type = %row.action_type, "appended event");
        Ok(id)
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub fn find_idempotent(&self, key: &str) -> Result<Option<EventId>> {
        self.with_retry("find_idempotent", || {
            db::find_by_idempotency_key(&self.conn(), key)
        })
    }

    pub fn latest_event_id(&self) -> Result<EventId> {
        self.with_retry("latest_event_id", || db::latest_event_id(&self.conn()))
    }

    pub fn get(&self, id: EventId) -> Result<Event> {
        let rows = self.with_retry("get", || db::read_events(&self.conn(), id, id, 1))?;
        match rows.into_iter().next() {
            Some(row) => decode_row(row),
            None => Err(GameError::NotFound(format!("event {}", id))),
        }
    }

    /// Lazy iterator over `from..=to` (`to` defaults to the current end of
    /// the log, so the range is finite even while writers keep appending)
    pub fn read_range(&self, from: EventId, to: Option<EventId>) -> Result<EventRange<'_>> {
        let to = match to {
            Some(to) => to,
            None => self.latest_event_id()?,
        };
        Ok(EventRange {
            store: self,
            next: if from.0 < 1 { EventId(1) } else { from },
            to,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    /// Up to `limit` events after `cursor`, optionally of one action type
    pub fn read_after(
        &self,
        cursor: EventId,
        action_type: Option<ActionType>,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let rows = self.with_retry("read_after", || match action_type {
            Some(action_type) => {
                db::read_events_of_type(&self.conn(), action_type.as_str(), cursor.next(), limit)
            }
            None => db::read_events(&self.conn(), cursor.next(), EventId(i64::MAX), limit),
        })?;
        rows.into_iter().map(decode_row).collect()
    }

    // ========================================================================
    // CHECKPOINTS & AUDIT
    // ========================================================================

    pub fn save_checkpoint(&self, event_id: EventId, state_json: &str) -> Result<()> {
        self.with_retry("checkpoint", || {
            db::insert_checkpoint(&self.conn(), event_id, state_json)
        })?;
        debug!(event_id = %event_id, bytes = state_json.len(), "saved checkpoint");
        Ok(())
    }

    pub fn latest_checkpoint(&self, at_or_before: EventId) -> Result<Option<(EventId, String)>> {
        self.with_retry("latest_checkpoint", || {
            db::latest_checkpoint(&self.conn(), at_or_before)
        })
    }

    pub fn checkpoint_count(&self) -> Result<i64> {
        self.with_retry("checkpoint_count", || db::checkpoint_count(&self.conn()))
    }

    /// Walk the whole log page by page, recomputing every hash and link
    pub fn verify_chain(&self) -> Result<ChainVerification> {
        let mut verifier = ChainVerifier::new();
        let mut next = EventId(1);
        loop {
            let rows = self.with_retry("verify_chain", || {
                db::read_events(&self.conn(), next, EventId(i64::MAX), self.config.page_size)
            })?;
            let Some(last) = rows.last() else { break };
            next = last.id.next();
            for row in &rows {
                verifier.push(&ChainLink::from(row));
            }
        }
        let result = verifier.finish();
        if !result.valid {
            warn!(errors = result.errors.len(), "event chain verification failed");
        }
        Ok(result)
    }
}

/// Turn a stored row back into a typed event
fn decode_row(row: EventRow) -> Result<Event> {
    let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
        .map_err(|e| {
            GameError::Consistency(format!("event {} has a bad timestamp: {}", row.id, e))
        })?
        .with_timezone(&Utc);
    let action_type: ActionType = row.action_type.parse()?;
    let payload: EventPayload = serde_json::from_str(&row.payload)?;
    if payload.action_type() != action_type {
        return Err(GameError::Consistency(format!(
            "event {} is stored as {} but carries a {} payload",
            row.id,
            action_type,
            payload.action_type()
        )));
    }
    let consequences: Vec<Consequence> = serde_json::from_str(&row.consequences)?;

    Ok(Event {
        id: row.id,
        timestamp,
        game_year: row.game_year,
        action_type,
        actor_id: row.actor_id.map(PlayerId),
        payload,
        consequences,
    })
}

/// Paged, lazy walk over a fixed id range. Restart by asking the store for
/// a new range from [`EventRange::cursor`].
pub struct EventRange<'a> {
    store: &'a EventStore,
    next: EventId,
    to: EventId,
    buffer: VecDeque<Event>,
    exhausted: bool,
}

impl EventRange<'_> {
    /// Id of the next event this range would yield
    pub fn cursor(&self) -> EventId {
        self.buffer.front().map(|e| e.id).unwrap_or(self.next)
    }

    pub fn end(&self) -> EventId {
        self.to
    }

    fn fill(&mut self) -> Result<()> {
        let (next, to, page) = (self.next, self.to, self.store.config.page_size);
        let rows = self
            .store
            .with_retry("read_range", || db::read_events(&self.store.conn(), next, to, page))?;
        match rows.last() {
            Some(last) => self.next = last.id.next(),
            None => self.exhausted = true,
        }
        for row in rows {
            self.buffer.push_back(decode_row(row)?);
        }
        Ok(())
    }
}

impl Iterator for EventRange<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if self.next > self.to {
                self.exhausted = true;
            } else if let Err(err) = self.fill() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventPayload;
    use crate::memory::{Fact, FactKind};
    use tempfile::tempdir;

    fn store() -> EventStore {
        let store = EventStore::in_memory(&StoreConfig::default(), &RetryPolicy::default()).unwrap();
        store.seed_genesis(1900).unwrap();
        store
    }

    fn register(id: &str) -> NewEvent {
        NewEvent::new(
            1900,
            None,
            EventPayload::PlayerRegistered {
                player_id: id.into(),
                name: format!("Player {}", id),
            },
        )
    }

    fn generate(id: &str) -> NewEvent {
        NewEvent::new(
            1900,
            None,
            EventPayload::ScholarGenerated {
                scholar_id: id.into(),
                name: format!("Dr. {}", id),
                seed: 7,
            },
        )
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let store = store();
        let a = store.append(register("p1")).unwrap();
        let b = store.append(register("p2")).unwrap();
        assert_eq!(a, EventId(1));
        assert_eq!(b, EventId(2));
        assert_eq!(store.latest_event_id().unwrap(), EventId(2));
    }

    #[test]
    fn test_append_then_read_back() {
        let store = store();
        let event = register("p1");
        let id = store.append(event.clone()).unwrap();

        let read = store.get(id).unwrap();
        assert_eq!(read.payload, event.payload);
        assert_eq!(read.timestamp, event.timestamp);
        assert_eq!(read.action_type, ActionType::PlayerRegistered);
        assert!(matches!(store.get(EventId(99)), Err(GameError::NotFound(_))));
    }

    #[test]
    fn test_idempotency_key_appends_once() {
        let store = store();
        let first = store
            .append(register("p1").with_idempotency_key(Some("cmd-1".into())))
            .unwrap();
        let second = store
            .append(register("p1").with_idempotency_key(Some("cmd-1".into())))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.latest_event_id().unwrap(), EventId(1));
        assert_eq!(store.find_idempotent("cmd-1").unwrap(), Some(first));
    }

    #[test]
    fn test_missing_prerequisite_is_ordering_error() {
        let store = store();
        let recruit = NewEvent::new(
            1900,
            None,
            EventPayload::ScholarRecruited {
                scholar_id: "s1".into(),
                player_id: "p1".into(),
            },
        );
        assert!(matches!(store.append(recruit), Err(GameError::Ordering(_))));
        assert_eq!(store.latest_event_id().unwrap(), EventId::ZERO);
    }

    #[test]
    fn test_duplicate_creation_is_validation_error() {
        let store = store();
        store.append(register("p1")).unwrap();
        assert!(matches!(
            store.append(register("p1")),
            Err(GameError::Validation(_))
        ));
    }

    #[test]
    fn test_first_year_needs_genesis() {
        let store = store();
        let advance = |year| NewEvent::new(year, None, EventPayload::YearAdvanced { year });

        store.append(advance(1901)).unwrap();
        assert!(matches!(store.append(advance(1901)), Err(GameError::Validation(_))));
        assert!(matches!(store.append(advance(1903)), Err(GameError::Ordering(_))));
        store.append(advance(1902)).unwrap();
    }

    #[test]
    fn test_schema_failure_never_reaches_the_log() {
        let store = store();
        let bad = NewEvent::new(
            1900,
            None,
            EventPayload::PlayerRegistered {
                player_id: "p1".into(),
                name: "".into(),
            },
        );
        assert!(matches!(store.append(bad), Err(GameError::Validation(_))));
        assert_eq!(store.latest_event_id().unwrap(), EventId::ZERO);
    }

    #[test]
    fn test_read_range_is_lazy_and_paged() {
        let config = StoreConfig {
            page_size: 2,
            ..StoreConfig::default()
        };
        let store = EventStore::in_memory(&config, &RetryPolicy::default()).unwrap();
        for i in 0..5 {
            store.append(register(&format!("p{}", i))).unwrap();
        }

        let ids: Vec<i64> = store
            .read_range(EventId(2), Some(EventId(4)))
            .unwrap()
            .map(|e| e.unwrap().id.0)
            .collect();
        assert_eq!(ids, vec![2, 3, 4]);

        // Open-ended ranges stop at the end captured when created
        let mut range = store.read_range(EventId::ZERO, None).unwrap();
        assert_eq!(range.end(), EventId(5));
        range.next().unwrap().unwrap();
        store.append(register("late")).unwrap();
        assert_eq!(range.cursor(), EventId(2));
        assert_eq!(range.count(), 4);

        // Restart from a cursor
        let rest: Vec<_> = store.read_range(EventId(5), None).unwrap().collect();
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn test_read_after_filters_by_type() {
        let store = store();
        store.append(register("p1")).unwrap();
        store.append(generate("s1")).unwrap();
        store.append(register("p2")).unwrap();

        let players = store
            .read_after(EventId::ZERO, Some(ActionType::PlayerRegistered), 10)
            .unwrap();
        assert_eq!(players.iter().map(|e| e.id.0).collect::<Vec<_>>(), vec![1, 3]);

        let after = store.read_after(EventId(1), None, 10).unwrap();
        assert_eq!(after.len(), 2);
    }

    #[test]
    fn test_consequences_round_trip() {
        let store = store();
        store.append(register("p1")).unwrap();
        store.append(generate("s1")).unwrap();
        let fact = Fact {
            year: 1900,
            kind: FactKind::Observation,
            subject: None,
            detail: "noted".into(),
        };
        let event = NewEvent::new(
            1900,
            Some("p1".into()),
            EventPayload::FactRecorded {
                scholar_id: "s1".into(),
                fact: fact.clone(),
            },
        )
        .with_consequences(vec![Consequence::Feeling {
            scholar_id: "s1".into(),
            subject: crate::types::Subject::Player("p1".into()),
            delta: 0.1,
        }]);
        let id = store.append(event.clone()).unwrap();

        let read = store.get(id).unwrap();
        assert_eq!(read.consequences, event.consequences);
        assert_eq!(read.actor_id, Some(PlayerId::from("p1")));
    }

    #[test]
    fn test_verify_chain_detects_tampering() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game.db");
        let store = EventStore::open(&path, &StoreConfig::default(), &RetryPolicy::default()).unwrap();
        for i in 0..4 {
            store.append(register(&format!("p{}", i))).unwrap();
        }
        let clean = store.verify_chain().unwrap();
        assert!(clean.valid, "{:?}", clean.errors);
        assert_eq!(clean.chain_length, 4);

        let raw = Connection::open(&path).unwrap();
        raw.execute(
            "UPDATE events SET payload = replace(payload, 'Player p2', 'Player X') WHERE id = 3",
            [],
        )
        .unwrap();

        let tampered = store.verify_chain().unwrap();
        assert!(!tampered.valid);
        assert!(tampered.errors.iter().any(|e| e.contains("event 3")));
    }

    #[test]
    fn test_checkpoints() {
        let store = store();
        store.save_checkpoint(EventId(3), "{}").unwrap();
        assert_eq!(
            store.latest_checkpoint(EventId(10)).unwrap(),
            Some((EventId(3), "{}".to_string()))
        );
        assert!(store.latest_checkpoint(EventId(2)).unwrap().is_none());
    }

    #[test]
    fn test_contention_exhausts_retry_budget() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game.db");
        let config = StoreConfig {
            busy_timeout_ms: 0,
            ..StoreConfig::default()
        };
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };
        let store = EventStore::open(&path, &config, &retry).unwrap();

        let blocker = Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

        let err = store.append(register("p1")).unwrap_err();
        assert!(matches!(err, GameError::Contention { attempts: 3 }));

        blocker.execute_batch("ROLLBACK").unwrap();
        assert_eq!(store.append(register("p1")).unwrap(), EventId(1));
    }

    #[test]
    fn test_contention_is_retried_until_lock_clears() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game.db");
        let config = StoreConfig {
            busy_timeout_ms: 0,
            ..StoreConfig::default()
        };
        let retry = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
        };
        let store = EventStore::open(&path, &config, &retry).unwrap();

        let blocker = Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();
        let release = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            blocker.execute_batch("COMMIT").unwrap();
        });

        assert_eq!(store.append(register("p1")).unwrap(), EventId(1));
        release.join().unwrap();
    }

    #[test]
    fn test_busy_reads_are_retried() {
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };
        let store = EventStore::in_memory(&StoreConfig::default(), &retry).unwrap();
        store.seed_genesis(1900).unwrap();
        store.append(register("p1")).unwrap();

        // WAL readers are not blocked by another connection's write lock,
        // so the busy reply SQLite gives during WAL recovery is injected.
        let busy = || {
            GameError::Storage(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                None,
            ))
        };
        let mut failures = 2;
        let latest = store
            .with_retry("read", || {
                if failures > 0 {
                    failures -= 1;
                    return Err(busy());
                }
                db::latest_event_id(&store.conn())
            })
            .unwrap();
        assert_eq!(latest, EventId(1));
        assert_eq!(failures, 0);

        let err = store
            .with_retry("read", || -> Result<EventId> { Err(busy()) })
            .unwrap_err();
        assert!(matches!(err, GameError::Contention { attempts: 3 }));
    }

    #[test]
    fn test_racing_resolutions_produce_one_event() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game.db");
        let a = EventStore::open(&path, &StoreConfig::default(), &RetryPolicy::default()).unwrap();
        let b = EventStore::open(&path, &StoreConfig::default(), &RetryPolicy::default()).unwrap();
        a.append(register("p1")).unwrap();
        a.append(NewEvent::new(
            1900,
            None,
            EventPayload::TheorySubmitted {
                theory_id: "t1".into(),
                player_id: "p1".into(),
                claim: "The moon is hollow".into(),
                confidence: crate::types::Confidence::Certain,
            },
        ))
        .unwrap();

        let resolve = |verified| {
            NewEvent::new(
                1900,
                None,
                EventPayload::TheoryResolved {
                    theory_id: "t1".into(),
                    verified,
                    reputation_delta: if verified { 5 } else { -7 },
                },
            )
        };

        let handles: Vec<_> = [(a, true), (b, false)]
            .into_iter()
            .map(|(store, verified)| std::thread::spawn(move || store.append(resolve(verified))))
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(GameError::Validation(_)))));
    }
}
