//! Game engine: the entry point command handlers talk to
//!
//! Control flow for every action:
//! 1. idempotency fast path (a known key returns its original event id)
//! 2. validate against the current projection
//! 3. resolve (expedition rolls, defection draws) and derive consequences
//! 4. append atomically
//! 5. fold into the projection cache, checkpointing every N events
//!
//! The projection cache is a discardable `Mutex<GameState>` that catches up
//! by reading events after its offset. Replay and audit never touch it.

use crate::actions::{self, ActionRequest};
use crate::config::EngineConfig;
use crate::error::{GameError, Result};
use crate::events::{ActionType, Event, EventPayload, NewEvent};
use crate::projection::{EntitySnapshot, GameState};
use crate::provenance::ChainVerification;
use crate::store::EventStore;
use crate::subscription::Subscription;
use crate::types::{EntityKind, EntityRef, EventId, PlayerId};
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub struct GameEngine {
    store: Arc<EventStore>,
    config: EngineConfig,
    cache: Mutex<GameState>,
}

impl GameEngine {
    /// Open the campaign database at `path`, creating it if needed
    pub fn open(path: &Path, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = EventStore::open(path, &config.store, &config.retry)?;
        Self::with_store(Arc::new(store), config)
    }

    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = EventStore::in_memory(&config.store, &config.retry)?;
        Self::with_store(Arc::new(store), config)
    }

    /// Wrap an existing store (several engines may share one file)
    pub fn with_store(store: Arc<EventStore>, config: EngineConfig) -> Result<Self> {
        store.seed_genesis(config.campaign.start_year)?;
        let engine = Self {
            cache: Mutex::new(GameState::new(config.campaign.start_year)),
            store,
            config,
        };
        let latest = engine.store.latest_event_id()?;
        let seed = engine.seed_state(latest)?;
        debug!(offset = %seed.applied_through, "projection cache seeded");
        *engine.lock_cache() = seed;
        Ok(engine)
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // SUBMISSION
    // ========================================================================

    /// Submit a typed action on behalf of `actor`
    pub fn submit_action(
        &self,
        actor: Option<&PlayerId>,
        request: ActionRequest,
        idempotency_key: Option<&str>,
    ) -> Result<EventId> {
        if let Some(id) = self.already_applied(idempotency_key)? {
            return Ok(id);
        }
        let payload = {
            let state = self.caught_up()?;
            request.into_payload(&state, actor, self.config.campaign.seed)?
        };
        self.commit(actor, payload, idempotency_key)
    }

    /// Submit a pre-built payload by action type name. The payload JSON is
    /// the variant's fields (the `data` half of a stored payload).
    pub fn submit_raw(
        &self,
        action_type: &str,
        actor_id: Option<&str>,
        payload_json: &str,
        idempotency_key: Option<&str>,
    ) -> Result<EventId> {
        if let Some(id) = self.already_applied(idempotency_key)? {
            return Ok(id);
        }
        let action_type: ActionType = action_type.parse()?;
        let data: serde_json::Value = serde_json::from_str(payload_json)
            .map_err(|e| GameError::Validation(format!("payload is not JSON: {}", e)))?;
        let payload: EventPayload =
            serde_json::from_value(json!({ "type": action_type.as_str(), "data": data }))
                .map_err(|e| {
                    GameError::Validation(format!("bad {} payload: {}", action_type, e))
                })?;
        let actor = actor_id.map(PlayerId::from);
        self.commit(actor.as_ref(), payload, idempotency_key)
    }

    fn already_applied(&self, idempotency_key: Option<&str>) -> Result<Option<EventId>> {
        let Some(key) = idempotency_key else {
            return Ok(None);
        };
        let existing = self.store.find_idempotent(key)?;
        if let Some(id) = existing {
            debug!(idempotency_key = key, event_id = %id, "action already applied");
        }
        Ok(existing)
    }

    fn commit(
        &self,
        actor: Option<&PlayerId>,
        payload: EventPayload,
        idempotency_key: Option<&str>,
    ) -> Result<EventId> {
        payload.validate()?;
        let event = {
            let state = self.caught_up()?;
            actions::check_payload(&state, actor, &payload, self.config.campaign.seed)?;
            let consequences = actions::consequences(&state, &payload);
            actions::check_consequences(&state, &payload, &consequences)?;
            let game_year = match &payload {
                EventPayload::YearAdvanced { year } => *year,
                _ => state.current_year,
            };
            NewEvent::new(game_year, actor.cloned(), payload)
                .with_consequences(consequences)
                .with_idempotency_key(idempotency_key.map(String::from))
        };

        let action_type = event.action_type();
        let id = self.store.append(event)?;
        match action_type {
            ActionType::YearAdvanced => info!(event_id = %id, "year advanced"),
            _ => info!(event_id = %id, %action_type, "action submitted"),
        }

        self.maybe_checkpoint(id);
        Ok(id)
    }

    // ========================================================================
    // PROJECTIONS
    // ========================================================================

    fn lock_cache(&self) -> MutexGuard<'_, GameState> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // The cache is only ever rebuilt from the log; start over
                warn!("projection cache poisoned, rebuilding from genesis");
                let mut guard = poisoned.into_inner();
                *guard = GameState::new(self.config.campaign.start_year);
                self.cache.clear_poison();
                guard
            }
        }
    }

    /// Lock the cache after folding in everything appended since its offset
    fn caught_up(&self) -> Result<MutexGuard<'_, GameState>> {
        let mut state = self.lock_cache();
        let from = state.applied_through.next();
        let mut folded = 0usize;
        for event in self.store.read_range(from, None)? {
            state.apply(&event?, &self.config.rules)?;
            folded += 1;
        }
        if folded > 0 {
            debug!(folded, offset = %state.applied_through, "projection cache caught up");
        }
        Ok(state)
    }

    /// Current state of one entity
    pub fn get_projection(&self, kind: EntityKind, id: &str) -> Result<EntitySnapshot> {
        self.caught_up()?.snapshot(&EntityRef::new(kind, id))
    }

    /// Full current projection
    pub fn state(&self) -> Result<GameState> {
        Ok(self.caught_up()?.clone())
    }

    // ========================================================================
    // REPLAY & AUDIT
    // ========================================================================

    /// Starting point for a fold up to `as_of`: the newest usable checkpoint,
    /// or the empty campaign.
    fn seed_state(&self, as_of: EventId) -> Result<GameState> {
        match self.store.latest_checkpoint(as_of)? {
            Some((offset, json)) => {
                let state = GameState::from_json(&json)?;
                if state.applied_through != offset {
                    return Err(GameError::Consistency(format!(
                        "checkpoint at {} holds state for offset {}",
                        offset, state.applied_through
                    )));
                }
                Ok(state)
            }
            None => Ok(GameState::new(self.config.campaign.start_year)),
        }
    }

    fn fold_onto(&self, mut state: GameState, as_of: EventId) -> Result<GameState> {
        let from = state.applied_through.next();
        if from <= as_of {
            for event in self.store.read_range(from, Some(as_of))? {
                state.apply(&event?, &self.config.rules)?;
            }
        }
        Ok(state)
    }

    /// Whole state as it stood after event `as_of`, resuming from the newest
    /// checkpoint at or before it
    pub fn replay_state(&self, as_of: EventId) -> Result<GameState> {
        let seed = self.seed_state(as_of)?;
        self.fold_onto(seed, as_of)
    }

    /// Same as `replay_state` but folds from genesis, ignoring checkpoints
    pub fn rebuild(&self, as_of: EventId) -> Result<GameState> {
        self.fold_onto(GameState::new(self.config.campaign.start_year), as_of)
    }

    /// One entity as it stood after event `as_of`
    pub fn replay(&self, entity: &EntityRef, as_of: EventId) -> Result<EntitySnapshot> {
        let latest = self.store.latest_event_id()?;
        if as_of > latest {
            return Err(GameError::NotFound(format!(
                "event {} (log ends at {})",
                as_of, latest
            )));
        }
        self.replay_state(as_of)?.snapshot(entity)
    }

    /// Store the current projection at its offset
    pub fn checkpoint(&self) -> Result<EventId> {
        let state = self.caught_up()?;
        let json = state.to_json()?;
        self.store.save_checkpoint(state.applied_through, &json)?;
        info!(offset = %state.applied_through, "checkpoint written");
        Ok(state.applied_through)
    }

    /// Automatic checkpoint after an append. The event is already durable,
    /// so a failure here is logged and the next interval tries again.
    fn maybe_checkpoint(&self, appended: EventId) {
        let interval = self.config.store.checkpoint_interval;
        if interval == 0 || appended.0 % interval as i64 != 0 {
            return;
        }
        if let Err(e) = self.checkpoint() {
            warn!(error = %e, event_id = %appended, "automatic checkpoint failed");
        }
    }

    pub fn verify_chain(&self) -> Result<ChainVerification> {
        self.store.verify_chain()
    }

    /// Events `from..=to` (to the end of the log when `to` is None)
    pub fn events(&self, from: EventId, to: Option<EventId>) -> Result<Vec<Event>> {
        self.store.read_range(from, to)?.collect()
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    /// Every event from the start of the log onward
    pub fn subscribe(&self, action_type: Option<ActionType>) -> Subscription {
        self.subscribe_from(EventId::ZERO, action_type)
    }

    /// Events after `cursor` (a previous subscription's `cursor()`)
    pub fn subscribe_from(&self, cursor: EventId, action_type: Option<ActionType>) -> Subscription {
        Subscription::new(self.store.clone(), action_type, cursor)
    }
}
