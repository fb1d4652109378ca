//! The Great Work - game-state engine
//!
//! Event-sourced state for a game of academic rivalry: players stake their
//! reputation on theories, send scholars on expeditions and poach each
//! other's staff. Every action is an immutable event in a hash-chained
//! SQLite log; the world is a deterministic fold over that log.
//!
//! # Guarantees
//!
//! - **Replayable**: any entity can be reconstructed as of any event id
//! - **Deterministic**: every draw is seeded from the campaign seed and
//!   recorded in its event, so replay never re-rolls
//! - **Tamper-evident**: each event hashes its content and its predecessor
//! - **Idempotent**: resubmitting with the same key appends nothing
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use great_work::{ActionRequest, EngineConfig, EntityKind, GameEngine};
//!
//! let engine = GameEngine::open(&db_path, EngineConfig::load(&config_path)?)?;
//!
//! let id = engine.submit_action(
//!     None,
//!     ActionRequest::RegisterPlayer { player_id: None, name: "Ada".into() },
//!     Some("discord-msg-1"),
//! )?;
//!
//! let snapshot = engine.get_projection(EntityKind::Player, "p1")?;
//! let then = engine.replay(&snapshot.entity, id)?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Command handlers (bot, CLI, web)            │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ ActionRequest / raw payload
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │  GameEngine                                          │
//! │  actions  → validate, resolve, derive consequences   │
//! │  store    → append (hash chain, causal keys)         │
//! │  projection cache → fold, checkpoint, replay         │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod generation;
pub mod memory;
pub mod projection;
pub mod provenance;
pub mod resolution;
pub mod store;
pub mod subscription;
pub mod types;

// Engine
pub use engine::GameEngine;
pub use config::{EngineConfig, Rules};
pub use error::{GameError, Result};

// Events
pub use actions::ActionRequest;
pub use events::{ActionType, Consequence, Event, EventPayload, NewEvent};
pub use store::EventStore;
pub use subscription::Subscription;

// Projections
pub use projection::{EntitySnapshot, EntityState, GameState};
pub use provenance::ChainVerification;
pub use types::*;
