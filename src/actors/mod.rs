//! Actor-based runtime of the monitoring service
//!
//! Each actor runs as an independent async task and talks to the others via
//! Tokio channels. The fleet actor owns all state; everything else works
//! through a [`FleetHandle`](fleet::FleetHandle) or reacts to its events.
//!
//! ## Architecture Overview
//!
//! ```text
//!    ┌───────────────┐  ┌────────────────────┐  ┌──────────────┐
//!    │ SamplerActor  │  │ BlackScreenActor   │  │ RemoteControl│
//!    └───────┬───────┘  └─────────┬──────────┘  └──────┬───────┘
//!            │ commands           │                    │
//!            └──────────┬─────────┴────────────────────┘
//!                       ▼
//!              ┌─────────────────┐
//!              │   FleetActor    │  (single writer)
//!              └────────┬────────┘
//!                       │ broadcast<FleetEvent>
//!        ┌──────────────┼───────────────────┐
//!        ▼              ▼                   ▼
//! ┌──────────────┐ ┌──────────────┐ ┌──────────────────┐
//! │FailoverActor │ │NotifierActor │ │ PersistenceActor │
//! └──────────────┘ └──────────────┘ └──────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Events**: The fleet actor publishes every change on a broadcast channel
//! 3. **Request/Response**: oneshot channels for synchronous queries

use std::time::Duration;

pub mod black_screen;
pub mod failover;
pub mod fleet;
pub mod messages;
pub mod notifier;
pub mod persistence;
pub mod sampler;

/// Shortest ticker period an actor accepts; `tokio::time::interval` panics on zero
pub(crate) const MIN_TICK: Duration = Duration::from_millis(10);
