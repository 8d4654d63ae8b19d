//! # Authoritative Combat Server Library
//!
//! This library provides the authoritative server implementation for the
//! networked arena shooter. It owns the canonical combat state (health,
//! death, status effects, inventories, pickups), decides every outcome on
//! the server, and replicates the results to observing clients.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! A single [`world::World`] per session holds the writable copy of every
//! combat entity. All damage, death, and effect decisions are made here;
//! clients receive snapshots and conform to them. The authority role check
//! at the entry of each mutating operation, not a lock, is what keeps
//! remote processes from writing state.
//!
//! ### Deterministic Outcome Processing
//! Damage flows through a fixed pipeline: invulnerability and liveness
//! preconditions, the game-mode damage adjustment, the health commit, then
//! either the hit-reaction path or the one-shot death sequence. Timed
//! behavior (effect expiry, ragdoll handoff, equip transitions, corpse
//! cleanup) runs as explicit scheduled tasks keyed by entity identity, so
//! removing an entity cancels everything it owns.
//!
//! ### Replication Contract
//! Outcomes reach clients through an explicit snapshot protocol rather
//! than implicit field diffing. Each replicated field has a declared
//! visibility scope (everyone, owner-only, skip-owner), and the last-hit
//! record is additionally windowed: it stops being sent shortly after its
//! last update so late joiners don't replay stale hit reactions.
//!
//! ## Module Organization
//!
//! ### World Module (`world`)
//! The simulation root: entity arenas, possession links, the scheduled
//! task queue, command handling, and per-viewer snapshot building.
//!
//! ### Health Module (`health`)
//! The damage ledger and death state machine: `apply_damage`, the
//! fresh-on-every-attempt `can_die` gate, kill-credit resolution with
//! environmental carryover, and the idempotent death sequence.
//!
//! ### Effects Module (`effects`)
//! Server-authoritative freeze/shrink with mutual exclusion, possession
//! revocation for freeze, and the dead-entity size restoration path.
//!
//! ### Inventory Module (`inventory`)
//! Weapon ownership as an ordered set, the equip transition state machine,
//! and wrap-around weapon cycling.
//!
//! ### Pickup Module (`pickup`)
//! At-most-once claim semantics over pre-spawned weapon instances.
//!
//! ### Network Module (`network`)
//! The tokio UDP event loop: receiver/sender tasks, per-client command
//! queues with sequence deduplication, tick-driven simulation advance, and
//! per-connection state broadcast.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 60Hz tick rate, 16 clients, 4 bots roaming the arena
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16),
//!         16,
//!         4,
//!     ).await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## State Authority
//!
//! The server maintains absolute authority over combat state. Requests
//! arriving from clients (equip, fire, pickup claims) are re-executed here
//! under the authority role and deduplicated by sequence number, so
//! speculative, duplicated, or replayed requests cannot corrupt state.

pub mod arena;
pub mod character;
pub mod client_manager;
pub mod effects;
pub mod game_mode;
pub mod health;
pub mod hit_buffer;
pub mod inventory;
pub mod network;
pub mod pickup;
pub mod presentation;
pub mod tasks;
pub mod world;
