//! # Combat Client Library
//!
//! This library provides the client-side implementation for the networked
//! arena shooter: a replicated local mirror of the authoritative combat
//! world plus the request path back to it.
//!
//! ## Architecture Overview
//!
//! The client never decides combat outcomes. It observes authoritative
//! snapshots, reacts to replicated changes, and forwards every mutating
//! request (equip, fire, pickup claims) to the server as a sequenced
//! command to be re-executed there.
//!
//! ### Hit Record Mirror
//! Each character carries a replicated last-hit record whose serial bumps
//! on every write. The mirror dispatches on serial changes (kill flag to
//! the death reaction, otherwise the hit reaction) using exactly the
//! values carried in the record, never re-derived ones.
//!
//! ### Local Effect Track
//! Freeze and shrink run a client-local cosmetic track (input disable,
//! full-screen overlay, duration timer) that is intentionally independent
//! of the authority-side effect flag. The two tracks tolerate divergence:
//! the local one only governs presentation and input, never authoritative
//! state.
//!
//! ### Eventual Consistency
//! Snapshots arrive over UDP with no ordering guarantee. Stale packets
//! are dropped by tick number, scoped fields keep their last known value
//! when a snapshot omits them, and hit records older than their
//! replication window are simply never sent, so late joiners don't replay
//! stale reactions.
//!
//! ## Module Organization
//!
//! ### Mirror Module (`mirror`)
//! Replicated character views, hit-record dispatch, and the local
//! status-effect track.
//!
//! ### Commands Module (`commands`)
//! Sequence numbering for outgoing requests; the server deduplicates on
//! these numbers, making redundant delivery safe.
//!
//! ### Network Module (`network`)
//! The tokio UDP loop: handshake, state application, command upload, and
//! the local effect timer tick.

pub mod commands;
pub mod mirror;
pub mod network;
