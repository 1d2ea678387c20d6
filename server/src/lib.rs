//! # Traitors Game Server Library
//!
//! This library provides the authoritative server for the traitors party
//! game. A roster of players is secretly split into a small traitor faction
//! and a faithful majority; the game alternates private nights and public
//! roundtables until one faction wins. The server is the only place where
//! roles, liveness and phase are known for certain.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Game State
//! Who is alive, who is a traitor and which phase the game is in are decided
//! here and nowhere else. Clients only ever see the slice of that state they
//! are entitled to: their own role, the public roster, and the outcome of
//! each transition.
//!
//! ### Continuity Across Reconnects
//! Every player receives an opaque token when joining. Presenting it from a
//! new connection rebinds the same player record, keeping faction, liveness
//! and score. Records and game state are persisted so a restarted server
//! resumes where it stopped.
//!
//! ### Privileged Control
//! A master of ceremonies logs in with a shared secret to advance days,
//! reset the game, inspect state and run scoring side games.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! The network loop owns the [`authority::SessionAuthority`] and processes
//! one inbound message at a time. Every read-then-write on the game runs as
//! a unit, including reconnects, so there are no locks around game state.
//!
//! ### Validate, Then Mutate
//! Each operation checks all of its preconditions before touching anything.
//! A refused action leaves the game exactly as it was and produces a typed
//! rejection for the sender.
//!
//! ### Fire-and-Forget Side Effects
//! The authority returns deliveries and persistence operations instead of
//! performing I/O. The loop hands them to a sender task and a persistence
//! worker; a storage failure is logged and gameplay continues.
//!
//! ## Module Organization
//!
//! ### Roster Module (`roster`)
//! Player records indexed by id, with secondary indices by connection and
//! by reconnection token.
//!
//! ### Roles Module (`roles`)
//! Seedable random split of the roster into traitors and faithful.
//!
//! ### Game Module (`game`)
//! The phase engine: start, day advance, eliminations and win conditions.
//! The `invitation`, `night` and `votes` modules extend it with the
//! recruitment offer, the nightly kill and the roundtable vote.
//!
//! ### Clock Module (`clock`)
//! Wall-clock access behind a trait, and the conclave window during which
//! the traitors may kill.
//!
//! ### Authority Module (`authority`)
//! Action dispatch, admin sessions, chat, scoring tests and the mapping from
//! engine events to client messages.
//!
//! ### Persistence Module (`persistence`)
//! Snapshot storage behind a trait, with in-memory and JSON-file stores.
//!
//! ### Network and Client Manager Modules (`network`, `client_manager`)
//! UDP transport, connection tracking and timeouts.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::authority::SessionAuthority;
//! use server::clock::SystemClock;
//! use server::config::GameConfig;
//! use server::game::Game;
//! use server::network::Server;
//! use server::persistence::MemoryStore;
//! use server::roles::RoleAssigner;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = GameConfig::default();
//!     let roles = RoleAssigner::from_entropy(config.traitor_count, config.min_players);
//!     let game = Game::new(config, roles, Arc::new(SystemClock));
//!
//!     let mut server = Server::new(
//!         "127.0.0.1:4000",
//!         64,
//!         Duration::from_secs(30),
//!         SessionAuthority::new(game, "admin123"),
//!         Arc::new(MemoryStore::new()),
//!     )
//!     .await?;
//!
//!     // Runs until a shutdown message arrives
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The server uses internal async tasks that handle:
//! - **Network Receiver**: decodes datagrams and queues them for the loop
//! - **Network Sender**: writes outgoing packets and broadcasts
//! - **Timeout Checker**: turns silent connections into disconnects
//! - **Persistence Worker**: applies storage operations in order

pub mod authority;
pub mod client_manager;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod invitation;
pub mod network;
pub mod night;
pub mod persistence;
pub mod roles;
pub mod roster;
pub mod votes;
