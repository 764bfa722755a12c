//! # Arena Server Library
//!
//! This library provides the authoritative server for a grid-based multiplayer
//! bomb arena. Up to four players connect over websockets, wait in a lobby
//! mini-game, then play rounds of the main game until one player is left
//! standing. All game logic decisions are made here; clients render whatever
//! the server broadcasts.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server runs the definitive version of movement, bombs, flames, walls
//! and power-ups. Clients only send held keys, never positions.
//!
//! ### Client Management
//! Handles the complete lifecycle of client connections including:
//! - Websocket upgrade and framing
//! - Seat assignment and nickname validation
//! - Heartbeat pings and timeout cleanup
//! - Points tracking across rounds
//!
//! ### State Broadcasting
//! Every main-game tick sends a full player snapshot plus only the entity
//! changes that happened since the previous tick. Static walls are sent once
//! at round start.
//!
//! ## Architecture Design
//!
//! ### Single Owner Event Loop
//! One task owns the [`arena::Arena`] and processes socket events, ticks and
//! timers sequentially. Connection tasks never touch game state; they only
//! decode frames and forward them over a channel.
//!
//! ### Time Injection
//! Everything below the network layer takes the current `Instant` as an
//! argument and reports its effects through an [`outbox::Outbox`]. Timers,
//! ticks and the session lifecycle can therefore be driven deterministically
//! from tests without sockets or sleeps.
//!
//! ## Module Organization
//!
//! ### Codec Module (`codec`)
//! Hand-rolled websocket handshake and frame encoding/decoding.
//!
//! ### Client Manager Module (`client_manager`)
//! Connection registry: seats, nicknames, held inputs, points and pongs.
//!
//! ### Session Module (`session`)
//! Lobby timer, countdown and end sequence state machine.
//!
//! ### Game Modules (`game`, `mini_game`, `level`, `entity`, `physics`, `delta`)
//! - Level generation and the tile grid
//! - Players, walls, bombs, flames and power-ups
//! - Axis-separated collision with sliding
//! - Per-tick change tracking for delta broadcasts
//!
//! ### Scheduler Module (`scheduler`)
//! Cancellable one-shot timers used for fuses, flames, collapses and the
//! session timers.
//!
//! ### Network Module (`network`)
//! TCP accept loop, per-connection reader and writer tasks, and the main
//! `tokio::select!` loop tying sockets to the arena.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ArenaConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Bind the listener with default lobby and tick timings
//!     let mut server = Server::new("127.0.0.1:8080", ArenaConfig::default()).await?;
//!
//!     // Runs until the process is stopped:
//!     // - Accepts websocket clients and assigns seats on join
//!     // - Ticks the mini-game or main game at its own rate
//!     // - Fires lobby, countdown and gameplay timers
//!     // - Pings clients and drops the ones that stop answering
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod arena;
pub mod client_manager;
pub mod codec;
pub mod config;
pub mod delta;
pub mod entity;
pub mod error;
pub mod game;
pub mod level;
pub mod mini_game;
pub mod network;
pub mod outbox;
pub mod physics;
pub mod scheduler;
pub mod session;
