//! # Block World Server Library
//!
//! This library implements a server for the classic block-world protocol
//! (revision 7). Players connect over TCP, download the level, then edit
//! blocks, move and chat in one shared world that is saved to disk
//! periodically.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative World
//! The server owns the only writable copy of the block grid. Clients send
//! edit requests; the server applies them and tells every connected client
//! what changed, the requester included.
//!
//! ### Player Management
//! Handles the lifecycle of each connection:
//! - Identification handshake and protocol version check
//! - Slot assignment in a fixed table of 255 player ids
//! - Level transfer as gzip-compressed chunks
//! - Despawn and leave notices when the connection ends
//!
//! ### Persistence
//! The world is stored as a `ClassicWorld` compound tree. Saves go through a
//! scratch file and a temp file so an interrupted save never leaves an
//! unreadable world behind.
//!
//! ## Architecture Design
//!
//! ### Task Per Connection
//! Each connection runs a read loop in its own task and owns a
//! [`writer::SessionWriter`] whose flush task batches outbound packets.
//! Connection tasks only talk to each other through the shared
//! [`world::World`].
//!
//! ### Two Locks, Never Nested
//! The block grid sits behind a read/write lock and the player table behind
//! a mutex. No operation holds both, and broadcasts run under the player
//! lock so nobody registered misses one.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! The player slot table and fan-out to registered players.
//!
//! ### World Module (`world`)
//! Block grid, player operations, level streaming and saving.
//!
//! ### Network Module (`network`)
//! TCP accept loop, the session state machine and the autosave task.
//!
//! ### Supporting Modules
//! - `writer`: batched, interval-flushed output per connection
//! - `persistence`: world file layout, save cycle and crash recovery
//! - `commands`: chat commands (`ping`, `tp`, `fill`)
//! - `config`: command-line and environment settings
//! - `error`: the server error type
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::Config;
//! use server::network::Server;
//! use server::persistence;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let world = Arc::new(persistence::load_or_create(&config)?);
//!
//!     // Accepts players and autosaves until the future is dropped
//!     Server::bind(config, world).await?.run().await;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod commands;
pub mod config;
pub mod error;
pub mod network;
pub mod persistence;
pub mod world;
pub mod writer;

pub use error::{Result, ServerError};
