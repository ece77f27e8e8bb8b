//! # Tick Session Server Library
//!
//! This library provides the server side of a tick-synchronized session
//! runtime. Network tasks log players in and out and feed them messages at
//! any time, while a single tick loop advances the simulation at a fixed
//! rate and only ever reads a consistent per-tick snapshot of each player.
//!
//! ## Core Responsibilities
//!
//! ### Live and Snapshot State
//! Every piece of state that network tasks write and simulation code reads
//! lives in a [`dual_state::DualStateCell`]. Writers touch the live side;
//! the tick loop copies live into snapshot once per tick, so everything a
//! tick observes was published at the same instant.
//!
//! ### Session Lifecycle
//! [`lifecycle::SessionLifecycle`] moves a player between offline and
//! online with compare-and-set, so exactly one of several racing logins
//! wins. Each login may bind one [`synchronizer::NetworkSynchronizer`],
//! which is cleared again on logout.
//!
//! ### Players
//! [`player::NetworkedPlayer`] composes an [`entity::EntityCore`] with the
//! lifecycle, tracks unsaved changes and saves them every few ticks. Chat,
//! commands, permissions and persistence go through the collaborators in a
//! [`context::ServerContext`] rather than a global.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Maps peer addresses to sessions and players, enforces the client limit
//! and detects inactive clients.
//!
//! ### Network Module (`network`)
//! Owns the UDP socket and its receiver, sender and timeout tasks, and runs
//! the tick loop:
//! - Decodes datagrams with the shared codec registry
//! - Handles logins, chat, movement and keep-alives
//! - Closes sessions whose stream no longer decodes
//! - Disconnects and saves everyone on shutdown
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:25565".to_string(),
//!         ..ServerConfig::default()
//!     };
//!
//!     // Runs until a shutdown is requested through `server.handle()`
//!     let mut server = Server::new(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod context;
pub mod dual_state;
pub mod entity;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod network;
pub mod player;
pub mod session;
pub mod store;
pub mod synchronizer;
pub mod utils;
pub mod world;

pub use error::{ServerError, SessionError};
pub use player::{ChatCapable, ChatOutcome, Nameable, NetworkedPlayer, PermissionQuery};
