//! # Session Host Library
//!
//! This library provides the authoritative host for a shared 2D space where
//! players float around inside bubbles and pick up coins. It owns the
//! canonical world state, applies client intents, and keeps every connected
//! client synchronized with a fixed-rate snapshot broadcast.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! The host holds the definitive player positions, bubble radii and coin
//! ownership. Clients only send intents; every value is validated and
//! clamped here before it becomes part of the world.
//!
//! ### Session Management
//! Handles the complete lifecycle of client connections including:
//! - Connection establishment and player id assignment
//! - Welcome frame with world bounds and the coin list
//! - Disconnection handling and cleanup
//!
//! ### State Broadcasting
//! Regularly transmits the current world to all connected clients. Discrete
//! events (joins, collections, chat, departures) additionally request an
//! immediate broadcast so clients see them without waiting for the next tick.
//!
//! ### Signaling Relay
//! Forwards opaque `signal` payloads between two clients so they can set up
//! a direct peer channel. The host never looks inside the payload.
//!
//! ## Architecture Design
//!
//! ### Task Layout
//! The host runs on the tokio runtime with:
//! - **Accept Loop**: accepts TCP connections and performs the WebSocket upgrade
//! - **Connection Readers**: one per connection, handling frames in arrival order
//! - **Connection Writers**: one per connection, draining a bounded outbound queue
//! - **Broadcaster**: a single task producing every `state` frame
//!
//! ### Shared State
//! The world is a single `GameState` shared by reference. Players and coins
//! are locked per entry, so unrelated players never wait on each other and a
//! snapshot never observes a half-applied update.
//!
//! ## Module Organization
//!
//! - `game`: world state store (players, coins, clamping, proximity check)
//! - `client_manager`: connection registry and best-effort delivery
//! - `dispatcher`: inbound message decoding and routing
//! - `broadcaster`: periodic and triggered snapshot fan-out
//! - `session`: connect/disconnect lifecycle
//! - `network`: TCP listener and WebSocket transport
//! - `config`: startup configuration
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!
//!     // Runs the broadcaster and accepts connections forever
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod client_manager;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod game;
pub mod network;
pub mod session;
pub mod utils;
