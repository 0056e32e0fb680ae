//! Connection registry for the session host
//!
//! This module tracks which live connection belongs to which player and
//! holds the transmit handle used to reach it:
//! - Player id allocation from a monotonic counter (ids are never reused)
//! - Registration on connect and removal on disconnect
//! - Best-effort delivery to one connection or to all of them
//!
//! Delivery never waits on a socket. Each connection owns a bounded
//! outbound queue drained by its own writer task; the registry only pushes
//! into that queue, so a slow client loses frames instead of stalling the
//! broadcaster or other connections.

use crate::utils::player_id;
use log::{debug, info};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Frames buffered per connection before new ones are dropped
pub const OUTBOUND_QUEUE_SIZE: usize = 64;

/// Result of pushing one frame to a connection's outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The frame is queued for the writer task
    Queued,
    /// The queue is full, the frame was dropped
    Full,
    /// The connection's writer has gone away
    Closed,
    /// No connection is registered under that id
    Unknown,
}

/// A registered connection
#[derive(Debug)]
pub struct Client {
    /// Id of the player this connection controls
    pub id: String,
    /// Remote address, for logging
    pub addr: SocketAddr,
    pub connected_at: Instant,
    sender: mpsc::Sender<Message>,
}

impl Client {
    pub fn new(id: String, addr: SocketAddr, sender: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            sender,
        }
    }

    /// Queues a frame without waiting.
    pub fn send(&self, message: Message) -> SendOutcome {
        match self.sender.try_send(message) {
            Ok(()) => SendOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => SendOutcome::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Maps player ids to their live connections
pub struct ClientManager {
    clients: HashMap<String, Client>,
    /// Sequence number for the next player id
    next_client_id: u64,
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientManager {
    /// Creates an empty registry. Player ids start from `p1`.
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
        }
    }

    /// Hands out a fresh player id.
    pub fn allocate_id(&mut self) -> String {
        let id = player_id(self.next_client_id);
        self.next_client_id += 1;
        id
    }

    /// Registers a connection under a player id.
    ///
    /// Returns false and leaves the registry untouched if the id is
    /// already taken.
    pub fn add_client(
        &mut self,
        id: &str,
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
    ) -> bool {
        if self.clients.contains_key(id) {
            return false;
        }

        info!("Client {} connected from {}", id, addr);
        self.clients
            .insert(id.to_string(), Client::new(id.to_string(), addr, sender));
        true
    }

    /// Removes a connection. Dropping the stored sender ends the
    /// connection's writer task once its queue drains.
    pub fn remove_client(&mut self, id: &str) -> bool {
        if let Some(client) = self.clients.remove(id) {
            info!(
                "Client {} disconnected after {:.1}s",
                client.id,
                client.connected_at.elapsed().as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    /// Queues a frame for a single connection.
    pub fn send_to(&self, id: &str, message: Message) -> SendOutcome {
        match self.clients.get(id) {
            Some(client) => {
                let outcome = client.send(message);
                if outcome != SendOutcome::Queued {
                    debug!("Frame to client {} not queued: {:?}", id, outcome);
                }
                outcome
            }
            None => SendOutcome::Unknown,
        }
    }

    /// Queues the same text frame for every connection.
    ///
    /// Connections that are closing or backed up are skipped. Returns the
    /// number of connections the frame was queued for.
    pub fn broadcast(&self, text: &str) -> usize {
        let mut delivered = 0;

        for client in self.clients.values() {
            match client.send(Message::Text(text.to_string())) {
                SendOutcome::Queued => delivered += 1,
                outcome => debug!("Skipped broadcast to client {}: {:?}", client.id, outcome),
            }
        }

        delivered
    }

    /// Returns the number of registered connections
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no connections are registered
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
