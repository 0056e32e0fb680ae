//! Per-connection session lifecycle.
//!
//! A session moves `Connecting -> Active -> Closed`. Only an active session
//! may mutate the world, and `Closed` is final: the player record and the
//! registry entry are gone and never come back under the same id.

use crate::broadcaster::BroadcastTrigger;
use crate::client_manager::ClientManager;
use crate::game::GameState;
use log::{error, info};
use shared::ServerMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

#[derive(Debug)]
pub struct Session {
    player_id: String,
    addr: SocketAddr,
    state: SessionState,
}

impl Session {
    fn new(player_id: String, addr: SocketAddr) -> Self {
        Self {
            player_id,
            addr,
            state: SessionState::Connecting,
        }
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    fn activate(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Active;
        }
    }
}

/// Opens and closes sessions, keeping players and registered connections
/// in one-to-one correspondence.
pub struct Lifecycle {
    world: Arc<GameState>,
    clients: Arc<RwLock<ClientManager>>,
    trigger: BroadcastTrigger,
}

impl Lifecycle {
    pub fn new(
        world: Arc<GameState>,
        clients: Arc<RwLock<ClientManager>>,
        trigger: BroadcastTrigger,
    ) -> Self {
        Self {
            world,
            clients,
            trigger,
        }
    }

    /// Creates the player for a new connection and registers its queue.
    ///
    /// The welcome frame is queued before the connection becomes visible to
    /// the broadcaster, so it is always the first frame the client gets.
    pub async fn open(&self, addr: SocketAddr, sender: mpsc::Sender<Message>) -> Session {
        let mut clients = self.clients.write().await;

        let id = clients.allocate_id();
        let mut session = Session::new(id.clone(), addr);

        self.world.create_player(&id);

        let welcome = ServerMessage::Welcome {
            id: id.clone(),
            world: self.world.bounds(),
            coins: self.world.coins(),
        };
        match serde_json::to_string(&welcome) {
            Ok(text) => {
                if sender.try_send(Message::Text(text)).is_err() {
                    error!("Failed to queue welcome for {}", id);
                }
            }
            Err(e) => error!("Failed to serialize welcome for {}: {}", id, e),
        }

        clients.add_client(&id, addr, sender);
        drop(clients);

        session.activate();
        info!("Session {} active ({} connected)", id, self.world.player_count());
        self.trigger.fire();

        session
    }

    /// Tears a session down. Calling it again on a closed session does
    /// nothing.
    pub async fn close(&self, session: &mut Session) {
        if session.state == SessionState::Closed {
            return;
        }
        session.state = SessionState::Closed;

        {
            let mut clients = self.clients.write().await;
            clients.remove_client(&session.player_id);
            self.world.remove_player(&session.player_id);
        }

        info!("Session {} ({}) closed", session.player_id, session.addr());
        self.trigger.fire();
    }
}
