//! Inbound message handling.
//!
//! Every frame is decoded, classified by its `type` and applied to the
//! world on behalf of the sending player. Nothing is ever reported back to
//! the sender: malformed frames, invalid fields and unknown targets all
//! degrade to a no-op.

use crate::broadcaster::BroadcastTrigger;
use crate::client_manager::{ClientManager, SendOutcome};
use crate::game::{GameState, PlayerPatch};
use crate::session::Session;
use log::{debug, error, info};
use serde_json::value::RawValue;
use shared::{
    as_number, as_text, encode_signal, raw_signal_data, truncate_chars, ClientMessage,
    MAX_CHAT_CHARS,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

/// What a frame ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Ignored: unparseable, unknown kind, invalid fields or a miss
    Dropped,
    /// World changed, left for the next periodic broadcast
    Applied,
    /// World changed and an immediate broadcast was requested
    Broadcast,
    /// Signal payload queued for its target
    Relayed,
}

pub struct Dispatcher {
    world: Arc<GameState>,
    clients: Arc<RwLock<ClientManager>>,
    trigger: BroadcastTrigger,
}

impl Dispatcher {
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

    /// Handles one raw frame from `session`.
    pub async fn dispatch(&self, session: &Session, raw: &str) -> DispatchOutcome {
        if !session.is_active() {
            return DispatchOutcome::Dropped;
        }

        let message = match ClientMessage::parse(raw) {
            Some(message) => message,
            None => {
                debug!("Dropped unrecognized frame from {}", session.player_id());
                return DispatchOutcome::Dropped;
            }
        };

        let outcome = self.handle(session.player_id(), message, raw).await;
        if outcome == DispatchOutcome::Broadcast {
            self.trigger.fire();
        }
        outcome
    }

    async fn handle(&self, from: &str, message: ClientMessage, raw: &str) -> DispatchOutcome {
        match message {
            ClientMessage::Join { name, x, y } => {
                let patch = PlayerPatch {
                    name: as_text(&name).map(str::to_string),
                    x: as_number(&x),
                    y: as_number(&y),
                    bubble_radius: None,
                };

                if self.world.update_player(from, patch) {
                    DispatchOutcome::Broadcast
                } else {
                    DispatchOutcome::Dropped
                }
            }

            ClientMessage::Update {
                x,
                y,
                bubble_radius,
            } => {
                let patch = PlayerPatch {
                    name: None,
                    x: as_number(&x),
                    y: as_number(&y),
                    bubble_radius: as_number(&bubble_radius),
                };

                if !patch.is_empty() && self.world.update_player(from, patch) {
                    DispatchOutcome::Applied
                } else {
                    DispatchOutcome::Dropped
                }
            }

            ClientMessage::Collect { coin_id } => match as_text(&coin_id) {
                Some(coin_id) if self.world.try_collect(coin_id, from) => {
                    DispatchOutcome::Broadcast
                }
                _ => DispatchOutcome::Dropped,
            },

            ClientMessage::Signal { to, .. } => match as_text(&to) {
                Some(to) => self.relay(from, to, raw_signal_data(raw)).await,
                None => DispatchOutcome::Dropped,
            },

            ClientMessage::Chat { text } => {
                let text = as_text(&text)
                    .map(|text| truncate_chars(text, MAX_CHAT_CHARS))
                    .unwrap_or_default();
                info!("Chat from {}: {}", from, text);
                DispatchOutcome::Broadcast
            }
        }
    }

    /// Forwards an opaque signaling payload to another live connection.
    ///
    /// The payload text is copied as received, never re-encoded.
    async fn relay(&self, from: &str, to: &str, data: Option<&RawValue>) -> DispatchOutcome {
        let text = match encode_signal(from, data) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize signal from {}: {}", from, e);
                return DispatchOutcome::Dropped;
            }
        };

        let clients = self.clients.read().await;
        match clients.send_to(to, Message::Text(text)) {
            SendOutcome::Queued => DispatchOutcome::Relayed,
            outcome => {
                debug!("Signal from {} to {} not delivered: {:?}", from, to, outcome);
                DispatchOutcome::Dropped
            }
        }
    }
}
