//! Fixed-rate snapshot broadcast.
//!
//! One task owns every `state` broadcast. Periodic ticks and event-driven
//! requests (join, collect, chat, connect, disconnect) both wake the same
//! loop, so frames go out strictly in the order their snapshots were taken.

use crate::client_manager::ClientManager;
use crate::game::{GameState, Snapshot};
use crate::utils::get_timestamp;
use log::{debug, error};
use shared::ServerMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Requests an immediate broadcast. Requests made while one is already
/// pending are merged into it.
#[derive(Clone, Default)]
pub struct BroadcastTrigger {
    notify: Arc<Notify>,
}

impl BroadcastTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.notify.notify_one();
    }

    async fn fired(&self) {
        self.notify.notified().await;
    }
}

pub struct Broadcaster {
    world: Arc<GameState>,
    clients: Arc<RwLock<ClientManager>>,
    trigger: BroadcastTrigger,
    period: Duration,
}

impl Broadcaster {
    pub fn new(
        world: Arc<GameState>,
        clients: Arc<RwLock<ClientManager>>,
        trigger: BroadcastTrigger,
        period: Duration,
    ) -> Self {
        Self {
            world,
            clients,
            trigger,
            period,
        }
    }

    /// Serializes a snapshot into a `state` frame.
    pub fn encode_state(snapshot: Snapshot, timestamp: u64) -> Option<String> {
        let message = ServerMessage::State {
            t: timestamp,
            players: snapshot.players,
            coins: snapshot.coins,
        };

        match serde_json::to_string(&message) {
            Ok(text) => Some(text),
            Err(e) => {
                error!("Failed to serialize state: {}", e);
                None
            }
        }
    }

    /// Takes a snapshot and queues it for every registered connection.
    /// Returns the number of connections it was queued for.
    pub async fn broadcast_now(&self) -> usize {
        if self.clients.read().await.is_empty() {
            return 0;
        }

        let text = match Self::encode_state(self.world.snapshot(), get_timestamp()) {
            Some(text) => text,
            None => return 0,
        };

        let clients = self.clients.read().await;
        clients.broadcast(&text)
    }

    /// Runs the broadcast loop for the lifetime of the process.
    pub async fn run(self) {
        let mut tick_timer = interval(self.period);
        tick_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        tick_timer.tick().await;

        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                _ = tick_timer.tick() => {
                    ticks += 1;
                    let delivered = self.broadcast_now().await;

                    // Periodic monitoring, roughly every 10s at 20Hz
                    if ticks % 200 == 0 && delivered > 0 {
                        debug!(
                            "Tick {}: {} connections, {} players",
                            ticks,
                            delivered,
                            self.world.player_count()
                        );
                    }
                }
                _ = self.trigger.fired() => {
                    self.broadcast_now().await;
                }
            }
        }
    }
}
