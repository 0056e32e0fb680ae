//! Server network layer: TCP accept loop, WebSocket upgrade and the
//! per-connection reader/writer tasks.

use crate::broadcaster::{BroadcastTrigger, Broadcaster};
use crate::client_manager::{ClientManager, OUTBOUND_QUEUE_SIZE};
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use crate::game::GameState;
use crate::session::Lifecycle;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Session host bound to a listening socket
pub struct Server {
    listener: TcpListener,
    world: Arc<GameState>,
    clients: Arc<RwLock<ClientManager>>,
    trigger: BroadcastTrigger,
    broadcast_interval: Duration,
}

/// Read-only view into a running server, for monitoring and tests
#[derive(Clone)]
pub struct ServerHandle {
    world: Arc<GameState>,
    clients: Arc<RwLock<ClientManager>>,
}

impl ServerHandle {
    pub fn world(&self) -> &GameState {
        &self.world
    }

    pub fn player_count(&self) -> usize {
        self.world.player_count()
    }

    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

impl Server {
    /// Binds the listener and seeds a fresh world.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let world = GameState::new(config.bounds(), config.coin_count);
        Self::bind_with_world(config, world).await
    }

    /// Binds the listener around an already built world.
    pub async fn bind_with_world(
        config: ServerConfig,
        world: GameState,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let addr = config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            world: Arc::new(world),
            clients: Arc::new(RwLock::new(ClientManager::new())),
            trigger: BroadcastTrigger::new(),
            broadcast_interval: config.broadcast_interval,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            world: Arc::clone(&self.world),
            clients: Arc::clone(&self.clients),
        }
    }

    /// Starts the broadcaster and accepts connections until the task is
    /// dropped.
    pub async fn run(self) -> Result<(), ServerError> {
        let broadcaster = Broadcaster::new(
            Arc::clone(&self.world),
            Arc::clone(&self.clients),
            self.trigger.clone(),
            self.broadcast_interval,
        );
        tokio::spawn(broadcaster.run());

        let lifecycle = Arc::new(Lifecycle::new(
            Arc::clone(&self.world),
            Arc::clone(&self.clients),
            self.trigger.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.world),
            Arc::clone(&self.clients),
            self.trigger.clone(),
        ));

        info!("Server started successfully");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let lifecycle = Arc::clone(&lifecycle);
                    let dispatcher = Arc::clone(&dispatcher);
                    tokio::spawn(handle_connection(stream, addr, lifecycle, dispatcher));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Drives one connection from handshake to close.
///
/// Inbound frames are handled in arrival order on this task. Outbound
/// frames go through a bounded queue drained by a separate writer task, so
/// a slow socket only delays its own frames.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    lifecycle: Arc<Lifecycle>,
    dispatcher: Arc<Dispatcher>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_SIZE);

    let mut session = lifecycle.open(addr, tx).await;
    let player_id = session.player_id().to_string();

    // Ends when the registry drops the queue sender or the socket fails
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = write.send(message).await {
                debug!("Failed to send to {}: {}", player_id, e);
                break;
            }
        }
        let _ = write.close().await;
    });

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                dispatcher.dispatch(&session, &text).await;
            }
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => {
                    dispatcher.dispatch(&session, &text).await;
                }
                Err(_) => debug!("Dropped non UTF-8 frame from {}", session.player_id()),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Connection {} ({}) ended: {}", session.player_id(), addr, e);
                break;
            }
        }
    }

    lifecycle.close(&mut session).await;
}
