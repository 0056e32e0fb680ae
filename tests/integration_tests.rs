//! Integration tests for the session host
//!
//! These tests run a real server on an ephemeral port and talk to it over
//! WebSocket connections, the same way browser clients do.

use assert_approx_eq::assert_approx_eq;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use server::config::ServerConfig;
use server::error::ServerError;
use server::game::GameState;
use server::network::{Server, ServerHandle};
use shared::{Coin, ServerMessage, WorldBounds};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);

fn test_config() -> ServerConfig {
    ServerConfig {
        port: 0,
        ..ServerConfig::default()
    }
}

/// Starts a server in the background and returns its URL and a handle.
async fn start(server: Server) -> (String, ServerHandle) {
    let addr = server.local_addr().unwrap();
    let handle = server.handle();
    tokio::spawn(server.run());
    (format!("ws://{}", addr), handle)
}

async fn start_default() -> (String, ServerHandle) {
    start(Server::bind(test_config()).await.unwrap()).await
}

async fn connect(url: &str) -> Client {
    let (client, _) = connect_async(url).await.expect("Failed to connect");
    client
}

async fn send(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

/// Reads frames until one parses into a message accepted by `pick`.
async fn next_matching<T>(
    client: &mut Client,
    mut pick: impl FnMut(ServerMessage) -> Option<T>,
) -> T {
    let read = async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => {
                    let message: ServerMessage = serde_json::from_str(&text).unwrap();
                    if let Some(found) = pick(message) {
                        return found;
                    }
                }
                Some(Ok(_)) => {}
                other => panic!("Connection ended early: {:?}", other),
            }
        }
    };
    timeout(WAIT, read).await.expect("Timed out waiting for frame")
}

async fn welcome(client: &mut Client) -> (String, WorldBounds, Vec<Coin>) {
    next_matching(client, |message| match message {
        ServerMessage::Welcome { id, world, coins } => Some((id, world, coins)),
        _ => None,
    })
    .await
}

/// Waits for a `state` broadcast satisfying `accept`.
async fn state_where(
    client: &mut Client,
    accept: impl Fn(&[shared::PlayerView], &[Coin]) -> bool,
) -> (Vec<shared::PlayerView>, Vec<Coin>) {
    next_matching(client, |message| match message {
        ServerMessage::State { players, coins, .. }
            if accept(players.as_slice(), coins.as_slice()) =>
        {
            Some((players, coins))
        }
        _ => None,
    })
    .await
}

async fn wait_for_players(handle: &ServerHandle, expected: usize) {
    let deadline = Instant::now() + WAIT;
    while handle.player_count() != expected || handle.connection_count().await != expected {
        assert!(
            Instant::now() < deadline,
            "expected {} players, have {}",
            expected,
            handle.player_count()
        );
        sleep(Duration::from_millis(10)).await;
    }
}

/// SESSION LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// The first frame is a welcome with the world and the full coin list
    #[tokio::test]
    async fn welcome_describes_world() {
        let (url, _handle) = start_default().await;
        let mut client = connect(&url).await;

        let first = match timeout(WAIT, client.next()).await.unwrap() {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<Value>(&text).unwrap(),
            other => panic!("Unexpected first frame {:?}", other),
        };

        assert_eq!(first["type"], "welcome");
        assert_eq!(first["id"], "p1");
        assert_eq!(first["world"]["w"], 1600.0);
        assert_eq!(first["world"]["h"], 900.0);
        assert_eq!(first["world"]["groundY"], 780.0);

        let coins = first["coins"].as_array().unwrap();
        assert_eq!(coins.len(), 20);
        for (index, coin) in coins.iter().enumerate() {
            assert_eq!(coin["id"], format!("c{}", index));
            assert_eq!(coin["taken"], false);
        }
    }

    /// A non-finite world size is refused before any coin is seeded
    #[tokio::test]
    async fn non_finite_world_refused_at_bind() {
        for (width, height) in [(f64::NAN, 900.0), (1600.0, f64::INFINITY)] {
            let config = ServerConfig {
                world_width: width,
                world_height: height,
                ..test_config()
            };
            assert!(matches!(
                Server::bind(config).await,
                Err(ServerError::InvalidConfig(_))
            ));
        }
    }

    /// N connections give N distinct players; closing them all empties the registry
    #[tokio::test]
    async fn registry_tracks_concurrent_connections() {
        let (url, handle) = start_default().await;

        let mut clients = Vec::new();
        for _ in 0..6 {
            clients.push(connect(&url).await);
        }

        let mut ids = Vec::new();
        for client in clients.iter_mut() {
            ids.push(welcome(client).await.0);
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 6);

        wait_for_players(&handle, 6).await;

        for mut client in clients {
            let _ = client.close(None).await;
        }
        wait_for_players(&handle, 0).await;
    }

    /// A departing player disappears from the other clients' view
    #[tokio::test]
    async fn disconnect_is_broadcast() {
        let (url, handle) = start_default().await;

        let mut alice = connect(&url).await;
        let (alice_id, _, _) = welcome(&mut alice).await;
        let mut bob = connect(&url).await;
        let (bob_id, _, _) = welcome(&mut bob).await;

        state_where(&mut alice, |players, _| players.iter().any(|p| p.id == bob_id)).await;

        // Abrupt drop is handled like a clean close
        drop(bob);

        let (players, _) = state_where(&mut alice, |players, _| {
            players.iter().all(|p| p.id != bob_id)
        })
        .await;
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].id, alice_id);
        wait_for_players(&handle, 1).await;
    }
}

/// STATE SYNCHRONIZATION TESTS
mod sync_tests {
    use super::*;

    /// Out-of-range radius is clamped before it reaches any client
    #[tokio::test]
    async fn update_is_clamped_in_broadcast() {
        let (url, _handle) = start_default().await;
        let mut client = connect(&url).await;
        let (id, _, _) = welcome(&mut client).await;

        send(
            &mut client,
            json!({"type": "update", "x": 800, "y": 450, "bubbleRadius": 9999}),
        )
        .await;

        let (players, _) = state_where(&mut client, |players, _| {
            players
                .iter()
                .any(|p| p.id == id && p.bubble_radius != 120.0)
        })
        .await;
        let me = players.iter().find(|p| p.id == id).unwrap();
        assert_approx_eq!(me.bubble_radius, 400.0);
        assert_approx_eq!(me.x, 800.0);
        assert_approx_eq!(me.y, 450.0);
    }

    /// Join sets the display name seen by everyone
    #[tokio::test]
    async fn join_name_reaches_other_clients() {
        let (url, _handle) = start_default().await;
        let mut alice = connect(&url).await;
        let (alice_id, _, _) = welcome(&mut alice).await;
        let mut bob = connect(&url).await;
        welcome(&mut bob).await;

        send(
            &mut alice,
            json!({"type": "join", "name": "a".repeat(50), "x": 10, "y": 20}),
        )
        .await;

        let (players, _) = state_where(&mut bob, |players, _| {
            players.iter().any(|p| p.id == alice_id && !p.name.is_empty())
        })
        .await;
        let alice_view = players.iter().find(|p| p.id == alice_id).unwrap();
        assert_eq!(alice_view.name, "a".repeat(32));
        assert_approx_eq!(alice_view.x, 10.0);
        assert_approx_eq!(alice_view.y, 20.0);
    }

    /// A collects c0 from its exact position; B's identical request from afar changes nothing
    #[tokio::test]
    async fn coin_collected_once() {
        let world = GameState::with_coins(
            WorldBounds::default(),
            vec![Coin::new("c0", 200.0, 200.0), Coin::new("c1", 1400.0, 600.0)],
        );
        let server = Server::bind_with_world(test_config(), world).await.unwrap();
        let (url, handle) = start(server).await;

        let mut alice = connect(&url).await;
        let (_, _, coins) = welcome(&mut alice).await;
        let mut bob = connect(&url).await;
        welcome(&mut bob).await;

        let c0 = coins.iter().find(|c| c.id == "c0").unwrap().clone();
        send(&mut alice, json!({"type": "update", "x": c0.x, "y": c0.y})).await;
        send(&mut alice, json!({"type": "collect", "coinId": "c0"})).await;

        let taken = |_: &[shared::PlayerView], coins: &[Coin]| {
            coins.iter().any(|c| c.id == "c0" && c.taken)
        };
        state_where(&mut alice, taken).await;
        state_where(&mut bob, taken).await;

        // Bob is still at the world center, far from c0
        send(&mut bob, json!({"type": "collect", "coinId": "c0"})).await;
        send(&mut bob, json!({"type": "collect", "coinId": "c1"})).await;

        for _ in 0..3 {
            let (_, coins) = state_where(&mut bob, |_, _| true).await;
            assert!(coins.iter().find(|c| c.id == "c0").unwrap().taken);
            assert!(!coins.iter().find(|c| c.id == "c1").unwrap().taken);
        }
        assert!(handle.world().coins()[0].taken);
    }

    /// Garbage frames are ignored and the connection keeps working
    #[tokio::test]
    async fn malformed_frames_are_ignored() {
        let (url, handle) = start_default().await;
        let mut client = connect(&url).await;
        let (id, _, _) = welcome(&mut client).await;

        client
            .send(Message::Text("{not json".to_string()))
            .await
            .unwrap();
        send(&mut client, json!({"type": "warp", "x": 1})).await;
        send(&mut client, json!({"x": 1})).await;
        send(&mut client, json!({"type": "update", "x": "far", "y": 100})).await;

        let (players, _) = state_where(&mut client, |players, _| {
            players.iter().any(|p| p.id == id && p.y == 100.0)
        })
        .await;
        let me = players.iter().find(|p| p.id == id).unwrap();
        assert_approx_eq!(me.x, 800.0);
        assert_eq!(handle.player_count(), 1);
    }

    /// Broadcasts keep arriving at roughly the configured rate
    #[tokio::test]
    async fn periodic_broadcast() {
        let (url, _handle) = start_default().await;
        let mut client = connect(&url).await;
        welcome(&mut client).await;

        let started = Instant::now();
        let mut last_t = 0;
        for _ in 0..10 {
            let t = next_matching(&mut client, |message| match message {
                ServerMessage::State { t, .. } => Some(t),
                _ => None,
            })
            .await;
            assert!(t >= last_t);
            last_t = t;
        }
        // Ten frames at 20Hz, with generous slack for slow machines
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}

/// SIGNALING RELAY TESTS
mod relay_tests {
    use super::*;

    #[tokio::test]
    async fn signal_is_forwarded_to_target() {
        let (url, _handle) = start_default().await;
        let mut alice = connect(&url).await;
        let (alice_id, _, _) = welcome(&mut alice).await;
        let mut bob = connect(&url).await;
        let (bob_id, _, _) = welcome(&mut bob).await;

        let data = json!({"type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 127.0.0.1"});
        send(
            &mut alice,
            json!({"type": "signal", "to": bob_id, "data": data}),
        )
        .await;

        let (from, received) = next_matching(&mut bob, |message| match message {
            ServerMessage::Signal { from, data } => Some((from, data)),
            _ => None,
        })
        .await;
        assert_eq!(from, alice_id);
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn signal_to_unknown_target_is_silent() {
        let (url, handle) = start_default().await;
        let mut alice = connect(&url).await;
        welcome(&mut alice).await;

        send(
            &mut alice,
            json!({"type": "signal", "to": "p999", "data": {"x": 1}}),
        )
        .await;

        // Only state frames follow, and the sender stays connected
        for _ in 0..5 {
            let frame = next_matching(&mut alice, Some).await;
            assert!(matches!(frame, ServerMessage::State { .. }));
        }
        assert_eq!(handle.player_count(), 1);
    }
}
