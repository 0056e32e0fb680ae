//! Headless client for exercising a running host.
//!
//! Connects, joins under a name, then drifts toward the nearest free coin
//! and tries to collect it once close enough.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::json;
use shared::{Coin, ServerMessage, PICKUP_RADIUS};
use std::time::Duration;
use tokio::time::{interval, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// WebSocket URL of the host
    #[clap(short, long, default_value = "ws://127.0.0.1:8080")]
    url: String,
    /// Display name to join with
    #[clap(short, long, default_value = "bot")]
    name: String,
    /// How long to stay connected, in seconds
    #[clap(short, long, default_value = "30")]
    duration: u64,
    /// Distance moved per step
    #[clap(short, long, default_value = "12")]
    step: f64,
}

/// Picks the closest coin nobody has taken yet.
fn nearest_free_coin(coins: &[Coin], x: f64, y: f64) -> Option<&Coin> {
    coins
        .iter()
        .filter(|coin| !coin.taken)
        .min_by(|a, b| {
            a.distance_squared_to(x, y)
                .total_cmp(&b.distance_squared_to(x, y))
        })
}

/// Moves from `(x, y)` toward `target` by at most `step`.
fn step_toward(x: f64, y: f64, target: (f64, f64), step: f64) -> (f64, f64) {
    let dx = target.0 - x;
    let dy = target.1 - y;
    let distance = (dx * dx + dy * dy).sqrt();
    if distance <= step {
        target
    } else {
        (x + dx / distance * step, y + dy / distance * step)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (ws_stream, _) = connect_async(args.url.as_str()).await?;
    info!("Connected to {}", args.url);
    let (mut write, mut read) = ws_stream.split();

    // The first frame is always the welcome
    let (id, mut coins, (mut x, mut y)) = match read.next().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text)? {
            ServerMessage::Welcome { id, world, coins } => {
                info!(
                    "Joined as {} in a {}x{} world with {} coins",
                    id,
                    world.w,
                    world.h,
                    coins.len()
                );
                (id, coins, world.center())
            }
            other => return Err(format!("expected welcome, got {:?}", other).into()),
        },
        other => return Err(format!("expected welcome, got {:?}", other).into()),
    };

    let join = json!({"type": "join", "name": args.name, "x": x, "y": y});
    write.send(Message::Text(join.to_string())).await?;

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let mut move_timer = interval(Duration::from_millis(100));

    while Instant::now() < deadline {
        tokio::select! {
            _ = move_timer.tick() => {
                let target = match nearest_free_coin(&coins, x, y) {
                    Some(coin) => coin.clone(),
                    None => {
                        info!("No coins left");
                        break;
                    }
                };

                (x, y) = step_toward(x, y, (target.x, target.y), args.step);
                let update = json!({"type": "update", "x": x, "y": y});
                write.send(Message::Text(update.to_string())).await?;

                if target.distance_squared_to(x, y) < PICKUP_RADIUS * PICKUP_RADIUS {
                    let collect = json!({"type": "collect", "coinId": target.id});
                    write.send(Message::Text(collect.to_string())).await?;
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                        Ok(ServerMessage::State { players, coins: latest, .. }) => {
                            let taken_before = coins.iter().filter(|c| c.taken).count();
                            let taken_now = latest.iter().filter(|c| c.taken).count();
                            if taken_now > taken_before {
                                debug!(
                                    "{} coins taken ({} players online)",
                                    taken_now,
                                    players.len()
                                );
                            }
                            if let Some(me) = players.iter().find(|p| p.id == id) {
                                x = me.x;
                                y = me.y;
                            }
                            coins = latest;
                        }
                        Ok(ServerMessage::Signal { from, data }) => {
                            info!("Signal from {}: {}", from, data);
                        }
                        Ok(other) => debug!("Ignoring {:?}", other),
                        Err(e) => warn!("Bad frame from host: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Host closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Connection error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    let taken = coins.iter().filter(|c| c.taken).count();
    info!("Bot {} finished, {} coins taken in the world", id, taken);
    let _ = write.close().await;
    Ok(())
}
