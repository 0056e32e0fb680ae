//! Startup configuration for the session host.
//!
//! All values are fixed for the lifetime of the process. The binary fills
//! them in from command-line flags; tests build them directly.

use crate::error::ServerError;
use shared::{WorldBounds, COIN_COUNT, WORLD_HEIGHT, WORLD_WIDTH};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind the listener to
    pub host: String,
    /// Port to listen on, 0 picks a free port
    pub port: u16,
    /// Period of the snapshot broadcast
    pub broadcast_interval: Duration,
    pub world_width: f64,
    pub world_height: f64,
    /// Number of coins seeded at startup
    pub coin_count: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            broadcast_interval: Duration::from_millis(50),
            world_width: WORLD_WIDTH,
            world_height: WORLD_HEIGHT,
            coin_count: COIN_COUNT,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn bounds(&self) -> WorldBounds {
        WorldBounds::new(self.world_width, self.world_height)
    }

    /// Rejects settings the world cannot be built from.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.broadcast_interval.is_zero() {
            return Err(ServerError::InvalidConfig(
                "broadcast interval must be greater than zero".to_string(),
            ));
        }

        if !self.world_width.is_finite() || !self.world_height.is_finite() {
            return Err(ServerError::InvalidConfig(format!(
                "world size {}x{} must be finite",
                self.world_width, self.world_height
            )));
        }

        let bounds = self.bounds();
        // Coins are seeded in [40, w-40] x [80, groundY-40]
        if bounds.w <= 80.0 || bounds.ground_y <= 120.0 {
            return Err(ServerError::InvalidConfig(format!(
                "world {}x{} is too small to seed coins",
                bounds.w, bounds.h
            )));
        }

        Ok(())
    }
}
