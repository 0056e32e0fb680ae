use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, then starts the session host.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Broadcast rate (snapshots per second)
        #[clap(short, long, default_value = "20")]
        tick_rate: u32,
        /// World width
        #[clap(long, default_value = "1600")]
        width: f64,
        /// World height
        #[clap(long, default_value = "900")]
        height: f64,
        /// Number of coins seeded at startup
        #[clap(short, long, default_value = "20")]
        coins: usize,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        broadcast_interval: Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64),
        world_width: args.width,
        world_height: args.height,
        coin_count: args.coins,
    };

    let server = Server::bind(config).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
