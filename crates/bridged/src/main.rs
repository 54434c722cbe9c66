//! Gateway daemon entry point

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bridged::{GatewayConfig, GatewayServer};

#[derive(Parser, Debug)]
#[command(name = "bridged", about = "WebSocket-to-MUD gateway")]
struct Args {
    /// Address to listen on for client WebSocket connections
    #[arg(long, default_value = "0.0.0.0:3000")]
    listen: String,

    /// Game server host
    #[arg(long, default_value = "3k.org")]
    host: String,

    /// Game server port
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// I/O tick period in milliseconds
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = GatewayConfig {
        listen_addr: args.listen,
        upstream_host: args.host,
        upstream_port: args.port,
        tick_interval: Duration::from_millis(args.tick_ms),
        ..Default::default()
    };

    let server = GatewayServer::bind(config).await?;
    server.run().await;
    Ok(())
}
