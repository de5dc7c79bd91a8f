//! stackcalc gRPC Server
//!
//! Serves the per-client stack calculator over gRPC until Ctrl+C or SIGTERM.

use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use stackcalc_grpc::CalculatorServer;

/// stackcalc gRPC Server - per-client stack calculator
#[derive(Parser, Debug)]
#[command(name = "stackcalc-grpc")]
#[command(about = "gRPC server providing per-client stack calculators")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "STACKCALC_ADDR", default_value = "[::1]:50051")]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let server = CalculatorServer::new(args.addr);
    server.run().await?;

    Ok(())
}
