use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "25565")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "20")]
    tick_rate: u32,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Ticks between periodic player saves
    #[arg(short, long, default_value = "20")]
    save_interval: u32,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    timeout_secs: u64,

    /// Directory for player files; players are kept in memory if omitted
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            bind_addr: format!("{}:{}", args.host, args.port),
            tick_rate: args.tick_rate,
            max_clients: args.max_clients,
            save_interval: args.save_interval,
            client_timeout: Duration::from_secs(args.timeout_secs),
            data_dir: args.data_dir,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());

    info!("Starting server...");
    info!(
        "Tick rate: {} Hz, max clients: {}, save every {} ticks",
        config.tick_rate, config.max_clients, config.save_interval
    );
    match &config.data_dir {
        Some(dir) => info!("Player data in {}", dir.display()),
        None => info!("Player data kept in memory"),
    }

    let mut server = Server::new(config).await?;

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            handle.shutdown();
        }
    });

    server.run().await?;

    Ok(())
}
