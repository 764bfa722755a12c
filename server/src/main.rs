use clap::Parser;
use log::info;
use server::config::ArenaConfig;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Lobby grace period once two players joined, in seconds
    #[arg(long, default_value = "20")]
    lobby_secs: u32,

    #[arg(long, default_value = "10")]
    countdown_secs: u32,

    /// Main game tick period in milliseconds
    #[arg(long, default_value = "17")]
    main_tick_ms: u64,

    /// Lobby mini-game tick period in milliseconds
    #[arg(long, default_value = "50")]
    mini_tick_ms: u64,

    #[arg(long, default_value = "15")]
    ping_secs: u64,

    /// Drop clients that have not answered a ping for this long
    #[arg(long, default_value = "60")]
    pong_timeout_secs: u64,

    /// Drop sockets that have not completed the websocket upgrade in time
    #[arg(long, default_value = "10")]
    handshake_timeout_secs: u64,

    /// Share of free cells filled with weak walls (0.0 to 1.0)
    #[arg(long, default_value = "0.55")]
    weak_wall_density: f64,

    /// Fixed RNG seed for reproducible levels
    #[arg(long)]
    seed: Option<u64>,
}

impl From<Args> for ArenaConfig {
    fn from(args: Args) -> Self {
        ArenaConfig {
            lobby_secs: args.lobby_secs,
            countdown_secs: args.countdown_secs,
            main_tick: Duration::from_millis(args.main_tick_ms.max(1)),
            mini_tick: Duration::from_millis(args.mini_tick_ms.max(1)),
            ping_interval: Duration::from_secs(args.ping_secs.max(1)),
            pong_timeout: Duration::from_secs(args.pong_timeout_secs),
            handshake_timeout: Duration::from_secs(args.handshake_timeout_secs.max(1)),
            weak_wall_density: args.weak_wall_density.clamp(0.0, 1.0),
            seed: args.seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    info!("Starting arena server...");
    info!(
        "Lobby {}s, countdown {}s, main tick {}ms, mini tick {}ms",
        args.lobby_secs, args.countdown_secs, args.main_tick_ms, args.mini_tick_ms
    );
    if let Some(seed) = args.seed {
        info!("Using fixed seed {}", seed);
    }

    let mut server = Server::new(&address, ArenaConfig::from(args)).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
