use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use smsfwd::config::DaemonConfig;
use smsfwd::rpc::{http, ControlDaemon};
use smsfwd::storage::SqliteSettingsStore;

#[derive(Parser, Debug)]
#[command(name = "smsfwdd")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    listen: Option<String>,
    #[arg(long)]
    db: Option<PathBuf>,
    #[arg(long)]
    sign_key: Option<String>,
    /// Start even when server autorun is disabled in the config.
    #[arg(long)]
    start: bool,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("smsfwdd error: {}", err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> std::io::Result<()> {
    let mut config = match &args.config {
        Some(path) => DaemonConfig::load(path).map_err(std::io::Error::other)?,
        None => DaemonConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = Some(listen);
    }
    if let Some(db) = args.db {
        config.db = Some(db);
    }
    if let Some(key) = args.sign_key {
        config.server.server_sign_key = key;
    }

    if !config.server.enable_server_autorun && !args.start {
        log::info!("server autorun is disabled; pass --start to run anyway");
        return Ok(());
    }

    let addr: SocketAddr = config
        .listen_addr()
        .parse()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
    let store = SqliteSettingsStore::open(&config.db_path()).map_err(std::io::Error::other)?;
    if config.server.server_sign_key.is_empty() {
        log::warn!("server sign key is empty, requests are not authenticated");
    }
    let daemon = Arc::new(
        ControlDaemon::with_store(store, config.server.clone())
            .with_restore_mode(config.restore_mode()),
    );

    let listener = TcpListener::bind(addr).await?;
    println!("smsfwdd listening on http://{}", addr);

    loop {
        let (mut stream, peer) = listener.accept().await?;
        let daemon = daemon.clone();
        tokio::spawn(async move {
            if let Err(err) = http::serve_connection(daemon, &mut stream).await {
                log::warn!("connection from {} failed: {}", peer, err);
            }
        });
    }
}
