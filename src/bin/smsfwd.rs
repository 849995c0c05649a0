use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use smsfwd::client::ControlClient;
use smsfwd::clone::{export_settings, restore_settings};
use smsfwd::config::DaemonConfig;
use smsfwd::storage::SqliteSettingsStore;
use smsfwd::version::AppVersion;

#[derive(Parser, Debug)]
#[command(name = "smsfwd", about = "Client for a remote smsfwdd control server")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Remote server, e.g. http://192.168.1.20:5000
    #[arg(long)]
    server: Option<String>,
    #[arg(long)]
    sign_key: Option<String>,
    /// Local settings database used by pull and push.
    #[arg(long)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show which endpoints the remote server exposes.
    Query,
    /// Copy the remote settings into the local database.
    Pull,
    /// Replace the remote settings with the local database.
    Push,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("smsfwd error: {}", err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> io::Result<()> {
    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load(path).map_err(io::Error::other)?,
        None => DaemonConfig::default(),
    };
    if let Some(db) = cli.db {
        config.db = Some(db);
    }
    let server = cli
        .server
        .unwrap_or_else(|| config.server.server_address.clone());
    if server.trim().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no server address: pass --server or set server.server_address",
        ));
    }
    let sign_key = cli
        .sign_key
        .unwrap_or_else(|| config.server.client_sign_key.clone());
    let client = ControlClient::new(&server, sign_key);
    let version = AppVersion::current();

    match cli.command {
        Command::Query => {
            let data = client.query_config()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&data).map_err(io::Error::other)?
            );
        }
        Command::Pull => {
            let snapshot = client.pull(version.code)?;
            let store = SqliteSettingsStore::open(&config.db_path()).map_err(io::Error::other)?;
            restore_settings(&store, &snapshot, config.restore_mode()).map_err(io::Error::other)?;
            println!(
                "pulled {} senders and {} rules from {}",
                snapshot.sender_list.len(),
                snapshot.rule_list.len(),
                client.address()
            );
        }
        Command::Push => {
            let store = SqliteSettingsStore::open(&config.db_path()).map_err(io::Error::other)?;
            let snapshot = export_settings(&store, &version).map_err(io::Error::other)?;
            client.push(&snapshot)?;
            println!(
                "pushed {} senders and {} rules to {}",
                snapshot.sender_list.len(),
                snapshot.rule_list.len(),
                client.address()
            );
        }
    }
    Ok(())
}
