//! `doorlink-relay`: run the door-state relay, or inspect its history.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use doorlink_channel::{LineChannel, SerialChannel, SerialSettings, DEFAULT_BAUD_RATE};
use doorlink_relay::config::{DEFAULT_DEVICE_ID, DEFAULT_PORT};
use doorlink_relay::{counters, RelayConfig, RelayCore, RelayError, RelayService};
use doorlink_store::{SqliteHistory, StateStore, StoreConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "doorlink-relay",
    version,
    about = "Door-state relay between a lock controller and a control client"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the relay.
    Run(RunArgs),
    /// Print recently recorded door events.
    History(HistoryArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Serial device of the lock controller.
    #[arg(long, env = "DOORLINK_SERIAL")]
    serial: String,

    #[arg(long, env = "DOORLINK_BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Control-client TCP port.
    #[arg(long, env = "DOORLINK_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to listen on.
    #[arg(long, env = "DOORLINK_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// SQLite history database.
    #[arg(long, env = "DOORLINK_DB", default_value = "door_events.db")]
    db: PathBuf,

    /// Directory for the daily text logs.
    #[arg(long, env = "DOORLINK_LOG_DIR", default_value = ".")]
    log_dir: PathBuf,

    /// `source` value the lock controller reports.
    #[arg(long, env = "DOORLINK_DEVICE_ID", default_value = DEFAULT_DEVICE_ID)]
    device_id: String,

    #[arg(long, env = "DOORLINK_POLL_TIMEOUT_MS", default_value_t = 100)]
    poll_timeout_ms: u64,

    #[arg(long, env = "DOORLINK_RECONNECT_INTERVAL_MS", default_value_t = 2000)]
    reconnect_interval_ms: u64,

    #[arg(long, env = "DOORLINK_MAX_RECONNECT_ATTEMPTS", default_value_t = 5)]
    max_reconnect_attempts: u32,
}

impl RunArgs {
    fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            listen_addr: format!("{}:{}", self.bind, self.port),
            device_id: self.device_id.clone(),
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }

    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            db_path: self.db.clone(),
            log_dir: Some(self.log_dir.clone()),
        }
    }
}

#[derive(Debug, Args)]
struct HistoryArgs {
    #[arg(long, env = "DOORLINK_DB", default_value = "door_events.db")]
    db: PathBuf,

    /// Number of entries to show, newest first.
    #[arg(long, default_value_t = 20)]
    limit: usize,

    /// Print as JSON.
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Command::Run(args) => run(args).map_err(Into::into),
        Command::History(args) => history(args),
    };

    if let Err(e) = result {
        eprintln!("doorlink-relay: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn run(args: RunArgs) -> Result<(), RelayError> {
    let config = args.relay_config();
    let settings = SerialSettings::new(&args.serial).with_baud_rate(args.baud);

    let store = StateStore::open(&args.store_config())?;
    let device = SerialChannel::open(&settings)?;
    counters::describe_metrics();

    let service = RelayService::bind(
        config.clone(),
        RelayCore::new(config.device_id.clone(), store),
        Box::new(device),
    )?
    .with_reopen(move || {
        SerialChannel::open(&settings).map(|c| Box::new(c) as Box<dyn LineChannel>)
    });

    let running = service.running_flag();
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })?;

    info!(addr = %service.local_addr(), "press Ctrl+C to stop");
    service.run()
}

fn history(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let db = SqliteHistory::open(&args.db)?;
    let entries = db.recent(args.limit)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("no door events recorded in {}", args.db.display());
        return Ok(());
    }
    for e in &entries {
        println!(
            "{:>6}  {}  {:<8}  {:<10}  {}",
            e.id,
            e.recorded_at,
            e.entry.state.as_str(),
            e.entry.source,
            e.entry.timestamp
        );
    }
    Ok(())
}
