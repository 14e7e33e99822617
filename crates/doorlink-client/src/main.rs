//! `doorlink`: lock, unlock or watch the door through the relay.

use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use doorlink_client::{ClientError, ClientEvent, ClientOptions, DoorClient, DEFAULT_SOURCE};
use doorlink_protocol::{DoorStatus, STATUS_OK};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "doorlink", version, about = "Door relay control client")]
struct Cli {
    /// Relay address.
    #[arg(
        long,
        env = "DOORLINK_SERVER",
        default_value = "127.0.0.1:8080",
        global = true
    )]
    server: String,

    /// Source id sent with commands.
    #[arg(long, env = "DOORLINK_SOURCE", default_value = DEFAULT_SOURCE, global = true)]
    source: String,

    /// How long to wait for replies, in milliseconds.
    #[arg(long, default_value_t = 3000, global = true)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Lock the door and wait for the controller to confirm.
    Lock,
    /// Unlock the door and wait for the controller to confirm.
    Unlock,
    /// Print the current state.
    Sync,
    /// Print every state change until the relay goes away.
    Watch,
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match run(&cli) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("doorlink: {e}");
            std::process::exit(1);
        }
    }
}

/// Returns the process exit code.
fn run(cli: &Cli) -> Result<i32, ClientError> {
    let timeout = Duration::from_millis(cli.timeout_ms);
    let client = DoorClient::connect(
        cli.server.as_str(),
        cli.source.as_str(),
        ClientOptions::default(),
    )?;

    let synced = wait_for(&client, timeout, |event| match event {
        ClientEvent::Synced(status) => Some(status.clone()),
        _ => None,
    });
    let Some(status) = synced else {
        eprintln!("doorlink: no sync response from {}", cli.server);
        return Ok(2);
    };

    match cli.command {
        Command::Sync => print_status(&status),
        Command::Lock | Command::Unlock => {
            if matches!(cli.command, Command::Lock) {
                client.lock()?;
            } else {
                client.unlock()?;
            }

            let ack = wait_for(&client, timeout, |event| match event {
                ClientEvent::Acked { status } => Some(status.clone()),
                _ => None,
            });
            match ack.as_deref() {
                Some(STATUS_OK) => {}
                Some(other) => {
                    eprintln!("doorlink: relay answered {other}");
                    return Ok(3);
                }
                None => {
                    eprintln!("doorlink: no acknowledgement from relay");
                    return Ok(3);
                }
            }

            let confirmed = wait_for(&client, timeout, |event| match event {
                ClientEvent::StateChanged(status) => Some(status.clone()),
                _ => None,
            });
            match confirmed {
                Some(status) => print_status(&status),
                None => println!("command sent; controller has not confirmed yet"),
            }
        }
        Command::Watch => {
            print_status(&status);
            loop {
                match client.recv_timeout(Duration::from_secs(60)) {
                    Some(ClientEvent::StateChanged(status)) => print_status(&status),
                    Some(ClientEvent::Disconnected) => {
                        println!("relay closed the connection");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(0)
}

/// Wait until `pick` accepts an event or `timeout` passes.
fn wait_for<T>(
    client: &DoorClient,
    timeout: Duration,
    mut pick: impl FnMut(&ClientEvent) -> Option<T>,
) -> Option<T> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        let event = client.recv_timeout(remaining)?;
        if let Some(found) = pick(&event) {
            return Some(found);
        }
        if event == ClientEvent::Disconnected {
            return None;
        }
    }
}

fn print_status(status: &DoorStatus) {
    if status.last_source.is_empty() {
        println!("{}", status.state);
    } else {
        println!(
            "{} (by {} at {})",
            status.state, status.last_source, status.last_timestamp
        );
    }
}
