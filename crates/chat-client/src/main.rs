// crates/chat-client/src/main.rs

use std::io::{self, BufRead, IsTerminal};
use std::process::ExitCode;
use std::thread;

use chat_client::{ChatConnection, ClientConfig, ClientError, NetworkEvent};
use clap::Parser;
use crossterm::execute;
use crossterm::terminal::SetTitle;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const EXIT_INVALID_PORT: u8 = 2;
const EXIT_UNKNOWN_HOST: u8 = 3;
const EXIT_CONNECTION_REFUSED: u8 = 4;

#[derive(Parser)]
#[command(name = "chat-client")]
#[command(about = "Console client for chat-server")]
struct Cli {
    /// Server host name or address [default: 127.0.0.1]
    host: Option<String>,

    /// Server port (1-65535) [default: 2000]
    port: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let config = match ClientConfig::from_args(cli.host.as_deref(), cli.port.as_deref()) {
        Ok(config) => config,
        Err(e) => return report(e),
    };

    let (tx_to_app, rx_from_network) = mpsc::unbounded_channel();
    let connection = match ChatConnection::connect(&config, tx_to_app).await {
        Ok(connection) => connection,
        Err(e) => return report(e),
    };

    run(connection, rx_from_network).await;
    ExitCode::SUCCESS
}

fn report(err: ClientError) -> ExitCode {
    eprintln!("error: {err}");
    match err {
        ClientError::InvalidPort(_) => ExitCode::from(EXIT_INVALID_PORT),
        ClientError::UnknownHost { .. } => ExitCode::from(EXIT_UNKNOWN_HOST),
        ClientError::ConnectionRefused { .. } => ExitCode::from(EXIT_CONNECTION_REFUSED),
        ClientError::Connect { .. } => ExitCode::FAILURE,
    }
}

async fn run(connection: ChatConnection, mut rx_from_network: mpsc::UnboundedReceiver<NetworkEvent>) {
    set_title(connection.server_addr());
    let mut input = spawn_stdin_reader();
    let mut input_enabled = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            event = rx_from_network.recv() => match event {
                Some(NetworkEvent::Message(line)) => println!("{line}"),
                Some(NetworkEvent::ConnectionLost) | None => {
                    println!("--- connection lost ---");
                    break;
                }
            },
            line = input.recv(), if input_enabled => match line {
                Some(line) => {
                    connection.send(line);
                }
                None => {
                    debug!("stdin closed; still receiving");
                    input_enabled = false;
                }
            },
        }
    }

    connection.close();
    connection.join().await;
}

fn set_title(title: &str) {
    let mut stdout = io::stdout();
    if stdout.is_terminal() {
        let _ = execute!(stdout, SetTitle(title));
    }
}

// Reading stdin blocks; keep it off the runtime.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    rx
}
