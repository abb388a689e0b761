//! Console chat server.
//!
//! Lines typed on stdin are broadcast to every client; the transcript
//! goes to stdout and logs to stderr. Ctrl-C stops the server.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use chat_server::console::ConsolePresenter;
use chat_server::{Config, ConfigError, Mediator, Service, ServiceError};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_INVALID_PORT: u8 = 2;
const EXIT_ADDRESS_IN_USE: u8 = 3;

#[derive(Debug, Parser)]
#[command(name = "chat-server", version, about = "Multi-client TCP chat server")]
struct Cli {
    /// Port to listen on (1-65535) [default: 2000]
    port: Option<String>,

    /// TOML file with `bind_addr`, `port` and `echo_to_sender`
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let config = config.with_env()?;

    match &cli.port {
        Some(port) => config.with_port_arg(port),
        None => Ok(config),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(ConfigError::InvalidPort(e)) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_INVALID_PORT);
        }
        Err(e) => {
            eprintln!("error: {:#}", anyhow::Error::from(e));
            return ExitCode::FAILURE;
        }
    };

    let service = match Service::bind(&config).await {
        Ok(service) => service,
        Err(e @ ServiceError::AddressInUse { .. }) => {
            eprintln!("error: {e}; is another server already running?");
            return ExitCode::from(EXIT_ADDRESS_IN_USE);
        }
        Err(e) => {
            eprintln!("error: {:#}", anyhow::Error::from(e));
            return ExitCode::FAILURE;
        }
    };

    match serve(service).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(service: Service) -> anyhow::Result<()> {
    let presenter = Arc::new(ConsolePresenter::new());
    let mediator = Arc::new(Mediator::new(service.handle(), presenter.clone()));
    service.set_observer(mediator.clone());
    mediator.start();

    let mut input = spawn_stdin_reader();
    let mut input_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("failed to listen for Ctrl-C")?;
                info!("interrupted");
                break;
            }
            line = input.recv(), if input_open => match line {
                Some(line) if presenter.input_enabled() => mediator.submit(&line),
                Some(_) => {}
                None => {
                    info!("stdin closed; serving until interrupted");
                    input_open = false;
                }
            },
        }
    }

    mediator.stop();
    service.wait_stopped().await;
    info!("server stopped");
    Ok(())
}

// A plain thread: a blocking stdin read must not hold up runtime shutdown.
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
