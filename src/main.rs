//! SDL Agent Chat
//!
//! Terminal chat client for SDL agent sessions. Connects to the chat server over
//! WebSocket, prints the transcript as it changes and sends typed lines back.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sdl_chat_client::console::{self, ChatView, InputCommand};
use sdl_chat_client::{ClientConfig, ConnectionManager};

/// SDL Agent Chat
///
/// Terminal chat client for SDL agent sessions
#[derive(Parser, Debug)]
#[command(name = "sdl-chat")]
#[command(version, about, long_about = None)]
struct Args {
    /// Chat server endpoint (overrides the config file)
    #[arg(short, long)]
    url: Option<String>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();

    info!("SDL Agent Chat v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(url) = args.url {
        config = config.with_url(url);
    }

    // Compose the client and the console view
    let manager = ConnectionManager::new(config);
    let view = Arc::new(Mutex::new(ChatView::new(io::stdout())));
    console::wire_view(&manager, &view);

    manager.connect();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => match console::parse_input(&line) {
                        InputCommand::Ignore => {}
                        InputCommand::Send(text) => {
                            manager.send_user_message(text);
                        }
                        InputCommand::Reply(text) => {
                            manager.send_human_input_response(text);
                        }
                        InputCommand::Quit => break,
                    },
                    None => {
                        info!("Input closed");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Initiating shutdown...");
                break;
            }
        }
    }

    manager.disconnect();
    info!("Goodbye");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
