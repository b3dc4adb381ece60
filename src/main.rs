use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use historian::common::logging::{init_logger, LogLevel};
use historian::daemon::{validate_config, DeviceConfig, Historian, HistorianMessage};

#[derive(Parser, Debug)]
struct Args {
    config_file: std::path::PathBuf,
    #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
    #[arg(long = "log-file", default_value = "")]
    log_file: String,
}

/// Forwards one JSON message per stdin line until EOF.
async fn read_stdin(tx: mpsc::Sender<HistorianMessage>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!("Couldn't read stdin: {}", err);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<HistorianMessage>(&line) {
            Ok(message) => {
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            Err(err) => warn!("Skipping malformed message: {}", err),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    //We have to keep the worker guard alive
    let _worker_guard = init_logger(args.log_level, &args.log_file).unwrap_or_else(|e| {
        eprintln!("Couldn't init logger: {}", e);
        std::process::exit(1);
    });

    let config = std::fs::read_to_string(&args.config_file).unwrap_or_else(|e| {
        error!("Couldn't read config file: {}", e);
        std::process::exit(1);
    });

    let config: Vec<DeviceConfig> = serde_json::from_str(&config).unwrap_or_else(|e| {
        error!("Couldn't parse config file: {}", e);
        std::process::exit(1);
    });

    if let Err(err) = validate_config(&config) {
        error!("Wrong config:\n{}", err);
        std::process::exit(1);
    }

    let historian = Historian::from_config(&config).unwrap_or_else(|e| {
        error!("Couldn't open stores: {}", e);
        std::process::exit(1);
    });

    let (tx, rx) = mpsc::channel::<HistorianMessage>(1024);

    let listener = tokio::spawn(Arc::new(historian).listen(rx));

    tokio::select! {
        _ = read_stdin(tx) => {
            info!("Input closed, flushing pending messages");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted by user, stopping process");
        }
    }

    // The sender is gone either way, the listener ends once the queue is drained
    if let Err(err) = listener.await {
        error!("Listener task failed: {}", err);
    }

    // A pending stdin read would otherwise hold the runtime open
    std::process::exit(0);
}
