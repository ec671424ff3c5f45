use std::path::PathBuf;
use std::process::ExitCode;
use clap::Parser;
use log::info;
use esp32_ble_control::{init_logging, run, RunOptions};
use esp32_ble_control::config::types::{LogLevel, ReconnectPolicy};
use esp32_ble_control::error::{AppRunError, ConfigError};

#[derive(Parser, Debug)]
#[command(author, version)]
#[command(about = "Scans for, connects to and sends text commands to an ESP32 BLE peripheral.", long_about = None)]
struct Args {
    /// Path to the config file. Defaults to <executable>.json if it exists, otherwise a file in
    /// the user's config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// What to do when connecting while another peripheral is connected: reject or replaceExisting
    #[arg(long)]
    reconnect_policy: Option<ReconnectPolicy>,

    /// Log verbose output, overrides the logLevel of the config file.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = init_logging() {
        eprintln!("Failed to initialize logging: {}", err);
        return ExitCode::FAILURE;
    }
    info!(concat!("ESP32 BLE Control ", env!("CARGO_PKG_VERSION")));

    let options = RunOptions {
        config_path: args.config,
        reconnect_policy: args.reconnect_policy,
        log_level: if args.verbose { Some(LogLevel::Debug) } else { None },
    };

    match run(options).await {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            eprintln!("This application has already been started");
            ExitCode::FAILURE
        },
        Err(err) => {
            eprintln!("Unexpected error: {}", err);
            ExitCode::FAILURE
        },
        Ok(_) => ExitCode::SUCCESS,
    }
}
