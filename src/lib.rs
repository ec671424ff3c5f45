use std::env;
use std::path::PathBuf;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::io::ConfigIO;
use crate::config::types::{Config, LogLevel, ReconnectPolicy};
use crate::device::btle::BtleRadio;
use crate::device::controller::spawn_controller;
use crate::error::AppRunError;
use crate::terminal::application::TerminalApplication;

pub mod config;
pub mod device;
pub mod error;
pub mod terminal;

pub fn init_logging() -> Result<(), fern::InitError> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        // the effective level is set with set_log_level, once the config is known
        .level(log::LevelFilter::Trace)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(fern::log_file(log_file)?);
    }

    dispatch.apply()?;
    set_log_level(LogLevel::Info);
    Ok(())
}

pub fn set_log_level(level: LogLevel) {
    log::set_max_level(level.into());
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub reconnect_policy: Option<ReconnectPolicy>,
    pub log_level: Option<LogLevel>,
}

pub async fn run(options: RunOptions) -> Result<(), AppRunError> {
    let config_io = ConfigIO::new_sync(options.config_path)?;
    let mut locker = config_io.locker()?;
    let _guard = locker.lock()?;

    let config = match config_io.read_or_init().await {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load config {}: {}; using defaults", config_io.path().to_string_lossy(), err);
            Config::default()
        },
    };
    set_log_level(options.log_level.unwrap_or(config.log_level));

    let policy = options.reconnect_policy.unwrap_or(config.reconnect_policy);
    let cancel = CancellationToken::new();

    let (radio, events) = BtleRadio::new(cancel.child_token()).await?;
    let (controller, controller_task) = spawn_controller(cancel.child_token(), radio, events, policy);

    let result = TerminalApplication::new(controller, config)
        .run(cancel.child_token())
        .await;

    info!("Shutting down");
    cancel.cancel();
    if let Err(err) = controller_task.await {
        warn!("Failed to join connection controller: {}", err);
    }

    result
}
