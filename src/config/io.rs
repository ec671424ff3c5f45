use std::env::current_exe;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str;
use std::sync::{Arc, Mutex, MutexGuard};
use directories_next::ProjectDirs;
use fd_lock::{RwLock, RwLockWriteGuard};
use log::{debug, info, warn};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::config::types::Config;
use crate::error::ConfigError;

const CONFIG_FILE_NAME: &str = "esp32-ble-control.json";

// <exe name>.json next to the executable, so a copy on a usb stick carries its own settings
fn portable_config_path() -> Option<PathBuf> {
    let mut path = match current_exe() {
        Ok(path) => path,
        Err(err) => {
            warn!("failed to get current exe path: {:?}", err);
            return None;
        },
    };

    if !path.set_extension("json") {
        return None;
    }
    Some(path)
}

fn default_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = portable_config_path() {
        if path.is_file() {
            return Ok(path);
        }
        debug!("No portable config at {}", path.to_string_lossy());
    }

    ProjectDirs::from("nl", "esp32", "esp32-ble-control")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoConfigPath)
}

/// Exclusive lock on the config file; only one instance drives the radio.
pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<std::fs::File>, ConfigError> {
        self.rw_lock.try_write().map_err(|source| ConfigError::CanNotLock { source })
    }
}

#[derive(Clone)]
pub struct ConfigIO {
    file: Arc<Mutex<std::fs::File>>,
    path: PathBuf,
}

impl ConfigIO {
    /// Opens the config file at `path`, or at the default location when `None`.
    pub fn new_sync(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path,
            None => default_config_path()?,
        };
        info!("Using config file {}", path.to_string_lossy());

        if let Some(directory) = path.parent() {
            if !directory.as_os_str().is_empty() {
                std::fs::create_dir_all(directory)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .create(true)
            .open(&path)?;

        Ok(ConfigIO { file: Arc::new(Mutex::new(file)), path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn locker(&self) -> Result<ConfigIOLocker, ConfigError> {
        let file = self.std_file().try_clone()?;
        Ok(ConfigIOLocker { rw_lock: RwLock::new(file) })
    }

    fn std_file(&self) -> MutexGuard<'_, std::fs::File> {
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // a handle sharing the cursor of the locked file; dropping it does not close the original
    fn file(&self) -> Result<File, ConfigError> {
        let file = self.std_file().try_clone()?;
        Ok(File::from_std(file))
    }

    async fn read_content(&self) -> Result<Vec<u8>, ConfigError> {
        let mut file = self.file()?;
        file.rewind().await?;

        let mut content = vec![];
        file.read_to_end(&mut content).await?;
        Ok(content)
    }

    pub async fn read(&self) -> Result<Config, ConfigError> {
        info!("Reading config file");
        let content = self.read_content().await?;

        if content.is_empty() {
            return Ok(Config::default());
        }

        let content = str::from_utf8(&content)?;
        Ok(serde_json::from_str(content)?)
    }

    /// Like [`ConfigIO::read`], but writes the defaults to a new (empty) config file.
    pub async fn read_or_init(&self) -> Result<Config, ConfigError> {
        let content = self.read_content().await?;

        if content.is_empty() {
            info!("Config file is empty, writing defaults");
            let config = Config::default();
            self.save(config.clone()).await?;
            return Ok(config);
        }

        self.read().await
    }

    pub async fn save(&self, config: Config) -> Result<(), ConfigError> {
        info!("Saving config");
        let content = serde_json::to_string_pretty(&config)?;

        let mut file = self.file()?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
