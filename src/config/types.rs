use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// What `connect` does while another peripheral is pending or connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconnectPolicy {
    /// Ignore the new connect request.
    #[default]
    Reject,
    /// Disconnect the current peripheral, then connect to the new one once the link is gone.
    ReplaceExisting,
}

impl fmt::Display for ReconnectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            ReconnectPolicy::Reject => "reject",
            ReconnectPolicy::ReplaceExisting => "replaceExisting",
        };

        write!(f, "{}", result)
    }
}

impl FromStr for ReconnectPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(ReconnectPolicy::Reject),
            "replaceExisting" | "replace-existing" | "replace" => Ok(ReconnectPolicy::ReplaceExisting),
            other => Err(format!("unknown reconnect policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// A named shortcut for a command string, e.g. "LED ON" sends "LED:1".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPreset {
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub reconnect_policy: ReconnectPolicy,
    pub log_level: LogLevel,
    pub presets: Vec<CommandPreset>,
}

impl Config {
    pub fn find_preset(&self, label: &str) -> Option<&CommandPreset> {
        self.presets
            .iter()
            .find(|preset| preset.label.eq_ignore_ascii_case(label))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            reconnect_policy: ReconnectPolicy::default(),
            log_level: LogLevel::default(),
            presets: vec![
                CommandPreset {
                    label: "LED ON".to_string(),
                    text: "LED:1".to_string(),
                },
                CommandPreset {
                    label: "LED OFF".to_string(),
                    text: "LED:0".to_string(),
                },
            ],
        }
    }
}
