use crate::device::types::{DeviceId, DiscoveredDevice, Snapshot};
use crate::error::ParseCommandError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Scan,
    Stop,
    List,
    Connect(String),
    Disconnect,
    Send(String),
    Preset(String),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  scan                 start scanning for peripherals
  stop                 stop scanning
  list                 list discovered peripherals
  connect <n|id>       connect to the n-th listed peripheral, or by id
  disconnect           disconnect from the current peripheral
  send <text>          send a command, e.g. `send LED:1`
  preset <label>       send a configured command preset, e.g. `preset LED ON`
  status               show the connection state
  help                 show this text
  quit                 disconnect and exit";

/// Parses one line of user input. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<UserCommand>, ParseCommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "scan" => UserCommand::Scan,
        "stop" => UserCommand::Stop,
        "list" | "ls" => UserCommand::List,
        "connect" => UserCommand::Connect(required(rest, "connect")?),
        "disconnect" => UserCommand::Disconnect,
        "send" => UserCommand::Send(required(rest, "send")?),
        "preset" => UserCommand::Preset(required(rest, "preset")?),
        "status" => UserCommand::Status,
        "help" | "?" => UserCommand::Help,
        "quit" | "exit" => UserCommand::Quit,
        _ => return Err(ParseCommandError::Unknown(word.to_string())),
    };

    Ok(Some(command))
}

fn required(argument: &str, command: &'static str) -> Result<String, ParseCommandError> {
    if argument.is_empty() {
        return Err(ParseCommandError::MissingArgument(command));
    }

    Ok(argument.to_string())
}

/// Resolves `connect` targets: a 1-based index into the device list, otherwise a raw id.
pub fn resolve_target(target: &str, devices: &[DiscoveredDevice]) -> DeviceId {
    if let Ok(index) = target.parse::<usize>() {
        if index >= 1 && index <= devices.len() {
            return devices[index - 1].id.clone();
        }
    }

    DeviceId::new(target)
}

pub fn format_device(index: usize, device: &DiscoveredDevice) -> String {
    format!("{:>3}. {} (RSSI {}) [{}]", index + 1, device.name, device.rssi, device.id)
}

pub fn format_status(snapshot: &Snapshot) -> String {
    let bluetooth = if snapshot.radio_ready { "on" } else { "off" };

    format!(
        "{} | phase: {} | bluetooth: {} | light status: {}",
        snapshot.connection_label(),
        snapshot.phase,
        bluetooth,
        snapshot.status_text,
    )
}

/// Lines describing what changed between two published states.
pub fn describe_changes(previous: &Snapshot, current: &Snapshot) -> Vec<String> {
    let mut lines = Vec::new();

    if previous.radio_ready != current.radio_ready {
        lines.push(if current.radio_ready {
            "Bluetooth is on".to_string()
        } else {
            "Bluetooth is off".to_string()
        });
    }

    if previous.connection_label() != current.connection_label() || previous.phase != current.phase {
        lines.push(format!("{} ({})", current.connection_label(), current.phase));
    }

    // the list only grows during a scan; a shorter list means a new scan started
    let known = if current.devices.len() >= previous.devices.len()
        && current.devices.starts_with(&previous.devices) {
        previous.devices.len()
    } else {
        0
    };
    for (index, device) in current.devices.iter().enumerate().skip(known) {
        lines.push(format_device(index, device));
    }

    if previous.status_text != current.status_text {
        lines.push(format!("Light status: {}", current.status_text));
    }

    lines
}
