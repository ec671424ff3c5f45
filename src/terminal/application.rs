use log::{info, warn};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

use crate::config::types::Config;
use crate::device::controller::ControllerHandle;
use crate::error::AppRunError;
use crate::terminal::commands::{describe_changes, format_device, format_status, parse_command, resolve_target, UserCommand, HELP};

/**
 * How long (milliseconds) to wait for the peripheral to disconnect when quitting.
 */
const DISCONNECT_DEADLINE: u64 = 3000;

pub struct TerminalApplication {
    controller: ControllerHandle,
    config: Config,
}

impl TerminalApplication {
    pub fn new(controller: ControllerHandle, config: Config) -> Self {
        TerminalApplication { controller, config }
    }

    /// Executes one command. Returns false when the application should exit.
    pub async fn execute(&mut self, command: UserCommand) -> Result<bool, AppRunError> {
        match command {
            UserCommand::Scan => {
                if !self.controller.snapshot().radio_ready {
                    println!("Bluetooth is not available");
                }
                self.controller.start_scan().await?;
            },
            UserCommand::Stop => self.controller.stop_scan().await?,
            UserCommand::List => {
                let snapshot = self.controller.snapshot();
                if snapshot.devices.is_empty() {
                    println!("{}", if snapshot.scanning { "Searching…" } else { "No devices; type `scan` to find your ESP32" });
                }
                for (index, device) in snapshot.devices.iter().enumerate() {
                    println!("{}", format_device(index, device));
                }
            },
            UserCommand::Connect(target) => {
                let id = resolve_target(&target, &self.controller.snapshot().devices);
                self.controller.connect(id).await?;
            },
            UserCommand::Disconnect => self.controller.disconnect().await?,
            UserCommand::Send(text) => self.send(text).await?,
            UserCommand::Preset(label) => {
                match self.config.find_preset(&label) {
                    Some(preset) => {
                        let text = preset.text.clone();
                        self.send(text).await?;
                    },
                    None => {
                        let labels: Vec<&str> = self.config.presets.iter().map(|p| p.label.as_str()).collect();
                        println!("Unknown preset `{}`; available: {}", label, labels.join(", "));
                    },
                }
            },
            UserCommand::Status => println!("{}", format_status(&self.controller.snapshot())),
            UserCommand::Help => println!("{}", HELP),
            UserCommand::Quit => return Ok(false),
        }

        Ok(true)
    }

    async fn send(&mut self, text: String) -> Result<(), AppRunError> {
        if !self.controller.snapshot().connected {
            println!("Not connected; the command is dropped");
        }
        self.controller.send(text).await?;
        Ok(())
    }

    /// Releases the link, connected or still connecting, and waits a while for it to go down.
    pub async fn disconnect_before_close(&mut self) -> Result<(), AppRunError> {
        if !self.controller.snapshot().has_link() {
            return Ok(());
        }

        info!("Disconnecting before close");
        self.controller.disconnect().await?;
        let disconnected = self.controller.wait_for(|snapshot| !snapshot.has_link());
        if timeout(Duration::from_millis(DISCONNECT_DEADLINE), disconnected).await.is_err() {
            warn!("Peripheral did not disconnect in time");
        }
        Ok(())
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), AppRunError> {
        let mut lines = BufReader::new(stdin()).lines();
        let mut state = self.controller.subscribe();
        let mut previous = state.borrow_and_update().clone();

        println!("{}", HELP);

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                changed = state.changed() => {
                    if changed.is_err() {
                        warn!("Connection controller stopped");
                        break 'mainloop;
                    }

                    let current = state.borrow_and_update().clone();
                    for line in describe_changes(&previous, &current) {
                        println!("{}", line);
                    }
                    previous = current;
                },
                line = lines.next_line() => {
                    let line = match line? {
                        Some(line) => line,
                        None => break 'mainloop,
                    };

                    match parse_command(&line) {
                        Ok(Some(command)) => {
                            if !self.execute(command).await? {
                                break 'mainloop;
                            }
                        },
                        Ok(None) => {},
                        Err(err) => println!("{}", err),
                    }
                },
            }
        }

        self.disconnect_before_close().await
    }
}
