use futures::{SinkExt, Stream, StreamExt};
use futures::channel::mpsc::{channel, Sender};
use log::{debug, info};
use tokio::spawn;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::types::ReconnectPolicy;
use crate::device::connection::ConnectionStateMachine;
use crate::device::constants::COMMAND_CHANNEL_SIZE;
use crate::device::radio::{Radio, RadioEventFor};
use crate::device::types::{DeviceId, Snapshot};
use crate::error::ControllerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartScan,
    StopScan,
    Connect(DeviceId),
    Disconnect,
    Send(String),
}

fn apply_command<R: Radio>(machine: &mut ConnectionStateMachine<R>, command: Command) {
    match command {
        Command::StartScan => machine.start_scan(),
        Command::StopScan => machine.stop_scan(),
        Command::Connect(id) => machine.connect(&id),
        Command::Disconnect => machine.disconnect(),
        Command::Send(text) => machine.send(&text),
    }
}

/// Cheap to clone front door of the controller task. Every operation only enqueues a command;
/// results become visible through [`ControllerHandle::snapshot`] once the radio reports back.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: Sender<Command>,
    state: watch::Receiver<Snapshot>,
}

impl ControllerHandle {
    async fn submit(&mut self, command: Command) -> Result<(), ControllerError> {
        self.commands.send(command).await?;
        Ok(())
    }

    pub async fn start_scan(&mut self) -> Result<(), ControllerError> {
        self.submit(Command::StartScan).await
    }

    pub async fn stop_scan(&mut self) -> Result<(), ControllerError> {
        self.submit(Command::StopScan).await
    }

    pub async fn connect(&mut self, id: DeviceId) -> Result<(), ControllerError> {
        self.submit(Command::Connect(id)).await
    }

    pub async fn disconnect(&mut self) -> Result<(), ControllerError> {
        self.submit(Command::Disconnect).await
    }

    pub async fn send<S: Into<String>>(&mut self, text: S) -> Result<(), ControllerError> {
        self.submit(Command::Send(text.into())).await
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.clone()
    }

    /// Waits until the published state satisfies `predicate` and returns it. Returns `None`
    /// once the controller task has stopped.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Option<Snapshot>
    where
        F: FnMut(&Snapshot) -> bool,
    {
        let mut state = self.state.clone();
        let result = match state.wait_for(|snapshot| predicate(snapshot)).await {
            Ok(snapshot) => Some(snapshot.clone()),
            Err(_) => None,
        };
        result
    }
}

/// Spawns the task that exclusively owns the connection state machine. Commands and radio
/// events are applied one at a time in the order they are received; after each one the full
/// state is published as a single [`Snapshot`].
pub fn spawn_controller<R, E>(
    cancel: CancellationToken,
    radio: R,
    mut events: E,
    policy: ReconnectPolicy,
) -> (ControllerHandle, JoinHandle<()>)
where
    R: Radio + Send + 'static,
    E: Stream<Item = RadioEventFor<R>> + Unpin + Send + 'static,
{
    let (command_sender, mut command_receiver) = channel::<Command>(COMMAND_CHANNEL_SIZE);
    let (state_sender, state_receiver) = watch::channel(Snapshot::default());

    let handle = spawn(async move {
        let mut machine = ConnectionStateMachine::new(radio, policy);
        info!("Connection controller started (reconnect policy: {})", policy);

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                command = command_receiver.next() => match command {
                    Some(command) => {
                        debug!("Applying {:?}", command);
                        apply_command(&mut machine, command);
                    },
                    None => {
                        info!("All controller handles dropped");
                        break 'mainloop;
                    },
                },
                event = events.next() => match event {
                    Some(event) => {
                        debug!("Handling {:?}", event);
                        machine.handle_event(event);
                    },
                    None => {
                        info!("Radio event stream ended");
                        break 'mainloop;
                    },
                },
            }

            let snapshot = machine.snapshot();
            state_sender.send_if_modified(|current| {
                if *current == snapshot {
                    return false;
                }
                *current = snapshot;
                true
            });
        }

        info!("Connection controller stopped");
    });

    let controller = ControllerHandle {
        commands: command_sender,
        state: state_receiver,
    };

    (controller, handle)
}
