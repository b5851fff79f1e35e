//! Async driver running the upgrade state machine on a tokio task.
//!
//! The driver task owns the [`UpgradeManager`] and is the only place it is
//! touched: host commands, received bytes and timer expiries are queued on
//! channels and handled one at a time, in arrival order. Listener callbacks
//! become [`UpgradeEvent`]s and outbound packets go to a [`Transport`].
//!
//! # Example
//!
//! ```ignore
//! use gaia_updater::{SerialTransport, UpgradeConfig, UpgradeDriver, UpgradeEvent};
//!
//! let transport = SerialTransport::open("/dev/rfcomm0")?;
//! let reader = transport.try_clone()?;
//! let config = UpgradeConfig { transport: TransportKind::Serial, ..Default::default() };
//!
//! let (handle, mut events) = UpgradeDriver::spawn(transport, &config);
//! reader.spawn_reader(handle.clone());
//! handle.start(PathBuf::from("firmware.bin")).await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         UpgradeEvent::ConfirmationRequired(kind) => handle.confirm(kind, true)?,
//!         UpgradeEvent::Finished => break,
//!         other => println!("{:?}", other),
//!     }
//! }
//! ```

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::UpgradeConfig;
use crate::error::{DriverError, UpgradeError};
use crate::gaia::GaiaFramer;
use crate::traits::{TimerToken, UpgradeListener};
use crate::transport::Transport;
use crate::upgrade::{
    ConfirmationKind, FirmwareImage, FirmwareSource, Phase, ResumePoint, TokioScheduler,
    UpgradeManager, UploadProgress,
};

/// Everything the host hears about an upgrade.
#[derive(Debug, Clone, PartialEq)]
pub enum UpgradeEvent {
    ResumePointChanged(ResumePoint),
    Progress(UploadProgress),
    /// Answer with [`UpgradeHandle::confirm`].
    ConfirmationRequired(ConfirmationKind),
    Error(UpgradeError),
    Finished,
    /// The upgrade channel was closed.
    Disconnected,
    /// A packet could not be written to the transport.
    TransportFailed(String),
}

/// Listener forwarding to a transport and an event channel.
struct DriverListener<T: Transport> {
    transport: T,
    framer: GaiaFramer,
    events: mpsc::UnboundedSender<UpgradeEvent>,
}

impl<T: Transport> DriverListener<T> {
    fn emit(&self, event: UpgradeEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        if let Err(e) = self.transport.write(bytes) {
            warn!("Transport write failed: {}", e);
            self.emit(UpgradeEvent::TransportFailed(e.to_string()));
        }
    }

    /// Register for upgrade notifications and open the upgrade channel.
    fn connect(&mut self) {
        for frame in [
            self.framer.register_upgrade_notifications(),
            self.framer.upgrade_connect(),
        ] {
            match frame {
                Ok(bytes) => self.write(&bytes),
                Err(e) => warn!("Failed to frame connect command: {}", e),
            }
        }
    }
}

impl<T: Transport> UpgradeListener for DriverListener<T> {
    fn send_bytes(&mut self, bytes: Vec<u8>) {
        self.write(&bytes);
    }

    fn on_error(&mut self, error: UpgradeError) {
        self.emit(UpgradeEvent::Error(error));
    }

    fn on_resume_point_changed(&mut self, point: ResumePoint) {
        self.emit(UpgradeEvent::ResumePointChanged(point));
    }

    fn on_finished(&mut self) {
        self.emit(UpgradeEvent::Finished);
    }

    fn on_progress(&mut self, progress: UploadProgress) {
        self.emit(UpgradeEvent::Progress(progress));
    }

    fn ask_confirmation(&mut self, kind: ConfirmationKind) {
        self.emit(UpgradeEvent::ConfirmationRequired(kind));
    }

    /// Close the upgrade channel and stop upgrade notifications.
    fn disconnect(&mut self) {
        for frame in [
            self.framer.upgrade_disconnect(),
            self.framer.cancel_upgrade_notifications(),
        ] {
            match frame {
                Ok(bytes) => self.write(&bytes),
                Err(e) => warn!("Failed to frame disconnect command: {}", e),
            }
        }
        self.emit(UpgradeEvent::Disconnected);
    }
}

enum Command {
    Start {
        image: Result<FirmwareImage, UpgradeError>,
        reply: oneshot::Sender<Result<(), UpgradeError>>,
    },
    Resume {
        reply: oneshot::Sender<bool>,
    },
    Abort,
    Receive(Vec<u8>),
    LinkAck,
    Confirm {
        kind: ConfirmationKind,
        accepted: bool,
    },
    Status {
        reply: oneshot::Sender<(Phase, Option<UploadProgress>)>,
    },
    Shutdown,
}

/// Task owning the state machine.
pub struct UpgradeDriver<T: Transport> {
    manager: UpgradeManager<DriverListener<T>, TokioScheduler>,
    commands: mpsc::UnboundedReceiver<Command>,
    timers: mpsc::UnboundedReceiver<TimerToken>,
}

impl<T: Transport + 'static> UpgradeDriver<T> {
    /// Spawn the driver on the current tokio runtime.
    pub fn spawn(
        transport: T,
        config: &UpgradeConfig,
    ) -> (UpgradeHandle, mpsc::UnboundedReceiver<UpgradeEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let listener = DriverListener {
            transport,
            framer: config.framer(),
            events: event_tx,
        };
        let driver = Self {
            manager: UpgradeManager::new(listener, TokioScheduler::new(timer_tx), config),
            commands: command_rx,
            timers: timer_rx,
        };
        tokio::spawn(driver.run());

        (UpgradeHandle { commands: command_tx }, event_rx)
    }

    async fn run(mut self) {
        info!("Upgrade driver started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                Some(token) = self.timers.recv() => self.manager.on_timer(token),
            }
        }
        info!("Upgrade driver stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start { image, reply } => {
                // The manager rejects a busy session before looking at the image.
                if image.is_ok()
                    && !self.manager.is_upgrading()
                    && self.manager.phase() == Phase::Idle
                {
                    self.manager.listener_mut().connect();
                }
                let _ = reply.send(self.manager.start(image));
            }
            Command::Resume { reply } => {
                if self.manager.is_upgrading() {
                    self.manager.listener_mut().connect();
                }
                let _ = reply.send(self.manager.resume());
            }
            Command::Abort => self.manager.abort(),
            Command::Receive(bytes) => self.manager.receive_inbound(&bytes),
            Command::LinkAck => self.manager.on_link_ack(),
            Command::Confirm { kind, accepted } => self.manager.confirm(kind, accepted),
            Command::Status { reply } => {
                let _ = reply.send((self.manager.phase(), self.manager.progress()));
            }
            Command::Shutdown => {}
        }
    }
}

/// Cloneable handle to a running [`UpgradeDriver`].
#[derive(Debug, Clone)]
pub struct UpgradeHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Start { .. } => write!(f, "Start"),
            Command::Resume { .. } => write!(f, "Resume"),
            Command::Abort => write!(f, "Abort"),
            Command::Receive(bytes) => write!(f, "Receive({} bytes)", bytes.len()),
            Command::LinkAck => write!(f, "LinkAck"),
            Command::Confirm { kind, accepted } => write!(f, "Confirm({:?}, {})", kind, accepted),
            Command::Status { .. } => write!(f, "Status"),
            Command::Shutdown => write!(f, "Shutdown"),
        }
    }
}

impl UpgradeHandle {
    /// Connect the upgrade channel and start uploading `source`.
    ///
    /// The file is read on the blocking thread pool.
    pub async fn start<S>(&self, source: S) -> Result<(), DriverError>
    where
        S: FirmwareSource + Send + 'static,
    {
        let image = tokio::task::spawn_blocking(move || source.load()).await?;

        let (reply, response) = oneshot::channel();
        self.send(Command::Start { image, reply })?;
        response.await.map_err(|_| DriverError::Closed)??;
        Ok(())
    }

    /// Reconnect and resume the current session.
    pub async fn resume(&self) -> Result<bool, DriverError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Resume { reply })?;
        response.await.map_err(|_| DriverError::Closed)
    }

    pub fn abort(&self) -> Result<(), DriverError> {
        self.send(Command::Abort)
    }

    /// Feed one GAIA packet received from the device.
    pub fn receive(&self, bytes: Vec<u8>) -> Result<(), DriverError> {
        self.send(Command::Receive(bytes))
    }

    /// Report delivery of the last packet, for links without GAIA acknowledgements.
    pub fn link_ack(&self) -> Result<(), DriverError> {
        self.send(Command::LinkAck)
    }

    pub fn confirm(&self, kind: ConfirmationKind, accepted: bool) -> Result<(), DriverError> {
        self.send(Command::Confirm { kind, accepted })
    }

    /// Current phase and transfer progress.
    pub async fn status(&self) -> Result<(Phase, Option<UploadProgress>), DriverError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Status { reply })?;
        response.await.map_err(|_| DriverError::Closed)
    }

    /// Stop the driver task. Pending commands are dropped.
    pub fn shutdown(&self) -> Result<(), DriverError> {
        self.send(Command::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: Command) -> Result<(), DriverError> {
        self.commands.send(command).map_err(|_| DriverError::Closed)
    }
}
