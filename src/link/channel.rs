//! Resilient channel to the robot, driven by a statum state machine
//!
//! The channel owns the only socket of the process. A single driver task holds
//! the link, the reconnect counter and the status; everything else talks to it
//! through a [`ChannelSender`] and watches [`ChannelStatus`] snapshots.
//!
//! # State Machine
//!
//! ```text
//!                  ┌──────── open ok ────────┐
//!                  │                         ▼
//!  Connecting ─────┤                     Connected ── disconnect / shutdown ──┐
//!      ▲           │ handshake failed        │ close event                    │
//!      │           ▼                         ▼                                ▼
//!      │        Closing(code) ◄──────────────┘                          Disconnected
//!      │           │ code != 1000                  code == 1000               ▲  │
//!      │           ▼                           ─────────────────────────────► │  │
//!      └── delay ─ Reconnecting ── attempts exhausted / disconnect ───────────┘  │
//!      │                                                                         │
//!      └──────────────────────────── reconnect ──────────────────────────────────┘
//! ```
//!
//! # Reconnection
//!
//! Fixed delay, bounded attempts. The counter resets on every successful open,
//! so the bound applies to consecutive failures only. Exhaustion is terminal
//! until [`ChannelSender::reconnect`] is called.
//!
//! # Delivery
//!
//! At most once. [`ChannelSender::send`] refuses outright when the status
//! snapshot is not connected, and the driver drops anything that reaches it
//! while no link is open. Nothing is ever queued for a later connection.

use crate::link::message::WireMessage;
use crate::link::transport::{CloseInfo, Connector, Link, TransportEvent, INTENTIONAL_CLOSE};
use crate::schedule::ScheduledTask;
use serde::Serialize;
use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 64;

const CONNECTION_ERROR: &str = "Connection error occurred";
const CREATE_FAILED: &str = "Failed to create connection";
const MAX_ATTEMPTS_REACHED: &str = "Max reconnection attempts reached";
const DISCONNECT_REASON: &str = "Intentional disconnect";
const SHUTDOWN_REASON: &str = "Controller shut down";

/// Reconnection policy of a channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Fixed wait before each reconnect attempt
    pub reconnect_delay_ms: u64,

    /// Consecutive failed attempts after which the channel gives up
    pub max_reconnect_attempts: u32,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 3000,
            max_reconnect_attempts: 5,
        }
    }
}

impl ChannelSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Connectivity snapshot published on every transition
///
/// `connected` and `reconnecting` are never both true. Both false means idle,
/// with `error` telling whether the idle state is a failure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub connected: bool,
    pub reconnecting: bool,
    pub error: Option<String>,
}

impl ChannelStatus {
    pub fn connected() -> Self {
        Self {
            connected: true,
            reconnecting: false,
            error: None,
        }
    }

    /// Idle and not going to recover on its own
    pub fn is_terminal(&self) -> bool {
        !self.connected && !self.reconnecting && self.error.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Not connected")]
    NotConnected,

    #[error("Outbound queue is full")]
    Backlogged,

    #[error("Channel has shut down")]
    Closed,

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug)]
enum ChannelCommand {
    Send(String),
    Disconnect,
    Reconnect,
    Shutdown,
}

// Driver states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum LinkState {
    Connecting,
    Connected,
    Closing,
    Reconnecting,
    Disconnected,
}

#[machine]
pub struct ChannelDriver<S: LinkState> {
    url: String,
    settings: ChannelSettings,
    connector: Arc<dyn Connector>,
    commands: mpsc::Receiver<ChannelCommand>,
    status: watch::Sender<ChannelStatus>,

    // Reconnect attempts since the last successful open
    attempts: u32,
    link: Option<Link>,
    // Why the last link went away, consumed by Closing
    close: Option<CloseInfo>,

    // Set once the owner asked for teardown
    stopping: bool,
}

/// Where the driver goes next
enum Step {
    Connect(ChannelDriver<Connecting>),
    Run(ChannelDriver<Connected>),
    Close(ChannelDriver<Closing>),
    Retry(ChannelDriver<Reconnecting>),
    Idle(ChannelDriver<Disconnected>),
}

impl<S: LinkState> ChannelDriver<S> {
    fn publish(&self, update: impl FnOnce(&mut ChannelStatus)) {
        self.status.send_modify(update);
        debug!("Channel status: {:?}", *self.status.borrow());
    }

    fn publish_idle(&self) {
        self.publish(|status| *status = ChannelStatus::default());
    }
}

impl ChannelDriver<Connecting> {
    fn create(
        url: String,
        settings: ChannelSettings,
        connector: Arc<dyn Connector>,
        commands: mpsc::Receiver<ChannelCommand>,
        status: watch::Sender<ChannelStatus>,
    ) -> Self {
        Self::new(url, settings, connector, commands, status, 0, None, None, false)
    }

    /// Opens a link, staying responsive to disconnect and shutdown meanwhile
    async fn open(mut self) -> Step {
        info!("Connecting to robot at {} (attempt {})", self.url, self.attempts);

        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let connect = connector.connect(&url);
        tokio::pin!(connect);

        let result = loop {
            tokio::select! {
                result = &mut connect => break Some(result),
                command = self.commands.recv() => match command {
                    Some(ChannelCommand::Send(_)) => {
                        debug!("Dropping outbound message while connecting");
                    }
                    Some(ChannelCommand::Reconnect) => {
                        debug!("Connect already in progress");
                    }
                    Some(ChannelCommand::Disconnect) => break None,
                    Some(ChannelCommand::Shutdown) | None => {
                        self.stopping = true;
                        break None;
                    }
                },
            }
        };

        match result {
            None => {
                info!("Connect aborted by owner");
                self.publish_idle();
                Step::Idle(self.transition())
            }
            Some(Ok(link)) => {
                info!("Connected to robot!");
                self.attempts = 0;
                self.link = Some(link);
                self.publish(|status| *status = ChannelStatus::connected());
                Step::Run(self.transition())
            }
            Some(Err(e)) if e.is_permanent() => {
                error!("Error creating connection: {}", e);
                self.publish(|status| {
                    *status = ChannelStatus {
                        connected: false,
                        reconnecting: false,
                        error: Some(CREATE_FAILED.to_string()),
                    }
                });
                Step::Idle(self.transition())
            }
            Some(Err(e)) => {
                error!("Socket connection error: {}", e);
                self.publish(|status| {
                    status.connected = false;
                    status.error = Some(CONNECTION_ERROR.to_string());
                });
                self.close = Some(CloseInfo::abnormal());
                Step::Close(self.transition())
            }
        }
    }
}

impl ChannelDriver<Connected> {
    /// Pumps the link until it closes or the owner lets go of it
    async fn run_until_closed(mut self) -> Step {
        let Some(mut link) = self.link.take() else {
            warn!("Connected without a link, treating as abnormal closure");
            self.close = Some(CloseInfo::abnormal());
            return Step::Close(self.transition());
        };

        loop {
            tokio::select! {
                event = link.events.recv() => match event {
                    Some(TransportEvent::Message(text)) => handle_inbound(&text),
                    Some(TransportEvent::Error(reason)) => {
                        error!("Socket connection error: {}", reason);
                        self.publish(|status| {
                            status.connected = false;
                            status.error = Some(CONNECTION_ERROR.to_string());
                        });
                    }
                    Some(TransportEvent::Closed(info)) => {
                        self.close = Some(info);
                        return Step::Close(self.transition());
                    }
                    None => {
                        self.close = Some(CloseInfo::abnormal());
                        return Step::Close(self.transition());
                    }
                },
                command = self.commands.recv() => match command {
                    Some(ChannelCommand::Send(text)) => {
                        if let Err(e) = link.writer.send_text(text).await {
                            warn!("Error sending message: {}", e);
                        }
                    }
                    Some(ChannelCommand::Reconnect) => {
                        debug!("Reconnect requested while connected, ignoring");
                    }
                    Some(ChannelCommand::Disconnect) => {
                        close_link(&mut link, DISCONNECT_REASON).await;
                        self.publish_idle();
                        return Step::Idle(self.transition());
                    }
                    Some(ChannelCommand::Shutdown) | None => {
                        close_link(&mut link, SHUTDOWN_REASON).await;
                        self.stopping = true;
                        self.publish_idle();
                        return Step::Idle(self.transition());
                    }
                },
            }
        }
    }
}

impl ChannelDriver<Closing> {
    /// Publishes the closure and applies the close-code policy
    fn settle(mut self) -> Step {
        let info = self.close.take().unwrap_or_else(CloseInfo::abnormal);

        info!("Disconnected from robot: {} {}", info.code, info.reason);
        self.publish(|status| {
            status.connected = false;
            status.error = Some(format!("Connection closed ({})", info.code));
        });

        if info.is_intentional() {
            Step::Idle(self.transition())
        } else {
            Step::Retry(self.transition())
        }
    }
}

impl ChannelDriver<Reconnecting> {
    /// Waits out the reconnect delay, or gives up once attempts are exhausted
    async fn wait_for_retry(mut self) -> Step {
        let max = self.settings.max_reconnect_attempts;
        if self.attempts >= max {
            warn!("Giving up after {} reconnection attempts", self.attempts);
            self.publish(|status| {
                status.reconnecting = false;
                status.error = Some(MAX_ATTEMPTS_REACHED.to_string());
            });
            return Step::Idle(self.transition());
        }

        let attempt = self.attempts + 1;
        info!(
            "Reconnecting in {}ms (attempt {}/{})",
            self.settings.reconnect_delay_ms, attempt, max
        );
        self.publish(|status| {
            status.reconnecting = true;
            status.error = Some(format!("Reconnecting... (Attempt {attempt}/{max})"));
        });

        let (due_tx, mut due_rx) = oneshot::channel();
        let timer = ScheduledTask::once("reconnect", self.settings.reconnect_delay(), move || {
            let _ = due_tx.send(());
        });

        loop {
            tokio::select! {
                _ = &mut due_rx => {
                    self.attempts += 1;
                    return Step::Connect(self.transition());
                }
                command = self.commands.recv() => match command {
                    Some(ChannelCommand::Send(_)) => {
                        debug!("Dropping outbound message while reconnecting");
                    }
                    Some(ChannelCommand::Reconnect) => {
                        info!("Manual reconnect requested, skipping delay");
                        timer.cancel();
                        self.attempts = 0;
                        return Step::Connect(self.transition());
                    }
                    Some(ChannelCommand::Disconnect) => {
                        timer.cancel();
                        self.publish_idle();
                        return Step::Idle(self.transition());
                    }
                    Some(ChannelCommand::Shutdown) | None => {
                        timer.cancel();
                        self.stopping = true;
                        self.publish_idle();
                        return Step::Idle(self.transition());
                    }
                },
            }
        }
    }
}

impl ChannelDriver<Disconnected> {
    /// Parks until an explicit reconnect; `None` once the owner is gone
    async fn idle(mut self) -> Option<ChannelDriver<Connecting>> {
        if self.stopping {
            return None;
        }

        while let Some(command) = self.commands.recv().await {
            match command {
                ChannelCommand::Reconnect => {
                    info!("Manual reconnect requested");
                    self.attempts = 0;
                    self.publish(|status| {
                        status.reconnecting = false;
                        status.error = None;
                    });
                    return Some(self.transition());
                }
                ChannelCommand::Send(_) => {
                    debug!("Dropping outbound message while disconnected");
                }
                ChannelCommand::Disconnect => self.publish_idle(),
                ChannelCommand::Shutdown => return None,
            }
        }
        None
    }
}

async fn drive(driver: ChannelDriver<Connecting>) {
    let mut step = Step::Connect(driver);
    loop {
        step = match step {
            Step::Connect(driver) => driver.open().await,
            Step::Run(driver) => driver.run_until_closed().await,
            Step::Close(driver) => driver.settle(),
            Step::Retry(driver) => driver.wait_for_retry().await,
            Step::Idle(driver) => match driver.idle().await {
                Some(connecting) => Step::Connect(connecting),
                None => break,
            },
        };
    }
    info!("Robot link stopped");
}

async fn close_link(link: &mut Link, reason: &str) {
    if let Err(e) = link.writer.close(INTENTIONAL_CLOSE, reason).await {
        debug!("Close frame not delivered: {}", e);
    }
}

// Inbound payloads are informational only and never touch the status
fn handle_inbound(text: &str) {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(data) => info!("Received message: {}", data),
        Err(e) => warn!("Error parsing message: {}", e),
    }
}

/// Cloneable front of a running channel
#[derive(Clone, Debug)]
pub struct ChannelSender {
    commands: mpsc::Sender<ChannelCommand>,
    status: watch::Receiver<ChannelStatus>,
}

impl ChannelSender {
    /// Fire-and-forget send; fails unless the channel is connected right now
    ///
    /// Gated on the published status, not on the socket itself: after a
    /// transport error the status reads disconnected, so sends are refused
    /// with [`SendError::NotConnected`] even while the socket is still open
    /// and waiting for its close event.
    pub fn send(&self, message: &WireMessage) -> Result<(), SendError> {
        if !self.status.borrow().connected {
            return Err(SendError::NotConnected);
        }
        let text = message.to_json()?;
        self.commands
            .try_send(ChannelCommand::Send(text))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SendError::Backlogged,
                mpsc::error::TrySendError::Closed(_) => SendError::Closed,
            })
    }

    /// Closes the link intentionally and cancels any pending reconnect
    pub fn disconnect(&self) {
        self.command(ChannelCommand::Disconnect);
    }

    /// Starts over with a fresh attempt counter
    pub fn reconnect(&self) {
        self.command(ChannelCommand::Reconnect);
    }

    pub fn status(&self) -> ChannelStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelStatus> {
        self.status.clone()
    }

    fn command(&self, command: ChannelCommand) {
        if let Err(e) = self.commands.try_send(command) {
            warn!("Channel command not delivered: {}", e);
        }
    }
}

/// Owner of the channel driver task
///
/// Dropping it tears the channel down; [`ResilientChannel::shutdown`] does the
/// same and waits until the socket is closed.
#[derive(Debug)]
pub struct ResilientChannel {
    sender: ChannelSender,
    task: Option<JoinHandle<()>>,
}

impl ResilientChannel {
    /// Spawns the driver and starts connecting right away
    pub fn spawn(
        url: impl Into<String>,
        settings: ChannelSettings,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let url = url.into();
        info!(
            "Spawning robot link to {} with settings: {:?}",
            url, settings
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(ChannelStatus::default());

        let driver = ChannelDriver::create(url, settings, connector, command_rx, status_tx);
        let task = tokio::spawn(drive(driver));

        Self {
            sender: ChannelSender {
                commands: command_tx,
                status: status_rx,
            },
            task: Some(task),
        }
    }

    pub fn sender(&self) -> ChannelSender {
        self.sender.clone()
    }

    pub fn send(&self, message: &WireMessage) -> Result<(), SendError> {
        self.sender.send(message)
    }

    pub fn disconnect(&self) {
        self.sender.disconnect();
    }

    pub fn reconnect(&self) {
        self.sender.reconnect();
    }

    pub fn status(&self) -> ChannelStatus {
        self.sender.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelStatus> {
        self.sender.subscribe()
    }

    /// Closes the socket intentionally and waits for the driver to finish
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            if self.sender.commands.send(ChannelCommand::Shutdown).await.is_err() {
                debug!("Channel driver already stopped");
            }
            if let Err(e) = task.await {
                error!("Channel driver panicked: {}", e);
            }
        }
    }
}

impl Drop for ResilientChannel {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.sender.commands.try_send(ChannelCommand::Shutdown);
        }
    }
}
