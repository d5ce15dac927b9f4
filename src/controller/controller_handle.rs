//! Controller Handle - composition root of the control link
//!
//! Wires the two transducers (speed, direction) to one throttle each and the
//! throttles to the robot channel. A single actor task owns all of them, so
//! pointer events, resizes and animation frames are applied strictly in
//! arrival order without any locking.
//!
//! ```text
//! pointer / resize ─┐
//!                   ├─► ControlLoop ─► Transducer ─► Throttle ─► ChannelSender
//! frame (16ms) ─────┘         │
//!                             └─► watch<ControlSnapshot>
//! ```
//!
//! [`ControllerHandle::drain`] releases any held control and resolves once
//! both knobs are back at rest and both throttles have flushed, so the last
//! value the robot sees is zero.

use crate::controller::status::StatusDisplay;
use crate::input::{
    AnimationSettings, ControlMode, InputError, Point, PointerEvent, Surface, Transducer,
};
use crate::link::{ChannelSender, ChannelStatus, Throttle, WireMessage};
use crate::schedule::ScheduledTask;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

const INPUT_BUFFER: usize = 256;

/// Configuration of both controls and their timing
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    /// Dead zone of the speed control, percent of its radius
    pub speed_dead_zone_percent: f64,

    /// Dead zone of the direction control, percent of its radius
    pub direction_dead_zone_percent: f64,

    /// Coalescing window of each outbound stream
    pub throttle_window_ms: u64,

    /// Period of the return-to-center animation
    pub frame_interval_ms: u64,

    pub animation: AnimationSettings,

    /// Surface applied to both controls at startup. The host may still
    /// resize each control later.
    pub initial_surface: Option<Surface>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            speed_dead_zone_percent: 5.0,
            direction_dead_zone_percent: 2.0,
            throttle_window_ms: 50,
            frame_interval_ms: 16,
            animation: AnimationSettings::default(),
            initial_surface: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Input error: {0}")]
    InputError(#[from] InputError),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),
}

/// Latest values of both controls as the operator sees them
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ControlSnapshot {
    pub speed: f64,
    pub direction: Point,
    pub speed_knob: Point,
    pub direction_knob: Point,
    pub speed_dragging: bool,
    pub direction_dragging: bool,
}

impl fmt::Display for ControlSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Speed: {:.0}%, X: {:.0}%, Y: {:.0}%",
            self.speed, self.direction.x, self.direction.y
        )
    }
}

#[derive(Debug)]
enum ControlInput {
    Pointer {
        control: ControlMode,
        event: PointerEvent,
    },
    Resize {
        control: ControlMode,
        surface: Surface,
    },
    Frame,
    Drain(oneshot::Sender<()>),
    Shutdown,
}

/// One transducer and the throttle feeding its stream
struct Stream {
    transducer: Transducer,
    throttle: Throttle<WireMessage>,
}

impl Stream {
    fn new(
        mode: ControlMode,
        dead_zone_percent: f64,
        settings: &ControllerSettings,
        channel: &ChannelSender,
    ) -> Result<Self, InputError> {
        let mut transducer = Transducer::new(mode, dead_zone_percent, settings.animation)?;
        if let Some(surface) = settings.initial_surface {
            transducer.resize(surface);
        }

        let label = match mode {
            ControlMode::Speed => "speed-throttle",
            ControlMode::Direction => "direction-throttle",
        };
        let channel = channel.clone();
        let throttle = Throttle::new(
            label,
            Duration::from_millis(settings.throttle_window_ms),
            move |message: WireMessage| {
                if let Err(e) = channel.send(&message) {
                    debug!("Dropped {:?}: {}", message, e);
                }
            },
        );

        Ok(Self {
            transducer,
            throttle,
        })
    }

    fn is_settled(&self) -> bool {
        self.transducer.is_resting() && !self.throttle.has_pending()
    }
}

struct ControlLoop {
    speed: Stream,
    direction: Stream,
    inputs: mpsc::Receiver<ControlInput>,
    snapshot: watch::Sender<ControlSnapshot>,
    frame: Option<ScheduledTask>,
    // Callers of drain waiting for both streams to settle
    drains: Vec<oneshot::Sender<()>>,
}

impl ControlLoop {
    async fn run(mut self) {
        info!("Control loop started");
        while let Some(input) = self.inputs.recv().await {
            match input {
                ControlInput::Pointer { control, event } => self.on_pointer(control, event),
                ControlInput::Resize { control, surface } => {
                    self.stream(control).transducer.resize(surface);
                }
                ControlInput::Frame => self.on_frame(),
                ControlInput::Drain(done) => self.on_drain(done),
                ControlInput::Shutdown => break,
            }
            self.resolve_drains();
        }
        self.teardown();
        info!("Control loop stopped");
    }

    fn stream(&mut self, control: ControlMode) -> &mut Stream {
        match control {
            ControlMode::Speed => &mut self.speed,
            ControlMode::Direction => &mut self.direction,
        }
    }

    fn on_pointer(&mut self, control: ControlMode, event: PointerEvent) {
        trace!("{} pointer event: {:?}", control, event);
        let stream = self.stream(control);
        if let Some(command) = stream.transducer.handle(event) {
            stream.throttle.submit(WireMessage::from(command));
            self.record(WireMessage::from(command));
        }
        self.refresh_knobs();
    }

    fn on_frame(&mut self) {
        for control in [ControlMode::Speed, ControlMode::Direction] {
            let stream = self.stream(control);
            if let Some(command) = stream.transducer.tick() {
                stream.throttle.submit(WireMessage::from(command));
                self.record(WireMessage::from(command));
            }
        }
        self.refresh_knobs();
    }

    fn on_drain(&mut self, done: oneshot::Sender<()>) {
        for control in [ControlMode::Speed, ControlMode::Direction] {
            let stream = self.stream(control);
            if stream.transducer.is_dragging() {
                debug!("Releasing held {} control for drain", control);
                stream.transducer.release();
            }
        }
        self.refresh_knobs();
        self.drains.push(done);
    }

    // Throttles flush on their own timers; frames keep arriving, so this is
    // re-checked at least once per frame interval
    fn resolve_drains(&mut self) {
        if self.drains.is_empty() || !self.speed.is_settled() || !self.direction.is_settled() {
            return;
        }
        debug!("Both controls settled, releasing {} drain(s)", self.drains.len());
        for done in self.drains.drain(..) {
            let _ = done.send(());
        }
    }

    fn record(&self, message: WireMessage) {
        self.snapshot.send_modify(|snapshot| match message {
            WireMessage::Speed { value } => snapshot.speed = value,
            WireMessage::Direction { x, y } => snapshot.direction = Point::new(x, y),
        });
    }

    // Knob offsets move on every frame of an animation; only wake watchers on change
    fn refresh_knobs(&self) {
        let speed_knob = self.speed.transducer.knob();
        let direction_knob = self.direction.transducer.knob();
        let speed_dragging = self.speed.transducer.is_dragging();
        let direction_dragging = self.direction.transducer.is_dragging();

        self.snapshot.send_if_modified(|snapshot| {
            let changed = snapshot.speed_knob != speed_knob
                || snapshot.direction_knob != direction_knob
                || snapshot.speed_dragging != speed_dragging
                || snapshot.direction_dragging != direction_dragging;
            snapshot.speed_knob = speed_knob;
            snapshot.direction_knob = direction_knob;
            snapshot.speed_dragging = speed_dragging;
            snapshot.direction_dragging = direction_dragging;
            changed
        });
    }

    fn teardown(&mut self) {
        if let Some(frame) = self.frame.take() {
            frame.cancel();
        }
        self.speed.throttle.cancel();
        self.direction.throttle.cancel();
    }
}

/// Handle to the running controller
///
/// Pointer events and resizes are queued to the control loop; connection
/// actions go straight to the channel.
pub struct ControllerHandle {
    inputs: mpsc::Sender<ControlInput>,
    snapshot: watch::Receiver<ControlSnapshot>,
    channel: ChannelSender,
    task: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    /// Spawns the control loop and its animation frame
    ///
    /// Fails when the settings describe an invalid dead zone or animation;
    /// nothing is spawned in that case.
    pub fn spawn(
        settings: Option<ControllerSettings>,
        channel: ChannelSender,
    ) -> Result<Self, ControllerError> {
        info!(
            "Initializing Controller system with settings: {:?}",
            settings
        );
        let settings = settings.unwrap_or_default();
        if settings.frame_interval_ms == 0 {
            return Err(ControllerError::InitializationError(
                "frame interval must be positive".to_string(),
            ));
        }

        let speed = Stream::new(
            ControlMode::Speed,
            settings.speed_dead_zone_percent,
            &settings,
            &channel,
        )?;
        let direction = Stream::new(
            ControlMode::Direction,
            settings.direction_dead_zone_percent,
            &settings,
            &channel,
        )?;

        let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(ControlSnapshot::default());
        debug!("Created input channel with buffer capacity {}", INPUT_BUFFER);

        let frames = input_tx.clone();
        let frame = ScheduledTask::repeating(
            "animation-frame",
            Duration::from_millis(settings.frame_interval_ms),
            move || match frames.try_send(ControlInput::Frame) {
                Ok(()) => true,
                // A busy loop simply skips this frame
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
        );

        let control_loop = ControlLoop {
            speed,
            direction,
            inputs: input_rx,
            snapshot: snapshot_tx,
            frame: Some(frame),
            drains: Vec::new(),
        };
        let task = tokio::spawn(control_loop.run());

        info!("Controller system initialized successfully");
        Ok(Self {
            inputs: input_tx,
            snapshot: snapshot_rx,
            channel,
            task: Some(task),
        })
    }

    pub async fn pointer(
        &self,
        control: ControlMode,
        event: PointerEvent,
    ) -> Result<(), ControllerError> {
        self.submit(ControlInput::Pointer { control, event }).await
    }

    pub async fn resize(
        &self,
        control: ControlMode,
        surface: Surface,
    ) -> Result<(), ControllerError> {
        self.submit(ControlInput::Resize { control, surface }).await
    }

    /// Releases held controls and waits until both have returned to rest and
    /// their final values have left the throttles
    pub async fn drain(&self) -> Result<(), ControllerError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.submit(ControlInput::Drain(done_tx)).await?;
        done_rx
            .await
            .map_err(|e| ControllerError::ChannelError(e.to_string()))
    }

    pub fn disconnect(&self) {
        info!("Operator requested disconnect");
        self.channel.disconnect();
    }

    pub fn reconnect(&self) {
        info!("Operator requested reconnect");
        self.channel.reconnect();
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlSnapshot> {
        self.snapshot.clone()
    }

    pub fn channel_status(&self) -> ChannelStatus {
        self.channel.status()
    }

    pub fn status_display(&self) -> StatusDisplay {
        StatusDisplay::from(&self.channel.status())
    }

    /// Stops the animation, drops pending sends and waits for the loop to end
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            if self.inputs.send(ControlInput::Shutdown).await.is_err() {
                debug!("Control loop already stopped");
            }
            if let Err(e) = task.await {
                error!("Control loop panicked: {}", e);
            }
        }
    }

    async fn submit(&self, input: ControlInput) -> Result<(), ControllerError> {
        self.inputs
            .send(input)
            .await
            .map_err(|e| ControllerError::ChannelError(e.to_string()))
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.inputs.try_send(ControlInput::Shutdown);
        }
    }
}
