//! Bridge worker with statum state machine
//!
//! Owns the transport, the decoder, the per-channel conditioning state and
//! both sinks for the duration of one run.
//!
//! # State Machine
//!
//! ```text
//! Idle ──► Connecting ──► Running ──► Stopping ──► Stopped
//!               │                        ▲
//!               └── open failure         └── cancel or fatal error
//! ```
//!
//! While `Running`, a missing telemetry stream moves the published status to
//! [`BridgeStatus::TimeoutNeutral`] and back without leaving the state.

use super::connector::Connector;
use super::error::BridgeError;
use super::sink::{Axis, JoystickSink, JoystickState, KeySink};
use super::transport::Transport;
use super::{BridgeStatus, TelemetrySnapshot};
use crate::config::BridgeConfig;
use crate::signal::{AxisMapper, SwitchFilter};
use crate::telemetry::{decoder_for, DecodeDiagnostics, Frame, FrameDecoder, SWITCH_COUNT};
use chrono::Local;
use statum::{machine, state};
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const READ_CHUNK: usize = 256;

/// States of one bridge run
#[state]
#[derive(Debug, Clone)]
pub enum BridgeState {
    Idle,       // Configured, nothing acquired
    Connecting, // Acquiring sinks and transport
    Running,    // Decoding telemetry and driving outputs
    Stopping,   // Releasing resources
    Stopped,    // Done, summary available
}

/// What a single [`BridgeLoop::step`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A frame was decoded and pushed to the outputs
    Frame,
    /// Idle timeout elapsed, neutral outputs pushed
    Neutral,
    /// Nothing decoded yet, still within the idle timeout
    Waiting,
}

/// Counters reported when a run ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub key_taps: u64,
    pub key_failures: u64,
    /// Times the bridge went from live telemetry to neutral hold
    pub idle_entries: u64,
    /// Rate-limited "no telemetry" warnings emitted
    pub idle_warnings: u64,
    pub decode: DecodeDiagnostics,
}

/// Mutable per-run state, built once when the loop is created
struct RunState {
    mappers: Vec<AxisMapper>,
    filters: Vec<SwitchFilter>,
    // None until the first frame, so the first frame always taps
    last_switches: [Option<bool>; SWITCH_COUNT],
    last_frame_at: Instant,
    last_snapshot_at: Option<Instant>,
    last_idle_warning: Option<Instant>,
    neutral_hold: bool,
    summary: RunSummary,
}

impl RunState {
    fn new(config: &BridgeConfig, now: Instant) -> Self {
        let filter_settings = config.filter_settings();
        Self {
            mappers: config.axis_configs().into_iter().map(AxisMapper::new).collect(),
            filters: (0..SWITCH_COUNT)
                .map(|_| SwitchFilter::new(filter_settings.clone()))
                .collect(),
            last_switches: [None; SWITCH_COUNT],
            last_frame_at: now,
            last_snapshot_at: None,
            last_idle_warning: None,
            neutral_hold: false,
            summary: RunSummary::default(),
        }
    }
}

#[machine]
pub struct BridgeLoop<S: BridgeState> {
    config: BridgeConfig,
    connector: Box<dyn Connector>,
    decoder: Box<dyn FrameDecoder>,
    transport: Option<Box<dyn Transport>>,
    joystick: Option<Box<dyn JoystickSink>>,
    keys: Option<Box<dyn KeySink>>,
    run: RunState,
    read_buffer: Vec<u8>,
    telemetry: watch::Sender<TelemetrySnapshot>,
    status: watch::Sender<BridgeStatus>,
}

impl<S: BridgeState> BridgeLoop<S> {
    fn publish_status(&self, status: BridgeStatus) {
        debug!("Bridge status: {}", status);
        self.status.send_replace(status);
    }
}

impl BridgeLoop<Idle> {
    pub fn create(
        config: BridgeConfig,
        connector: Box<dyn Connector>,
        telemetry: watch::Sender<TelemetrySnapshot>,
        status: watch::Sender<BridgeStatus>,
    ) -> Self {
        let decoder = decoder_for(config.serial.wire_format);
        let run = RunState::new(&config, Instant::now());

        Self::new(
            config,
            connector,
            decoder,
            None, // transport
            None, // joystick
            None, // keys
            run,
            vec![0; READ_CHUNK],
            telemetry,
            status,
        )
    }

    pub fn start(self) -> BridgeLoop<Connecting> {
        info!(
            "Starting bridge on {} ({} frames)",
            self.config.serial.port, self.config.serial.wire_format
        );
        self.publish_status(BridgeStatus::Connecting);
        self.transition()
    }
}

impl BridgeLoop<Connecting> {
    /// Acquires the joystick and the transport, in that order
    ///
    /// Either failure ends the run before `Running`; the published status
    /// becomes [`BridgeStatus::Failed`].
    pub fn connect(mut self) -> Result<BridgeLoop<Running>, BridgeError> {
        let device_id = self.config.joystick.device_id;
        let joystick = match self.connector.open_joystick(device_id) {
            Ok(joystick) => joystick,
            Err(e) => {
                error!("Virtual joystick {} unavailable: {}", device_id, e);
                let err = BridgeError::JoystickOpen(e);
                self.publish_status(BridgeStatus::Failed(err.to_string()));
                return Err(err);
            }
        };

        let transport = match self.connector.open_transport(&self.config.serial) {
            Ok(transport) => transport,
            Err(e) => {
                error!("Serial port {} unavailable: {}", self.config.serial.port, e);
                let err = BridgeError::TransportOpen(e);
                self.publish_status(BridgeStatus::Failed(err.to_string()));
                return Err(err);
            }
        };

        info!(
            "Connected to {}, driving virtual joystick {}",
            transport.name(),
            device_id
        );

        self.joystick = Some(joystick);
        self.transport = Some(transport);
        self.keys = Some(self.connector.open_keys());
        // The idle timeout counts from the moment the link is up
        self.run.last_frame_at = Instant::now();

        self.publish_status(BridgeStatus::Running);
        Ok(self.transition())
    }
}

impl BridgeLoop<Running> {
    /// Performs one iteration: decode at most one frame or run the watchdog
    ///
    /// Buffered frames are drained before the transport is read again, so a
    /// burst of frames is processed one per step without blocking.
    pub fn step(&mut self, now: Instant) -> Result<StepOutcome, BridgeError> {
        let mut frame = self.decoder.next_frame(&[]);

        if frame.is_none() {
            let transport = self
                .transport
                .as_mut()
                .ok_or_else(|| BridgeError::InvalidState("transport not connected".to_string()))?;
            let count = transport
                .read(&mut self.read_buffer)
                .map_err(BridgeError::TransportRead)?;
            if count > 0 {
                frame = self.decoder.next_frame(&self.read_buffer[..count]);
            }
        }

        match frame {
            Some(frame) => {
                self.apply_frame(&frame, now)?;
                Ok(StepOutcome::Frame)
            }
            None => {
                let silent_for = now.saturating_duration_since(self.run.last_frame_at);
                if silent_for > self.config.timing.idle_timeout() {
                    self.hold_neutral(now)?;
                    Ok(StepOutcome::Neutral)
                } else {
                    Ok(StepOutcome::Waiting)
                }
            }
        }
    }

    /// Steps until `cancel` fires or a fatal error occurs
    pub fn run_until_cancelled(
        mut self,
        cancel: &CancellationToken,
    ) -> (BridgeLoop<Stopping>, Result<(), BridgeError>) {
        info!("Bridge loop running");

        while !cancel.is_cancelled() {
            if let Err(e) = self.step(Instant::now()) {
                error!("Bridge loop failed: {}", e);
                return (self.stop(), Err(e));
            }
        }

        info!("Cancellation received, stopping bridge");
        (self.stop(), Ok(()))
    }

    pub fn stop(self) -> BridgeLoop<Stopping> {
        self.publish_status(BridgeStatus::Stopping);
        self.transition()
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = self.run.summary.clone();
        summary.decode = self.decoder.diagnostics().clone();
        summary
    }

    fn apply_frame(&mut self, frame: &Frame, now: Instant) -> Result<(), BridgeError> {
        let pots = frame.pots();
        let raw_switches = frame.switches();

        let mut state = JoystickState::neutral();
        for axis in Axis::ALL {
            let index = axis.index();
            let value = self.run.mappers[index].map(i32::from(pots[index]));
            state.set_axis(axis, value);
        }

        let mut switches = [false; SWITCH_COUNT];
        for (index, filter) in self.run.filters.iter_mut().enumerate() {
            switches[index] = filter.feed(raw_switches[index], now);
        }
        state.buttons = switches;

        let joystick = self
            .joystick
            .as_mut()
            .ok_or_else(|| BridgeError::InvalidState("joystick not connected".to_string()))?;
        joystick.update(&state).map_err(BridgeError::OutputSink)?;

        self.run.last_frame_at = now;
        self.run.summary.frames += 1;
        if self.run.neutral_hold {
            self.run.neutral_hold = false;
            self.run.last_idle_warning = None;
            info!("Telemetry resumed");
            self.publish_status(BridgeStatus::Running);
        }

        self.tap_edges(switches);
        self.publish_snapshot(frame, switches, now);
        Ok(())
    }

    /// Taps the configured key for every switch whose stable state changed
    fn tap_edges(&mut self, switches: [bool; SWITCH_COUNT]) {
        for (index, &on) in switches.iter().enumerate() {
            if self.run.last_switches[index] == Some(on) {
                continue;
            }
            self.run.last_switches[index] = Some(on);

            let Some(key) = self.config.switches[index].key_for(on) else {
                continue;
            };
            let Some(keys) = self.keys.as_mut() else {
                continue;
            };

            info!(
                "Switch {} {} -> tap '{}'",
                index + 1,
                if on { "ON" } else { "OFF" },
                key
            );
            match keys.tap(key) {
                Ok(()) => self.run.summary.key_taps += 1,
                Err(e) => {
                    warn!("{}", e);
                    self.run.summary.key_failures += 1;
                }
            }
        }
    }

    fn publish_snapshot(&mut self, frame: &Frame, switches: [bool; SWITCH_COUNT], now: Instant) {
        let interval = self.config.timing.observer_interval();
        if let Some(last) = self.run.last_snapshot_at {
            if now.saturating_duration_since(last) < interval {
                return;
            }
        }
        self.run.last_snapshot_at = Some(now);

        let snapshot = TelemetrySnapshot {
            pots: frame.pots(),
            switches,
            calibration: frame.calibration(),
            timestamp: Local::now(),
        };
        // No subscribers is fine; monitoring is optional
        if self.telemetry.send(snapshot).is_err() {
            debug!("No telemetry subscribers");
        }
    }

    fn hold_neutral(&mut self, now: Instant) -> Result<(), BridgeError> {
        if !self.run.neutral_hold {
            self.run.neutral_hold = true;
            self.run.summary.idle_entries += 1;
            self.publish_status(BridgeStatus::TimeoutNeutral);
        }

        let joystick = self
            .joystick
            .as_mut()
            .ok_or_else(|| BridgeError::InvalidState("joystick not connected".to_string()))?;
        joystick
            .update(&JoystickState::neutral())
            .map_err(BridgeError::OutputSink)?;

        let warn_due = self.run.last_idle_warning.map_or(true, |last| {
            now.saturating_duration_since(last) >= self.config.timing.idle_warn_interval()
        });
        if warn_due {
            warn!(
                "No telemetry from {} for {:?}, outputs held neutral. Check wiring and baud rate ({})",
                self.config.serial.port,
                now.saturating_duration_since(self.run.last_frame_at),
                self.config.serial.baud
            );
            self.run.last_idle_warning = Some(now);
            self.run.summary.idle_warnings += 1;
        }
        Ok(())
    }
}

impl BridgeLoop<Stopping> {
    /// Pushes a final neutral state and releases transport and sinks
    ///
    /// A failing final update is logged; shutdown always completes.
    pub fn shutdown(mut self) -> BridgeLoop<Stopped> {
        info!("Neutralizing outputs");
        if let Some(joystick) = self.joystick.as_mut() {
            if let Err(e) = joystick.update(&JoystickState::neutral()) {
                warn!("Final neutral update failed: {}", e);
            }
        }

        if let Some(transport) = self.transport.take() {
            info!("Closing {}", transport.name());
            drop(transport);
        }
        self.keys = None;
        self.joystick = None;

        self.publish_status(BridgeStatus::Stopped);
        self.transition()
    }
}

impl BridgeLoop<Stopped> {
    pub fn summary(&self) -> RunSummary {
        let mut summary = self.run.summary.clone();
        summary.decode = self.decoder.diagnostics().clone();
        summary
    }

    /// Marks the run as ended by `err` for status observers
    pub fn fail(&self, err: &BridgeError) {
        self.publish_status(BridgeStatus::Failed(err.to_string()));
    }
}

/// Drives a bridge through its whole lifecycle on the calling thread
///
/// Blocks until `cancel` fires or a fatal error ends the run. Outputs are
/// neutralized on both paths whenever the run got past `Connecting`.
pub fn run_bridge(
    bridge: BridgeLoop<Idle>,
    cancel: CancellationToken,
) -> Result<RunSummary, BridgeError> {
    let running = bridge.start().connect()?;
    let (stopping, outcome) = running.run_until_cancelled(&cancel);
    let stopped = stopping.shutdown();
    let summary = stopped.summary();

    match outcome {
        Ok(()) => {
            info!(
                "Bridge stopped: {} frames, {} key taps, {} dropped inputs",
                summary.frames,
                summary.key_taps,
                summary.decode.dropped()
            );
            Ok(summary)
        }
        Err(e) => {
            stopped.fail(&e);
            Err(e)
        }
    }
}
