//! Bridge Handle - async API around the blocking bridge worker
//!
//! The worker blocks on serial reads, so it runs on tokio's blocking pool
//! and is stopped cooperatively through a [`CancellationToken`]. Status and
//! telemetry reach async consumers through watch channels.

use super::bridge_loop::{run_bridge, BridgeLoop, RunSummary};
use super::connector::Connector;
use super::error::BridgeError;
use super::{BridgeStatus, TelemetrySnapshot};
use crate::config::BridgeConfig;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct BridgeHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<RunSummary, BridgeError>>>,
    status_receiver: watch::Receiver<BridgeStatus>,
    telemetry_receiver: watch::Receiver<TelemetrySnapshot>,
    stop_timeout: Duration,
}

impl BridgeHandle {
    /// Starts a bridge run on the blocking pool
    ///
    /// Must be called from within a tokio runtime. Connection failures are
    /// reported through [`BridgeHandle::wait`] and the status channel.
    pub fn spawn(config: BridgeConfig, connector: Box<dyn Connector>) -> Self {
        info!("Spawning bridge worker for {}", config.serial.port);

        let stop_timeout = config.timing.stop_timeout();
        let (status_sender, status_receiver) = watch::channel(BridgeStatus::Idle);
        let (telemetry_sender, telemetry_receiver) = watch::channel(TelemetrySnapshot::default());

        let bridge = BridgeLoop::create(config, connector, telemetry_sender, status_sender);
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        let task = tokio::task::spawn_blocking(move || {
            debug!("Bridge worker thread started");
            let result = run_bridge(bridge, worker_cancel);
            if let Err(e) = &result {
                error!("Bridge worker terminated with error: {}", e);
            }
            result
        });

        Self {
            cancel,
            task: Some(task),
            status_receiver,
            telemetry_receiver,
            stop_timeout,
        }
    }

    /// Receiver for throttled telemetry snapshots
    pub fn subscribe(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.telemetry_receiver.clone()
    }

    pub fn status(&self) -> watch::Receiver<BridgeStatus> {
        self.status_receiver.clone()
    }

    pub fn is_running(&self) -> bool {
        self.status_receiver.borrow().is_active()
    }

    /// Requests a stop and waits up to the configured stop timeout
    ///
    /// On [`BridgeError::StopTimeout`] the worker keeps running detached and a
    /// later call may retry the wait.
    pub async fn stop(&mut self) -> Result<RunSummary, BridgeError> {
        info!("Stop requested");
        self.cancel.cancel();

        let task = self.task.as_mut().ok_or(BridgeError::NotRunning)?;
        match tokio::time::timeout(self.stop_timeout, task).await {
            Ok(joined) => {
                self.task = None;
                flatten(joined)
            }
            Err(_) => {
                warn!("Bridge worker still busy after {:?}", self.stop_timeout);
                Err(BridgeError::StopTimeout(self.stop_timeout))
            }
        }
    }

    /// Waits for the worker to end on its own, without requesting a stop
    ///
    /// Cancel safe, so it can sit in a `select!` next to a shutdown signal.
    pub async fn wait(&mut self) -> Result<RunSummary, BridgeError> {
        let task = self.task.as_mut().ok_or(BridgeError::NotRunning)?;
        let joined = task.await;
        self.task = None;
        flatten(joined)
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            debug!("Bridge handle dropped, cancelling worker");
            self.cancel.cancel();
        }
    }
}

fn flatten(
    joined: Result<Result<RunSummary, BridgeError>, JoinError>,
) -> Result<RunSummary, BridgeError> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(BridgeError::Worker(e.to_string())),
    }
}
