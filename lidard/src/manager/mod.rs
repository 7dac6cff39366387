//! LiDAR management layer
//!
//! [`LidarManager`] owns the device lifecycle. It mediates between the one
//! acquisition task that talks to the hardware and any number of stream
//! subscribers, and serializes control requests (start, stop, reset,
//! reconfigure) so they never interleave.
//!
//! # Concurrency
//!
//! - The state lives in a [`StateMachine`] backed by a `watch` channel;
//!   `status()` reads it without taking the control lock.
//! - Control operations hold `control` (a tokio mutex) while they change
//!   the acquisition slot. `start()` releases it before waiting for the
//!   motor to stabilize, which is what lets `stop()` cancel a pending start.
//! - The acquisition task exclusively owns the driver; nothing else issues
//!   hardware commands.

mod acquisition;
pub mod assembler;
pub mod hub;
pub mod rpm;
pub mod state_machine;

use lidar_core::api::StatusResponse;
use lidar_core::config::StreamConfig;
use lidar_core::{DeviceState, LidarConfig, LidarError, Result, Scan};
use lidar_hardware::DriverFactory;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use acquisition::Acquisition;
pub use hub::{FanoutHub, SubscriberHandle, SubscriberId};
pub use state_machine::{HardwareEvent, StateMachine};

/// Handle on a running acquisition task
struct AcquisitionTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct ControlSlot {
    task: Option<AcquisitionTask>,
}

/// Orchestrates the state machine, the acquisition task and the fan-out hub
pub struct LidarManager {
    state: Arc<StateMachine>,
    config: RwLock<LidarConfig>,
    hub: Arc<FanoutHub>,
    factory: Arc<dyn DriverFactory>,
    control: Mutex<ControlSlot>,
    malformed: Arc<AtomicU64>,
    created_at: Instant,
}

impl LidarManager {
    /// Create an idle manager. Nothing touches hardware until `start()`.
    pub fn new(factory: Arc<dyn DriverFactory>, config: LidarConfig, stream: &StreamConfig) -> Self {
        Self {
            state: Arc::new(StateMachine::new()),
            config: RwLock::new(config),
            hub: Arc::new(FanoutHub::new(
                stream.subscriber_capacity,
                stream.overflow_policy,
            )),
            factory,
            control: Mutex::new(ControlSlot::default()),
            malformed: Arc::new(AtomicU64::new(0)),
            created_at: Instant::now(),
        }
    }

    /// Start the device; resolves once Running or with the reason it failed.
    pub async fn start(&self) -> Result<()> {
        let mut control = self.control.lock().await;
        let ready = self.spawn_acquisition(&mut control).await?;
        drop(control);

        await_ready(ready).await
    }

    /// Stop the device and wait until the port is released.
    ///
    /// Idempotent, safe while a start is still in progress, and from the
    /// error state it doubles as the explicit reset.
    pub async fn stop(&self) -> Result<()> {
        let mut control = self.control.lock().await;
        self.stop_locked(&mut control).await
    }

    /// Clear a fault: Error → Idle
    pub async fn reset(&self) -> Result<()> {
        let mut control = self.control.lock().await;
        let state = self.state.state();
        if !matches!(state, DeviceState::Error(_)) {
            return Err(LidarError::InvalidTransition {
                operation: "reset",
                state: state.to_string(),
            });
        }

        join_task(&mut control).await;
        self.state.reset()?;
        info!("LiDAR reset after fault");
        Ok(())
    }

    /// Replace the hardware configuration.
    ///
    /// Idle: applied directly. Running: stop, apply, start. If the restart
    /// fails the previous configuration is put back and a restart with it
    /// is attempted before the error is returned.
    pub async fn reconfigure(&self, new_config: LidarConfig) -> Result<LidarConfig> {
        let mut control = self.control.lock().await;

        if self.state.request_reconfigure(&new_config)? == DeviceState::Idle {
            *self.config.write().await = new_config.clone();
            info!("Configuration updated");
            return Ok(new_config);
        }

        info!("Reconfiguring running LiDAR");
        self.stop_locked(&mut control).await?;
        let previous = std::mem::replace(&mut *self.config.write().await, new_config.clone());
        let ready = self.spawn_acquisition(&mut control).await?;
        drop(control);

        match await_ready(ready).await {
            Ok(()) => {
                info!("LiDAR restarted with new configuration");
                Ok(new_config)
            }
            Err(e) => {
                warn!("Restart with new configuration failed: {}", e);
                self.rollback(previous, &e).await;
                Err(e)
            }
        }
    }

    /// Current configuration
    pub async fn config(&self) -> LidarConfig {
        self.config.read().await.clone()
    }

    /// Current state
    pub fn state(&self) -> DeviceState {
        self.state.state()
    }

    /// Receiver notified on every state transition
    pub fn watch_state(&self) -> watch::Receiver<DeviceState> {
        self.state.watch()
    }

    /// Snapshot for the status endpoint
    pub async fn status(&self) -> StatusResponse {
        let (state, fault) = StatusResponse::state_fields(&self.state.state());
        StatusResponse {
            state,
            fault,
            config: self.config().await,
            subscriber_count: self.hub.subscriber_count(),
            malformed_sample_count: self.malformed.load(Ordering::Relaxed),
            scans_published: self.hub.published_count(),
            uptime_secs: self.created_at.elapsed().as_secs(),
        }
    }

    /// Open a scan stream with the default queue settings
    pub fn subscribe(&self) -> SubscriberHandle {
        self.hub.subscribe()
    }

    /// Most recently completed scan
    pub fn latest_scan(&self) -> Option<Arc<Scan>> {
        self.hub.latest()
    }

    pub fn hub(&self) -> &Arc<FanoutHub> {
        &self.hub
    }

    /// "serial" or "mock"
    pub fn hardware_mode(&self) -> &'static str {
        self.factory.mode()
    }

    /// Process exit: stop the device, or with `stop_motor == false` only
    /// abandon the acquisition task and leave the hardware as it is.
    pub async fn shutdown(&self, stop_motor: bool) {
        if stop_motor {
            info!("Stopping LiDAR before exit...");
            match self.stop().await {
                Ok(()) => info!("LiDAR stopped"),
                Err(e) => warn!("Failed to stop LiDAR during shutdown: {}", e),
            }
            return;
        }

        let mut control = self.control.lock().await;
        if let Some(task) = control.task.take() {
            info!("Leaving LiDAR running on exit");
            task.handle.abort();
        }
    }

    /// Admit a start and spawn the acquisition task. Caller holds `control`.
    async fn spawn_acquisition(
        &self,
        control: &mut ControlSlot,
    ) -> Result<oneshot::Receiver<Result<()>>> {
        self.state.request_start()?;

        // A task left over from a faulted run has already halted the hardware
        join_task(control).await;

        let config = self.config.read().await.clone();
        info!(
            "Starting LiDAR on {} @ {} baud",
            config.serial_port, config.baud_rate
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = oneshot::channel();
        let acquisition = Acquisition {
            state: self.state.clone(),
            hub: self.hub.clone(),
            factory: self.factory.clone(),
            malformed: self.malformed.clone(),
            config,
            stop_rx,
        };

        control.task = Some(AcquisitionTask {
            stop_tx,
            handle: tokio::spawn(acquisition.run(ready_tx)),
        });
        Ok(ready_rx)
    }

    async fn stop_locked(&self, control: &mut ControlSlot) -> Result<()> {
        match self.state.state() {
            DeviceState::Idle => {
                debug!("Stop requested while idle");
                join_task(control).await;
                Ok(())
            }
            DeviceState::Error(reason) => {
                info!("Stopping from error state ({})", reason);
                join_task(control).await;
                self.state.reset()?;
                Ok(())
            }
            _ => {
                self.state.request_stop()?;
                join_task(control).await;

                // A fault that won the race against the stop request still ends in Idle
                match self.state.state() {
                    DeviceState::Stopping => {
                        self.state.on_hardware_event(HardwareEvent::MotorHalted)?;
                    }
                    DeviceState::Error(_) => {
                        self.state.reset()?;
                    }
                    _ => {}
                }
                info!("LiDAR stopped");
                Ok(())
            }
        }
    }

    async fn rollback(&self, previous: LidarConfig, cause: &LidarError) {
        let mut control = self.control.lock().await;

        match self.state.state() {
            DeviceState::Error(_) => {
                join_task(&mut control).await;
                if let Err(e) = self.state.reset() {
                    error!("Failed to reset before rollback: {}", e);
                    return;
                }
            }
            DeviceState::Idle => {}
            other => {
                warn!("Not rolling back configuration: device is {}", other);
                return;
            }
        }

        *self.config.write().await = previous;
        info!("Previous configuration restored");

        if matches!(cause, LidarError::StartAborted) {
            return;
        }

        let ready = match self.spawn_acquisition(&mut control).await {
            Ok(ready) => ready,
            Err(e) => {
                error!("Failed to restart with previous configuration: {}", e);
                return;
            }
        };
        drop(control);

        match await_ready(ready).await {
            Ok(()) => info!("LiDAR restarted with previous configuration"),
            Err(e) => error!("Restart with previous configuration failed: {}", e),
        }
    }
}

/// Signal the acquisition task (if any) and wait for it to finish
async fn join_task(control: &mut ControlSlot) {
    if let Some(task) = control.task.take() {
        let _ = task.stop_tx.send(true);
        if let Err(e) = task.handle.await {
            error!("Acquisition task failed: {}", e);
        }
    }
}

async fn await_ready(ready: oneshot::Receiver<Result<()>>) -> Result<()> {
    ready.await.unwrap_or_else(|_| {
        Err(LidarError::HardwareFault(
            "acquisition task ended before reporting readiness".to_string(),
        ))
    })
}
