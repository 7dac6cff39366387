//! The acquisition task
//!
//! The single producer: it exclusively owns the driver for its whole life,
//! from open through spin-up and scanning to the final motor stop. Every
//! await point also watches the stop signal.

use lidar_core::{FaultReason, LidarConfig, LidarError, Result};
use lidar_hardware::{is_disconnect_error, DriverFactory, HalEvent, LidarCommand, LidarDriver};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::assembler::ScanAssembler;
use super::hub::FanoutHub;
use super::rpm::RpmMonitor;
use super::state_machine::{HardwareEvent, StateMachine};

/// How a phase of the task ended when it did not simply succeed
enum Interrupted {
    /// `stop()` was requested
    Stop,
    /// Stabilization window elapsed
    Timeout,
    /// The driver reported an error
    Fault(LidarError),
}

pub(crate) struct Acquisition {
    pub state: Arc<StateMachine>,
    pub hub: Arc<FanoutHub>,
    pub factory: Arc<dyn DriverFactory>,
    pub malformed: Arc<AtomicU64>,
    pub config: LidarConfig,
    pub stop_rx: watch::Receiver<bool>,
}

/// Resolve once a stop has been requested (or the manager side went away)
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        debug!("Stop channel closed");
    }
}

impl Acquisition {
    /// Run to completion. `ready` receives the outcome of the start phase.
    pub async fn run(mut self, ready: oneshot::Sender<Result<()>>) {
        let mut driver = tokio::select! {
            biased;
            _ = stop_requested(&mut self.stop_rx) => {
                info!("Start aborted before the device was opened");
                let _ = ready.send(Err(LidarError::StartAborted));
                return;
            }
            opened = self.factory.open(&self.config) => match opened {
                Ok(driver) => driver,
                Err(e) => {
                    let message = e.to_string();
                    error!("Failed to open LiDAR on {}: {}", self.config.serial_port, message);
                    let _ = self.state.on_hardware_event(HardwareEvent::Fault(
                        FaultReason::HardwareOpenFailed(message.clone()),
                    ));
                    let _ = ready.send(Err(LidarError::HardwareOpenFailed(message)));
                    return;
                }
            },
        };
        info!(
            "Opened LiDAR on {}",
            driver.port_path().unwrap_or(self.factory.mode())
        );

        match self.spin_up(driver.as_mut()).await {
            Ok(()) => {}
            Err(interrupted) => {
                halt(driver.as_mut()).await;
                let result = match interrupted {
                    Interrupted::Stop => {
                        info!("Start aborted by stop request");
                        Err(LidarError::StartAborted)
                    }
                    Interrupted::Timeout => {
                        let timeout_ms = self.config.stabilization_timeout_ms;
                        warn!("Motor RPM did not stabilize within {} ms", timeout_ms);
                        let _ = self
                            .state
                            .on_hardware_event(HardwareEvent::StabilizationTimeout);
                        Err(LidarError::RpmStabilizationTimeout { timeout_ms })
                    }
                    Interrupted::Fault(e) => {
                        let message = e.to_string();
                        let _ = self.state.on_hardware_event(HardwareEvent::Fault(
                            FaultReason::HardwareFault(message.clone()),
                        ));
                        Err(LidarError::HardwareFault(message))
                    }
                };
                let _ = ready.send(result);
                return;
            }
        }

        if self
            .state
            .on_hardware_event(HardwareEvent::RpmStabilized)
            .is_err()
        {
            // A stop slipped in between the last rotation and the transition
            halt(driver.as_mut()).await;
            let _ = ready.send(Err(LidarError::StartAborted));
            return;
        }
        let _ = ready.send(Ok(()));

        match self.stream(driver.as_mut()).await {
            Interrupted::Fault(e) => {
                if is_disconnect_error(&e) {
                    error!("LiDAR disconnected while scanning: {}", e);
                } else {
                    error!("Hardware fault while scanning: {}", e);
                }
                // Release the port first so the error state never has hardware attached
                halt(driver.as_mut()).await;
                let _ = self.state.on_hardware_event(HardwareEvent::Fault(
                    FaultReason::HardwareFault(e.to_string()),
                ));
            }
            _ => {
                info!("Acquisition stopping");
                halt(driver.as_mut()).await;
            }
        }
    }

    /// Start the motor and scanning, then wait for a stable RPM
    async fn spin_up(&mut self, driver: &mut dyn LidarDriver) -> std::result::Result<(), Interrupted> {
        let deadline =
            Instant::now() + Duration::from_millis(self.config.stabilization_timeout_ms);

        for command in [
            LidarCommand::SetMotorPwm(self.config.pwm_duty),
            LidarCommand::StartScan,
        ] {
            tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop_rx) => return Err(Interrupted::Stop),
                sent = driver.send_command(command) => sent.map_err(Interrupted::Fault)?,
            }
        }

        info!(
            "Waiting for motor to reach {} RPM (pwm {})",
            self.config.motor_rpm_target, self.config.pwm_duty
        );
        let mut monitor = RpmMonitor::new(&self.config);
        loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop_rx) => return Err(Interrupted::Stop),
                _ = tokio::time::sleep_until(deadline) => return Err(Interrupted::Timeout),
                event = driver.read_sample() => match event {
                    Ok(HalEvent::EndOfRotation) => {
                        monitor.on_boundary(Instant::now());
                        if monitor.is_stable() {
                            info!(
                                "Motor stabilized at {:.1} RPM",
                                monitor.last_rpm().unwrap_or_default()
                            );
                            return Ok(());
                        }
                    }
                    Ok(HalEvent::Sample(_)) => {}
                    Err(e) => return Err(Interrupted::Fault(e)),
                },
            }
        }
    }

    /// Assemble and publish scans until stopped or faulted
    async fn stream(&mut self, driver: &mut dyn LidarDriver) -> Interrupted {
        let mut assembler = ScanAssembler::new(self.malformed.clone());
        loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop_rx) => return Interrupted::Stop,
                event = driver.read_sample() => match event {
                    Ok(event) => {
                        if let Some(scan) = assembler.feed(event) {
                            self.hub.publish(Arc::new(scan));
                        }
                    }
                    Err(e) => return Interrupted::Fault(e),
                },
            }
        }
    }
}

/// Stop scanning, stop the motor and release the port. Best effort: each
/// step runs even if an earlier one failed.
async fn halt(driver: &mut dyn LidarDriver) {
    for command in [LidarCommand::StopScan, LidarCommand::StopMotor] {
        if let Err(e) = driver.send_command(command).await {
            warn!("{:?} failed during shutdown: {}", command, e);
        }
    }
    if let Err(e) = driver.close().await {
        warn!("Failed to close LiDAR cleanly: {}", e);
    }
    debug!("LiDAR halted");
}
