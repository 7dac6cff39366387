//! Device lifecycle state machine
//!
//! Every transition is a single check-and-set on a `watch` channel, so a
//! concurrent reader never observes a half-applied transition and two
//! racing requests can never both pass the same guard.

use lidar_core::{DeviceState, FaultReason, LidarConfig, LidarError, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Signals reported by the acquisition task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareEvent {
    /// Target RPM held for the required number of rotations
    RpmStabilized,
    /// Motor stopped and the port was released after a stop request
    MotorHalted,
    /// I/O error, disconnect, or open failure
    Fault(FaultReason),
    /// The stabilization window elapsed without reaching the target RPM
    StabilizationTimeout,
}

/// Owner of the device state
pub struct StateMachine {
    tx: watch::Sender<DeviceState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(DeviceState::Idle);
        Self { tx }
    }

    /// Current state
    pub fn state(&self) -> DeviceState {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every transition
    pub fn watch(&self) -> watch::Receiver<DeviceState> {
        self.tx.subscribe()
    }

    /// Apply `f` atomically; the transition is published only when `f` returns Ok.
    fn transition<F>(&self, f: F) -> Result<DeviceState>
    where
        F: FnOnce(&DeviceState) -> Result<Option<DeviceState>>,
    {
        let mut outcome = Ok(DeviceState::Idle);
        self.tx.send_if_modified(|state| match f(state) {
            Ok(Some(next)) => {
                debug!("State transition: {} -> {}", state, next);
                *state = next.clone();
                outcome = Ok(next);
                true
            }
            Ok(None) => {
                outcome = Ok(state.clone());
                false
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }

    /// Idle → Starting
    pub fn request_start(&self) -> Result<DeviceState> {
        self.transition(|state| match state {
            DeviceState::Idle => Ok(Some(DeviceState::Starting)),
            DeviceState::Starting | DeviceState::Running => {
                Err(LidarError::AlreadyRunning(state.as_str().to_string()))
            }
            other => Err(LidarError::InvalidTransition {
                operation: "start",
                state: other.to_string(),
            }),
        })
    }

    /// Starting/Running → Stopping. Stopping and Idle are left unchanged.
    pub fn request_stop(&self) -> Result<DeviceState> {
        self.transition(|state| match state {
            DeviceState::Starting | DeviceState::Running => Ok(Some(DeviceState::Stopping)),
            DeviceState::Stopping | DeviceState::Idle => Ok(None),
            other => Err(LidarError::InvalidTransition {
                operation: "stop",
                state: other.to_string(),
            }),
        })
    }

    /// Check whether `config` may be applied from the current state.
    ///
    /// Structural validation comes first, so an invalid config is rejected
    /// the same way in every state. The state itself is not changed; a
    /// running device is cycled by the manager.
    pub fn request_reconfigure(&self, config: &LidarConfig) -> Result<DeviceState> {
        config.validate()?;
        match self.state() {
            state @ (DeviceState::Idle | DeviceState::Running) => Ok(state),
            DeviceState::Error(_) => Err(LidarError::ReconfigureWhileError),
            other => Err(LidarError::InvalidTransition {
                operation: "reconfigure",
                state: other.to_string(),
            }),
        }
    }

    /// Apply a hardware signal
    pub fn on_hardware_event(&self, event: HardwareEvent) -> Result<DeviceState> {
        let result = self.transition(|state| match (&event, state) {
            (HardwareEvent::RpmStabilized, DeviceState::Starting) => {
                Ok(Some(DeviceState::Running))
            }
            (HardwareEvent::MotorHalted, DeviceState::Stopping) => Ok(Some(DeviceState::Idle)),
            (HardwareEvent::Fault(reason), DeviceState::Starting | DeviceState::Running) => {
                Ok(Some(DeviceState::Error(reason.clone())))
            }
            (HardwareEvent::StabilizationTimeout, DeviceState::Starting) => Ok(Some(
                DeviceState::Error(FaultReason::RpmStabilizationTimeout),
            )),
            // A fault racing with a stop request is absorbed by the stop,
            // and a second fault keeps the first reason
            (HardwareEvent::Fault(_), DeviceState::Stopping | DeviceState::Error(_)) => Ok(None),
            (HardwareEvent::StabilizationTimeout, DeviceState::Stopping) => Ok(None),
            (event, other) => Err(LidarError::InvalidTransition {
                operation: hardware_event_name(event),
                state: other.to_string(),
            }),
        });

        match &result {
            Ok(DeviceState::Error(reason)) => warn!("LiDAR entered error state: {}", reason),
            Ok(DeviceState::Running) => info!("LiDAR running"),
            _ => {}
        }
        result
    }

    /// Error → Idle
    pub fn reset(&self) -> Result<DeviceState> {
        self.transition(|state| match state {
            DeviceState::Error(_) => Ok(Some(DeviceState::Idle)),
            other => Err(LidarError::InvalidTransition {
                operation: "reset",
                state: other.to_string(),
            }),
        })
    }
}

fn hardware_event_name(event: &HardwareEvent) -> &'static str {
    match event {
        HardwareEvent::RpmStabilized => "mark running",
        HardwareEvent::MotorHalted => "mark halted",
        HardwareEvent::Fault(_) => "record fault",
        HardwareEvent::StabilizationTimeout => "record stabilization timeout",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fault() -> FaultReason {
        FaultReason::HardwareFault("EOF".to_string())
    }

    #[test]
    fn test_happy_path() {
        let sm = StateMachine::new();
        assert_eq!(sm.state(), DeviceState::Idle);

        assert_eq!(sm.request_start().unwrap(), DeviceState::Starting);
        assert_eq!(
            sm.on_hardware_event(HardwareEvent::RpmStabilized).unwrap(),
            DeviceState::Running
        );
        assert_eq!(sm.request_stop().unwrap(), DeviceState::Stopping);
        assert_eq!(
            sm.on_hardware_event(HardwareEvent::MotorHalted).unwrap(),
            DeviceState::Idle
        );
    }

    #[test]
    fn test_start_rejected_when_active() {
        let sm = StateMachine::new();
        sm.request_start().unwrap();
        assert!(matches!(
            sm.request_start(),
            Err(LidarError::AlreadyRunning(_))
        ));

        sm.on_hardware_event(HardwareEvent::RpmStabilized).unwrap();
        assert!(matches!(
            sm.request_start(),
            Err(LidarError::AlreadyRunning(_))
        ));

        sm.request_stop().unwrap();
        assert!(matches!(
            sm.request_start(),
            Err(LidarError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let sm = StateMachine::new();
        assert_eq!(sm.request_stop().unwrap(), DeviceState::Idle);

        sm.request_start().unwrap();
        sm.request_stop().unwrap();
        assert_eq!(sm.request_stop().unwrap(), DeviceState::Stopping);
    }

    #[test]
    fn test_error_requires_reset() {
        let sm = StateMachine::new();
        sm.request_start().unwrap();
        sm.on_hardware_event(HardwareEvent::StabilizationTimeout)
            .unwrap();
        assert_eq!(
            sm.state(),
            DeviceState::Error(FaultReason::RpmStabilizationTimeout)
        );

        assert!(matches!(
            sm.request_start(),
            Err(LidarError::InvalidTransition { .. })
        ));
        assert!(matches!(
            sm.request_reconfigure(&LidarConfig::default()),
            Err(LidarError::ReconfigureWhileError)
        ));

        assert_eq!(sm.reset().unwrap(), DeviceState::Idle);
        assert!(sm.reset().is_err());
    }

    #[test]
    fn test_fault_while_running() {
        let sm = StateMachine::new();
        sm.request_start().unwrap();
        sm.on_hardware_event(HardwareEvent::RpmStabilized).unwrap();
        sm.on_hardware_event(HardwareEvent::Fault(fault())).unwrap();
        assert_eq!(sm.state(), DeviceState::Error(fault()));
    }

    #[test]
    fn test_fault_during_stop_is_absorbed() {
        let sm = StateMachine::new();
        sm.request_start().unwrap();
        sm.request_stop().unwrap();
        assert_eq!(
            sm.on_hardware_event(HardwareEvent::Fault(fault())).unwrap(),
            DeviceState::Stopping
        );
    }

    #[test]
    fn test_stray_events_rejected() {
        let sm = StateMachine::new();
        assert!(sm.on_hardware_event(HardwareEvent::RpmStabilized).is_err());
        assert!(sm.on_hardware_event(HardwareEvent::MotorHalted).is_err());
        assert_eq!(sm.state(), DeviceState::Idle);
    }

    #[test]
    fn test_reconfigure_guard() {
        let sm = StateMachine::new();
        let config = LidarConfig::default();
        assert!(sm.request_reconfigure(&config).is_ok());
        sm.request_start().unwrap();
        assert!(matches!(
            sm.request_reconfigure(&config),
            Err(LidarError::InvalidTransition { .. })
        ));
        sm.on_hardware_event(HardwareEvent::RpmStabilized).unwrap();
        assert_eq!(sm.request_reconfigure(&config).unwrap(), DeviceState::Running);

        let invalid = LidarConfig {
            motor_rpm_target: 0,
            ..LidarConfig::default()
        };
        assert!(matches!(
            sm.request_reconfigure(&invalid),
            Err(LidarError::InvalidConfig(_))
        ));
        assert_eq!(sm.state(), DeviceState::Running);
    }

    #[tokio::test]
    async fn test_watchers_see_transitions() {
        let sm = StateMachine::new();
        let mut rx = sm.watch();

        sm.request_start().unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), DeviceState::Starting);

        // Rejected requests do not notify
        let _ = sm.request_start();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_starts_admit_exactly_one() {
        let sm = Arc::new(StateMachine::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let sm = sm.clone();
                tokio::spawn(async move { sm.request_start().is_ok() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(sm.state(), DeviceState::Starting);
    }
}
