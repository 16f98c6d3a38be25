//! Resource admission guard
//!
//! [`ResourceGuard`] decides per job whether the accelerated path may use a
//! shared compute resource. Each device carries a two-state machine with an
//! upper threshold `T` and a lower re-enable threshold `L = T - gap`:
//!
//! | state       | observation | new state   | admit |
//! |-------------|-------------|-------------|-------|
//! | Available   | `U >= T`    | Constrained | false |
//! | Available   | `U < T`     | Available   | true  |
//! | Constrained | `U < L`     | Available   | true  |
//! | Constrained | `U >= L`    | Constrained | false |
//!
//! Readings inside `[L, T)` never change the state, so utilization hovering
//! around the threshold cannot make jobs flap between modes. Every
//! observation and transition for a device happens inside that device's
//! critical section.
//!
//! Telemetry sits behind [`ResourceTelemetry`]. Query failures are absorbed
//! here and read as 100% utilization; they never reach callers.

use jsl_format::constants::{DEFAULT_HYSTERESIS_GAP, DEFAULT_UPPER_THRESHOLD, FAIL_SAFE_UTILIZATION};
use jsl_format::{JslError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[cfg(not(target_arch = "wasm32"))]
use sysinfo::System;

/// Failure to read a utilization figure
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Index beyond the devices the backend reports
    #[error("device {0} is not present")]
    NoSuchDevice(usize),
    /// Backend reported an error for this query
    #[error("telemetry query failed: {0}")]
    Query(String),
    /// Backend cannot be queried at all
    #[error("telemetry backend unavailable")]
    Unavailable,
}

/// Capability interface over a utilization source
pub trait ResourceTelemetry: Send + Sync {
    /// Short backend name for logs and reports
    fn name(&self) -> &str;

    /// Number of devices; sampled once when a guard is built
    fn device_count(&self) -> usize;

    /// Current utilization of `device` in percent
    fn utilization(&self, device: usize) -> std::result::Result<f64, TelemetryError>;
}

/// Backend reporting zero devices
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl ResourceTelemetry for NullTelemetry {
    fn name(&self) -> &str {
        "none"
    }

    fn device_count(&self) -> usize {
        0
    }

    fn utilization(&self, _device: usize) -> std::result::Result<f64, TelemetryError> {
        Err(TelemetryError::Unavailable)
    }
}

/// Host memory utilization exposed as device 0
#[cfg(not(target_arch = "wasm32"))]
pub struct SystemMemoryTelemetry {
    system: Mutex<System>,
}

#[cfg(not(target_arch = "wasm32"))]
impl SystemMemoryTelemetry {
    /// Probe the host; `None` when total memory cannot be determined
    pub fn new() -> Option<Self> {
        let mut system = System::new();
        system.refresh_memory();
        if system.total_memory() == 0 {
            return None;
        }
        Some(Self {
            system: Mutex::new(system),
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl ResourceTelemetry for SystemMemoryTelemetry {
    fn name(&self) -> &str {
        "system-memory"
    }

    fn device_count(&self) -> usize {
        1
    }

    fn utilization(&self, device: usize) -> std::result::Result<f64, TelemetryError> {
        if device != 0 {
            return Err(TelemetryError::NoSuchDevice(device));
        }
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return Err(TelemetryError::Query("total memory reported as 0".into()));
        }
        Ok(system.used_memory() as f64 / total as f64 * 100.0)
    }
}

/// Guard thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Utilization (percent) at or above which an available device becomes constrained
    pub upper_threshold: f64,
    /// Distance below the upper threshold a constrained device must drop to
    pub hysteresis_gap: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            upper_threshold: DEFAULT_UPPER_THRESHOLD,
            hysteresis_gap: DEFAULT_HYSTERESIS_GAP,
        }
    }
}

impl GuardConfig {
    /// Config with a custom upper threshold and the default gap
    pub fn with_threshold(upper_threshold: f64) -> Self {
        Self {
            upper_threshold,
            ..Self::default()
        }
    }

    /// Re-enable threshold `L = T - gap`
    pub fn lower_threshold(&self) -> f64 {
        self.upper_threshold - self.hysteresis_gap
    }

    /// Require `0 < T <= 100` and `0 < gap < T`, so `L` stays reachable
    pub fn validate(&self) -> Result<()> {
        let t = self.upper_threshold;
        if !(t.is_finite() && t > 0.0 && t <= 100.0) {
            return Err(JslError::InvalidConfig(format!(
                "upper_threshold must be in (0, 100], got {}",
                t
            )));
        }
        let gap = self.hysteresis_gap;
        if !(gap.is_finite() && gap > 0.0 && gap < t) {
            return Err(JslError::InvalidConfig(format!(
                "hysteresis_gap must be in (0, upper_threshold), got {}",
                gap
            )));
        }
        Ok(())
    }
}

/// Per-device admission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardState {
    /// Jobs are admitted to the accelerated path
    Available,
    /// Jobs run in standard mode until utilization drops below `L`
    Constrained,
}

impl fmt::Display for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GuardState::Available => "available",
            GuardState::Constrained => "constrained",
        })
    }
}

/// Point-in-time view of one device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReport {
    /// Device index
    pub device: usize,
    /// Observed utilization in percent
    pub utilization: f64,
    /// State after the observation (unchanged by reporting)
    pub state: GuardState,
}

/// Shared, concurrency-safe admission guard.
///
/// Build one per process and hand it to every job (usually inside an `Arc`).
pub struct ResourceGuard {
    telemetry: Box<dyn ResourceTelemetry>,
    config: GuardConfig,
    devices: Vec<Mutex<GuardState>>,
}

impl ResourceGuard {
    /// Build a guard over `telemetry`; every device starts `Available`
    pub fn new(telemetry: Box<dyn ResourceTelemetry>, config: GuardConfig) -> Result<Self> {
        config.validate()?;
        let device_count = telemetry.device_count();
        let devices = (0..device_count)
            .map(|_| Mutex::new(GuardState::Available))
            .collect();

        if device_count == 0 {
            tracing::warn!(
                backend = telemetry.name(),
                "no devices visible; all jobs will run in standard mode"
            );
        } else {
            tracing::info!(
                backend = telemetry.name(),
                devices = device_count,
                upper = config.upper_threshold,
                lower = config.lower_threshold(),
                "resource guard initialised"
            );
        }

        Ok(Self {
            telemetry,
            config,
            devices,
        })
    }

    /// Guard over the host's platform telemetry, or a null backend if none
    pub fn detect(config: GuardConfig) -> Result<Self> {
        #[cfg(not(target_arch = "wasm32"))]
        {
            if let Some(telemetry) = SystemMemoryTelemetry::new() {
                return Self::new(Box::new(telemetry), config);
            }
        }
        Self::new(Box::new(NullTelemetry), config)
    }

    /// Guard with no devices; never admits
    pub fn disabled() -> Self {
        Self {
            telemetry: Box::new(NullTelemetry),
            config: GuardConfig::default(),
            devices: Vec::new(),
        }
    }

    /// Thresholds in force
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Telemetry backend name
    pub fn backend(&self) -> &str {
        self.telemetry.name()
    }

    /// Devices visible when the guard was built
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Current utilization of `device` in percent.
    ///
    /// Returns 0 for devices the guard does not know and 100 when the query
    /// fails.
    pub fn observe(&self, device: usize) -> f64 {
        let Some(slot) = self.devices.get(device) else {
            return 0.0;
        };
        let _state = slot.lock().unwrap_or_else(PoisonError::into_inner);
        self.read(device)
    }

    /// Observe `device` and apply the hysteresis transition.
    ///
    /// Unknown devices (including every index when no devices exist) are
    /// never admitted.
    pub fn admit(&self, device: usize) -> bool {
        let Some(slot) = self.devices.get(device) else {
            return false;
        };
        let mut state = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let usage = self.read(device);
        let upper = self.config.upper_threshold;
        let lower = self.config.lower_threshold();

        let next = match *state {
            GuardState::Available if usage >= upper => GuardState::Constrained,
            GuardState::Constrained if usage < lower => GuardState::Available,
            current => current,
        };

        if next != *state {
            match next {
                GuardState::Constrained => tracing::warn!(
                    device,
                    usage,
                    threshold = upper,
                    "utilization at or above threshold; falling back to standard mode"
                ),
                GuardState::Available => tracing::info!(
                    device,
                    usage,
                    threshold = lower,
                    "utilization below re-enable threshold; accelerated mode restored"
                ),
            }
            *state = next;
        }

        next == GuardState::Available
    }

    /// Current state of `device` without observing
    pub fn state(&self, device: usize) -> Option<GuardState> {
        self.devices
            .get(device)
            .map(|slot| *slot.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Observe every device without changing any state
    pub fn report(&self) -> Vec<DeviceReport> {
        self.devices
            .iter()
            .enumerate()
            .map(|(device, slot)| {
                let state = slot.lock().unwrap_or_else(PoisonError::into_inner);
                DeviceReport {
                    device,
                    utilization: self.read(device),
                    state: *state,
                }
            })
            .collect()
    }

    fn read(&self, device: usize) -> f64 {
        match self.telemetry.utilization(device) {
            Ok(usage) if usage.is_finite() => usage.clamp(0.0, 100.0),
            Ok(usage) => {
                tracing::warn!(device, usage, "non-finite utilization reading; assuming full");
                FAIL_SAFE_UTILIZATION
            }
            Err(err) => {
                tracing::warn!(device, error = %err, "utilization query failed; assuming full");
                FAIL_SAFE_UTILIZATION
            }
        }
    }
}

impl fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("backend", &self.telemetry.name())
            .field("config", &self.config)
            .field("devices", &self.devices.len())
            .finish()
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        tracing::debug!(backend = self.telemetry.name(), "resource guard released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Replays a fixed sequence of readings, then repeats the last one
    struct Scripted {
        devices: usize,
        readings: Mutex<VecDeque<std::result::Result<f64, TelemetryError>>>,
    }

    impl Scripted {
        fn new(readings: Vec<f64>) -> Self {
            Self::with_results(readings.into_iter().map(Ok).collect())
        }

        fn with_results(readings: Vec<std::result::Result<f64, TelemetryError>>) -> Self {
            Self {
                devices: 1,
                readings: Mutex::new(readings.into()),
            }
        }
    }

    impl ResourceTelemetry for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn device_count(&self) -> usize {
            self.devices
        }

        fn utilization(&self, _device: usize) -> std::result::Result<f64, TelemetryError> {
            let mut readings = self.readings.lock().unwrap();
            if readings.len() > 1 {
                readings.pop_front().unwrap()
            } else {
                match readings.front() {
                    Some(Ok(value)) => Ok(*value),
                    _ => Err(TelemetryError::Query("script exhausted".into())),
                }
            }
        }
    }

    fn guard(readings: Vec<f64>) -> ResourceGuard {
        ResourceGuard::new(Box::new(Scripted::new(readings)), GuardConfig::default()).unwrap()
    }

    #[test]
    fn hysteresis_sequence() {
        let guard = guard(vec![85.0, 70.0, 55.0]);
        let admitted: Vec<bool> = (0..3).map(|_| guard.admit(0)).collect();
        assert_eq!(admitted, [false, false, true]);
        assert_eq!(guard.state(0), Some(GuardState::Available));
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(!guard(vec![80.0]).admit(0));
        assert!(guard(vec![79.0]).admit(0));
    }

    #[test]
    fn constrained_needs_to_drop_below_lower() {
        let guard = guard(vec![90.0, 60.0, 59.9]);
        assert!(!guard.admit(0));
        assert!(!guard.admit(0), "exactly L keeps the device constrained");
        assert!(guard.admit(0));
    }

    #[test]
    fn no_flapping_inside_band() {
        let mut readings = vec![95.0];
        readings.extend((0..50).map(|i| if i % 2 == 0 { 79.9 } else { 60.0 }));
        let guard = guard(readings);
        assert!(!guard.admit(0));
        for _ in 0..50 {
            assert!(!guard.admit(0));
        }
    }

    #[test]
    fn query_failure_is_fail_safe() {
        let telemetry = Scripted::with_results(vec![
            Err(TelemetryError::Query("boom".into())),
            Ok(10.0),
        ]);
        let guard = ResourceGuard::new(Box::new(telemetry), GuardConfig::default()).unwrap();
        assert!(!guard.admit(0));
        assert_eq!(guard.state(0), Some(GuardState::Constrained));
        assert!(guard.admit(0));
    }

    #[test]
    fn observe_failure_reports_full() {
        let telemetry = Scripted::with_results(vec![Err(TelemetryError::Unavailable)]);
        let guard = ResourceGuard::new(Box::new(telemetry), GuardConfig::default()).unwrap();
        assert_eq!(guard.observe(0), 100.0);
    }

    #[test]
    fn non_finite_readings_are_failures() {
        let guard = guard(vec![f64::NAN, f64::INFINITY]);
        assert_eq!(guard.observe(0), 100.0);
        assert_eq!(guard.observe(0), 100.0);
    }

    #[test]
    fn readings_are_clamped() {
        let guard = guard(vec![-5.0, 150.0]);
        assert_eq!(guard.observe(0), 0.0);
        assert_eq!(guard.observe(0), 100.0);
    }

    #[test]
    fn no_devices_never_admits() {
        let guard = ResourceGuard::new(Box::new(NullTelemetry), GuardConfig::default()).unwrap();
        assert_eq!(guard.device_count(), 0);
        assert!(!guard.admit(0));
        assert_eq!(guard.observe(0), 0.0);
        assert_eq!(guard.state(0), None);

        let disabled = ResourceGuard::disabled();
        assert!(!disabled.admit(0));
        assert_eq!(disabled.observe(3), 0.0);
    }

    #[test]
    fn out_of_range_device() {
        let guard = guard(vec![10.0]);
        assert!(!guard.admit(1));
        assert_eq!(guard.observe(1), 0.0);
    }

    #[test]
    fn config_validation() {
        assert!(GuardConfig::default().validate().is_ok());
        assert_eq!(GuardConfig::default().lower_threshold(), 60.0);
        assert!(GuardConfig::with_threshold(0.0).validate().is_err());
        assert!(GuardConfig::with_threshold(101.0).validate().is_err());
        assert!(GuardConfig::with_threshold(15.0).validate().is_err());
        let config = GuardConfig {
            upper_threshold: 50.0,
            hysteresis_gap: 0.0,
        };
        assert!(config.validate().is_err());
        assert!(ResourceGuard::new(Box::new(NullTelemetry), config).is_err());

        // L = 0 could never be undercut by a clamped reading
        let unreachable_lower = GuardConfig {
            upper_threshold: 50.0,
            hysteresis_gap: 50.0,
        };
        assert!(unreachable_lower.validate().is_err());
        assert!(ResourceGuard::new(Box::new(NullTelemetry), unreachable_lower).is_err());
    }

    #[test]
    fn widest_valid_gap_still_recovers() {
        let config = GuardConfig {
            upper_threshold: 50.0,
            hysteresis_gap: 49.0,
        };
        let guard =
            ResourceGuard::new(Box::new(Scripted::new(vec![90.0, 0.0, 0.0])), config).unwrap();
        let admitted: Vec<bool> = (0..3).map(|_| guard.admit(0)).collect();
        assert_eq!(admitted, [false, true, true]);
    }

    #[test]
    fn report_does_not_transition() {
        let guard = guard(vec![99.0]);
        let report = guard.report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].utilization, 99.0);
        assert_eq!(report[0].state, GuardState::Available);
        assert_eq!(guard.state(0), Some(GuardState::Available));
    }

    #[test]
    fn concurrent_admission_is_consistent() {
        struct Fixed(f64);
        impl ResourceTelemetry for Fixed {
            fn name(&self) -> &str {
                "fixed"
            }
            fn device_count(&self) -> usize {
                1
            }
            fn utilization(&self, _device: usize) -> std::result::Result<f64, TelemetryError> {
                Ok(self.0)
            }
        }

        let guard = Arc::new(ResourceGuard::new(Box::new(Fixed(70.0)), GuardConfig::default()).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                std::thread::spawn(move || (0..1_000).all(|_| guard.admit(0)))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(guard.state(0), Some(GuardState::Available));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn system_memory_telemetry_reports_a_percentage() {
        if let Some(telemetry) = SystemMemoryTelemetry::new() {
            let usage = telemetry.utilization(0).unwrap();
            assert!((0.0..=100.0).contains(&usage));
            assert!(telemetry.utilization(1).is_err());
        }
    }
}
