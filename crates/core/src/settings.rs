//! Load-time control parameters.

use std::time::Duration;

use crate::hysteresis::{ColdRule, ThresholdSchedule};
use crate::moisture::Calibration;

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub calibration: Calibration,
    pub thresholds: ThresholdSchedule,
    /// How long connectivity may be down before fail-safe takes over.
    /// Zero means "as soon as the link is lost".
    pub offline_grace: Duration,
    pub failsafe_interval: Duration,
    pub failsafe_duration: Duration,
    pub probe_interval: Duration,
    pub temperature_poll_interval: Duration,
}

impl ControllerConfig {
    /// Warm-season profile: fixed 30 % threshold, fail-safe as soon as the
    /// link drops, a 10 s pulse every 30 minutes.
    pub fn simple() -> Self {
        Self {
            calibration: Calibration::default(),
            thresholds: ThresholdSchedule::fixed(30),
            offline_grace: Duration::ZERO,
            failsafe_interval: Duration::from_secs(30 * 60),
            failsafe_duration: Duration::from_secs(10),
            probe_interval: Duration::from_secs(60),
            temperature_poll_interval: Duration::from_secs(60),
        }
    }

    /// Cold-season profile: threshold drops to 20 % below 15 °C, six hours
    /// of offline grace, a 2 minute pulse once a day.
    pub fn cold_weather() -> Self {
        Self {
            calibration: Calibration::default(),
            thresholds: ThresholdSchedule {
                base: 30,
                cold: Some(ColdRule {
                    cutoff_c: 15.0,
                    threshold: 20,
                }),
            },
            offline_grace: Duration::from_secs(6 * 3600),
            failsafe_interval: Duration::from_secs(24 * 3600),
            failsafe_duration: Duration::from_secs(2 * 60),
            probe_interval: Duration::from_secs(60),
            temperature_poll_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::cold_weather()
    }
}
