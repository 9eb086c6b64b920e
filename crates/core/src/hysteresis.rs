//! Moisture hysteresis and temperature-dependent thresholds.

use serde::Serialize;

use crate::moisture::MoistureReading;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PumpState {
    #[default]
    Off,
    On,
}

impl PumpState {
    pub fn is_on(self) -> bool {
        self == PumpState::On
    }

    pub fn from_on(on: bool) -> Self {
        if on {
            PumpState::On
        } else {
            PumpState::Off
        }
    }
}

/// Single-threshold hysteresis.
///
/// Each transition is guarded by the *opposite* current state: Off→On needs
/// `moisture < threshold`, On→Off needs `moisture >= threshold`. Dropping the
/// state guard turns this into a plain comparator that chatters at the
/// boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct HysteresisPolicy;

impl HysteresisPolicy {
    pub fn decide(&self, current: MoistureReading, pump: PumpState, threshold: u8) -> PumpState {
        let m = current.percent();
        match pump {
            PumpState::Off if m < threshold => PumpState::On,
            PumpState::On if m >= threshold => PumpState::Off,
            held => held,
        }
    }
}

/// Base threshold, optionally lowered while it is cold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSchedule {
    pub base: u8,
    pub cold: Option<ColdRule>,
}

/// Below `cutoff_c` the plants need less water, so irrigate only under
/// `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColdRule {
    pub cutoff_c: f32,
    pub threshold: u8,
}

impl ThresholdSchedule {
    pub fn fixed(base: u8) -> Self {
        Self { base, cold: None }
    }

    /// Threshold for the given (possibly unknown) temperature. An unknown
    /// temperature never blocks a decision; it selects the base threshold.
    pub fn effective(&self, temperature_c: Option<f32>) -> u8 {
        match (self.cold, temperature_c) {
            (Some(rule), Some(t)) if t < rule.cutoff_c => rule.threshold,
            _ => self.base,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
