//! Raw ADC sample → soil moisture percentage.

use serde::Serialize;

/// Soil moisture in percent, always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct MoistureReading(u8);

impl MoistureReading {
    pub const MIN: MoistureReading = MoistureReading(0);
    pub const MAX: MoistureReading = MoistureReading(100);

    /// Build a reading, clamping anything outside `0..=100`.
    pub fn clamped(percent: i64) -> Self {
        Self(percent.clamp(0, 100) as u8)
    }

    pub fn percent(self) -> u8 {
        self.0
    }
}

/// Sensor endpoints: the raw value read in bone-dry soil and in water.
///
/// Capacitive probes read *lower* when wetter, so `raw_dry > raw_wet` is the
/// common case, but either orientation works.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub raw_dry: i64,
    pub raw_wet: i64,
}

impl Default for Calibration {
    /// 10-bit ADC with the probe pulling the input low in wet soil.
    fn default() -> Self {
        Self {
            raw_dry: 1023,
            raw_wet: 0,
        }
    }
}

/// Stateless linear mapping from raw samples to [`MoistureReading`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoistureSampler {
    calibration: Calibration,
}

impl MoistureSampler {
    pub fn new(calibration: Calibration) -> Self {
        Self { calibration }
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Map `raw` so that `raw_dry` → 0 % and `raw_wet` → 100 %.
    ///
    /// Out-of-range samples are clamped, never rejected. A zero-width
    /// calibration reads as 0 %.
    pub fn sample(&self, raw: i64) -> MoistureReading {
        let Calibration { raw_dry, raw_wet } = self.calibration;
        let range = raw_dry - raw_wet;
        if range == 0 {
            return MoistureReading::MIN;
        }
        let scaled = (raw_dry.saturating_sub(raw)).saturating_mul(100) / range;
        MoistureReading::clamped(scaled)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
