//! Simulated soil probe for running the controller without hardware.
//!
//! Models a capacitive probe in a pot or bed:
//! - Temporal coherence via random walk with mean reversion
//! - Gradual drying drift (evaporation)
//! - Per-reading ADC noise and occasional spikes
//! - Diurnal (day/night) cycle
//! - Closed-loop watering response (soil gets wetter while the pump runs)
//!
//! Raw values live in the same units as the configured calibration, so the
//! simulator and the real ADC are interchangeable behind [`MoistureSensor`].

use std::fmt;
use std::time::Instant;

use irrigation_core::{Calibration, MoistureSensor};

// ---------------------------------------------------------------------------
// Gaussian approximation
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal(rng: &mut fastrand::Rng) -> f64 {
    (0..12).map(|_| rng.f64()).sum::<f64>() - 6.0
}

fn gaussian(rng: &mut fastrand::Rng, mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal(rng)
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Simulation profiles selectable via the `SIM_SCENARIO` env var.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Starts mid-range and dries steadily. Hysteresis cycles every few
    /// minutes at the default tick rate.
    Drying,
    /// Hovers near the centre with little noise.
    Stable,
    /// High noise and frequent spikes.
    Flaky,
    /// Starts near the wet end and dries very slowly; the pump should stay off.
    Wet,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" => Self::Stable,
            "flaky" => Self::Flaky,
            "wet" => Self::Wet,
            _ => Self::Drying,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drying => write!(f, "drying"),
            Self::Stable => write!(f, "stable"),
            Self::Flaky => write!(f, "flaky"),
            Self::Wet => write!(f, "wet"),
        }
    }
}

/// Tuning knobs, in fractions of the calibration range per sample.
struct Profile {
    drift: f64,
    walk: f64,
    reversion: f64,
    noise: f64,
    spike_prob: f32,
    spike: f64,
    /// 0.0 = wet endpoint, 1.0 = dry endpoint.
    start: f64,
}

impl Profile {
    fn of(scenario: Scenario) -> Self {
        match scenario {
            Scenario::Drying => Profile {
                drift: 0.002,
                walk: 0.004,
                reversion: 0.0,
                noise: 0.004,
                spike_prob: 0.01,
                spike: 0.15,
                start: 0.5,
            },
            Scenario::Stable => Profile {
                drift: 0.0002,
                walk: 0.002,
                reversion: 0.05,
                noise: 0.002,
                spike_prob: 0.002,
                spike: 0.05,
                start: 0.5,
            },
            Scenario::Flaky => Profile {
                drift: 0.001,
                walk: 0.015,
                reversion: 0.02,
                noise: 0.015,
                spike_prob: 0.10,
                spike: 0.2,
                start: 0.5,
            },
            Scenario::Wet => Profile {
                drift: 0.0002,
                walk: 0.003,
                reversion: 0.0,
                noise: 0.003,
                spike_prob: 0.01,
                spike: 0.1,
                start: 0.1,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Stateful single-probe soil simulator.
pub struct SoilSim {
    rng: fastrand::Rng,
    profile: Profile,
    /// Current "true" dryness, 0.0 (wet endpoint) ..= 1.0 (dry endpoint).
    dryness: f64,
    calibration: Calibration,
    diurnal_amplitude: f64,
    diurnal_period_s: f64,
    started: Instant,
    watering: bool,
    wet_rate: f64,
}

impl SoilSim {
    /// `diurnal_period_s` controls the day/night cycle length. Use 600 for
    /// fast dev iteration or 86400 for real time.
    pub fn new(scenario: Scenario, calibration: Calibration, diurnal_period_s: f64) -> Self {
        Self::with_rng(fastrand::Rng::new(), scenario, calibration, diurnal_period_s)
    }

    fn with_rng(
        mut rng: fastrand::Rng,
        scenario: Scenario,
        calibration: Calibration,
        diurnal_period_s: f64,
    ) -> Self {
        let profile = Profile::of(scenario);
        let dryness = (profile.start + gaussian(&mut rng, 0.0, 0.03)).clamp(0.0, 1.0);
        Self {
            rng,
            profile,
            dryness,
            calibration,
            diurnal_amplitude: 0.03,
            diurnal_period_s: diurnal_period_s.max(1.0),
            started: Instant::now(),
            watering: false,
            wet_rate: 0.02,
        }
    }

    /// Tell the simulator whether the pump is currently running.
    pub fn set_watering(&mut self, active: bool) {
        self.watering = active;
    }

    fn step(&mut self) {
        let p = &self.profile;
        let pull = p.reversion * (0.5 - self.dryness);
        let walk = gaussian(&mut self.rng, 0.0, p.walk);
        let wet = if self.watering { self.wet_rate } else { 0.0 };
        self.dryness = (self.dryness + p.drift + pull + walk - wet).clamp(-0.05, 1.05);
    }

    /// Convert a dryness fraction into calibrated raw units.
    fn to_raw(&self, dryness: f64) -> i64 {
        let Calibration { raw_dry, raw_wet } = self.calibration;
        let raw = raw_wet as f64 + dryness * (raw_dry - raw_wet) as f64;
        raw.round() as i64
    }
}

impl MoistureSensor for SoilSim {
    fn read_raw(&mut self) -> i64 {
        self.step();

        // Peaks in the "afternoon" of the cycle: drier.
        let phase =
            2.0 * std::f64::consts::PI * self.started.elapsed().as_secs_f64() / self.diurnal_period_s;
        let diurnal = self.diurnal_amplitude * phase.sin();

        let noise = gaussian(&mut self.rng, 0.0, self.profile.noise);
        let spike = if self.rng.f32() < self.profile.spike_prob {
            gaussian(&mut self.rng, 0.0, self.profile.spike)
        } else {
            0.0
        };

        self.to_raw(self.dryness + diurnal + noise + spike)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use irrigation_core::MoistureSampler;

    fn sim(scenario: Scenario) -> SoilSim {
        SoilSim::with_rng(
            fastrand::Rng::with_seed(7),
            scenario,
            Calibration::default(),
            600.0,
        )
    }

    fn mean_raw(s: &mut SoilSim, n: usize) -> f64 {
        (0..n).map(|_| s.read_raw() as f64).sum::<f64>() / n as f64
    }

    #[test]
    fn readings_stay_near_calibrated_range() {
        let mut s = sim(Scenario::Flaky);
        for _ in 0..1000 {
            let v = s.read_raw();
            // Spikes may overshoot, but never wildly.
            assert!((-600..=1700).contains(&v), "raw out of range: {v}");
        }
    }

    #[test]
    fn temporal_coherence() {
        let mut s = sim(Scenario::Stable);
        let samples: Vec<i64> = (0..100).map(|_| s.read_raw()).collect();
        let max_jump = samples
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .max()
            .unwrap();
        assert!(max_jump < 400, "max consecutive jump too large: {max_jump}");
    }

    #[test]
    fn drying_scenario_gets_drier() {
        let mut s = sim(Scenario::Drying);
        let before = mean_raw(&mut s, 20);
        for _ in 0..200 {
            s.read_raw();
        }
        let after = mean_raw(&mut s, 20);
        assert!(after > before, "expected drift to dry: {before:.0} -> {after:.0}");
    }

    #[test]
    fn watering_makes_soil_wetter() {
        let mut s = sim(Scenario::Drying);
        for _ in 0..20 {
            s.read_raw();
        }
        let before = mean_raw(&mut s, 20);

        s.set_watering(true);
        for _ in 0..30 {
            s.read_raw();
        }
        let after = mean_raw(&mut s, 20);

        assert!(
            after < before,
            "watering should lower readings: before={before:.0} after={after:.0}"
        );
    }

    #[test]
    fn wet_scenario_reads_above_default_threshold() {
        let mut s = sim(Scenario::Wet);
        let sampler = MoistureSampler::default();
        let avg = mean_raw(&mut s, 10).round() as i64;
        assert!(
            sampler.sample(avg).percent() > 30,
            "wet scenario should start moist, got raw {avg}"
        );
    }

    #[test]
    fn follows_inverted_calibration() {
        let cal = Calibration {
            raw_dry: 12000,
            raw_wet: 26000,
        };
        let mut s = SoilSim::with_rng(fastrand::Rng::with_seed(1), Scenario::Wet, cal, 600.0);
        let avg = mean_raw(&mut s, 10);
        assert!(avg > 19000.0, "wet soil should sit near raw_wet, got {avg:.0}");
    }

    #[test]
    fn scenario_from_str_lossy() {
        assert_eq!(Scenario::from_str_lossy("drying"), Scenario::Drying);
        assert_eq!(Scenario::from_str_lossy("STABLE"), Scenario::Stable);
        assert_eq!(Scenario::from_str_lossy(" Flaky "), Scenario::Flaky);
        assert_eq!(Scenario::from_str_lossy("wet"), Scenario::Wet);
        assert_eq!(Scenario::from_str_lossy("unknown"), Scenario::Drying);
        assert_eq!(Scenario::from_str_lossy(""), Scenario::Drying);
    }

    #[test]
    fn scenario_display() {
        assert_eq!(Scenario::Drying.to_string(), "drying");
        assert_eq!(Scenario::Wet.to_string(), "wet");
    }

    #[test]
    fn approx_std_normal_has_zero_mean() {
        let mut rng = fastrand::Rng::with_seed(42);
        let n = 5000;
        let mean = (0..n).map(|_| approx_std_normal(&mut rng)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.15, "mean should be near zero: {mean}");
    }
}
