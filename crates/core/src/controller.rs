//! Top-level irrigation state machine.
//!
//! ```text
//!            ┌──[link down ≥ grace]──┐
//!            │                       ▼
//!        Adaptive               FailSafe
//!            ▲                       │
//!            └──[link healthy AND no pulse running]
//! ```
//!
//! Adaptive drives the pump from moisture hysteresis (or a manual override).
//! FailSafe hands the pump to [`FailSafeScheduler`] and ignores moisture.
//! A fail-safe pulse that is already running when connectivity returns is
//! allowed to finish; Adaptive takes over on the tick after it ends.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Timestamp;
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::events::{ControllerEvent, PumpSource};
use crate::failsafe::FailSafeScheduler;
use crate::hysteresis::{HysteresisPolicy, PumpState};
use crate::moisture::{MoistureReading, MoistureSampler};
use crate::ports::{Io, PumpRelay, TemperatureSource};
use crate::settings::ControllerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Adaptive,
    FailSafe,
}

/// State after a tick, for logging and status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snapshot {
    pub mode: Mode,
    pub pump: PumpState,
    pub connectivity: ConnectivityState,
    #[serde(rename = "offline_for_sec", serialize_with = "whole_seconds")]
    pub offline_for: Duration,
    pub moisture: MoistureReading,
    pub temperature_c: Option<f32>,
    pub threshold: u8,
}

fn whole_seconds<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

pub struct IrrigationController {
    config: ControllerConfig,
    sampler: MoistureSampler,
    policy: HysteresisPolicy,
    monitor: ConnectivityMonitor,
    failsafe: FailSafeScheduler,
    mode: Mode,
    pump: PumpState,
    pump_source: PumpSource,
    /// Last value written to the relay; `None` until the first tick.
    applied: Option<PumpState>,
    moisture: Option<MoistureReading>,
    temperature: Option<f32>,
    last_temperature_request: Option<Timestamp>,
    manual: Option<PumpState>,
    pending: Vec<ControllerEvent>,
}

impl IrrigationController {
    pub fn new(config: ControllerConfig, now: Timestamp) -> Self {
        Self {
            sampler: MoistureSampler::new(config.calibration),
            policy: HysteresisPolicy,
            monitor: ConnectivityMonitor::new(now, config.probe_interval),
            failsafe: FailSafeScheduler::new(
                config.failsafe_interval,
                config.failsafe_duration,
                now,
            ),
            mode: Mode::Adaptive,
            pump: PumpState::Off,
            pump_source: PumpSource::Hysteresis,
            applied: None,
            moisture: None,
            temperature: None,
            last_temperature_request: None,
            manual: None,
            pending: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pump(&self) -> PumpState {
        self.pump
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn failsafe(&self) -> &FailSafeScheduler {
        &self.failsafe
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    pub fn manual_override(&self) -> Option<PumpState> {
        self.manual
    }

    /// Force the pump on/off (`Some`) or hand it back to hysteresis (`None`).
    ///
    /// Only honoured in Adaptive mode. While in FailSafe the override is kept
    /// and takes effect once Adaptive control resumes.
    pub fn set_manual_override(&mut self, state: Option<PumpState>) {
        if self.manual == state {
            return;
        }
        self.manual = state;
        if self.mode == Mode::FailSafe {
            warn!(
                ?state,
                "controller: manual override deferred while in fail-safe"
            );
        } else {
            info!(?state, "controller: manual override set");
        }
        self.pending.push(ControllerEvent::ManualOverride { state });
    }

    /// One control step. Call at a fixed cadence (~1 Hz).
    pub fn tick(&mut self, now: Timestamp, io: Io<'_>) -> Snapshot {
        // ── Connectivity ────────────────────────────────────────────
        let before = self.monitor.state();
        self.monitor.on_link_event(io.network.is_link_up(), now);
        let reachability = io.reachability;
        self.monitor
            .probe(now, io.network, || reachability.probe_reachability());
        let connectivity = self.monitor.state();
        if connectivity != before {
            self.pending
                .push(ControllerEvent::ConnectivityChanged { state: connectivity });
        }

        // ── Inputs ──────────────────────────────────────────────────
        self.poll_temperature(now, connectivity, io.weather);

        let moisture = self.sampler.sample(io.sensor.read_raw());
        if self.moisture != Some(moisture) {
            self.pending
                .push(ControllerEvent::MoistureChanged { percent: moisture });
        }
        self.moisture = Some(moisture);

        let threshold = self.config.thresholds.effective(self.temperature);

        // ── Mode + decision ─────────────────────────────────────────
        self.update_mode(now, connectivity);

        match self.mode {
            Mode::FailSafe => {
                let demanded = self.failsafe.tick(now);
                self.set_pump(demanded, PumpSource::FailSafe);
            }
            Mode::Adaptive => match self.manual {
                Some(forced) => self.set_pump(forced, PumpSource::Manual),
                None => {
                    let decided = self.policy.decide(moisture, self.pump, threshold);
                    self.set_pump(decided, PumpSource::Hysteresis);
                }
            },
        }

        self.apply(io.relay);

        for event in std::mem::take(&mut self.pending) {
            io.events.emit(&event);
        }

        Snapshot {
            mode: self.mode,
            pump: self.pump,
            connectivity,
            offline_for: self.monitor.down_duration(now),
            moisture,
            temperature_c: self.temperature,
            threshold,
        }
    }

    fn wants_failsafe(&self, now: Timestamp, connectivity: ConnectivityState) -> bool {
        connectivity == ConnectivityState::Down
            && self.monitor.down_duration(now) >= self.config.offline_grace
    }

    fn update_mode(&mut self, now: Timestamp, connectivity: ConnectivityState) {
        let wants_failsafe = self.wants_failsafe(now, connectivity);
        match self.mode {
            Mode::Adaptive if wants_failsafe => {
                warn!(
                    offline_for_sec = self.monitor.down_duration(now).as_secs(),
                    grace_sec = self.config.offline_grace.as_secs(),
                    "controller: offline grace exceeded — entering fail-safe"
                );
                self.failsafe.reset(now);
                self.switch_mode(Mode::FailSafe);
            }
            Mode::FailSafe if !wants_failsafe => {
                if self.failsafe.is_active() {
                    // Pulse keeps running until its own duration is up.
                    return;
                }
                info!("controller: connectivity restored — resuming adaptive control");
                self.failsafe.reset(now);
                self.switch_mode(Mode::Adaptive);
            }
            _ => {}
        }
    }

    fn switch_mode(&mut self, to: Mode) {
        let from = self.mode;
        self.mode = to;
        self.pending.push(ControllerEvent::ModeChanged { from, to });
    }

    fn poll_temperature(
        &mut self,
        now: Timestamp,
        connectivity: ConnectivityState,
        weather: &mut dyn TemperatureSource,
    ) {
        if let Some(celsius) = weather.poll_update() {
            if celsius.is_finite() {
                self.temperature = Some(celsius);
                self.pending
                    .push(ControllerEvent::TemperatureUpdated { celsius });
            } else {
                warn!(celsius, "controller: ignoring non-finite temperature");
            }
        }

        if connectivity != ConnectivityState::Up {
            return;
        }
        let due = self.last_temperature_request.map_or(true, |last| {
            now.saturating_since(last) >= self.config.temperature_poll_interval
        });
        if due {
            weather.request_update();
            self.last_temperature_request = Some(now);
        }
    }

    fn set_pump(&mut self, state: PumpState, source: PumpSource) {
        if state != self.pump {
            self.pump = state;
            self.pump_source = source;
        }
    }

    /// Write the pump state to the relay, at most once per change.
    fn apply(&mut self, relay: &mut dyn PumpRelay) {
        if self.applied == Some(self.pump) {
            return;
        }
        relay.set_pump_relay(self.pump.is_on());
        self.applied = Some(self.pump);
        info!(
            pump = ?self.pump,
            source = ?self.pump_source,
            mode = ?self.mode,
            "controller: relay updated"
        );
        self.pending.push(ControllerEvent::PumpChanged {
            state: self.pump,
            source: self.pump_source,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================
