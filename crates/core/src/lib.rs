//! Control core for a single-zone irrigation controller.
//!
//! The core turns a raw soil-moisture sample into a pump decision each tick.
//! While connectivity is healthy it uses moisture hysteresis (optionally
//! lowered in cold weather); once the link has been down longer than the
//! configured grace period it falls back to a fixed time-based pulse.
//!
//! ```text
//! Clock ─▶ ConnectivityMonitor ─▶ IrrigationController ─┬─▶ HysteresisPolicy
//!                                        ▲              └─▶ FailSafeScheduler
//!                       TemperatureSource┘                        │
//!                                                 PumpRelay ◀─────┘
//! ```
//!
//! Nothing in this crate blocks or performs I/O. Collaborators are reached
//! through the traits in [`ports`].

pub mod clock;
pub mod connectivity;
pub mod controller;
pub mod events;
pub mod failsafe;
pub mod hysteresis;
pub mod moisture;
pub mod ports;
pub mod settings;

pub use clock::{Clock, ManualClock, MonotonicClock, Timestamp};
pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use controller::{IrrigationController, Mode, Snapshot};
pub use events::{ControllerEvent, PumpSource};
pub use failsafe::{FailSafeCycle, FailSafeScheduler};
pub use hysteresis::{ColdRule, HysteresisPolicy, PumpState, ThresholdSchedule};
pub use moisture::{Calibration, MoistureReading, MoistureSampler};
pub use ports::{
    EventSink, Io, MoistureSensor, NetworkLink, PumpRelay, Reachability, TemperatureSource,
};
pub use settings::ControllerConfig;
