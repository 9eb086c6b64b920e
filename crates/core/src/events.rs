//! Outbound notifications.
//!
//! The controller emits these through [`EventSink`](crate::ports::EventSink)
//! at the end of a tick. Telemetry adapters decide where they go.

use serde::Serialize;

use crate::connectivity::ConnectivityState;
use crate::controller::Mode;
use crate::hysteresis::PumpState;
use crate::moisture::MoistureReading;

/// What made the pump change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpSource {
    Hysteresis,
    FailSafe,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControllerEvent {
    PumpChanged {
        state: PumpState,
        source: PumpSource,
    },
    ModeChanged {
        from: Mode,
        to: Mode,
    },
    ConnectivityChanged {
        state: ConnectivityState,
    },
    MoistureChanged {
        percent: MoistureReading,
    },
    TemperatureUpdated {
        celsius: f32,
    },
    ManualOverride {
        state: Option<PumpState>,
    },
}
