//! Port traits: the boundary between the control core and the device.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ IrrigationController
//! ```
//!
//! Every method here is called from the single control tick. Implementations
//! must return promptly: reachability probes are bounded by their own
//! timeout, and anything slower (weather fetches, reconnects) belongs on a
//! background worker whose result is picked up on a later tick.

use crate::events::ControllerEvent;

/// Soil probe, read once per tick.
pub trait MoistureSensor {
    fn read_raw(&mut self) -> i64;
}

/// Pump relay. Writing the value that is already applied must be harmless.
pub trait PumpRelay {
    fn set_pump_relay(&mut self, on: bool);
}

/// Link-layer view of the network (e.g. Wi-Fi association).
pub trait NetworkLink {
    fn is_link_up(&mut self) -> bool;

    /// Kick off a reconnection. Must not wait for the outcome.
    fn attempt_reconnect(&mut self);
}

/// End-to-end reachability check (e.g. an HTTP ping).
pub trait Reachability {
    fn probe_reachability(&mut self) -> bool;
}

/// Asynchronous ambient temperature feed.
///
/// `request_update` starts a fetch without waiting; `poll_update` hands back
/// a finished result, if any. Failed fetches simply never produce a value.
pub trait TemperatureSource {
    fn request_update(&mut self);

    fn poll_update(&mut self) -> Option<f32>;
}

/// Receives the notifications the controller emits after each tick.
pub trait EventSink {
    fn emit(&mut self, event: &ControllerEvent);
}

impl EventSink for Vec<ControllerEvent> {
    fn emit(&mut self, event: &ControllerEvent) {
        self.push(event.clone());
    }
}

/// Collaborators handed to [`IrrigationController::tick`](crate::IrrigationController::tick).
pub struct Io<'a> {
    pub sensor: &'a mut dyn MoistureSensor,
    pub relay: &'a mut dyn PumpRelay,
    pub network: &'a mut dyn NetworkLink,
    pub reachability: &'a mut dyn Reachability,
    pub weather: &'a mut dyn TemperatureSource,
    pub events: &'a mut dyn EventSink,
}
