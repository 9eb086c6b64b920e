//! Pump relay via GPIO. The `gpio` feature gates the real rppal driver;
//! without it, a mock implementation records the state and logs changes.

use anyhow::Result;
use irrigation_core::PumpRelay;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

// ---------------------------------------------------------------------------
// Real GPIO relay (production, requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub(crate) struct Relay {
    pin: OutputPin,
    active_low: bool, // many relay boards are active-low
}

#[cfg(feature = "gpio")]
impl Relay {
    pub(crate) fn new(gpio_pin: u8, active_low: bool) -> Result<Self> {
        let pin = Gpio::new()?.get(gpio_pin)?.into_output();
        let mut relay = Self { pin, active_low };

        // Pump off until the controller decides otherwise.
        relay.drive(false);
        tracing::info!(gpio_pin, active_low, "relay: initialised (pump off)");
        Ok(relay)
    }

    pub(crate) fn is_on(&self) -> bool {
        self.pin.is_set_high() != self.active_low
    }

    fn drive(&mut self, on: bool) {
        // active-low: LOW = ON, HIGH = OFF
        if on != self.active_low {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

#[cfg(feature = "gpio")]
impl PumpRelay for Relay {
    fn set_pump_relay(&mut self, on: bool) {
        self.drive(on);
        tracing::info!(pump = if on { "ON" } else { "OFF" }, "relay: set");
    }
}

// ---------------------------------------------------------------------------
// Mock relay (development, no hardware)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub(crate) struct Relay {
    on: bool,
}

#[cfg(not(feature = "gpio"))]
impl Relay {
    pub(crate) fn new(gpio_pin: u8, active_low: bool) -> Result<Self> {
        tracing::info!(
            gpio_pin,
            active_low,
            "[mock-gpio] pump relay registered (not wired)"
        );
        Ok(Self { on: false })
    }

    pub(crate) fn is_on(&self) -> bool {
        self.on
    }
}

#[cfg(not(feature = "gpio"))]
impl PumpRelay for Relay {
    fn set_pump_relay(&mut self, on: bool) {
        self.on = on;
        tracing::info!(
            pump = if on { "ON" } else { "OFF" },
            "[mock-gpio] relay set"
        );
    }
}

// ===========================================================================
// Tests
// ===========================================================================
