//! Time-driven backup irrigation for when sensor feedback can't be trusted.
//!
//! ```text
//! Idle ──[now - last_cycle_end >= interval]──▶ Active (pump ON)
//!  ▲                                              │
//!  └────[now - started >= duration] (pump OFF)────┘
//! ```
//!
//! The next interval is measured from the tick that actually ended the
//! previous pulse, so late ticks delay the schedule instead of compressing it.

use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::clock::Timestamp;
use crate::hysteresis::PumpState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum FailSafeCycle {
    Idle { last_cycle_end: Timestamp },
    Active { started: Timestamp },
}

#[derive(Debug, Clone)]
pub struct FailSafeScheduler {
    interval: Duration,
    duration: Duration,
    cycle: FailSafeCycle,
}

impl FailSafeScheduler {
    pub fn new(interval: Duration, duration: Duration, now: Timestamp) -> Self {
        Self {
            interval,
            duration,
            cycle: FailSafeCycle::Idle {
                last_cycle_end: now,
            },
        }
    }

    /// Back to Idle with the first pulse a full interval after `now`.
    pub fn reset(&mut self, now: Timestamp) {
        self.cycle = FailSafeCycle::Idle {
            last_cycle_end: now,
        };
    }

    pub fn cycle(&self) -> FailSafeCycle {
        self.cycle
    }

    pub fn is_active(&self) -> bool {
        matches!(self.cycle, FailSafeCycle::Active { .. })
    }

    /// When the next pulse is due, or `None` mid-pulse.
    pub fn next_pulse_at(&self) -> Option<Timestamp> {
        match self.cycle {
            FailSafeCycle::Idle { last_cycle_end } => Some(last_cycle_end + self.interval),
            FailSafeCycle::Active { .. } => None,
        }
    }

    /// Advance the state machine and return the pump state it demands.
    ///
    /// Repeated calls inside the same window are no-ops: every transition is
    /// gated on a timestamp comparison.
    pub fn tick(&mut self, now: Timestamp) -> PumpState {
        match self.cycle {
            FailSafeCycle::Idle { last_cycle_end } => {
                if now.saturating_since(last_cycle_end) >= self.interval {
                    info!(
                        duration_sec = self.duration.as_secs(),
                        "failsafe: interval elapsed — starting pulse"
                    );
                    self.cycle = FailSafeCycle::Active { started: now };
                    PumpState::On
                } else {
                    PumpState::Off
                }
            }
            FailSafeCycle::Active { started } => {
                if now.saturating_since(started) >= self.duration {
                    info!(
                        next_in_sec = self.interval.as_secs(),
                        "failsafe: pulse complete"
                    );
                    self.cycle = FailSafeCycle::Idle {
                        last_cycle_end: now,
                    };
                    PumpState::Off
                } else {
                    PumpState::On
                }
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
