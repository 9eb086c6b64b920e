//! Link health tracking with rate-limited end-to-end probes.
//!
//! `last_success` only moves forward on a link-up transition or a successful
//! probe. A failing probe therefore lets the offline duration grow, which is
//! exactly what pushes the controller into fail-safe mode.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Timestamp;
use crate::ports::NetworkLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: ConnectivityState,
    last_success: Timestamp,
    last_probe: Option<Timestamp>,
    probe_interval: Duration,
}

impl ConnectivityMonitor {
    /// Starts Down with `last_success = now`, so the offline clock runs from
    /// boot until the first successful contact.
    pub fn new(now: Timestamp, probe_interval: Duration) -> Self {
        Self {
            state: ConnectivityState::Down,
            last_success: now,
            last_probe: None,
            probe_interval,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn last_success(&self) -> Timestamp {
        self.last_success
    }

    /// Link-layer notification. Only a Down→Up transition refreshes
    /// `last_success`.
    pub fn on_link_event(&mut self, is_link_up: bool, now: Timestamp) {
        match (self.state, is_link_up) {
            (ConnectivityState::Down, true) => {
                self.state = ConnectivityState::Up;
                self.last_success = now;
                info!(at_ms = now.as_millis(), "connectivity: link up");
            }
            (ConnectivityState::Up, false) => {
                self.state = ConnectivityState::Down;
                warn!(
                    at_ms = now.as_millis(),
                    "connectivity: link down — operating offline"
                );
            }
            _ => {}
        }
    }

    /// Run a liveness probe if one is due (the first call always probes).
    ///
    /// Link down → ask the collaborator to reconnect and report Down.
    /// Link up → run `probe_fn`; success marks Up and refreshes
    /// `last_success`, failure leaves both untouched.
    pub fn probe<L, F>(&mut self, now: Timestamp, link: &mut L, probe_fn: F) -> ConnectivityState
    where
        L: NetworkLink + ?Sized,
        F: FnOnce() -> bool,
    {
        if let Some(last) = self.last_probe {
            if now.saturating_since(last) < self.probe_interval {
                return self.state;
            }
        }
        self.last_probe = Some(now);

        if !link.is_link_up() {
            warn!("connectivity: link down at probe time — attempting reconnect");
            link.attempt_reconnect();
            self.state = ConnectivityState::Down;
            return self.state;
        }

        if probe_fn() {
            self.state = ConnectivityState::Up;
            self.last_success = now;
            info!("connectivity: end-to-end probe ok");
        } else {
            warn!(
                offline_for_sec = self.down_duration(now).as_secs(),
                "connectivity: end-to-end probe failed"
            );
        }
        self.state
    }

    /// Time since the last confirmed contact.
    pub fn down_duration(&self, now: Timestamp) -> Duration {
        now.saturating_since(self.last_success)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
