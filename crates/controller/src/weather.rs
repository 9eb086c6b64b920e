//! Ambient temperature from weatherapi.com's `current.json`.
//!
//! Fetches run on tokio's blocking pool so the control tick never waits on
//! HTTP. At most one fetch is in flight; its outcome comes back over a
//! channel and is collected by the next `poll_update`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use irrigation_core::TemperatureSource;

// ---------------------------------------------------------------------------
// Response shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    current: Current,
}

#[derive(Debug, Deserialize)]
struct Current {
    temp_c: f32,
}

/// Extract `current.temp_c` from a `current.json` body.
pub(crate) fn parse_temperature(body: &str) -> Result<f32> {
    let resp: CurrentResponse =
        serde_json::from_str(body).context("weather response missing current.temp_c")?;
    Ok(resp.current.temp_c)
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

struct Endpoint {
    agent: ureq::Agent,
    url: String,
    api_key: String,
    location: String,
}

impl Endpoint {
    fn fetch(&self) -> Result<f32> {
        let body = self
            .agent
            .get(&self.url)
            .query("key", &self.api_key)
            .query("q", &self.location)
            .query("aqi", "no")
            .call()
            .with_context(|| format!("GET {}", self.url))?
            .into_string()
            .context("reading weather response")?;
        parse_temperature(&body)
    }
}

pub struct WeatherFeed {
    runtime: Handle,
    endpoint: Option<Arc<Endpoint>>,
    tx: mpsc::UnboundedSender<Option<f32>>,
    rx: mpsc::UnboundedReceiver<Option<f32>>,
    in_flight: bool,
}

impl WeatherFeed {
    /// A feed that fetches from `url`. Without an API key and location the
    /// feed stays silent and the base threshold applies.
    pub fn new(
        runtime: Handle,
        url: String,
        credentials: Option<(String, String)>,
        timeout: Duration,
    ) -> Self {
        let endpoint = credentials.map(|(api_key, location)| {
            info!(%location, "weather: fetching current temperature");
            Arc::new(Endpoint {
                agent: ureq::AgentBuilder::new().timeout(timeout).build(),
                url,
                api_key,
                location,
            })
        });
        if endpoint.is_none() {
            info!("weather: no api_key/location configured, temperature rule disabled");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            runtime,
            endpoint,
            tx,
            rx,
            in_flight: false,
        }
    }
}

impl TemperatureSource for WeatherFeed {
    fn request_update(&mut self) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        if self.in_flight {
            debug!("weather: previous fetch still running");
            return;
        }
        self.in_flight = true;

        let tx = self.tx.clone();
        self.runtime.spawn_blocking(move || {
            let outcome = match endpoint.fetch() {
                Ok(celsius) => Some(celsius),
                Err(e) => {
                    warn!("weather: fetch failed: {e:#}");
                    None
                }
            };
            // Receiver gone means we are shutting down.
            let _ = tx.send(outcome);
        });
    }

    fn poll_update(&mut self) -> Option<f32> {
        let mut latest = None;
        while let Ok(outcome) = self.rx.try_recv() {
            self.in_flight = false;
            if let Some(celsius) = outcome {
                info!(celsius, "weather: temperature updated");
                latest = Some(celsius);
            }
        }
        latest
    }
}

// ===========================================================================
// Tests
// ===========================================================================
