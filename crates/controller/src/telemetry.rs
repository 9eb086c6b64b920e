//! MQTT telemetry out, pump commands in.
//!
//! ```text
//!   irrigation/<device>/event      ◀── every ControllerEvent, JSON + ts
//!   irrigation/<device>/status     ◀── periodic Snapshot (retained)
//!   irrigation/<device>/pump/set   ──▶ ON | OFF | AUTO
//! ```

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};

use irrigation_core::{ControllerEvent, EventSink, PumpState, Snapshot};

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

pub(crate) fn event_topic(device_id: &str) -> String {
    format!("irrigation/{device_id}/event")
}

pub(crate) fn status_topic(device_id: &str) -> String {
    format!("irrigation/{device_id}/status")
}

pub(crate) fn command_topic(device_id: &str) -> String {
    format!("irrigation/{device_id}/pump/set")
}

/// Extract device_id from "irrigation/<device_id>/pump/set".
pub(crate) fn extract_command_device(topic: &str) -> Option<&str> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() == 4 && parts[0] == "irrigation" && parts[2] == "pump" && parts[3] == "set" {
        Some(parts[1])
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpCommand {
    On,
    Off,
    /// Drop the manual override and return to moisture control.
    Auto,
}

impl PumpCommand {
    /// Parse an "ON"/"OFF"/"AUTO" payload (case-insensitive, trims whitespace).
    pub fn parse(payload: &[u8]) -> Result<Self, String> {
        let s = String::from_utf8_lossy(payload).trim().to_uppercase();
        match s.as_str() {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            "AUTO" => Ok(Self::Auto),
            _ => Err(format!("unknown pump command '{s}'")),
        }
    }

    pub fn into_override(self) -> Option<PumpState> {
        match self {
            Self::On => Some(PumpState::On),
            Self::Off => Some(PumpState::Off),
            Self::Auto => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Stamped<'a, T: Serialize> {
    ts: i64,
    #[serde(flatten)]
    body: &'a T,
}

fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

pub(crate) fn encode<T: Serialize>(ts: i64, body: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&Stamped { ts, body })
}

/// Forwards controller events to the broker without blocking the tick.
///
/// Publishes go into rumqttc's request queue; when the queue is full
/// (broker unreachable for a while) events are dropped and logged.
pub struct MqttSink {
    client: AsyncClient,
    event_topic: String,
    status_topic: String,
}

impl MqttSink {
    pub fn new(client: AsyncClient, device_id: &str) -> Self {
        Self {
            client,
            event_topic: event_topic(device_id),
            status_topic: status_topic(device_id),
        }
    }

    fn publish<T: Serialize>(&self, topic: &str, retain: bool, body: &T) {
        let payload = match encode(now_unix(), body) {
            Ok(p) => p,
            Err(e) => {
                warn!(topic, "telemetry: encode failed: {e}");
                return;
            }
        };
        if let Err(e) = self
            .client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload)
        {
            warn!(topic, "telemetry: publish dropped: {e}");
        }
    }

    pub fn publish_status(&self, snapshot: &Snapshot) {
        self.publish(&self.status_topic, true, snapshot);
    }
}

impl EventSink for MqttSink {
    fn emit(&mut self, event: &ControllerEvent) {
        self.publish(&self.event_topic, false, event);
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Drive the MQTT connection and forward pump commands to the control loop.
///
/// Subscribes on every ConnAck so a broker restart does not lose the
/// command subscription.
pub async fn run(
    mut eventloop: EventLoop,
    client: AsyncClient,
    device_id: String,
    commands: mpsc::Sender<PumpCommand>,
) {
    let topic = command_topic(&device_id);
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");
                if let Err(e) = client.subscribe(topic.as_str(), QoS::AtLeastOnce).await {
                    warn!(topic = %topic, "mqtt subscribe failed: {e}");
                } else {
                    info!(topic = %topic, "mqtt subscribed");
                }
            }
            Ok(Event::Incoming(Packet::Publish(p))) => {
                if extract_command_device(&p.topic) != Some(device_id.as_str()) {
                    warn!(topic = %p.topic, "mqtt: unhandled topic");
                    continue;
                }
                match PumpCommand::parse(&p.payload) {
                    Ok(cmd) => {
                        info!(?cmd, "mqtt: pump command received");
                        if commands.send(cmd).await.is_err() {
                            // Control loop gone; nothing left to drive.
                            return;
                        }
                    }
                    Err(msg) => warn!("{msg} (use ON/OFF/AUTO)"),
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("mqtt disconnected");
            }
            Ok(_) => {}
            Err(e) => {
                warn!("mqtt error: {e}. reconnecting...");
                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
