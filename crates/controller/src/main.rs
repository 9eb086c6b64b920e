#[cfg(any(feature = "adc", test))]
mod adc;
mod config;
mod network;
mod relay;
#[cfg(feature = "sim")]
mod sim;
mod telemetry;
mod weather;

#[cfg(not(any(feature = "adc", feature = "sim")))]
compile_error!("enable the `adc` or `sim` feature to provide a moisture sensor");

use anyhow::Result;
use rumqttc::{AsyncClient, MqttOptions};
use std::{env, time::Duration};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::info;
use tracing_subscriber::EnvFilter;

use irrigation_core::{Clock, Io, IrrigationController, MonotonicClock, PumpRelay};

const TICK: Duration = Duration::from_secs(1);

/// Publish a status snapshot (and log one) every this many ticks.
const STATUS_EVERY_TICKS: u64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

    // ── Config file ─────────────────────────────────────────────────
    let cfg = config::load(&config_path)?;
    let control = cfg.controller_config();
    info!(
        path = %config_path,
        preset = ?cfg.preset,
        threshold = control.thresholds.base,
        cold_rule = ?control.thresholds.cold,
        offline_grace_sec = control.offline_grace.as_secs(),
        failsafe_interval_sec = control.failsafe_interval.as_secs(),
        failsafe_duration_sec = control.failsafe_duration.as_secs(),
        "config loaded"
    );

    // ── Pump relay ──────────────────────────────────────────────────
    // gpio_pin is validated to 2..=27.
    let mut relay = relay::Relay::new(cfg.relay.gpio_pin as u8, cfg.relay.active_low)?;

    // ── Moisture sensor ─────────────────────────────────────────────
    #[cfg(feature = "adc")]
    let mut sensor = adc::Ads1115::open(
        cfg.sensor.i2c_addr as u16,
        cfg.sensor.channel as usize,
        control.calibration.raw_wet,
    )?;

    #[cfg(all(feature = "sim", not(feature = "adc")))]
    let mut sensor = {
        let scenario =
            sim::Scenario::from_str_lossy(&env::var("SIM_SCENARIO").unwrap_or_default());
        let diurnal_period_s: f64 = env::var("SIM_DIURNAL_PERIOD_S")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(600.0);
        info!(%scenario, diurnal_period_s, "sim: simulated soil probe");
        sim::SoilSim::new(scenario, control.calibration, diurnal_period_s)
    };

    // ── Network + weather ───────────────────────────────────────────
    let mut link = network::LinuxLink::new(
        cfg.connectivity.interface.clone(),
        cfg.connectivity.reconnect_command.clone(),
    );
    let mut probe = network::HttpProbe::new(cfg.connectivity.probe_url.clone(), cfg.probe_timeout());
    let mut weather = weather::WeatherFeed::new(
        Handle::current(),
        cfg.weather.url.clone(),
        cfg.weather.api_key.clone().zip(cfg.weather.location.clone()),
        cfg.weather_timeout(),
    );

    // ── MQTT ────────────────────────────────────────────────────────
    let device_id = cfg.telemetry.device_id.clone();
    let mut mqttoptions = MqttOptions::new(format!("irrigation-{device_id}"), broker, port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    let (client, eventloop) = AsyncClient::new(mqttoptions, 64);

    let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
    tokio::spawn(telemetry::run(
        eventloop,
        client.clone(),
        device_id.clone(),
        cmd_tx,
    ));
    let mut sink = telemetry::MqttSink::new(client, &device_id);

    // ── Control loop ────────────────────────────────────────────────
    let clock = MonotonicClock::new();
    let mut controller = IrrigationController::new(control, clock.now());

    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(device = %device_id, tick_ms = TICK.as_millis() as u64, "controller started");

    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                relay.set_pump_relay(false);
                info!("shutdown: pump off");
                return Ok(());
            }
        }

        while let Ok(cmd) = cmd_rx.try_recv() {
            controller.set_manual_override(cmd.into_override());
        }

        // Reachability probes block for up to their timeout.
        let now = clock.now();
        let snapshot = tokio::task::block_in_place(|| {
            controller.tick(
                now,
                Io {
                    sensor: &mut sensor,
                    relay: &mut relay,
                    network: &mut link,
                    reachability: &mut probe,
                    weather: &mut weather,
                    events: &mut sink,
                },
            )
        });

        #[cfg(all(feature = "sim", not(feature = "adc")))]
        sensor.set_watering(relay.is_on());

        if ticks % STATUS_EVERY_TICKS == 0 {
            sink.publish_status(&snapshot);
            info!(
                mode = ?snapshot.mode,
                pump = ?snapshot.pump,
                relay_on = relay.is_on(),
                moisture = snapshot.moisture.percent(),
                threshold = snapshot.threshold,
                temperature_c = ?snapshot.temperature_c,
                connectivity = ?snapshot.connectivity,
                offline_for_sec = snapshot.offline_for.as_secs(),
                "status"
            );
        }
        ticks += 1;
    }
}
