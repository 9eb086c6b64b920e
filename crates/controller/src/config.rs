//! TOML config file loading and validation for the controller process.
//!
//! Control values left out of the file fall back to the selected `preset`
//! (`cold_weather` unless stated otherwise). Everything else has a plain
//! default so an empty file yields a runnable simulator setup.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use irrigation_core::{ColdRule, ControllerConfig, ThresholdSchedule};

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub preset: Preset,
    #[serde(default)]
    pub moisture: MoistureSection,
    #[serde(default)]
    pub sensor: SensorSection,
    #[serde(default)]
    pub weather: WeatherSection,
    #[serde(default)]
    pub connectivity: ConnectivitySection,
    #[serde(default)]
    pub failsafe: FailSafeSection,
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Simple,
    #[default]
    ColdWeather,
}

impl Preset {
    fn base(self) -> ControllerConfig {
        match self {
            Preset::Simple => ControllerConfig::simple(),
            Preset::ColdWeather => ControllerConfig::cold_weather(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MoistureSection {
    pub raw_dry: Option<i64>,
    pub raw_wet: Option<i64>,
    /// Percent below which the pump starts.
    pub threshold: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SensorSection {
    #[serde(default = "default_i2c_addr")]
    pub i2c_addr: i64,
    #[serde(default)]
    pub channel: i64,
}

#[derive(Debug, Deserialize)]
pub struct WeatherSection {
    pub cold_cutoff_c: Option<f32>,
    pub cold_threshold: Option<i64>,
    pub poll_sec: Option<i64>,
    #[serde(default = "default_weather_url")]
    pub url: String,
    pub api_key: Option<String>,
    pub location: Option<String>,
    #[serde(default = "default_http_timeout_sec")]
    pub timeout_sec: i64,
}

#[derive(Debug, Deserialize)]
pub struct ConnectivitySection {
    pub offline_grace_sec: Option<i64>,
    pub probe_interval_sec: Option<i64>,
    #[serde(default = "default_probe_url")]
    pub probe_url: String,
    #[serde(default = "default_http_timeout_sec")]
    pub probe_timeout_sec: i64,
    /// Network interface whose operstate is watched (e.g. `wlan0`). Unset:
    /// whichever interface holds the default route.
    pub interface: Option<String>,
    /// Command spawned (not awaited) when the link is down.
    pub reconnect_command: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FailSafeSection {
    pub interval_sec: Option<i64>,
    pub duration_sec: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RelaySection {
    #[serde(default = "default_relay_pin")]
    pub gpio_pin: i64,
    /// Many common relay boards are active-low.
    #[serde(default = "default_true")]
    pub active_low: bool,
}

#[derive(Debug, Deserialize)]
pub struct TelemetrySection {
    #[serde(default = "default_device_id")]
    pub device_id: String,
}

fn default_i2c_addr() -> i64 {
    0x48
}

fn default_weather_url() -> String {
    "http://api.weatherapi.com/v1/current.json".to_string()
}

fn default_probe_url() -> String {
    "http://api.weatherapi.com/v1/ping.json".to_string()
}

fn default_http_timeout_sec() -> i64 {
    5
}

fn default_relay_pin() -> i64 {
    17
}

fn default_true() -> bool {
    true
}

fn default_device_id() -> String {
    "garden".to_string()
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            i2c_addr: default_i2c_addr(),
            channel: 0,
        }
    }
}

impl Default for WeatherSection {
    fn default() -> Self {
        Self {
            cold_cutoff_c: None,
            cold_threshold: None,
            poll_sec: None,
            url: default_weather_url(),
            api_key: None,
            location: None,
            timeout_sec: default_http_timeout_sec(),
        }
    }
}

impl Default for ConnectivitySection {
    fn default() -> Self {
        Self {
            offline_grace_sec: None,
            probe_interval_sec: None,
            probe_url: default_probe_url(),
            probe_timeout_sec: default_http_timeout_sec(),
            interface: None,
            reconnect_command: None,
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            gpio_pin: default_relay_pin(),
            active_low: true,
        }
    }
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
        }
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
const VALID_GPIO_PINS: &[i64] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

/// Maximum single-ended reading from the ADS1115 (15-bit unsigned).
const ADS1115_MAX: i64 = 32767;

/// ADDR pin strapping options: GND, VDD, SDA, SCL.
const ADS1115_ADDRS: &[i64] = &[0x48, 0x49, 0x4a, 0x4b];

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate the whole file. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_moisture(&mut errors);
        self.validate_sensor(&mut errors);
        self.validate_weather(&mut errors);
        self.validate_connectivity(&mut errors);
        self.validate_failsafe(&mut errors);
        self.validate_relay(&mut errors);
        self.validate_telemetry(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_moisture(&self, errors: &mut Vec<String>) {
        let m = &self.moisture;
        let base = self.preset.base().calibration;
        let raw_dry = m.raw_dry.unwrap_or(base.raw_dry);
        let raw_wet = m.raw_wet.unwrap_or(base.raw_wet);

        // ── ADC calibration bounds ──────────────────────────────
        if !(0..=ADS1115_MAX).contains(&raw_dry) {
            errors.push(format!(
                "moisture: raw_dry {raw_dry} out of ADC range [0, {ADS1115_MAX}]"
            ));
        }
        if !(0..=ADS1115_MAX).contains(&raw_wet) {
            errors.push(format!(
                "moisture: raw_wet {raw_wet} out of ADC range [0, {ADS1115_MAX}]"
            ));
        }
        if raw_dry == raw_wet {
            errors.push(format!(
                "moisture: raw_dry and raw_wet are both {raw_dry}, calibration range is zero"
            ));
        }

        if let Some(t) = m.threshold {
            check_percent(errors, "moisture: threshold", t);
        }
    }

    fn validate_sensor(&self, errors: &mut Vec<String>) {
        let s = &self.sensor;
        if !ADS1115_ADDRS.contains(&s.i2c_addr) {
            errors.push(format!(
                "sensor: i2c_addr {:#04x} is not an ADS1115 address (0x48-0x4b)",
                s.i2c_addr
            ));
        }
        if !(0..=3).contains(&s.channel) {
            errors.push(format!(
                "sensor: channel {} out of range (0-3)",
                s.channel
            ));
        }
    }

    fn validate_weather(&self, errors: &mut Vec<String>) {
        let w = &self.weather;

        // ── Cold rule ───────────────────────────────────────────
        match (w.cold_cutoff_c, w.cold_threshold) {
            (Some(_), None) | (None, Some(_)) => errors.push(
                "weather: cold_cutoff_c and cold_threshold must be set together".to_string(),
            ),
            _ => {}
        }
        if let Some(c) = w.cold_cutoff_c {
            if !c.is_finite() {
                errors.push(format!("weather: cold_cutoff_c {c} is not a number"));
            }
        }
        if let Some(t) = w.cold_threshold {
            check_percent(errors, "weather: cold_threshold", t);
        }

        // ── Polling ─────────────────────────────────────────────
        if let Some(p) = w.poll_sec {
            check_positive(errors, "weather: poll_sec", p);
        }
        check_positive(errors, "weather: timeout_sec", w.timeout_sec);
        check_http_url(errors, "weather: url", &w.url);

        match (&w.api_key, &w.location) {
            (Some(_), None) => errors.push("weather: api_key set without location".to_string()),
            (None, Some(_)) => errors.push("weather: location set without api_key".to_string()),
            (Some(k), Some(l)) => {
                if k.trim().is_empty() {
                    errors.push("weather: api_key is empty".to_string());
                }
                if l.trim().is_empty() {
                    errors.push("weather: location is empty".to_string());
                }
            }
            (None, None) => {}
        }
    }

    fn validate_connectivity(&self, errors: &mut Vec<String>) {
        let c = &self.connectivity;

        if let Some(g) = c.offline_grace_sec {
            if g < 0 {
                errors.push(format!(
                    "connectivity: offline_grace_sec must not be negative, got {g}"
                ));
            }
        }
        if let Some(p) = c.probe_interval_sec {
            check_positive(errors, "connectivity: probe_interval_sec", p);
        }
        check_positive(errors, "connectivity: probe_timeout_sec", c.probe_timeout_sec);
        check_http_url(errors, "connectivity: probe_url", &c.probe_url);

        if let Some(iface) = &c.interface {
            if iface.trim().is_empty() || iface.contains('/') {
                errors.push(format!(
                    "connectivity: interface {iface:?} is not a valid interface name"
                ));
            }
        }
        if let Some(cmd) = &c.reconnect_command {
            if cmd.first().map_or(true, |p| p.trim().is_empty()) {
                errors.push("connectivity: reconnect_command is empty".to_string());
            }
        }
    }

    fn validate_failsafe(&self, errors: &mut Vec<String>) {
        let f = &self.failsafe;
        if let Some(i) = f.interval_sec {
            check_positive(errors, "failsafe: interval_sec", i);
        }
        if let Some(d) = f.duration_sec {
            check_positive(errors, "failsafe: duration_sec", d);
        }
    }

    fn validate_relay(&self, errors: &mut Vec<String>) {
        if !VALID_GPIO_PINS.contains(&self.relay.gpio_pin) {
            errors.push(format!(
                "relay: gpio_pin {} is not a valid BCM GPIO pin (allowed: 2-27)",
                self.relay.gpio_pin
            ));
        }
    }

    fn validate_telemetry(&self, errors: &mut Vec<String>) {
        let id = &self.telemetry.device_id;
        if id.trim().is_empty() {
            errors.push("telemetry: device_id is empty".to_string());
        } else if id.contains(['/', '+', '#']) {
            errors.push(format!(
                "telemetry: device_id {id:?} must not contain MQTT topic characters (/ + #)"
            ));
        }
    }

    // -----------------------------------------------------------------------
    // Derived settings
    // -----------------------------------------------------------------------

    /// Merge the file over its preset. Call after [`Config::validate`].
    pub fn controller_config(&self) -> ControllerConfig {
        let mut out = self.preset.base();

        if let Some(raw_dry) = self.moisture.raw_dry {
            out.calibration.raw_dry = raw_dry;
        }
        if let Some(raw_wet) = self.moisture.raw_wet {
            out.calibration.raw_wet = raw_wet;
        }

        if let Some(t) = self.moisture.threshold {
            out.thresholds.base = percent(t);
        }
        if let (Some(cutoff_c), Some(t)) = (self.weather.cold_cutoff_c, self.weather.cold_threshold)
        {
            out.thresholds = ThresholdSchedule {
                base: out.thresholds.base,
                cold: Some(ColdRule {
                    cutoff_c,
                    threshold: percent(t),
                }),
            };
        }
        if let Some(p) = self.weather.poll_sec {
            out.temperature_poll_interval = secs(p);
        }

        if let Some(g) = self.connectivity.offline_grace_sec {
            out.offline_grace = secs(g);
        }
        if let Some(p) = self.connectivity.probe_interval_sec {
            out.probe_interval = secs(p);
        }

        if let Some(i) = self.failsafe.interval_sec {
            out.failsafe_interval = secs(i);
        }
        if let Some(d) = self.failsafe.duration_sec {
            out.failsafe_duration = secs(d);
        }

        out
    }

    pub fn weather_timeout(&self) -> Duration {
        secs(self.weather.timeout_sec)
    }

    pub fn probe_timeout(&self) -> Duration {
        secs(self.connectivity.probe_timeout_sec)
    }
}

fn check_positive(errors: &mut Vec<String>, what: &str, v: i64) {
    if v <= 0 {
        errors.push(format!("{what} must be positive, got {v}"));
    }
}

fn check_percent(errors: &mut Vec<String>, what: &str, v: i64) {
    if !(0..=100).contains(&v) {
        errors.push(format!("{what} {v} out of range [0, 100]"));
    }
}

fn check_http_url(errors: &mut Vec<String>, what: &str, url: &str) {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(format!("{what} {url:?} must start with http:// or https://"));
    }
}

fn secs(v: i64) -> Duration {
    Duration::from_secs(v.max(0) as u64)
}

fn percent(v: i64) -> u8 {
    v.clamp(0, 100) as u8
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use irrigation_core::Calibration;

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.preset, Preset::ColdWeather);
        assert_eq!(config.relay.gpio_pin, 17);
        assert!(config.relay.active_low);
        assert_eq!(config.telemetry.device_id, "garden");
        config.validate().unwrap();
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
preset = "simple"

[moisture]
raw_dry = 26000
raw_wet = 12000
threshold = 35

[sensor]
i2c_addr = 0x49
channel = 2

[weather]
cold_cutoff_c = 12.5
cold_threshold = 25
poll_sec = 600
api_key = "k"
location = "Oslo"

[connectivity]
offline_grace_sec = 3600
probe_interval_sec = 30
interface = "wlan0"
reconnect_command = ["wpa_cli", "-i", "wlan0", "reconnect"]

[failsafe]
interval_sec = 7200
duration_sec = 45

[relay]
gpio_pin = 27
active_low = false

[telemetry]
device_id = "greenhouse"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.preset, Preset::Simple);
        assert_eq!(config.sensor.i2c_addr, 0x49);
        assert_eq!(config.connectivity.interface.as_deref(), Some("wlan0"));
        assert_eq!(config.telemetry.device_id, "greenhouse");

        let cc = config.controller_config();
        assert_eq!(
            cc.calibration,
            Calibration {
                raw_dry: 26000,
                raw_wet: 12000
            }
        );
        assert_eq!(cc.thresholds.base, 35);
        assert_eq!(
            cc.thresholds.cold,
            Some(ColdRule {
                cutoff_c: 12.5,
                threshold: 25
            })
        );
        assert_eq!(cc.temperature_poll_interval, Duration::from_secs(600));
        assert_eq!(cc.offline_grace, Duration::from_secs(3600));
        assert_eq!(cc.probe_interval, Duration::from_secs(30));
        assert_eq!(cc.failsafe_interval, Duration::from_secs(7200));
        assert_eq!(cc.failsafe_duration, Duration::from_secs(45));
    }

    #[test]
    fn unknown_preset_fails_to_parse() {
        assert!(toml::from_str::<Config>(r#"preset = "tropical""#).is_err());
    }

    // -- Presets ----------------------------------------------------------

    #[test]
    fn empty_file_is_cold_weather_profile() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.controller_config(), ControllerConfig::cold_weather());
    }

    #[test]
    fn simple_preset_without_overrides() {
        let config: Config = toml::from_str(r#"preset = "simple""#).unwrap();
        assert_eq!(config.controller_config(), ControllerConfig::simple());
    }

    #[test]
    fn overrides_only_touch_named_fields() {
        let config: Config = toml::from_str(
            r#"
[failsafe]
duration_sec = 90
"#,
        )
        .unwrap();
        let cc = config.controller_config();
        let base = ControllerConfig::cold_weather();
        assert_eq!(cc.failsafe_duration, Duration::from_secs(90));
        assert_eq!(cc.failsafe_interval, base.failsafe_interval);
        assert_eq!(cc.thresholds, base.thresholds);
    }

    #[test]
    fn zero_grace_is_allowed() {
        let mut cfg = Config::default();
        cfg.connectivity.offline_grace_sec = Some(0);
        cfg.validate().unwrap();
        assert_eq!(cfg.controller_config().offline_grace, Duration::ZERO);
    }

    // -- Moisture ---------------------------------------------------------

    #[test]
    fn raw_dry_out_of_range() {
        let mut cfg = Config::default();
        cfg.moisture.raw_dry = Some(40000);
        assert_validation_err(&cfg, "raw_dry 40000 out of ADC range");
    }

    #[test]
    fn raw_wet_negative() {
        let mut cfg = Config::default();
        cfg.moisture.raw_wet = Some(-1);
        assert_validation_err(&cfg, "raw_wet -1 out of ADC range");
    }

    #[test]
    fn zero_calibration_range() {
        let mut cfg = Config::default();
        cfg.moisture.raw_dry = Some(500);
        cfg.moisture.raw_wet = Some(500);
        assert_validation_err(&cfg, "calibration range is zero");
    }

    #[test]
    fn partial_calibration_checked_against_preset() {
        // raw_wet defaults to 0; raw_dry = 0 collapses the range.
        let mut cfg = Config::default();
        cfg.moisture.raw_dry = Some(0);
        assert_validation_err(&cfg, "calibration range is zero");
    }

    #[test]
    fn threshold_above_hundred() {
        let mut cfg = Config::default();
        cfg.moisture.threshold = Some(101);
        assert_validation_err(&cfg, "moisture: threshold 101 out of range");
    }

    // -- Sensor -----------------------------------------------------------

    #[test]
    fn sensor_bad_address() {
        let mut cfg = Config::default();
        cfg.sensor.i2c_addr = 0x20;
        assert_validation_err(&cfg, "not an ADS1115 address");
    }

    #[test]
    fn sensor_channel_out_of_range() {
        let mut cfg = Config::default();
        cfg.sensor.channel = 4;
        assert_validation_err(&cfg, "channel 4 out of range");
    }

    // -- Weather ----------------------------------------------------------

    #[test]
    fn cold_rule_needs_both_halves() {
        let mut cfg = Config::default();
        cfg.weather.cold_cutoff_c = Some(10.0);
        assert_validation_err(&cfg, "must be set together");
    }

    #[test]
    fn cold_cutoff_nan_rejected() {
        let mut cfg = Config::default();
        cfg.weather.cold_cutoff_c = Some(f32::NAN);
        cfg.weather.cold_threshold = Some(20);
        assert_validation_err(&cfg, "is not a number");
    }

    #[test]
    fn api_key_without_location() {
        let mut cfg = Config::default();
        cfg.weather.api_key = Some("k".into());
        assert_validation_err(&cfg, "api_key set without location");
    }

    #[test]
    fn weather_url_must_be_http() {
        let mut cfg = Config::default();
        cfg.weather.url = "ftp://example.com".into();
        assert_validation_err(&cfg, "weather: url");
    }

    #[test]
    fn weather_poll_zero() {
        let mut cfg = Config::default();
        cfg.weather.poll_sec = Some(0);
        assert_validation_err(&cfg, "poll_sec must be positive");
    }

    // -- Connectivity -----------------------------------------------------

    #[test]
    fn negative_grace_rejected() {
        let mut cfg = Config::default();
        cfg.connectivity.offline_grace_sec = Some(-5);
        assert_validation_err(&cfg, "offline_grace_sec must not be negative");
    }

    #[test]
    fn probe_interval_zero() {
        let mut cfg = Config::default();
        cfg.connectivity.probe_interval_sec = Some(0);
        assert_validation_err(&cfg, "probe_interval_sec must be positive");
    }

    #[test]
    fn interface_with_slash_rejected() {
        let mut cfg = Config::default();
        cfg.connectivity.interface = Some("../eth0".into());
        assert_validation_err(&cfg, "not a valid interface name");
    }

    #[test]
    fn empty_reconnect_command_rejected() {
        let mut cfg = Config::default();
        cfg.connectivity.reconnect_command = Some(vec![]);
        assert_validation_err(&cfg, "reconnect_command is empty");
    }

    // -- Fail-safe --------------------------------------------------------

    #[test]
    fn failsafe_duration_zero() {
        let mut cfg = Config::default();
        cfg.failsafe.duration_sec = Some(0);
        assert_validation_err(&cfg, "duration_sec must be positive");
    }

    // -- Relay ------------------------------------------------------------

    #[test]
    fn relay_gpio_pin_1_rejected() {
        let mut cfg = Config::default();
        cfg.relay.gpio_pin = 1;
        assert_validation_err(&cfg, "not a valid BCM GPIO pin");
    }

    #[test]
    fn relay_gpio_boundary_27_accepted() {
        let mut cfg = Config::default();
        cfg.relay.gpio_pin = 27;
        cfg.validate().unwrap();
    }

    // -- Telemetry --------------------------------------------------------

    #[test]
    fn device_id_with_wildcard_rejected() {
        let mut cfg = Config::default();
        cfg.telemetry.device_id = "garden/+".into();
        assert_validation_err(&cfg, "must not contain MQTT topic characters");
    }

    #[test]
    fn device_id_blank_rejected() {
        let mut cfg = Config::default();
        cfg.telemetry.device_id = "  ".into();
        assert_validation_err(&cfg, "device_id is empty");
    }

    // -- Multiple errors reported at once ---------------------------------

    #[test]
    fn multiple_errors_collected() {
        let mut cfg = Config::default();
        cfg.moisture.threshold = Some(-3);
        cfg.failsafe.interval_sec = Some(0);
        cfg.relay.gpio_pin = 0;
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("3 errors"), "wrong count in: {msg}");
        assert!(msg.contains("threshold"), "missing threshold error in: {msg}");
        assert!(msg.contains("interval_sec"), "missing interval error in: {msg}");
        assert!(msg.contains("gpio_pin"), "missing gpio error in: {msg}");
    }

    // -- Load -------------------------------------------------------------

    #[test]
    fn load_missing_file_has_path_in_error() {
        let err = load("/nonexistent/irrigation.toml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/irrigation.toml"));
    }
}
