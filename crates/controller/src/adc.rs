//! ADS1115 16-bit ADC on I2C as the soil probe.
//!
//! Single-ended read of one channel at PGA ±4.096 V, 128 SPS, single-shot.
//! Typical capacitive probes powered from 3.3 V read about 26000 in dry
//! soil and 12000 in water at this gain.

use std::{thread, time::Duration};

use irrigation_core::MoistureSensor;

#[cfg(feature = "adc")]
use rppal::i2c::I2c;

// ── ADS1115 register addresses ──────────────────────────────────────────────

/// Conversion result register (read-only, 16-bit signed).
const REG_CONVERSION: u8 = 0x00;
/// Configuration register (read/write).
const REG_CONFIG: u8 = 0x01;

// ── Config register bit fields ──────────────────────────────────────────────
//
//   [15]    OS       : write 1 to start single-shot conversion
//   [14:12] MUX      : input multiplexer (channel selection)
//   [11:9]  PGA      : programmable gain amplifier
//   [8]     MODE     : 0 = continuous, 1 = single-shot
//   [7:5]   DR       : data rate
//   [1:0]   COMP_QUE : 11 = comparator off

/// OS=1, PGA=001 (±4.096 V), MODE=1, DR=100 (128 SPS), COMP_QUE=11.
const CONFIG_BASE: u16 = 0b1_000_001_1_100_0_0_0_11;

/// Single-ended MUX values (AINx vs GND).
const MUX_SHIFT: u8 = 12;
const MUX_SINGLE_ENDED: [u16; 4] = [0b100, 0b101, 0b110, 0b111];

/// Conversion takes ~7.8 ms at 128 SPS.
const CONVERSION_WAIT: Duration = Duration::from_millis(9);

/// Conversion-ready flag when the config register is read back.
const OS_READY_BIT: u16 = 1 << 15;

fn config_for_channel(channel: usize) -> u16 {
    CONFIG_BASE | (MUX_SINGLE_ENDED[channel & 0b11] << MUX_SHIFT)
}

/// Single-ended results are non-negative; anything else is bus noise.
fn clamp_single_ended(raw: i16) -> i64 {
    i64::from(raw).clamp(0, 32767)
}

// ── Driver ──────────────────────────────────────────────────────────────────

/// 16-bit big-endian register access.
pub trait Registers {
    fn write_register(&mut self, reg: u8, value: u16) -> anyhow::Result<()>;
    fn read_register(&mut self, reg: u8) -> anyhow::Result<u16>;
}

#[cfg(feature = "adc")]
impl Registers for I2c {
    fn write_register(&mut self, reg: u8, value: u16) -> anyhow::Result<()> {
        self.block_write(reg, &value.to_be_bytes())?;
        Ok(())
    }

    fn read_register(&mut self, reg: u8) -> anyhow::Result<u16> {
        let mut buf = [0u8; 2];
        self.block_read(reg, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }
}

pub struct Ads1115<R> {
    bus: R,
    channel: usize,
    /// Returned on a failed read when no good sample exists yet: the wet
    /// calibration endpoint, so a dead probe never starts the pump.
    fallback: i64,
    last_good: Option<i64>,
}

#[cfg(feature = "adc")]
impl Ads1115<I2c> {
    /// Open I2C bus 1 and talk to the ADS1115 at `addr`.
    pub fn open(addr: u16, channel: usize, raw_wet: i64) -> anyhow::Result<Self> {
        anyhow::ensure!(channel <= 3, "ADS1115 channel {channel} out of range (0-3)");

        let mut i2c = I2c::new()?;
        i2c.set_slave_address(addr)?;

        tracing::info!(
            addr = format_args!("0x{addr:02x}"),
            channel,
            "ads1115 initialised"
        );
        Ok(Self::with_bus(i2c, channel, raw_wet))
    }
}

impl<R: Registers> Ads1115<R> {
    pub(crate) fn with_bus(bus: R, channel: usize, fallback: i64) -> Self {
        Self {
            bus,
            channel,
            fallback,
            last_good: None,
        }
    }

    fn read_channel(&mut self) -> anyhow::Result<i16> {
        self.bus
            .write_register(REG_CONFIG, config_for_channel(self.channel))?;

        thread::sleep(CONVERSION_WAIT);

        // One wait is normally enough at 128 SPS.
        for _ in 0..3 {
            if self.bus.read_register(REG_CONFIG)? & OS_READY_BIT != 0 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        Ok(self.bus.read_register(REG_CONVERSION)? as i16)
    }
}

impl<R: Registers> MoistureSensor for Ads1115<R> {
    fn read_raw(&mut self) -> i64 {
        match self.read_channel() {
            Ok(raw) => {
                let v = clamp_single_ended(raw);
                self.last_good = Some(v);
                v
            }
            Err(e) => {
                tracing::error!(channel = self.channel, "adc read failed: {e:#}");
                self.last_good.unwrap_or(self.fallback)
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    // -- Config register construction -----------------------------------------

    #[test]
    fn config_register_channels() {
        assert_eq!(config_for_channel(0), 0xC383);
        assert_eq!(config_for_channel(1), 0xD383);
        assert_eq!(config_for_channel(2), 0xE383);
        assert_eq!(config_for_channel(3), 0xF383);
    }

    #[test]
    fn config_base_fields() {
        assert_eq!((CONFIG_BASE >> 15) & 1, 1, "OS should start a conversion");
        assert_eq!((CONFIG_BASE >> 9) & 0b111, 0b001, "PGA should be ±4.096 V");
        assert_eq!((CONFIG_BASE >> 8) & 1, 1, "MODE should be single-shot");
        assert_eq!((CONFIG_BASE >> 5) & 0b111, 0b100, "DR should be 128 SPS");
    }

    #[test]
    fn negative_conversion_clamps_to_zero() {
        assert_eq!(clamp_single_ended(-12), 0);
        assert_eq!(clamp_single_ended(i16::MAX), 32767);
        assert_eq!(clamp_single_ended(19000), 19000);
    }

    // -- Read sequence against a scripted bus ---------------------------------

    #[derive(Default)]
    struct FakeBus {
        writes: Vec<(u8, u16)>,
        reads: VecDeque<anyhow::Result<u16>>,
    }

    impl Registers for FakeBus {
        fn write_register(&mut self, reg: u8, value: u16) -> anyhow::Result<()> {
            self.writes.push((reg, value));
            Ok(())
        }

        fn read_register(&mut self, _reg: u8) -> anyhow::Result<u16> {
            self.reads
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("bus timeout")))
        }
    }

    #[test]
    fn reads_conversion_after_ready() {
        let mut bus = FakeBus::default();
        bus.reads.push_back(Ok(OS_READY_BIT));
        bus.reads.push_back(Ok(21000));
        let mut adc = Ads1115::with_bus(bus, 2, 12000);

        assert_eq!(adc.read_raw(), 21000);
        assert_eq!(adc.bus.writes, vec![(REG_CONFIG, 0xE383)]);
    }

    #[test]
    fn failed_read_repeats_last_good_value() {
        let mut bus = FakeBus::default();
        bus.reads.push_back(Ok(OS_READY_BIT));
        bus.reads.push_back(Ok(18000));
        let mut adc = Ads1115::with_bus(bus, 0, 12000);

        assert_eq!(adc.read_raw(), 18000);
        // Queue is now empty: every register read errors.
        assert_eq!(adc.read_raw(), 18000);
    }

    #[test]
    fn failure_before_any_sample_reads_wet() {
        let mut adc = Ads1115::with_bus(FakeBus::default(), 0, 12000);
        assert_eq!(adc.read_raw(), 12000);
    }
}
