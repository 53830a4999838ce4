//! Radio and link configuration
//!
//! [`Config`] gathers the RF parameters written by
//! [`Radio::initialize`](crate::radio::Radio::initialize) and the timing policy
//! of the blocking transmit/receive loops. It is validated once, before any
//! register is touched.

pub use crate::registers::{Bandwidth, CodingRate, SpreadingFactor};
use crate::registers::{Ocp, PaConfig, PaDac};
use crate::Error;

/// Crystal oscillator frequency of SX127x modules
pub const XOSC_HZ: u64 = 32_000_000;

/// Carrier frequency resolution in Hz (`F_xosc / 2^19`)
pub const FREQUENCY_STEP_HZ: f32 = XOSC_HZ as f32 / (1u64 << 19) as f32;

/// Lowest carrier frequency supported by the SX127x family
pub const MIN_FREQUENCY_HZ: u32 = 137_000_000;

/// Highest carrier frequency supported by the SX127x family
pub const MAX_FREQUENCY_HZ: u32 = 1_020_000_000;

/// SPI mode expected by the radio (CPOL = 0, CPHA = 0)
pub const SPI_MODE: embedded_hal::spi::Mode = embedded_hal::spi::MODE_0;

/// Highest SPI clock the radio accepts
pub const MAX_SPI_FREQUENCY_HZ: u32 = 10_000_000;

/// Lowest output power on the PA_BOOST pin
pub const MIN_TX_POWER_DBM: u8 = 2;

/// Highest output power on the PA_BOOST pin, with the high power DAC
pub const MAX_TX_POWER_DBM: u8 = 20;

/// Highest output power without the high power DAC
const MAX_STANDARD_TX_POWER_DBM: u8 = 17;

/// Encodes a carrier frequency into the 24-bit frequency register word.
///
/// `frf = F_rf * 2^19 / 32 MHz`, rounded down.
pub fn frf_from_hz(frequency_hz: u32) -> u32 {
    (((frequency_hz as u64) << 19) / XOSC_HZ) as u32
}

/// Decodes a frequency register word back into Hz, rounded down.
pub fn hz_from_frf(frf: u32) -> u32 {
    ((((frf as u64) & 0x00FF_FFFF) * XOSC_HZ) >> 19) as u32
}

/// What to do with packets that fail the payload CRC check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CrcErrorPolicy {
    /// Drop the packet and keep listening. The poll interval that follows the
    /// event is not charged to the receive timeout, so corrupt traffic extends
    /// how long the receiver listens.
    #[default]
    Discard,
    /// Drop the packet and keep listening, charging one poll interval.
    DiscardCounted,
    /// Stop listening and return [`Error::Crc`].
    Report,
}

/// Radio configuration
///
/// The defaults match a common 915 MHz setup: SF7, 125 kHz, CR 4/5, 8 symbol
/// preamble, CRC on, private sync word, 17 dBm on PA_BOOST.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Carrier frequency in Hz
    pub frequency_hz: u32,
    pub spreading_factor: SpreadingFactor,
    pub bandwidth: Bandwidth,
    pub coding_rate: CodingRate,
    /// Preamble length in symbols
    pub preamble_len: u16,
    /// Longest payload accepted, both for transmit and by the receiver
    pub max_payload_len: u8,
    pub sync_word: u8,
    /// Output power on the PA_BOOST pin in dBm, 2..=20
    pub tx_power_dbm: u8,
    /// Append and check a payload CRC
    pub crc: bool,
    /// Check the silicon version and confirm LoRa mode during initialization
    pub strict: bool,
    pub crc_error_policy: CrcErrorPolicy,
    /// Upper bound on waiting for TxDone
    pub tx_timeout_ms: u32,
    pub tx_poll_interval_ms: u32,
    pub rx_poll_interval_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frequency_hz: 915_000_000,
            spreading_factor: SpreadingFactor::Sf7,
            bandwidth: Bandwidth::Khz125,
            coding_rate: CodingRate::Cr4_5,
            preamble_len: 8,
            max_payload_len: 0xFF,
            sync_word: 0x12,
            tx_power_dbm: 17,
            crc: true,
            strict: true,
            crc_error_policy: CrcErrorPolicy::Discard,
            tx_timeout_ms: 2_000,
            tx_poll_interval_ms: 1,
            rx_poll_interval_ms: 10,
        }
    }
}

impl Config {
    /// Checks that every parameter is supported by the chip and by the link.
    ///
    /// # Errors
    /// * `Error::InvalidConfig` - A parameter is out of range. SF6 is rejected
    ///   because it requires implicit header mode.
    pub fn validate(&self) -> Result<(), Error> {
        let valid = (MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&self.frequency_hz)
            && self.spreading_factor != SpreadingFactor::Sf6
            && self.preamble_len >= 6
            && self.max_payload_len > 0
            && (MIN_TX_POWER_DBM..=MAX_TX_POWER_DBM).contains(&self.tx_power_dbm)
            && self.tx_timeout_ms > 0
            && self.tx_poll_interval_ms > 0
            && self.rx_poll_interval_ms > 0;

        if valid {
            Ok(())
        } else {
            log::warn!("rejecting radio configuration {:?}", self);
            Err(Error::InvalidConfig)
        }
    }

    /// Frequency register word for the configured carrier
    pub fn frf(&self) -> u32 {
        frf_from_hz(self.frequency_hz)
    }

    /// Power amplifier registers for the configured output power.
    ///
    /// Up to 17 dBm runs on the standard DAC with a 100 mA current limit.
    /// Above that the high power DAC adds 3 dB and the limit rises to 140 mA.
    pub fn power_amplifier(&self) -> (PaConfig, PaDac, Ocp) {
        let power = self.tx_power_dbm.clamp(MIN_TX_POWER_DBM, MAX_TX_POWER_DBM);
        let high_power = power > MAX_STANDARD_TX_POWER_DBM;
        let (output_power, ocp_ma) = match high_power {
            true => (power - 5, 140),
            false => (power - 2, 100),
        };

        (
            PaConfig {
                pa_boost: true,
                max_power: 0,
                output_power,
            },
            PaDac { high_power },
            Ocp::from_milliamps(ocp_ma),
        )
    }

    /// Whether LowDataRateOptimize is required, i.e. a symbol lasts longer than 16 ms
    pub fn low_data_rate_optimize(&self) -> bool {
        let chips = 1u64 << (self.spreading_factor as u8);
        chips * 1_000_000 / self.bandwidth.hz() as u64 > 16_000
    }
}
