//! RF-related registers
//!
//! This module contains registers related to RF configuration and operation including:
//! - Carrier frequency
//! - LoRa modem configuration (bandwidth, coding rate, spreading factor, CRC)
//! - Preamble length and sync word
//! - Power amplifier, high power DAC and over-current protection
//! - Packet and live signal strength/quality
//!
//! All of these must be written while the chip is in sleep or standby.

use core::convert::Infallible;

use regiface::{register, FromByteArray, ReadableRegister, ToByteArray, WritableRegister};

/// Error type for modem configuration fields that hold a reserved code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidFieldValue(pub u8);

/// Carrier frequency registers (address: 0x06..0x08)
///
/// 24-bit RF carrier frequency word, written MSB first as one burst:
///
/// `F_rf = F_xosc * frf / 2^19` with a 32 MHz crystal, i.e. one step is ~61 Hz.
///
/// # Important Notes
/// - The new frequency only takes effect once the LSB has been written
/// - Must be changed in sleep or standby mode
#[register(0x06u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frequency {
    /// Frequency word, only the lower 24 bits are used
    pub frf: u32,
}

impl Frequency {
    /// The three register bytes in MSB, MID, LSB order
    pub fn bytes(self) -> [u8; 3] {
        let [_, msb, mid, lsb] = self.frf.to_be_bytes();
        [msb, mid, lsb]
    }
}

/// LoRa spreading factor
///
/// Number of chips per symbol is `2^SF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpreadingFactor {
    Sf6 = 6,
    Sf7 = 7,
    Sf8 = 8,
    Sf9 = 9,
    Sf10 = 10,
    Sf11 = 11,
    Sf12 = 12,
}

impl SpreadingFactor {
    /// Convert a raw register code into a spreading factor
    pub fn from_code(code: u8) -> Result<Self, InvalidFieldValue> {
        match code {
            6 => Ok(Self::Sf6),
            7 => Ok(Self::Sf7),
            8 => Ok(Self::Sf8),
            9 => Ok(Self::Sf9),
            10 => Ok(Self::Sf10),
            11 => Ok(Self::Sf11),
            12 => Ok(Self::Sf12),
            invalid => Err(InvalidFieldValue(invalid)),
        }
    }
}

/// LoRa signal bandwidth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bandwidth {
    Khz7_8 = 0,
    Khz10_4 = 1,
    Khz15_6 = 2,
    Khz20_8 = 3,
    Khz31_25 = 4,
    Khz41_7 = 5,
    Khz62_5 = 6,
    Khz125 = 7,
    Khz250 = 8,
    Khz500 = 9,
}

impl Bandwidth {
    /// Convert a raw register code into a bandwidth
    pub fn from_code(code: u8) -> Result<Self, InvalidFieldValue> {
        match code {
            0 => Ok(Self::Khz7_8),
            1 => Ok(Self::Khz10_4),
            2 => Ok(Self::Khz15_6),
            3 => Ok(Self::Khz20_8),
            4 => Ok(Self::Khz31_25),
            5 => Ok(Self::Khz41_7),
            6 => Ok(Self::Khz62_5),
            7 => Ok(Self::Khz125),
            8 => Ok(Self::Khz250),
            9 => Ok(Self::Khz500),
            invalid => Err(InvalidFieldValue(invalid)),
        }
    }

    /// Bandwidth in Hz
    pub fn hz(self) -> u32 {
        match self {
            Self::Khz7_8 => 7_800,
            Self::Khz10_4 => 10_400,
            Self::Khz15_6 => 15_600,
            Self::Khz20_8 => 20_800,
            Self::Khz31_25 => 31_250,
            Self::Khz41_7 => 41_700,
            Self::Khz62_5 => 62_500,
            Self::Khz125 => 125_000,
            Self::Khz250 => 250_000,
            Self::Khz500 => 500_000,
        }
    }
}

/// LoRa forward error correction coding rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodingRate {
    Cr4_5 = 1,
    Cr4_6 = 2,
    Cr4_7 = 3,
    Cr4_8 = 4,
}

impl CodingRate {
    /// Convert a raw register code into a coding rate
    pub fn from_code(code: u8) -> Result<Self, InvalidFieldValue> {
        match code {
            1 => Ok(Self::Cr4_5),
            2 => Ok(Self::Cr4_6),
            3 => Ok(Self::Cr4_7),
            4 => Ok(Self::Cr4_8),
            invalid => Err(InvalidFieldValue(invalid)),
        }
    }
}

/// Modem configuration 1 register (address: 0x1D)
///
/// Bandwidth in bits [7:4], coding rate in bits [3:1], header mode in bit 0.
///
/// BW=125kHz, CR=4/5 with an explicit header encodes to `0x72`.
#[register(0x1Du8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct ModemConfig1 {
    /// Signal bandwidth
    pub bandwidth: Bandwidth,
    /// Error coding rate
    pub coding_rate: CodingRate,
    /// Implicit header mode. The link always uses explicit headers.
    pub implicit_header: bool,
}

/// Modem configuration 2 register (address: 0x1E)
///
/// Spreading factor in bits [7:4], continuous TX in bit 3, payload CRC in
/// bit 2 and the two MSBs of the RX symbol timeout in bits [1:0].
///
/// SF7 with CRC enabled encodes to `0x74`.
#[register(0x1Eu8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct ModemConfig2 {
    /// Spreading factor
    pub spreading_factor: SpreadingFactor,
    /// Send the FIFO contents continuously (test mode)
    pub tx_continuous: bool,
    /// Generate and check a payload CRC
    pub crc_on: bool,
    /// RX symbol timeout bits [9:8]
    pub symbol_timeout_msb: u8,
}

/// Modem configuration 3 register (address: 0x26)
///
/// # Important Notes
/// - LowDataRateOptimize is mandatory when the symbol time exceeds 16 ms
/// - AGC auto enables the automatic LNA gain loop
#[register(0x26u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct ModemConfig3 {
    /// Low data rate optimization
    pub low_data_rate_optimize: bool,
    /// LNA gain set by the internal AGC loop
    pub agc_auto_on: bool,
}

/// Preamble length registers (address: 0x20..0x21)
///
/// Preamble length in symbols, big endian, written as one burst.
/// The chip adds 4.25 symbols to this value on air.
#[register(0x20u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct PreambleLength {
    /// Number of programmed preamble symbols
    pub symbols: u16,
}

/// LoRa sync word register (address: 0x39)
///
/// `0x12` for private networks, `0x34` is reserved for LoRaWAN networks.
#[register(0x39u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct SyncWord {
    pub value: u8,
}

impl Default for SyncWord {
    fn default() -> Self {
        Self { value: 0x12 }
    }
}

/// Power amplifier configuration register (address: 0x09)
///
/// | Bits | Field |
/// |------|-------|
/// | 7 | PA select: PA_BOOST pin (1) or RFO pin (0) |
/// | 6:4 | Max power, `Pmax = 10.8 + 0.6 * max_power` dBm |
/// | 3:0 | Output power |
///
/// On PA_BOOST `Pout = 17 - (15 - output_power)` dBm, or `+3` dB on top of that
/// with the high power DAC enabled.
#[register(0x09u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PaConfig {
    /// Route the output to the PA_BOOST pin
    pub pa_boost: bool,
    /// Only relevant on the RFO pin
    pub max_power: u8,
    pub output_power: u8,
}

/// High power PA DAC register (address: 0x4D)
///
/// `0x87` enables +20 dBm on PA_BOOST, `0x84` is the power-on default.
///
/// # Important Notes
/// - Only allowed with a duty cycle of at most 1%
/// - Needs the over-current trip raised, see [`Ocp`]
#[register(0x4Du8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PaDac {
    pub high_power: bool,
}

const PA_DAC_DEFAULT: u8 = 0x84;
const PA_DAC_HIGH_POWER: u8 = 0x87;

/// Over-current protection register (address: 0x0B)
///
/// Enable in bit 5, trim in bits [4:0]. The power-on default is 100 mA (`0x2B`).
#[register(0x0Bu8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ocp {
    pub enabled: bool,
    /// Trip current code
    pub trim: u8,
}

impl Ocp {
    /// Enabled protection tripping at roughly `milliamps`
    ///
    /// The chip supports 45..=240 mA, anything higher saturates.
    pub fn from_milliamps(milliamps: u8) -> Self {
        let trim = match milliamps {
            0..=45 => 0,
            46..=120 => (milliamps - 45) / 5,
            121..=240 => ((milliamps as u16 + 30) / 10) as u8,
            _ => 27,
        };

        Self {
            enabled: true,
            trim,
        }
    }
}

/// Offset between raw RSSI register values and dBm.
///
/// This is the low frequency port offset, applied on both bands.
pub const RSSI_OFFSET_DBM: i16 = 157;

/// Packet SNR register (address: 0x19)
///
/// Estimated SNR of the last received packet, two's complement in 0.25 dB steps.
/// Only valid after RxDone and before the next mode change.
#[register(0x19u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister)]
pub struct PacketSnr {
    pub raw: i8,
}

impl PacketSnr {
    /// SNR in dB
    pub fn db(self) -> f32 {
        self.raw as f32 / 4.0
    }
}

/// Packet RSSI register (address: 0x1A)
///
/// RSSI of the last received packet. Only valid after RxDone and before the
/// next mode change.
#[register(0x1Au8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister)]
pub struct PacketRssi {
    pub raw: u8,
}

impl PacketRssi {
    /// RSSI in dBm
    pub fn dbm(self) -> i16 {
        self.raw as i16 - RSSI_OFFSET_DBM
    }
}

/// Current RSSI register (address: 0x1B)
///
/// Live RSSI of the channel, updated continuously while in receive mode.
#[register(0x1Bu8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister)]
pub struct Rssi {
    pub raw: u8,
}

impl Rssi {
    /// RSSI in dBm
    pub fn dbm(self) -> i16 {
        self.raw as i16 - RSSI_OFFSET_DBM
    }
}

impl FromByteArray for Frequency {
    type Error = Infallible;
    type Array = [u8; 3];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            frf: u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]),
        })
    }
}

impl ToByteArray for Frequency {
    type Error = Infallible;
    type Array = [u8; 3];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok(self.bytes())
    }
}

impl FromByteArray for ModemConfig1 {
    type Error = InvalidFieldValue;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            bandwidth: Bandwidth::from_code(bytes[0] >> 4)?,
            coding_rate: CodingRate::from_code((bytes[0] >> 1) & 0x07)?,
            implicit_header: bytes[0] & 0x01 != 0,
        })
    }
}

impl ToByteArray for ModemConfig1 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([((self.bandwidth as u8) << 4)
            | ((self.coding_rate as u8) << 1)
            | self.implicit_header as u8])
    }
}

impl FromByteArray for ModemConfig2 {
    type Error = InvalidFieldValue;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            spreading_factor: SpreadingFactor::from_code(bytes[0] >> 4)?,
            tx_continuous: bytes[0] & 0x08 != 0,
            crc_on: bytes[0] & 0x04 != 0,
            symbol_timeout_msb: bytes[0] & 0x03,
        })
    }
}

impl ToByteArray for ModemConfig2 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([((self.spreading_factor as u8) << 4)
            | ((self.tx_continuous as u8) << 3)
            | ((self.crc_on as u8) << 2)
            | (self.symbol_timeout_msb & 0x03)])
    }
}

impl FromByteArray for ModemConfig3 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            low_data_rate_optimize: bytes[0] & 0x08 != 0,
            agc_auto_on: bytes[0] & 0x04 != 0,
        })
    }
}

impl ToByteArray for ModemConfig3 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([((self.low_data_rate_optimize as u8) << 3) | ((self.agc_auto_on as u8) << 2)])
    }
}

impl FromByteArray for PreambleLength {
    type Error = Infallible;
    type Array = [u8; 2];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            symbols: u16::from_be_bytes(bytes),
        })
    }
}

impl ToByteArray for PreambleLength {
    type Error = Infallible;
    type Array = [u8; 2];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok(self.symbols.to_be_bytes())
    }
}

impl FromByteArray for SyncWord {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self { value: bytes[0] })
    }
}

impl ToByteArray for SyncWord {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([self.value])
    }
}

impl FromByteArray for PaConfig {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            pa_boost: bytes[0] & 0x80 != 0,
            max_power: (bytes[0] >> 4) & 0x07,
            output_power: bytes[0] & 0x0F,
        })
    }
}

impl ToByteArray for PaConfig {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([((self.pa_boost as u8) << 7)
            | ((self.max_power & 0x07) << 4)
            | (self.output_power & 0x0F)])
    }
}

impl FromByteArray for PaDac {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            high_power: bytes[0] & 0x07 == 0x07,
        })
    }
}

impl ToByteArray for PaDac {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        match self.high_power {
            true => Ok([PA_DAC_HIGH_POWER]),
            false => Ok([PA_DAC_DEFAULT]),
        }
    }
}

impl FromByteArray for Ocp {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            enabled: bytes[0] & 0x20 != 0,
            trim: bytes[0] & 0x1F,
        })
    }
}

impl ToByteArray for Ocp {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([((self.enabled as u8) << 5) | (self.trim & 0x1F)])
    }
}

impl FromByteArray for PacketSnr {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            raw: bytes[0] as i8,
        })
    }
}

impl FromByteArray for PacketRssi {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self { raw: bytes[0] })
    }
}

impl FromByteArray for Rssi {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self { raw: bytes[0] })
    }
}
