//! System-related registers
//!
//! This module contains the registers that select the modem family and the
//! operating mode of the chip, along with the silicon revision.
//!
//! The operating mode register is the single piece of state that decides
//! whether the chip is asleep, idle, transmitting or listening. Only one mode
//! is active at a time.

use core::convert::Infallible;

use regiface::{register, FromByteArray, ReadableRegister, ToByteArray, WritableRegister};

/// Silicon revision reported by SX1276/77/78/79 parts.
pub const SX127X_VERSION: u8 = 0x12;

/// Transceiver operating mode
///
/// Encoded in bits [2:0] of [`OpMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Lowest power, FIFO not accessible. LoRa mode can only be toggled here.
    Sleep = 0,
    /// Oscillator and baseband running, FIFO accessible
    Standby = 1,
    /// Frequency synthesis for transmit
    FsTx = 2,
    /// Transmit the FIFO contents, falls back to standby on TxDone
    Transmit = 3,
    /// Frequency synthesis for receive
    FsRx = 4,
    /// Receive packets until the mode is changed
    ReceiveContinuous = 5,
    /// Receive a single packet, falls back to standby afterwards
    ReceiveSingle = 6,
    /// Channel activity detection
    Cad = 7,
}

impl Mode {
    /// Decode the three mode bits of the operating mode register.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Self::Sleep,
            1 => Self::Standby,
            2 => Self::FsTx,
            3 => Self::Transmit,
            4 => Self::FsRx,
            5 => Self::ReceiveContinuous,
            6 => Self::ReceiveSingle,
            _ => Self::Cad,
        }
    }
}

/// Operating mode register (address: 0x01)
///
/// Selects the modem family and the transceiver mode.
///
/// # Important Notes
/// - `long_range_mode` (LoRa) can only be changed while in [`Mode::Sleep`]
/// - Writes of the LoRa bit outside of sleep are silently ignored by the chip,
///   so it must be read back to confirm it stuck
/// - The low frequency bit selects the LF register bank; the driver keeps it clear
#[register(0x01u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpMode {
    /// Select LoRa (true) or FSK/OOK (false, power-on default)
    pub long_range_mode: bool,
    /// Access the LF test registers
    pub low_frequency_mode: bool,
    /// Transceiver mode
    pub mode: Mode,
}

impl OpMode {
    /// LoRa modem in the given transceiver mode
    pub const fn lora(mode: Mode) -> Self {
        Self {
            long_range_mode: true,
            low_frequency_mode: false,
            mode,
        }
    }

    /// FSK modem in sleep, which is where the LoRa bit has to be set from
    pub const fn fsk_sleep() -> Self {
        Self {
            long_range_mode: false,
            low_frequency_mode: false,
            mode: Mode::Sleep,
        }
    }

    /// Raw register byte
    pub fn bits(self) -> u8 {
        ((self.long_range_mode as u8) << 7)
            | ((self.low_frequency_mode as u8) << 3)
            | self.mode as u8
    }
}

/// Version register (address: 0x42)
///
/// Holds the silicon revision. SX1276/77/78/79 report [`SX127X_VERSION`].
/// A bus with nothing attached typically reads back `0x00` or `0xFF`.
#[register(0x42u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Version {
    /// Full revision number in bits [7:4], metal mask revision in bits [3:0]
    pub value: u8,
}

impl Version {
    /// Whether the value looks like a chip is driving MISO at all
    pub fn is_present(self) -> bool {
        self.value != 0x00 && self.value != 0xFF
    }
}

impl FromByteArray for OpMode {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            long_range_mode: bytes[0] & 0x80 != 0,
            low_frequency_mode: bytes[0] & 0x08 != 0,
            mode: Mode::from_bits(bytes[0]),
        })
    }
}

impl ToByteArray for OpMode {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([self.bits()])
    }
}

impl FromByteArray for Version {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self { value: bytes[0] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_mode_matches_reference_bytes() {
        assert_eq!(OpMode::fsk_sleep().bits(), 0x00);
        assert_eq!(OpMode::lora(Mode::Sleep).bits(), 0x80);
        assert_eq!(OpMode::lora(Mode::Standby).bits(), 0x81);
        assert_eq!(OpMode::lora(Mode::Transmit).bits(), 0x83);
        assert_eq!(OpMode::lora(Mode::ReceiveContinuous).bits(), 0x85);
    }

    #[test]
    fn op_mode_decodes_flags() {
        let decoded = OpMode::from_bytes([0x8D]).unwrap();
        assert!(decoded.long_range_mode);
        assert!(decoded.low_frequency_mode);
        assert_eq!(decoded.mode, Mode::ReceiveContinuous);
    }

    #[test]
    fn floating_bus_is_not_a_device() {
        assert!(!Version { value: 0x00 }.is_present());
        assert!(!Version { value: 0xFF }.is_present());
        assert!(Version { value: SX127X_VERSION }.is_present());
    }
}
