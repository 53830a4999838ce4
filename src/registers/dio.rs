//! Interrupt and digital IO related registers
//!
//! The SX127x raises eight LoRa interrupt sources in the IRQ flags register.
//! Any of them can be observed by polling that register over SPI, and a
//! subset can be routed to the DIO pins through the mapping registers.
//!
//! Flags are cleared by writing a 1 to their bit position.

use bitflags::bitflags;
use core::convert::Infallible;

use regiface::{register, FromByteArray, ReadableRegister, ToByteArray, WritableRegister};

bitflags! {
    /// LoRa interrupt sources
    ///
    /// Bit layout of [`IrqFlags`] and the IRQ flags mask register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Irq: u8 {
        /// Timeout in RX single mode
        const RX_TIMEOUT = 1 << 7;
        /// Packet reception complete
        const RX_DONE = 1 << 6;
        /// Payload CRC error, raised together with RX_DONE
        const PAYLOAD_CRC_ERROR = 1 << 5;
        /// Valid header received in RX
        const VALID_HEADER = 1 << 4;
        /// FIFO payload transmission complete
        const TX_DONE = 1 << 3;
        /// Channel activity detection finished
        const CAD_DONE = 1 << 2;
        /// FHSS change channel
        const FHSS_CHANGE_CHANNEL = 1 << 1;
        /// Valid LoRa signal detected during CAD
        const CAD_DETECTED = 1;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Irq {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Irq {{ 0b{0=0..8:08b} }}", self.bits())
    }
}

/// IRQ flags register (address: 0x12)
///
/// # Important Notes
/// - Flags stay set until cleared by writing a 1 to them
/// - Writing `0xFF` clears every pending flag
/// - RX_DONE is also raised for packets that failed the CRC check
#[register(0x12u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqFlags {
    /// Pending interrupt sources, or the sources to clear on write
    pub irq: Irq,
}

impl IrqFlags {
    /// Write value that clears every flag
    pub const fn clear_all() -> Self {
        Self { irq: Irq::all() }
    }
}

/// Event signalled on the DIO0 pin in LoRa mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dio0Mapping {
    /// DIO0 follows RX_DONE
    RxDone = 0b00,
    /// DIO0 follows TX_DONE
    TxDone = 0b01,
    /// DIO0 follows CAD_DONE
    CadDone = 0b10,
}

impl Dio0Mapping {
    /// IRQ flag reflected on the pin
    pub fn irq(self) -> Irq {
        match self {
            Self::RxDone => Irq::RX_DONE,
            Self::TxDone => Irq::TX_DONE,
            Self::CadDone => Irq::CAD_DONE,
        }
    }
}

/// DIO mapping 1 register (address: 0x40)
///
/// Routes interrupt sources to DIO0..DIO3. Only DIO0 is wired by the driver,
/// DIO1..DIO3 are left on their power-on mapping.
///
/// # Important Notes
/// - RX_DONE on DIO0 is `0x00`, TX_DONE on DIO0 is `0x40`
/// - The pin follows the flag, so it drops once the flag is cleared
#[register(0x40u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct DioMapping1 {
    /// DIO0 source
    pub dio0: Dio0Mapping,
}

impl FromByteArray for IrqFlags {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            irq: Irq::from_bits_retain(bytes[0]),
        })
    }
}

impl ToByteArray for IrqFlags {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([self.irq.bits()])
    }
}

impl FromByteArray for DioMapping1 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        let dio0 = match bytes[0] >> 6 {
            0b00 => Dio0Mapping::RxDone,
            0b01 => Dio0Mapping::TxDone,
            // 0b11 is unused in LoRa mode and behaves like CadDone
            _ => Dio0Mapping::CadDone,
        };
        Ok(Self { dio0 })
    }
}

impl ToByteArray for DioMapping1 {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([(self.dio0 as u8) << 6])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_all_writes_ff() {
        assert_eq!(IrqFlags::clear_all().to_bytes().unwrap(), [0xFF]);
    }

    #[test]
    fn dio0_mapping_bytes() {
        let tx = DioMapping1 {
            dio0: Dio0Mapping::TxDone,
        };
        let rx = DioMapping1 {
            dio0: Dio0Mapping::RxDone,
        };
        assert_eq!(tx.to_bytes().unwrap(), [0x40]);
        assert_eq!(rx.to_bytes().unwrap(), [0x00]);
        assert_eq!(DioMapping1::from_bytes([0x40]).unwrap(), tx);
    }

    #[test]
    fn crc_error_rides_along_with_rx_done() {
        let flags = IrqFlags::from_bytes([0x60]).unwrap();
        assert!(flags.irq.contains(Irq::RX_DONE | Irq::PAYLOAD_CRC_ERROR));
        assert!(!flags.irq.contains(Irq::TX_DONE));
    }
}
