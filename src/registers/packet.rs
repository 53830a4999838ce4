//! Packet handling related registers
//!
//! This module contains the registers that manage the shared 256 byte FIFO:
//! - FIFO data port and SPI address pointer
//! - TX and RX base addresses
//! - Payload length for transmission and the received byte count
//!
//! The FIFO is only accessible in standby, TX and RX modes. Every access to
//! the data port reads or writes at [`FifoAddrPtr`] and advances it by one,
//! so the pointer has to be set immediately before each burst.

use core::convert::Infallible;

use regiface::{register, FromByteArray, ReadableRegister, ToByteArray, WritableRegister};

/// FIFO data port address
///
/// Not a regular register: a burst read or write at this address streams
/// bytes out of or into the FIFO starting at [`FifoAddrPtr`].
pub const FIFO: u8 = 0x00;

/// Largest payload a single packet can carry (one length byte)
pub const MAX_PAYLOAD_LEN: usize = 255;

/// FIFO SPI pointer register (address: 0x0D)
///
/// Address in the FIFO data buffer where the next SPI read or write happens.
#[register(0x0Du8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister, Default)]
pub struct FifoAddrPtr {
    pub address: u8,
}

/// FIFO TX base address register (address: 0x0E)
///
/// Start of the transmit bank. Power-on default is `0x80`, the driver places
/// both banks at `0x00` so a packet can use the whole FIFO.
#[register(0x0Eu8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister, Default)]
pub struct FifoTxBaseAddr {
    pub address: u8,
}

/// FIFO RX base address register (address: 0x0F)
///
/// Start of the receive bank. Received packets are written from here on.
#[register(0x0Fu8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister, Default)]
pub struct FifoRxBaseAddr {
    pub address: u8,
}

/// FIFO RX current address register (address: 0x10)
///
/// Start address of the last packet received. Read-only.
#[register(0x10u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister)]
pub struct FifoRxCurrentAddr {
    pub address: u8,
}

/// Received byte count register (address: 0x13)
///
/// Payload length of the last packet received. Read-only.
#[register(0x13u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister)]
pub struct RxNbBytes {
    pub count: u8,
}

/// Payload length register (address: 0x22)
///
/// Number of FIFO bytes to send in explicit header mode. A value of 0 is not
/// permitted by the chip.
#[register(0x22u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct PayloadLength {
    pub length: u8,
}

/// Maximum payload length register (address: 0x23)
///
/// Packets whose header announces a longer payload are dropped by the chip.
#[register(0x23u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister, WritableRegister)]
pub struct MaxPayloadLength {
    pub length: u8,
}

impl Default for MaxPayloadLength {
    fn default() -> Self {
        Self { length: 0xFF }
    }
}

macro_rules! single_byte_register {
    ($name:ident, $field:ident) => {
        impl FromByteArray for $name {
            type Error = Infallible;
            type Array = [u8; 1];

            fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
                Ok(Self { $field: bytes[0] })
            }
        }
    };
    ($name:ident, $field:ident, writable) => {
        single_byte_register!($name, $field);

        impl ToByteArray for $name {
            type Error = Infallible;
            type Array = [u8; 1];

            fn to_bytes(self) -> Result<Self::Array, Self::Error> {
                Ok([self.$field])
            }
        }
    };
}

single_byte_register!(FifoAddrPtr, address, writable);
single_byte_register!(FifoTxBaseAddr, address, writable);
single_byte_register!(FifoRxBaseAddr, address, writable);
single_byte_register!(FifoRxCurrentAddr, address);
single_byte_register!(RxNbBytes, count);
single_byte_register!(PayloadLength, length, writable);
single_byte_register!(MaxPayloadLength, length, writable);
