//! SX127x Register Transport
//!
//! This module provides the register-level interface to an SX127x radio over SPI.
//! It supports both synchronous and asynchronous operations.
//!
//! Every access is one SPI transaction: the [`SpiDevice`](embedded_hal::spi::SpiDevice)
//! asserts chip-select, the address byte is sent (bit 7 set for writes, clear
//! for reads), data bytes follow, and chip-select is released again. The chip
//! auto-increments the address during a burst, except on the FIFO data port
//! where the FIFO pointer advances instead.
//!
//! The transport has no internal locking. It is owned by exactly one
//! [`Radio`](crate::radio::Radio) and must only be driven from one flow at a time.
//!
//! # Example
//! ```ignore
//! use sx127x::{Device, registers::{FifoAddrPtr, Version}};
//!
//! // Create device with SPI interface and reset pin
//! let spi = // ... SPI implementation
//! let reset = // ... reset pin
//! let mut device = Device::new(spi, reset);
//!
//! // Read a register
//! let version: Version = device.read_register()?;
//!
//! // Write to the FIFO at address 0
//! device.write_register(FifoAddrPtr { address: 0 })?;
//! device.write_fifo(&[0x01, 0x02, 0x03])?;
//! ```

use core::convert::Infallible;

use regiface::{ByteArray, ReadableRegister, ToByteArray, WritableRegister};

use crate::registers::FIFO;
use crate::Error;

/// Write bit set in the address byte of write transactions
const WRITE: u8 = 0x80;

/// Reset pulse and settling time in milliseconds
const RESET_DELAY_MS: u32 = 10;

fn read_address(address: u8) -> Result<u8, Error> {
    if address > 0x7F {
        return Err(Error::InvalidAddress(address));
    }
    Ok(address)
}

fn write_address(address: u8) -> Result<u8, Error> {
    read_address(address).map(|address| address | WRITE)
}

fn encode<R>(register: R) -> R::Array
where
    R: ToByteArray<Error = Infallible>,
{
    match register.to_bytes() {
        Ok(raw) => raw,
        Err(never) => match never {},
    }
}

/// Longest register burst the driver encodes ahead of time
const MAX_REGISTER_LEN: usize = 4;

/// A register write encoded ahead of time.
///
/// Lets registers of different types share one table, e.g. the configuration
/// sequence written by both radio backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterWrite {
    address: u8,
    len: usize,
    bytes: [u8; MAX_REGISTER_LEN],
}

impl RegisterWrite {
    pub fn new<R>(register: R) -> Self
    where
        R: WritableRegister<IdType = u8, Error = Infallible>,
    {
        let raw_value = encode(register);
        let raw = raw_value.as_ref();
        let len = raw.len().min(MAX_REGISTER_LEN);
        let mut bytes = [0u8; MAX_REGISTER_LEN];
        bytes[..len].copy_from_slice(&raw[..len]);

        Self {
            address: R::id(),
            len,
            bytes,
        }
    }

    /// Address of the first register in the burst
    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Register transport for the SX127x radio.
///
/// This struct wraps an SPI device and the radio's reset line. It supports
/// both synchronous operations through the embedded-hal traits and
/// asynchronous operations through embedded-hal-async.
pub struct Device<SPI, RESET> {
    spi: SPI,
    reset: RESET,
}

impl<SPI, RESET> Device<SPI, RESET> {
    /// Creates a new Device instance wrapping the provided SPI device and reset pin.
    ///
    /// # Arguments
    /// * `spi` - An SPI device (mode 0) that owns the radio's chip-select line
    /// * `reset` - Output pin wired to the radio's NRESET
    pub fn new(spi: SPI, reset: RESET) -> Self {
        Self { spi, reset }
    }

    /// Releases the underlying SPI device and reset pin.
    pub fn release(self) -> (SPI, RESET) {
        (self.spi, self.reset)
    }
}

impl<SPI, RESET> Device<SPI, RESET>
where
    SPI: embedded_hal::spi::SpiDevice,
    RESET: embedded_hal::digital::OutputPin,
{
    /// Pulses the reset line low, then high, waiting 10 ms after each edge.
    ///
    /// Leaves the chip in its power-on default state (FSK modem, standby).
    ///
    /// # Errors
    /// * `Error::Pin` - The reset pin could not be driven
    pub fn reset(&mut self, delay: &mut impl embedded_hal::delay::DelayNs) -> Result<(), Error> {
        self.reset.set_low().map_err(|_| Error::Pin)?;
        delay.delay_ms(RESET_DELAY_MS);
        self.reset.set_high().map_err(|_| Error::Pin)?;
        delay.delay_ms(RESET_DELAY_MS);
        Ok(())
    }

    /// Reads one byte from a register address.
    ///
    /// # Errors
    /// * `Error::InvalidAddress` - The address is above 0x7F
    /// * `Error::Bus` - SPI communication failed
    pub fn read_raw(&mut self, address: u8) -> Result<u8, Error> {
        let header = [read_address(address)?];
        let mut value = [0u8];

        self.spi
            .transaction(&mut [
                embedded_hal::spi::Operation::Write(&header),
                embedded_hal::spi::Operation::Read(&mut value),
            ])
            .map_err(|_| Error::Bus)?;

        Ok(value[0])
    }

    /// Writes one byte to a register address.
    ///
    /// # Errors
    /// * `Error::InvalidAddress` - The address is above 0x7F
    /// * `Error::Bus` - SPI communication failed
    pub fn write_raw(&mut self, address: u8, value: u8) -> Result<(), Error> {
        let frame = [write_address(address)?, value];

        self.spi
            .transaction(&mut [embedded_hal::spi::Operation::Write(&frame)])
            .map_err(|_| Error::Bus)
    }

    /// Reads a register value from the device.
    ///
    /// # Type Parameters
    /// * `R` - Register type implementing ReadableRegister with u8 ID
    ///
    /// # Errors
    /// * `Error::Bus` - SPI communication failed
    /// * `Error::Deserialization` - Failed to parse register value
    pub fn read_register<R>(&mut self) -> Result<R, Error>
    where
        R: ReadableRegister<IdType = u8>,
    {
        let header = [read_address(R::id())?];
        let mut raw_value = R::Array::new();

        self.spi
            .transaction(&mut [
                embedded_hal::spi::Operation::Write(&header),
                embedded_hal::spi::Operation::Read(raw_value.as_mut()),
            ])
            .map_err(|_| Error::Bus)?;

        R::from_bytes(raw_value).map_err(|_| Error::Deserialization)
    }

    /// Writes a value to a device register.
    ///
    /// Multi-byte registers are written as a single burst, first byte at the
    /// register's address.
    ///
    /// # Errors
    /// * `Error::Bus` - SPI communication failed
    pub fn write_register<R>(&mut self, register: R) -> Result<(), Error>
    where
        R: WritableRegister<IdType = u8, Error = Infallible>,
    {
        let header = [write_address(R::id())?];
        let raw_value = encode(register);

        self.spi
            .transaction(&mut [
                embedded_hal::spi::Operation::Write(&header),
                embedded_hal::spi::Operation::Write(raw_value.as_ref()),
            ])
            .map_err(|_| Error::Bus)
    }

    /// Performs a pre-encoded register write as one burst.
    ///
    /// # Errors
    /// * `Error::Bus` - SPI communication failed
    pub fn write(&mut self, write: &RegisterWrite) -> Result<(), Error> {
        let header = [write_address(write.address())?];

        self.spi
            .transaction(&mut [
                embedded_hal::spi::Operation::Write(&header),
                embedded_hal::spi::Operation::Write(write.bytes()),
            ])
            .map_err(|_| Error::Bus)
    }

    /// Writes bytes to the FIFO starting at the current FIFO pointer.
    ///
    /// The caller must set [`FifoAddrPtr`](crate::registers::FifoAddrPtr) first.
    ///
    /// # Errors
    /// * `Error::Bus` - SPI communication failed
    pub fn write_fifo(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let header = [FIFO | WRITE];

        self.spi
            .transaction(&mut [
                embedded_hal::spi::Operation::Write(&header),
                embedded_hal::spi::Operation::Write(bytes),
            ])
            .map_err(|_| Error::Bus)
    }

    /// Reads `bytes.len()` bytes from the FIFO starting at the current FIFO pointer.
    ///
    /// # Errors
    /// * `Error::Bus` - SPI communication failed
    pub fn read_fifo(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        let header = [FIFO];

        self.spi
            .transaction(&mut [
                embedded_hal::spi::Operation::Write(&header),
                embedded_hal::spi::Operation::Read(bytes),
            ])
            .map_err(|_| Error::Bus)
    }
}

impl<SPI, RESET> Device<SPI, RESET>
where
    SPI: embedded_hal_async::spi::SpiDevice,
    RESET: embedded_hal::digital::OutputPin,
{
    /// Asynchronously pulses the reset line.
    ///
    /// This is the async version of [`reset`](Device::reset).
    pub async fn reset_async(
        &mut self,
        delay: &mut impl embedded_hal_async::delay::DelayNs,
    ) -> Result<(), Error> {
        self.reset.set_low().map_err(|_| Error::Pin)?;
        delay.delay_ms(RESET_DELAY_MS).await;
        self.reset.set_high().map_err(|_| Error::Pin)?;
        delay.delay_ms(RESET_DELAY_MS).await;
        Ok(())
    }

    /// Asynchronously reads one byte from a register address.
    ///
    /// This is the async version of [`read_raw`](Device::read_raw).
    pub async fn read_raw_async(&mut self, address: u8) -> Result<u8, Error> {
        let header = [read_address(address)?];
        let mut value = [0u8];

        self.spi
            .transaction(&mut [
                embedded_hal_async::spi::Operation::Write(&header),
                embedded_hal_async::spi::Operation::Read(&mut value),
            ])
            .await
            .map_err(|_| Error::Bus)?;

        Ok(value[0])
    }

    /// Asynchronously writes one byte to a register address.
    ///
    /// This is the async version of [`write_raw`](Device::write_raw).
    pub async fn write_raw_async(&mut self, address: u8, value: u8) -> Result<(), Error> {
        let frame = [write_address(address)?, value];

        self.spi
            .transaction(&mut [embedded_hal_async::spi::Operation::Write(&frame)])
            .await
            .map_err(|_| Error::Bus)
    }

    /// Asynchronously reads a register value from the device.
    ///
    /// This is the async version of [`read_register`](Device::read_register).
    pub async fn read_register_async<R>(&mut self) -> Result<R, Error>
    where
        R: ReadableRegister<IdType = u8>,
    {
        let header = [read_address(R::id())?];
        let mut raw_value = R::Array::new();

        self.spi
            .transaction(&mut [
                embedded_hal_async::spi::Operation::Write(&header),
                embedded_hal_async::spi::Operation::Read(raw_value.as_mut()),
            ])
            .await
            .map_err(|_| Error::Bus)?;

        R::from_bytes(raw_value).map_err(|_| Error::Deserialization)
    }

    /// Asynchronously writes a value to a device register.
    ///
    /// This is the async version of [`write_register`](Device::write_register).
    pub async fn write_register_async<R>(&mut self, register: R) -> Result<(), Error>
    where
        R: WritableRegister<IdType = u8, Error = Infallible>,
    {
        let header = [write_address(R::id())?];
        let raw_value = encode(register);

        self.spi
            .transaction(&mut [
                embedded_hal_async::spi::Operation::Write(&header),
                embedded_hal_async::spi::Operation::Write(raw_value.as_ref()),
            ])
            .await
            .map_err(|_| Error::Bus)
    }

    /// Asynchronously performs a pre-encoded register write.
    ///
    /// This is the async version of [`write`](Device::write).
    pub async fn write_async(&mut self, write: &RegisterWrite) -> Result<(), Error> {
        let header = [write_address(write.address())?];

        self.spi
            .transaction(&mut [
                embedded_hal_async::spi::Operation::Write(&header),
                embedded_hal_async::spi::Operation::Write(write.bytes()),
            ])
            .await
            .map_err(|_| Error::Bus)
    }

    /// Asynchronously writes bytes to the FIFO.
    ///
    /// This is the async version of [`write_fifo`](Device::write_fifo).
    pub async fn write_fifo_async(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let header = [FIFO | WRITE];

        self.spi
            .transaction(&mut [
                embedded_hal_async::spi::Operation::Write(&header),
                embedded_hal_async::spi::Operation::Write(bytes),
            ])
            .await
            .map_err(|_| Error::Bus)
    }

    /// Asynchronously reads bytes from the FIFO.
    ///
    /// This is the async version of [`read_fifo`](Device::read_fifo).
    pub async fn read_fifo_async(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        let header = [FIFO];

        self.spi
            .transaction(&mut [
                embedded_hal_async::spi::Operation::Write(&header),
                embedded_hal_async::spi::Operation::Read(bytes),
            ])
            .await
            .map_err(|_| Error::Bus)
    }
}
