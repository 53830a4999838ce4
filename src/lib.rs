#![cfg_attr(not(test), no_std)]
//! SX127x Radio Driver
//!
//! This crate provides a type-safe interface for the Semtech SX1276/77/78/79 sub-GHz
//! radio transceivers in LoRa mode, and a minimal half-duplex packet link on top of it.
//!
//! # Features
//! - Frequency range: 137-1020 MHz
//! - LoRa modulation: SF7-12, BW 7.8-500kHz, CR 4/5-4/8
//! - Explicit header packets of up to 255 bytes with optional payload CRC
//! - Per-packet RSSI and SNR
//! - Output power of 2-20 dBm on the PA_BOOST pin
//! - Blocking (polling) and async (DIO0 interrupt) backends
//!
//! # Architecture
//! The driver is organized into several modules:
//!
//! - [`device`]: Register transport over SPI
//!   - One SPI transaction per register access or FIFO burst
//!   - Owns the reset line
//!
//! - [`registers`]: Register definitions for direct hardware access
//!   - RF configuration (frequency, modem configuration, sync word)
//!   - Packet handling (FIFO pointers, payload length)
//!   - Interrupt flags and DIO mapping
//!   - Operating mode and version
//!
//! - [`config`]: RF parameters and link timing policy
//!
//! - [`radio`]: Operating modes, initialization, transmit and receive
//!
//! # Usage
//! The transport uses the `regiface` crate so that every register is a typed
//! value with its own address and encoding. [`Radio`] takes ownership of a
//! [`Device`], the DIO0 input and a delay, and is the only thing that should
//! drive the chip from then on.
//!
//! Operation follows a fixed sequence:
//!
//! 1. Create a [`Device`] from an SPI device (mode 0, at most 10 MHz) and the reset pin
//! 2. Create a [`Radio`] with a validated [`Config`]
//! 3. [`Radio::init`] resets the chip, selects LoRa and writes the configuration
//! 4. Call [`Radio::transmit`] and [`Radio::receive`] as needed
//! 5. [`Radio::sleep`] before releasing the hardware
//!
//! # Important Notes
//! - The LoRa mode bit can only be changed while the chip sleeps
//! - Every transmit and receive passes through standby and ends in standby
//! - RSSI and SNR are only valid right after a reception
//! - The driver is not reentrant; use it from a single task
//! - Dropping an async operation leaves the chip where it was; the `*_async_with`
//!   variants take a cancellation future and still end in standby
//!
//! # Example
//! ```ignore
//! use sx127x::{Config, Device, Radio, Error};
//!
//! fn ping<SPI, RESET, DIO0, DELAY>(spi: SPI, reset: RESET, dio0: DIO0, delay: DELAY) -> Result<(), Error>
//! where
//!     SPI: embedded_hal::spi::SpiDevice,
//!     RESET: embedded_hal::digital::OutputPin,
//!     DELAY: embedded_hal::delay::DelayNs,
//! {
//!     let mut radio = Radio::new(Device::new(spi, reset), dio0, delay, Config::default())?;
//!     radio.init()?;
//!
//!     radio.transmit(b"PING 0")?;
//!     let packet = radio.receive(1_000)?;
//!     log::info!("{:?} at {} dBm", packet.as_str(), packet.rssi_dbm());
//!
//!     radio.sleep()
//! }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod radio;
pub mod registers;

#[cfg(test)]
mod sim;

pub use config::{Config, CrcErrorPolicy};
pub use device::Device;
pub use error::Error;
pub use radio::{Abort, AbortFn, Diagnostics, NeverAbort, Packet, Radio, SignalQuality};
