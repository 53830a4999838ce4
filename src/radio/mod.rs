//! LoRa radio driver and half-duplex link
//!
//! [`Radio`] owns the register transport, the DIO0 line and a delay source and
//! drives the chip through its operating modes:
//!
//! ```text
//!          initialize()
//! Sleep ───────────────▶ Standby ◀──────────────┐
//!                          │  │                  │ TxDone / timeout / abort
//!                          │  └─ transmit() ──▶ Transmit
//!                          │                     │
//!                          └──── receive() ──▶ ReceiveContinuous
//! ```
//!
//! Every transition into transmit or receive passes through standby, and the
//! chip is back in standby once an operation returns, whatever its outcome.
//!
//! Two completion backends share the same contract:
//! - blocking, polling the IRQ flags register at a fixed interval (this module)
//! - async, waiting for the DIO0 line to rise (the `*_async` methods)
//!
//! The driver is not reentrant. It takes `&mut self` for every operation and
//! is meant to be owned by a single task.

mod asynch;

use core::sync::atomic::{AtomicBool, Ordering};

use heapless::Vec;

use crate::config::{Config, CrcErrorPolicy};
use crate::device::{Device, RegisterWrite};
use crate::registers::{
    FifoAddrPtr, FifoRxBaseAddr, FifoRxCurrentAddr, FifoTxBaseAddr, Frequency, Irq, IrqFlags,
    MaxPayloadLength, ModemConfig1, ModemConfig2, ModemConfig3, OpMode, PacketRssi,
    PacketSnr, PayloadLength, PreambleLength, Rssi, RxNbBytes, SyncWord, Version,
    MAX_PAYLOAD_LEN, SX127X_VERSION,
};
use crate::Error;

pub use crate::registers::Mode;

/// FIFO base address shared by the TX and RX banks
const FIFO_BASE: u8 = 0x00;

/// Time for the oscillator to settle after a sleep/standby transition
const MODE_SETTLE_MS: u32 = 10;

/// Signal quality of a received packet
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SignalQuality {
    /// Packet RSSI in dBm
    pub rssi_dbm: i16,
    /// Packet SNR in dB
    pub snr_db: f32,
}

/// A received packet and the signal quality it was received with
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    payload: Vec<u8, MAX_PAYLOAD_LEN>,
    signal: SignalQuality,
}

impl Packet {
    /// Raw payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload as text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.payload).ok()
    }

    pub fn signal(&self) -> SignalQuality {
        self.signal
    }

    pub fn rssi_dbm(&self) -> i16 {
        self.signal.rssi_dbm
    }

    pub fn snr_db(&self) -> f32 {
        self.signal.snr_db
    }

    /// Consumes the packet, returning the payload buffer
    pub fn into_payload(self) -> Vec<u8, MAX_PAYLOAD_LEN> {
        self.payload
    }
}

/// Snapshot of the chip state used to check wiring and configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    pub version: u8,
    pub op_mode: OpMode,
    pub frequency: Frequency,
    pub irq: Irq,
}

impl Diagnostics {
    /// Whether the chip is listening in RX continuous mode
    pub fn is_receiving(&self) -> bool {
        self.op_mode.long_range_mode && self.op_mode.mode == Mode::ReceiveContinuous
    }

    /// Carrier frequency the chip is tuned to, in Hz
    pub fn frequency_hz(&self) -> u32 {
        crate::config::hz_from_frf(self.frequency.frf)
    }
}

/// Cancellation token checked on every poll of a blocking operation.
///
/// When it fires the operation stops, the chip is put back in standby and
/// [`Error::Aborted`] is returned.
pub trait Abort {
    fn should_abort(&mut self) -> bool;
}

/// Token that never fires
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverAbort;

impl Abort for NeverAbort {
    fn should_abort(&mut self) -> bool {
        false
    }
}

impl Abort for &AtomicBool {
    fn should_abort(&mut self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Token backed by a closure, e.g. a deadline check against a monotonic clock
pub struct AbortFn<F>(pub F);

impl<F> Abort for AbortFn<F>
where
    F: FnMut() -> bool,
{
    fn should_abort(&mut self) -> bool {
        (self.0)()
    }
}

/// Outcome of one look at the IRQ flags while receiving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxEvent {
    Idle,
    CrcError,
    Done,
}

fn classify(irq: Irq) -> RxEvent {
    if irq.contains(Irq::PAYLOAD_CRC_ERROR) {
        RxEvent::CrcError
    } else if irq.contains(Irq::RX_DONE) {
        RxEvent::Done
    } else {
        RxEvent::Idle
    }
}

fn check_payload(payload: &[u8], config: &Config) -> Result<(), Error> {
    let max = MAX_PAYLOAD_LEN.min(config.max_payload_len as usize);
    if payload.is_empty() {
        Err(Error::EmptyPayload)
    } else if payload.len() > max {
        Err(Error::PayloadTooLarge {
            len: payload.len(),
            max,
        })
    } else {
        Ok(())
    }
}

fn payload_buffer(len: u8) -> Result<Vec<u8, MAX_PAYLOAD_LEN>, Error> {
    let mut payload = Vec::new();
    payload
        .resize_default(len as usize)
        .map_err(|_| Error::PayloadTooLarge {
            len: len as usize,
            max: MAX_PAYLOAD_LEN,
        })?;
    Ok(payload)
}

/// Keeps the first error, but lets a cleanup failure surface after a success
fn settle<T>(result: Result<T, Error>, cleanup: Result<(), Error>) -> Result<T, Error> {
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), _) => Err(err),
    }
}

/// Registers written by `initialize`, in order, once the chip is in LoRa standby
fn configuration(config: &Config) -> [RegisterWrite; 12] {
    let (pa_config, pa_dac, ocp) = config.power_amplifier();
    [
        RegisterWrite::new(Frequency { frf: config.frf() }),
        RegisterWrite::new(ModemConfig1 {
            bandwidth: config.bandwidth,
            coding_rate: config.coding_rate,
            implicit_header: false,
        }),
        RegisterWrite::new(ModemConfig2 {
            spreading_factor: config.spreading_factor,
            tx_continuous: false,
            crc_on: config.crc,
            symbol_timeout_msb: 0,
        }),
        RegisterWrite::new(ModemConfig3 {
            low_data_rate_optimize: config.low_data_rate_optimize(),
            agc_auto_on: true,
        }),
        RegisterWrite::new(PreambleLength {
            symbols: config.preamble_len,
        }),
        RegisterWrite::new(MaxPayloadLength {
            length: config.max_payload_len,
        }),
        RegisterWrite::new(SyncWord {
            value: config.sync_word,
        }),
        RegisterWrite::new(pa_config),
        RegisterWrite::new(pa_dac),
        RegisterWrite::new(ocp),
        RegisterWrite::new(FifoTxBaseAddr { address: FIFO_BASE }),
        RegisterWrite::new(FifoRxBaseAddr { address: FIFO_BASE }),
    ]
}

/// Decides whether the chip that answered is an SX127x in LoRa mode.
///
/// Only enforced in strict mode. Returns the silicon version.
fn check_device(config: &Config, version: Version, op_mode: OpMode) -> Result<u8, Error> {
    if config.strict && (version.value != SX127X_VERSION || !op_mode.long_range_mode) {
        if version.is_present() {
            log::warn!(
                "unexpected radio: version 0x{:02X}, op mode 0x{:02X}",
                version.value,
                op_mode.bits()
            );
        } else {
            log::warn!("no radio answering, version reads 0x{:02X}", version.value);
        }
        return Err(Error::NoDevice {
            version: version.value,
        });
    }

    log::debug!("radio initialized, version 0x{:02X}", version.value);
    Ok(version.value)
}

/// SX127x LoRa radio
///
/// Owns the transport ([`Device`]), the DIO0 interrupt line and a delay
/// source for its whole lifetime. The configuration is validated when the
/// radio is created and written to the chip by [`initialize`](Radio::initialize).
pub struct Radio<SPI, RESET, DIO0, DELAY> {
    device: Device<SPI, RESET>,
    dio0: DIO0,
    delay: DELAY,
    config: Config,
    mode: Mode,
    last_signal: Option<SignalQuality>,
}

impl<SPI, RESET, DIO0, DELAY> Radio<SPI, RESET, DIO0, DELAY> {
    /// Creates a radio driver. No bus traffic happens until [`init`](Radio::init).
    ///
    /// # Errors
    /// * `Error::InvalidConfig` - The configuration is not supported
    pub fn new(
        device: Device<SPI, RESET>,
        dio0: DIO0,
        delay: DELAY,
        config: Config,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            device,
            dio0,
            delay,
            config,
            mode: Mode::Sleep,
            last_signal: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Operating mode last set by the driver
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// RSSI and SNR of the last packet received successfully
    pub fn last_signal(&self) -> Option<SignalQuality> {
        self.last_signal
    }

    /// Gives back the transport, DIO0 pin and delay.
    ///
    /// No bus traffic happens here; call [`sleep`](Radio::sleep) first to
    /// leave the chip in its lowest power state.
    pub fn release(self) -> (Device<SPI, RESET>, DIO0, DELAY) {
        (self.device, self.dio0, self.delay)
    }
}

impl<SPI, RESET, DIO0, DELAY> Radio<SPI, RESET, DIO0, DELAY>
where
    SPI: embedded_hal::spi::SpiDevice,
    RESET: embedded_hal::digital::OutputPin,
    DELAY: embedded_hal::delay::DelayNs,
{
    /// Resets the chip and writes the configuration.
    ///
    /// Returns the silicon version.
    pub fn init(&mut self) -> Result<u8, Error> {
        self.device.reset(&mut self.delay)?;
        self.mode = Mode::Standby;
        self.initialize()
    }

    /// Brings the chip into LoRa standby and writes the full configuration.
    ///
    /// Returns the silicon version. Calling it again rewrites the same values.
    ///
    /// # Errors
    /// * `Error::NoDevice` - In strict mode, the version register does not
    ///   read [`SX127X_VERSION`] or the LoRa mode bit did not stick
    pub fn initialize(&mut self) -> Result<u8, Error> {
        log::debug!("initializing radio at {} Hz", self.config.frequency_hz);

        // The LoRa bit can only be changed in sleep
        self.device.write_register(OpMode::fsk_sleep())?;
        self.device.write_register(OpMode::lora(Mode::Sleep))?;
        self.delay.delay_ms(MODE_SETTLE_MS);
        self.set_mode(Mode::Standby)?;
        self.delay.delay_ms(MODE_SETTLE_MS);

        for write in configuration(&self.config) {
            self.device.write(&write)?;
        }

        let version: Version = self.device.read_register()?;
        let op_mode: OpMode = self.device.read_register()?;
        check_device(&self.config, version, op_mode)
    }

    /// Validates and applies a new configuration, then rewrites the chip.
    ///
    /// The previous configuration is kept if validation fails.
    pub fn reconfigure(&mut self, config: Config) -> Result<u8, Error> {
        config.validate()?;
        self.config = config;
        self.initialize()
    }

    /// Puts the chip in LoRa sleep
    pub fn sleep(&mut self) -> Result<(), Error> {
        self.set_mode(Mode::Sleep)
    }

    /// Puts the chip in LoRa standby
    pub fn standby(&mut self) -> Result<(), Error> {
        self.set_mode(Mode::Standby)
    }

    /// Transmits one packet and blocks until the chip reports TxDone.
    ///
    /// # Errors
    /// * `Error::PayloadTooLarge` / `Error::EmptyPayload` - Rejected before any bus traffic
    /// * `Error::TransmitTimeout` - TxDone not seen within `tx_timeout_ms`
    pub fn transmit(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.transmit_with(payload, NeverAbort)
    }

    /// [`transmit`](Radio::transmit) with a cancellation token
    pub fn transmit_with(&mut self, payload: &[u8], mut abort: impl Abort) -> Result<(), Error> {
        check_payload(payload, &self.config)?;
        log::trace!("transmitting {} bytes", payload.len());

        self.set_mode(Mode::Standby)?;
        self.clear_irq()?;
        self.device.write_register(FifoAddrPtr { address: FIFO_BASE })?;
        self.device.write_register(PayloadLength {
            length: payload.len() as u8,
        })?;
        self.device.write_fifo(payload)?;
        self.set_mode(Mode::Transmit)?;

        let result = self.wait_tx_done(&mut abort);
        let cleanup = self.return_to_standby();
        settle(result, cleanup)
    }

    /// Listens for one packet for up to `timeout_ms` milliseconds.
    ///
    /// Packets with a CRC error are handled according to
    /// [`Config::crc_error_policy`]; they are never returned as a packet.
    /// Zero-length receptions are dropped.
    ///
    /// # Errors
    /// * `Error::ReceiveTimeout` - Nothing valid arrived in time
    /// * `Error::Crc` - Only under [`CrcErrorPolicy::Report`]
    pub fn receive(&mut self, timeout_ms: u32) -> Result<Packet, Error> {
        self.receive_with(timeout_ms, NeverAbort)
    }

    /// [`receive`](Radio::receive) with a cancellation token
    pub fn receive_with(&mut self, timeout_ms: u32, mut abort: impl Abort) -> Result<Packet, Error> {
        self.set_mode(Mode::Standby)?;
        self.clear_irq()?;
        self.device.write_register(FifoAddrPtr { address: FIFO_BASE })?;
        self.set_mode(Mode::ReceiveContinuous)?;

        let result = self.wait_rx_done(timeout_ms, &mut abort);
        let cleanup = self.return_to_standby();
        settle(result, cleanup)
    }

    /// Reads back the registers that tell whether the chip is wired and configured
    pub fn diagnostics(&mut self) -> Result<Diagnostics, Error> {
        let version: Version = self.device.read_register()?;
        let op_mode: OpMode = self.device.read_register()?;
        let frequency: Frequency = self.device.read_register()?;
        let flags: IrqFlags = self.device.read_register()?;
        Ok(Diagnostics {
            version: version.value,
            op_mode,
            frequency,
            irq: flags.irq,
        })
    }

    /// Live channel RSSI in dBm, meaningful while receiving
    pub fn current_rssi(&mut self) -> Result<i16, Error> {
        let rssi: Rssi = self.device.read_register()?;
        Ok(rssi.dbm())
    }

    fn set_mode(&mut self, mode: Mode) -> Result<(), Error> {
        self.device.write_register(OpMode::lora(mode))?;
        if self.mode != mode {
            log::trace!("mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
        Ok(())
    }

    fn clear_irq(&mut self) -> Result<(), Error> {
        self.device.write_register(IrqFlags::clear_all())
    }

    fn return_to_standby(&mut self) -> Result<(), Error> {
        self.clear_irq()?;
        self.set_mode(Mode::Standby)
    }

    fn wait_tx_done(&mut self, abort: &mut impl Abort) -> Result<(), Error> {
        let interval = self.config.tx_poll_interval_ms;
        let mut elapsed = 0u32;
        loop {
            let flags: IrqFlags = self.device.read_register()?;
            if flags.irq.contains(Irq::TX_DONE) {
                log::trace!("tx done after ~{} ms", elapsed);
                return Ok(());
            }
            if abort.should_abort() {
                log::debug!("transmit aborted");
                return Err(Error::Aborted);
            }
            if elapsed >= self.config.tx_timeout_ms {
                log::warn!("no TxDone after {} ms", elapsed);
                return Err(Error::TransmitTimeout);
            }
            self.delay.delay_ms(interval);
            elapsed = elapsed.saturating_add(interval);
        }
    }

    fn wait_rx_done(&mut self, timeout_ms: u32, abort: &mut impl Abort) -> Result<Packet, Error> {
        let interval = self.config.rx_poll_interval_ms;
        let mut elapsed = 0u32;
        // Cleared for the interval right after a discarded CRC error
        let mut charge = true;
        loop {
            if abort.should_abort() {
                log::debug!("receive aborted");
                return Err(Error::Aborted);
            }

            let flags: IrqFlags = self.device.read_register()?;
            match classify(flags.irq) {
                RxEvent::Idle => {}
                RxEvent::CrcError => {
                    self.clear_irq()?;
                    log::debug!("dropping packet with CRC error");
                    match self.config.crc_error_policy {
                        CrcErrorPolicy::Discard => charge = false,
                        CrcErrorPolicy::DiscardCounted => {}
                        CrcErrorPolicy::Report => return Err(Error::Crc),
                    }
                }
                RxEvent::Done => {
                    let received: RxNbBytes = self.device.read_register()?;
                    if received.count > 0 {
                        return self.read_packet(received.count);
                    }
                    log::debug!("dropping zero-length reception");
                    self.clear_irq()?;
                }
            }

            if elapsed >= timeout_ms {
                log::trace!("receive timed out after {} ms", elapsed);
                return Err(Error::ReceiveTimeout);
            }
            self.delay.delay_ms(interval);
            if charge {
                elapsed = elapsed.saturating_add(interval);
            }
            charge = true;
        }
    }

    /// Reads the packet that raised RxDone, then its RSSI and SNR, then clears the flags.
    fn read_packet(&mut self, len: u8) -> Result<Packet, Error> {
        let current: FifoRxCurrentAddr = self.device.read_register()?;
        self.device.write_register(FifoAddrPtr {
            address: current.address,
        })?;
        let mut payload = payload_buffer(len)?;
        self.device.read_fifo(&mut payload)?;

        let rssi: PacketRssi = self.device.read_register()?;
        let snr: PacketSnr = self.device.read_register()?;
        self.clear_irq()?;

        let signal = SignalQuality {
            rssi_dbm: rssi.dbm(),
            snr_db: snr.db(),
        };
        log::debug!(
            "received {} bytes, rssi {} dBm, snr {} dB",
            len,
            signal.rssi_dbm,
            signal.snr_db
        );
        self.last_signal = Some(signal);
        Ok(Packet { payload, signal })
    }
}
