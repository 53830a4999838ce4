//! Interrupt driven backend
//!
//! Same contract as the blocking methods, but completion is detected by
//! waiting for DIO0 to rise instead of polling the IRQ flags. DIO0 is routed
//! to TxDone or RxDone right before each operation, and the wait is raced
//! against the timeout and an optional cancellation future with [`select3`].
//!
//! Dropping one of these futures before it resolves leaves the chip in
//! whatever mode it was in. To stop an operation early and still end in
//! standby, pass the stop condition to the `*_with` variants instead.

use core::future::{pending, Future};

use embassy_futures::select::{select3, Either3};
use embedded_hal_async::digital::Wait;

use super::{
    check_device, check_payload, classify, configuration, payload_buffer, settle, Packet, Radio,
    RxEvent, SignalQuality, FIFO_BASE, MODE_SETTLE_MS,
};
use crate::config::CrcErrorPolicy;
use crate::device::Device;
use crate::registers::{
    Dio0Mapping, DioMapping1, FifoAddrPtr, FifoRxCurrentAddr, Irq, IrqFlags, Mode, OpMode,
    PacketRssi, PacketSnr, PayloadLength, RxNbBytes, Version,
};
use crate::Error;

impl<SPI, RESET, DIO0, DELAY> Radio<SPI, RESET, DIO0, DELAY>
where
    SPI: embedded_hal_async::spi::SpiDevice,
    RESET: embedded_hal::digital::OutputPin,
    DIO0: Wait,
    DELAY: embedded_hal_async::delay::DelayNs,
{
    /// Asynchronously resets the chip and writes the configuration.
    ///
    /// This is the async version of [`init`](Radio::init).
    pub async fn init_async(&mut self) -> Result<u8, Error> {
        self.device.reset_async(&mut self.delay).await?;
        self.mode = Mode::Standby;
        self.initialize_async().await
    }

    /// Asynchronously writes the full configuration.
    ///
    /// This is the async version of [`initialize`](Radio::initialize).
    pub async fn initialize_async(&mut self) -> Result<u8, Error> {
        log::debug!("initializing radio at {} Hz", self.config.frequency_hz);

        self.device.write_register_async(OpMode::fsk_sleep()).await?;
        self.device.write_register_async(OpMode::lora(Mode::Sleep)).await?;
        self.delay.delay_ms(MODE_SETTLE_MS).await;
        self.set_mode_async(Mode::Standby).await?;
        self.delay.delay_ms(MODE_SETTLE_MS).await;

        for write in configuration(&self.config) {
            self.device.write_async(&write).await?;
        }

        let version: Version = self.device.read_register_async().await?;
        let op_mode: OpMode = self.device.read_register_async().await?;
        check_device(&self.config, version, op_mode)
    }

    /// Asynchronously puts the chip in LoRa standby
    pub async fn standby_async(&mut self) -> Result<(), Error> {
        self.set_mode_async(Mode::Standby).await
    }

    /// Asynchronously puts the chip in LoRa sleep
    pub async fn sleep_async(&mut self) -> Result<(), Error> {
        self.set_mode_async(Mode::Sleep).await
    }

    /// Transmits one packet and waits for TxDone on DIO0.
    ///
    /// This is the async version of [`transmit`](Radio::transmit). Dropping
    /// the future mid-flight leaves the chip transmitting, use
    /// [`transmit_async_with`](Radio::transmit_async_with) to cancel.
    pub async fn transmit_async(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.transmit_async_with(payload, pending::<()>()).await
    }

    /// [`transmit_async`](Radio::transmit_async) that gives up once `cancel`
    /// completes.
    ///
    /// # Errors
    /// * `Error::Aborted` - `cancel` completed first. The chip is back in standby.
    pub async fn transmit_async_with(
        &mut self,
        payload: &[u8],
        cancel: impl Future,
    ) -> Result<(), Error> {
        check_payload(payload, &self.config)?;
        log::trace!("transmitting {} bytes", payload.len());

        self.set_mode_async(Mode::Standby).await?;
        self.device
            .write_register_async(DioMapping1 {
                dio0: Dio0Mapping::TxDone,
            })
            .await?;
        self.device.write_register_async(IrqFlags::clear_all()).await?;
        self.device.write_register_async(FifoAddrPtr { address: FIFO_BASE }).await?;
        self.device
            .write_register_async(PayloadLength {
                length: payload.len() as u8,
            })
            .await?;
        self.device.write_fifo_async(payload).await?;
        self.set_mode_async(Mode::Transmit).await?;

        let Self {
            device,
            dio0,
            delay,
            config,
            ..
        } = self;
        let timeout = delay.delay_ms(config.tx_timeout_ms);
        let result = match select3(cancel, timeout, wait_tx_done(device, dio0)).await {
            Either3::First(_) => {
                log::debug!("transmit aborted");
                Err(Error::Aborted)
            }
            Either3::Second(()) => {
                log::warn!("no TxDone after {} ms", config.tx_timeout_ms);
                Err(Error::TransmitTimeout)
            }
            Either3::Third(result) => result,
        };

        let cleanup = self.return_to_standby_async().await;
        settle(result, cleanup)
    }

    /// Listens for one packet, waiting for RxDone on DIO0.
    ///
    /// This is the async version of [`receive`](Radio::receive). The timeout
    /// runs on the delay source, so discarded CRC errors never extend it under
    /// either discard policy. Dropping the future leaves the chip listening,
    /// use [`receive_async_with`](Radio::receive_async_with) to cancel.
    pub async fn receive_async(&mut self, timeout_ms: u32) -> Result<Packet, Error> {
        self.receive_async_with(timeout_ms, pending::<()>()).await
    }

    /// [`receive_async`](Radio::receive_async) that gives up once `cancel`
    /// completes.
    ///
    /// # Errors
    /// * `Error::Aborted` - `cancel` completed first. The chip is back in standby.
    pub async fn receive_async_with(
        &mut self,
        timeout_ms: u32,
        cancel: impl Future,
    ) -> Result<Packet, Error> {
        self.set_mode_async(Mode::Standby).await?;
        self.device
            .write_register_async(DioMapping1 {
                dio0: Dio0Mapping::RxDone,
            })
            .await?;
        self.device.write_register_async(IrqFlags::clear_all()).await?;
        self.device.write_register_async(FifoAddrPtr { address: FIFO_BASE }).await?;
        self.set_mode_async(Mode::ReceiveContinuous).await?;

        let Self {
            device,
            dio0,
            delay,
            config,
            ..
        } = self;
        let policy = config.crc_error_policy;
        let timeout = delay.delay_ms(timeout_ms);
        let result = match select3(cancel, timeout, wait_rx_done(device, dio0, policy)).await {
            Either3::First(_) => {
                log::debug!("receive aborted");
                Err(Error::Aborted)
            }
            Either3::Second(()) => {
                log::trace!("receive timed out after {} ms", timeout_ms);
                Err(Error::ReceiveTimeout)
            }
            Either3::Third(result) => result,
        };

        if let Ok(packet) = &result {
            self.last_signal = Some(packet.signal);
        }
        let cleanup = self.return_to_standby_async().await;
        settle(result, cleanup)
    }

    async fn set_mode_async(&mut self, mode: Mode) -> Result<(), Error> {
        self.device.write_register_async(OpMode::lora(mode)).await?;
        if self.mode != mode {
            log::trace!("mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
        Ok(())
    }

    async fn return_to_standby_async(&mut self) -> Result<(), Error> {
        self.device.write_register_async(IrqFlags::clear_all()).await?;
        self.set_mode_async(Mode::Standby).await
    }
}

async fn wait_tx_done<SPI, RESET, DIO0>(
    device: &mut Device<SPI, RESET>,
    dio0: &mut DIO0,
) -> Result<(), Error>
where
    SPI: embedded_hal_async::spi::SpiDevice,
    RESET: embedded_hal::digital::OutputPin,
    DIO0: Wait,
{
    loop {
        dio0.wait_for_high().await.map_err(|_| Error::Pin)?;
        let flags: IrqFlags = device.read_register_async().await?;
        if flags.irq.contains(Irq::TX_DONE) {
            log::trace!("tx done");
            return Ok(());
        }
        device.write_register_async(IrqFlags::clear_all()).await?;
    }
}

async fn wait_rx_done<SPI, RESET, DIO0>(
    device: &mut Device<SPI, RESET>,
    dio0: &mut DIO0,
    policy: CrcErrorPolicy,
) -> Result<Packet, Error>
where
    SPI: embedded_hal_async::spi::SpiDevice,
    RESET: embedded_hal::digital::OutputPin,
    DIO0: Wait,
{
    loop {
        dio0.wait_for_high().await.map_err(|_| Error::Pin)?;
        let flags: IrqFlags = device.read_register_async().await?;
        match classify(flags.irq) {
            RxEvent::CrcError => {
                device.write_register_async(IrqFlags::clear_all()).await?;
                log::debug!("dropping packet with CRC error");
                if policy == CrcErrorPolicy::Report {
                    return Err(Error::Crc);
                }
            }
            RxEvent::Done => {
                let received: RxNbBytes = device.read_register_async().await?;
                if received.count > 0 {
                    return read_packet(device, received.count).await;
                }
                log::debug!("dropping zero-length reception");
                device.write_register_async(IrqFlags::clear_all()).await?;
            }
            RxEvent::Idle => {
                device.write_register_async(IrqFlags::clear_all()).await?;
            }
        }
    }
}

async fn read_packet<SPI, RESET>(device: &mut Device<SPI, RESET>, len: u8) -> Result<Packet, Error>
where
    SPI: embedded_hal_async::spi::SpiDevice,
    RESET: embedded_hal::digital::OutputPin,
{
    let current: FifoRxCurrentAddr = device.read_register_async().await?;
    device
        .write_register_async(FifoAddrPtr {
            address: current.address,
        })
        .await?;
    let mut payload = payload_buffer(len)?;
    device.read_fifo_async(&mut payload).await?;

    let rssi: PacketRssi = device.read_register_async().await?;
    let snr: PacketSnr = device.read_register_async().await?;
    device.write_register_async(IrqFlags::clear_all()).await?;

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
    Ok(Packet { payload, signal })
}
