//! Driver error type
//!
//! Every failure the driver can report is a plain value of [`Error`]. None of
//! them are fatal: the caller decides whether to retry, log or give up.

/// Errors returned by the transport and the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// SPI communication failed
    Bus,
    /// The reset or DIO0 pin reported an error
    Pin,
    /// Register contents could not be decoded
    Deserialization,
    /// Register address outside of the 7-bit address space
    InvalidAddress(u8),
    /// The chip did not answer like an SX127x in LoRa mode
    ///
    /// Carries the raw version register value that was read back.
    NoDevice { version: u8 },
    /// TxDone was not raised within the configured transmit timeout
    TransmitTimeout,
    /// No packet arrived within the receive timeout
    ReceiveTimeout,
    /// A packet was received with a bad payload CRC
    ///
    /// Only returned under [`CrcErrorPolicy::Report`](crate::config::CrcErrorPolicy::Report).
    Crc,
    /// Payload does not fit in a single packet
    PayloadTooLarge { len: usize, max: usize },
    /// Zero-length payloads cannot be transmitted
    EmptyPayload,
    /// The requested configuration is not supported
    InvalidConfig,
    /// The operation was cancelled through its abort token
    Aborted,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bus => f.write_str("SPI bus error"),
            Self::Pin => f.write_str("GPIO pin error"),
            Self::Deserialization => f.write_str("register value could not be decoded"),
            Self::InvalidAddress(addr) => write!(f, "register address 0x{addr:02X} out of range"),
            Self::NoDevice { version } => {
                write!(f, "no SX127x in LoRa mode found (version 0x{version:02X})")
            }
            Self::TransmitTimeout => f.write_str("transmission did not complete in time"),
            Self::ReceiveTimeout => f.write_str("no packet received before timeout"),
            Self::Crc => f.write_str("payload CRC error"),
            Self::PayloadTooLarge { len, max } => {
                write!(f, "payload of {len} bytes exceeds maximum of {max}")
            }
            Self::EmptyPayload => f.write_str("payload is empty"),
            Self::InvalidConfig => f.write_str("unsupported radio configuration"),
            Self::Aborted => f.write_str("operation aborted"),
        }
    }
}
