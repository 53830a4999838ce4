//! Register definitions for the SX127x radio in LoRa mode
//! Generated from the SX1276/77/78/79 datasheet rev. 7
//!
//! Every register the driver touches is declared exactly once here, together
//! with its 7-bit address and its byte encoding. The transport frames the
//! address, the radio driver only ever names registers by type.

mod dio;
mod packet;
mod rf;
mod system;

pub use dio::*;
pub use packet::*;
pub use rf::*;
pub use system::*;
