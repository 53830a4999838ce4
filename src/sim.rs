//! Simulated SX127x for unit tests
//!
//! [`Chip`] models the parts of the radio the driver relies on: the register
//! file with its read-only and write-1-to-clear registers, the FIFO and its
//! pointer, the LoRa bit only changing in sleep, TX completion after a fixed
//! airtime and packets arriving while listening. Time only moves when a delay
//! is awaited, so every test is deterministic.
//!
//! The SPI, reset, DIO0 and delay handles share the chip state and implement
//! both the blocking and the async embedded-hal traits.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::vec::Vec;

use embedded_hal::spi::Operation;

const NS_PER_MS: u64 = 1_000_000;

const OP_MODE: usize = 0x01;
const PA_CONFIG: usize = 0x09;
const OCP: usize = 0x0B;
const FIFO_ADDR_PTR: usize = 0x0D;
const FIFO_TX_BASE: usize = 0x0E;
const FIFO_RX_BASE: usize = 0x0F;
const FIFO_RX_CURRENT: usize = 0x10;
const IRQ_FLAGS: usize = 0x12;
const RX_NB_BYTES: usize = 0x13;
const PACKET_SNR: usize = 0x19;
const PACKET_RSSI: usize = 0x1A;
const RSSI: usize = 0x1B;
const PAYLOAD_LENGTH: usize = 0x22;
const DIO_MAPPING_1: usize = 0x40;
const VERSION: usize = 0x42;
const PA_DAC: usize = 0x4D;

const READ_ONLY: [usize; 6] = [FIFO_RX_CURRENT, RX_NB_BYTES, PACKET_SNR, PACKET_RSSI, RSSI, VERSION];

const LORA: u8 = 0x80;
const MODE_MASK: u8 = 0x07;
const SLEEP: u8 = 0;
const STANDBY: u8 = 1;
const TRANSMIT: u8 = 3;
const RECEIVE_CONTINUOUS: u8 = 5;

const RX_DONE: u8 = 0x40;
const PAYLOAD_CRC_ERROR: u8 = 0x20;
const VALID_HEADER: u8 = 0x10;
const TX_DONE: u8 = 0x08;
const CAD_DONE: u8 = 0x04;

/// What the chip hears while listening
#[derive(Debug, Clone, PartialEq)]
pub enum Reception {
    /// A good packet with its raw RSSI and SNR register values
    Packet { payload: Vec<u8>, rssi: u8, snr: i8 },
    /// A packet that fails the payload CRC
    CrcError,
    /// RxDone with no bytes
    Empty,
}

/// One chip-select bracket on the bus
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    written: Vec<u8>,
    read: Vec<u8>,
}

impl Transaction {
    pub fn new(written: &[u8]) -> Self {
        Self {
            written: written.to_vec(),
            read: Vec::new(),
        }
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    pub fn read(&self) -> &[u8] {
        &self.read
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError;

impl embedded_hal::spi::Error for SimError {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}

impl embedded_hal::digital::Error for SimError {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

struct State {
    regs: [u8; 128],
    fifo: [u8; 256],
    version: u8,
    now_ns: u64,
    timers_ns: Vec<u64>,
    transactions: Vec<Transaction>,
    selected: bool,
    reset_low: bool,
    reset_edges: Vec<bool>,
    receptions: Vec<(u64, Reception)>,
    tx_airtime_ms: Option<u32>,
    tx_done_at: Option<u64>,
    sent: Vec<Vec<u8>>,
    fail_bus: bool,
}

fn power_on_registers(version: u8) -> [u8; 128] {
    let mut regs = [0u8; 128];
    regs[OP_MODE] = 0x09;
    regs[PA_CONFIG] = 0x4F;
    regs[OCP] = 0x2B;
    regs[PA_DAC] = 0x84;
    regs[0x06] = 0x6C;
    regs[0x07] = 0x80;
    regs[FIFO_TX_BASE] = 0x80;
    regs[0x1D] = 0x72;
    regs[0x1E] = 0x70;
    regs[0x21] = 0x08;
    regs[PAYLOAD_LENGTH] = 0x01;
    regs[0x23] = 0xFF;
    regs[0x39] = 0x12;
    regs[VERSION] = version;
    regs
}

impl State {
    fn new() -> Self {
        Self {
            regs: power_on_registers(0x12),
            fifo: [0; 256],
            version: 0x12,
            now_ns: 0,
            timers_ns: Vec::new(),
            transactions: Vec::new(),
            selected: false,
            reset_low: false,
            reset_edges: Vec::new(),
            receptions: Vec::new(),
            tx_airtime_ms: Some(5),
            tx_done_at: None,
            sent: Vec::new(),
            fail_bus: false,
        }
    }

    fn mode(&self) -> u8 {
        self.regs[OP_MODE] & MODE_MASK
    }

    fn lora_in(&self, mode: u8) -> bool {
        self.regs[OP_MODE] & LORA != 0 && self.mode() == mode
    }

    fn dio0_high(&self) -> bool {
        let mapped = match self.regs[DIO_MAPPING_1] >> 6 {
            0b00 => RX_DONE,
            0b01 => TX_DONE,
            _ => CAD_DONE,
        };
        self.regs[IRQ_FLAGS] & mapped != 0
    }

    fn read_byte(&mut self, address: usize) -> u8 {
        if address == 0 {
            let pointer = self.regs[FIFO_ADDR_PTR];
            self.regs[FIFO_ADDR_PTR] = pointer.wrapping_add(1);
            self.fifo[pointer as usize]
        } else {
            self.regs[address]
        }
    }

    fn write_byte(&mut self, address: usize, value: u8) {
        match address {
            0 => {
                let pointer = self.regs[FIFO_ADDR_PTR];
                self.regs[FIFO_ADDR_PTR] = pointer.wrapping_add(1);
                self.fifo[pointer as usize] = value;
            }
            OP_MODE => self.write_op_mode(value),
            IRQ_FLAGS => self.regs[IRQ_FLAGS] &= !value,
            address if READ_ONLY.contains(&address) => {}
            address => self.regs[address] = value,
        }
    }

    fn write_op_mode(&mut self, value: u8) {
        let current = self.regs[OP_MODE];
        let lora = if current & MODE_MASK == SLEEP {
            value & LORA
        } else {
            current & LORA
        };
        self.regs[OP_MODE] = lora | (value & !LORA);

        self.tx_done_at = None;
        if self.lora_in(TRANSMIT) {
            let base = self.regs[FIFO_TX_BASE] as usize;
            let len = self.regs[PAYLOAD_LENGTH] as usize;
            let payload = (0..len).map(|i| self.fifo[(base + i) % 256]).collect();
            self.sent.push(payload);
            self.tx_done_at = self
                .tx_airtime_ms
                .map(|ms| self.now_ns + ms as u64 * NS_PER_MS);
        }
        self.update();
    }

    fn next_activity(&self) -> Option<u64> {
        let tx = self.tx_done_at.filter(|_| self.lora_in(TRANSMIT));
        let rx = self
            .receptions
            .first()
            .map(|(due, _)| *due)
            .filter(|_| self.lora_in(RECEIVE_CONTINUOUS));
        let next = match (tx, rx) {
            (Some(tx), Some(rx)) => Some(tx.min(rx)),
            (tx, rx) => tx.or(rx),
        };
        next.map(|at| at.max(self.now_ns))
    }

    /// Earliest deadline of the timers currently awaited
    fn next_timer(&self) -> Option<u64> {
        self.timers_ns.iter().copied().min()
    }

    fn disarm(&mut self, deadline: u64) {
        if let Some(index) = self.timers_ns.iter().position(|at| *at == deadline) {
            self.timers_ns.swap_remove(index);
        }
    }

    fn advance_to(&mut self, at: u64) {
        self.now_ns = self.now_ns.max(at);
        self.update();
    }

    fn update(&mut self) {
        if let Some(done) = self.tx_done_at {
            if self.now_ns >= done && self.lora_in(TRANSMIT) {
                self.regs[IRQ_FLAGS] |= TX_DONE;
                self.regs[OP_MODE] = (self.regs[OP_MODE] & !MODE_MASK) | STANDBY;
                self.tx_done_at = None;
            }
        }

        while self.lora_in(RECEIVE_CONTINUOUS) {
            match self.receptions.first().map(|(due, _)| *due) {
                Some(due) if due <= self.now_ns => {
                    let (_, reception) = self.receptions.remove(0);
                    self.deliver(reception);
                }
                _ => break,
            }
        }
    }

    fn deliver(&mut self, reception: Reception) {
        let base = self.regs[FIFO_RX_BASE];
        match reception {
            Reception::Packet { payload, rssi, snr } => {
                for (i, byte) in payload.iter().enumerate() {
                    self.fifo[(base as usize + i) % 256] = *byte;
                }
                self.regs[FIFO_RX_CURRENT] = base;
                self.regs[RX_NB_BYTES] = payload.len() as u8;
                self.regs[PACKET_RSSI] = rssi;
                self.regs[PACKET_SNR] = snr as u8;
                self.regs[IRQ_FLAGS] |= RX_DONE | VALID_HEADER;
            }
            Reception::CrcError => {
                for i in 0..4 {
                    self.fifo[(base as usize + i) % 256] = 0xA5;
                }
                self.regs[FIFO_RX_CURRENT] = base;
                self.regs[RX_NB_BYTES] = 4;
                self.regs[IRQ_FLAGS] |= RX_DONE | PAYLOAD_CRC_ERROR | VALID_HEADER;
            }
            Reception::Empty => {
                self.regs[FIFO_RX_CURRENT] = base;
                self.regs[RX_NB_BYTES] = 0;
                self.regs[IRQ_FLAGS] |= RX_DONE | VALID_HEADER;
            }
        }
    }

    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SimError> {
        if self.fail_bus {
            return Err(SimError);
        }
        self.selected = true;

        let mut record = Transaction::default();
        let mut address: Option<usize> = None;
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    for byte in bytes.iter() {
                        record.written.push(*byte);
                        address = Some(match address {
                            None => (*byte & 0x7F) as usize,
                            Some(address) => {
                                self.write_byte(address, *byte);
                                next_address(address)
                            }
                        });
                    }
                }
                Operation::Read(buffer) => {
                    for slot in buffer.iter_mut() {
                        let current = address.unwrap_or(0);
                        *slot = self.read_byte(current);
                        record.read.push(*slot);
                        address = Some(next_address(current));
                    }
                }
                Operation::DelayNs(ns) => {
                    let at = self.now_ns + *ns as u64;
                    self.advance_to(at);
                }
                _ => {
                    self.selected = false;
                    return Err(SimError);
                }
            }
        }

        self.transactions.push(record);
        self.selected = false;
        Ok(())
    }
}

/// The FIFO port keeps its address, everything else auto-increments
fn next_address(address: usize) -> usize {
    if address == 0 {
        0
    } else {
        (address + 1) & 0x7F
    }
}

/// Handle to a simulated radio
#[derive(Clone)]
pub struct Chip {
    state: Rc<RefCell<State>>,
}

impl Chip {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(State::new())),
        }
    }

    pub fn spi(&self) -> SimSpi {
        SimSpi {
            state: self.state.clone(),
        }
    }

    pub fn reset_pin(&self) -> ResetPin {
        ResetPin {
            state: self.state.clone(),
        }
    }

    pub fn dio0(&self) -> Dio0 {
        Dio0 {
            state: self.state.clone(),
        }
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay {
            state: self.state.clone(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.state.borrow().now_ns / NS_PER_MS
    }

    pub fn register(&self, address: u8) -> u8 {
        self.state.borrow().regs[address as usize]
    }

    pub fn registers(&self) -> [u8; 128] {
        self.state.borrow().regs
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.state.borrow().transactions.clone()
    }

    pub fn clear_transactions(&self) {
        self.state.borrow_mut().transactions.clear();
    }

    pub fn chip_selected(&self) -> bool {
        self.state.borrow().selected
    }

    pub fn reset_edges(&self) -> Vec<bool> {
        self.state.borrow().reset_edges.clone()
    }

    /// Payloads the chip put on air, in order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.borrow().sent.clone()
    }

    /// Queues a reception `ms` from now. It is delivered once the chip is
    /// listening and the time has come.
    pub fn schedule_rx_in(&self, ms: u32, reception: Reception) {
        let mut state = self.state.borrow_mut();
        let due = state.now_ns + ms as u64 * NS_PER_MS;
        let index = state.receptions.partition_point(|(at, _)| *at <= due);
        state.receptions.insert(index, (due, reception));
    }

    /// Time between entering transmit and TxDone. `None` never completes.
    pub fn set_tx_airtime(&self, airtime_ms: Option<u32>) {
        self.state.borrow_mut().tx_airtime_ms = airtime_ms;
    }

    pub fn set_version(&self, version: u8) {
        let mut state = self.state.borrow_mut();
        state.version = version;
        state.regs[VERSION] = version;
    }

    pub fn set_channel_rssi(&self, raw: u8) {
        self.state.borrow_mut().regs[RSSI] = raw;
    }

    pub fn fail_bus(&self, fail: bool) {
        self.state.borrow_mut().fail_bus = fail;
    }
}

pub struct SimSpi {
    state: Rc<RefCell<State>>,
}

impl embedded_hal::spi::ErrorType for SimSpi {
    type Error = SimError;
}

impl embedded_hal::spi::SpiDevice for SimSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SimError> {
        self.state.borrow_mut().transaction(operations)
    }
}

impl embedded_hal_async::spi::SpiDevice for SimSpi {
    async fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SimError> {
        self.state.borrow_mut().transaction(operations)
    }
}

pub struct ResetPin {
    state: Rc<RefCell<State>>,
}

impl embedded_hal::digital::ErrorType for ResetPin {
    type Error = SimError;
}

impl embedded_hal::digital::OutputPin for ResetPin {
    fn set_low(&mut self) -> Result<(), SimError> {
        let mut state = self.state.borrow_mut();
        state.reset_low = true;
        state.reset_edges.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), SimError> {
        let mut state = self.state.borrow_mut();
        state.reset_edges.push(true);
        if state.reset_low {
            state.regs = power_on_registers(state.version);
            state.tx_done_at = None;
        }
        state.reset_low = false;
        Ok(())
    }
}

pub struct Dio0 {
    state: Rc<RefCell<State>>,
}

impl Dio0 {
    /// Resolves once the pin reaches `level`, skipping time forward to the
    /// next chip activity as long as no armed timer would fire first.
    async fn wait_for_level(&mut self, level: bool) -> Result<(), SimError> {
        std::future::poll_fn(|_| {
            let mut state = self.state.borrow_mut();
            if state.dio0_high() == level {
                return Poll::Ready(Ok(()));
            }
            let limit = state.next_timer().unwrap_or(u64::MAX);
            if let Some(at) = state.next_activity().filter(|at| *at <= limit) {
                state.advance_to(at);
                if state.dio0_high() == level {
                    return Poll::Ready(Ok(()));
                }
            }
            Poll::Pending
        })
        .await
    }
}

impl embedded_hal::digital::ErrorType for Dio0 {
    type Error = SimError;
}

impl embedded_hal::digital::InputPin for Dio0 {
    fn is_high(&mut self) -> Result<bool, SimError> {
        Ok(self.state.borrow().dio0_high())
    }

    fn is_low(&mut self) -> Result<bool, SimError> {
        Ok(!self.state.borrow().dio0_high())
    }
}

impl embedded_hal_async::digital::Wait for Dio0 {
    async fn wait_for_high(&mut self) -> Result<(), SimError> {
        self.wait_for_level(true).await
    }

    async fn wait_for_low(&mut self) -> Result<(), SimError> {
        self.wait_for_level(false).await
    }

    async fn wait_for_rising_edge(&mut self) -> Result<(), SimError> {
        self.wait_for_level(false).await?;
        self.wait_for_level(true).await
    }

    async fn wait_for_falling_edge(&mut self) -> Result<(), SimError> {
        self.wait_for_level(true).await?;
        self.wait_for_level(false).await
    }

    async fn wait_for_any_edge(&mut self) -> Result<(), SimError> {
        let level = self.state.borrow().dio0_high();
        self.wait_for_level(!level).await
    }
}

/// Delay that advances the simulated clock
pub struct SimDelay {
    state: Rc<RefCell<State>>,
}

impl SimDelay {
    fn timer(&self, ns: u64) -> Timer {
        let deadline = self.state.borrow().now_ns + ns;
        Timer {
            state: self.state.clone(),
            deadline,
            armed: false,
        }
    }
}

impl embedded_hal::delay::DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        let mut state = self.state.borrow_mut();
        let at = state.now_ns + ns as u64;
        state.advance_to(at);
    }

    fn delay_ms(&mut self, ms: u32) {
        let mut state = self.state.borrow_mut();
        let at = state.now_ns + ms as u64 * NS_PER_MS;
        state.advance_to(at);
    }
}

impl embedded_hal_async::delay::DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.timer(ns as u64).await
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.timer(ms as u64 * NS_PER_MS).await
    }
}

/// Pends once so that racing futures get a chance to run, then jumps to its
/// deadline as soon as no other awaited timer is due earlier
struct Timer {
    state: Rc<RefCell<State>>,
    deadline: u64,
    armed: bool,
}

impl Future for Timer {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let mut state = this.state.borrow_mut();
        let first = state.next_timer().map_or(true, |at| this.deadline <= at);
        if state.now_ns >= this.deadline || (this.armed && first) {
            state.advance_to(this.deadline);
            if this.armed {
                state.disarm(this.deadline);
                this.armed = false;
            }
            return Poll::Ready(());
        }
        if !this.armed {
            state.timers_ns.push(this.deadline);
            this.armed = true;
        }
        Poll::Pending
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.disarm(self.deadline);
        }
    }
}
