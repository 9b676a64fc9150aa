use crate::address::{Address, TargetType};
use crate::driver::{CanDriver, CanMessage};
use crate::events::{EventSink, NullSink, TransportEvent};
use crate::frame::{fd_frame_size, FlowControl};
use crate::time::{Timer, TimerDriver};
use alloc::boxed::Box;
use alloc::vec::Vec;
use crossbeam_queue::SegQueue;
use smallvec::SmallVec;

mod rx;
mod tx;

/// Padding byte used to fill CAN FD frames up to a valid frame size
const FD_PADDING: u8 = 0xCC;

/// Receive state machine states
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxState {
    /// No reassembly in progress
    Idle,
    /// First frame received, waiting for consecutive frames
    WaitCf,
}

/// Transmit state machine states
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxState {
    /// No send in progress
    Idle,
    /// First frame sent, waiting for a flow control grant
    WaitFc,
    /// Sending consecutive frames
    Transmit,
}

/// Local flow control policy and protocol timeouts
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Consecutive frames granted per flow control, 0 = unlimited
    pub block_size: u8,
    /// Separation time granted to the peer in milliseconds
    pub st_min_ms: u32,
    /// Wait grants tolerated before a send is abandoned, 0 = unlimited
    pub wft_max: u8,
    /// Timeout waiting for the next consecutive frame
    pub rx_cf_timeout_ms: u64,
    /// Timeout waiting for a flow control grant
    pub rx_fc_timeout_ms: u64,
    /// Pad classic frames to 8 bytes with this value, None = no padding
    pub padding: Option<u8>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            block_size: 0,
            st_min_ms: 20,
            wft_max: 5,
            rx_cf_timeout_ms: 1000,
            rx_fc_timeout_ms: 1000,
            padding: None,
        }
    }
}

/// The ISO-TP engine for one address pair
///
/// Owns the independent receive and transmit state machines and the two
/// message FIFOs. The engine is single threaded and non blocking, it is
/// driven by calling [Transport::process] (or [Transport::process_rx] and
/// [Transport::process_tx]) on a short cadence relative to the configured
/// timeouts. One call performs at most one receive classification and one
/// transmit decision.
pub struct Transport<Time: TimerDriver> {
    address: Address,
    config: TransportConfig,
    time: Time,
    events: Box<dyn EventSink>,
    fd: bool,
    max_data_length: usize,

    rx_state: RxState,
    rx_buffer: Vec<u8>,
    rx_frame_len: u32,
    rx_seq_num: u8,
    rx_block_counter: u32,
    timer_rx_cf: Timer,

    tx_state: TxState,
    tx_buffer: Vec<u8>,
    tx_frame_len: usize,
    tx_seq_num: u8,
    tx_block_counter: u32,
    remote_block_size: u8,
    wft_counter: u32,
    timer_rx_fc: Timer,
    timer_tx_st_min: Timer,

    // the only coupling points between the two state machines,
    // both drained within one poll
    pending_flow_control_tx: bool,
    last_flow_control: Option<FlowControl>,

    rx_queue: SegQueue<Vec<u8>>,
    tx_queue: SegQueue<Vec<u8>>,
}

impl<Time: TimerDriver> Transport<Time> {
    /// Creates a transport with the default flow control policy
    pub fn new(address: Address, time: Time) -> Self {
        Self::with_config(address, TransportConfig::default(), time)
    }

    /// Creates a transport with an explicit flow control policy
    pub fn with_config(address: Address, config: TransportConfig, time: Time) -> Self {
        let mut transport = Self {
            address,
            time,
            events: Box::new(NullSink),
            fd: false,
            max_data_length: 8,
            rx_state: RxState::Idle,
            rx_buffer: Vec::new(),
            rx_frame_len: 0,
            rx_seq_num: 0,
            rx_block_counter: 0,
            timer_rx_cf: Timer::new(config.rx_cf_timeout_ms),
            tx_state: TxState::Idle,
            tx_buffer: Vec::new(),
            tx_frame_len: 0,
            tx_seq_num: 0,
            tx_block_counter: 0,
            remote_block_size: 0,
            wft_counter: 0,
            timer_rx_fc: Timer::new(config.rx_fc_timeout_ms),
            timer_tx_st_min: Timer::new(0),
            pending_flow_control_tx: false,
            last_flow_control: None,
            rx_queue: SegQueue::new(),
            tx_queue: SegQueue::new(),
            config,
        };
        transport.stop_receiving();
        transport.stop_sending();
        transport
    }

    /// Replaces the diagnostic event sink
    pub fn set_event_sink(&mut self, sink: Box<dyn EventSink>) {
        self.events = sink;
    }

    /// Switches between classic CAN (8 byte) and CAN FD (64 byte) frames
    ///
    /// Takes effect on the next transmit decision.
    pub fn set_fd_mode(&mut self, fd: bool) {
        self.fd = fd;
        self.max_data_length = if fd { 64 } else { 8 };
    }

    /// Enqueues one message for transmission, never blocks
    ///
    /// The outbound queue is unbounded, messages are segmented one at a
    /// time in FIFO order. Empty payloads are dropped, a zero length
    /// single frame is not encodable.
    pub fn send(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.tx_queue.push(data.to_vec());
    }

    /// Dequeues one completed reassembled message, never blocks
    pub fn receive(&mut self) -> Option<Vec<u8>> {
        self.rx_queue.pop()
    }

    /// One combined poll step: at most one received frame is classified
    /// and at most one frame is handed to the adapter
    pub fn process<Driver: CanDriver>(&mut self, can: &mut Driver) {
        if let Some(msg) = can.receive() {
            self.process_rx(&msg);
        }
        if let Some(msg) = self.process_tx() {
            can.transmit(&msg);
        }
    }

    /// Current receive state
    pub fn rx_state(&self) -> RxState {
        self.rx_state
    }

    /// Current transmit state
    pub fn tx_state(&self) -> TxState {
        self.tx_state
    }

    // ------------------------------ private ------------------------------------------------------

    fn emit(&mut self, event: TransportEvent) {
        self.events.on_event(event);
    }

    /// Frame bytes usable for PCI and data after the addressing prefix
    fn capacity(&self) -> usize {
        self.max_data_length - self.address.rx_prefix_size()
    }

    fn stop_receiving(&mut self) {
        self.rx_state = RxState::Idle;
        self.rx_buffer.clear();
        self.rx_frame_len = 0;
        self.rx_seq_num = 0;
        self.rx_block_counter = 0;
        self.timer_rx_cf.stop();
    }

    fn stop_sending(&mut self) {
        self.tx_state = TxState::Idle;
        self.tx_buffer.clear();
        self.tx_frame_len = 0;
        self.tx_seq_num = 0;
        self.tx_block_counter = 0;
        self.wft_counter = 0;
        self.timer_rx_fc.stop();
        self.timer_tx_st_min.stop();
    }

    /// Builds the raw CAN message for one frame payload: addressing
    /// prefix, then PCI and data, padded to a transmittable length
    fn make_tx_msg(&self, payload: &[u8], target: TargetType) -> CanMessage {
        let mut data: SmallVec<[u8; 8]> = SmallVec::new();
        data.extend_from_slice(self.address.tx_payload_prefix());
        data.extend_from_slice(payload);
        if self.fd {
            // FD frames only exist in the fixed length set
            data.resize(
                fd_frame_size(data.len()),
                self.config.padding.unwrap_or(FD_PADDING),
            );
        } else if let Some(padding) = self.config.padding {
            data.resize(self.max_data_length, padding);
        }
        CanMessage {
            id: self.address.tx_can_id(target),
            data,
            fd: self.fd,
        }
    }
}
