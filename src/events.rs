use crate::frame::FrameError;

/// Structured diagnostic events emitted by the transport
///
/// Every locally recovered protocol failure and every completed message
/// is reported here instead of a process wide logger. All events are
/// informational, the state machines already performed their reset when
/// an event is emitted.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportEvent {
    /// A malformed frame was dropped
    FrameDropped(FrameError),
    /// A single or first frame preempted an active reassembly
    ReassemblyInterrupted,
    /// A consecutive frame arrived outside an active reassembly
    UnexpectedConsecutiveFrame,
    /// A consecutive frame carried the wrong sequence number
    SequenceMismatch {
        /// Next expected sequence number
        expected: u8,
        /// Sequence number actually received
        received: u8,
    },
    /// No consecutive frame arrived within the configured timeout
    ConsecutiveFrameTimeout,
    /// No flow control grant arrived within the configured timeout
    FlowControlTimeout,
    /// The peer sent more wait grants than the local policy allows
    WaitLimitExceeded {
        /// Configured maximum number of wait frames
        limit: u8,
    },
    /// The peer signalled a receive buffer overflow
    RemoteOverflow,
    /// A flow control frame arrived while no send was active
    UnexpectedFlowControl,
    /// A reassembled message was placed into the receive queue
    ReceiveCompleted {
        /// Message length in bytes
        len: usize,
    },
    /// The last frame of an outbound message was handed to the adapter
    SendCompleted {
        /// Message length in bytes
        len: usize,
    },
}

/// Receives [TransportEvent]s, injected into the transport at construction
pub trait EventSink {
    /// Called once per event, must not block
    fn on_event(&mut self, event: TransportEvent);
}

/// Default sink discarding all events
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&mut self, _event: TransportEvent) {}
}
