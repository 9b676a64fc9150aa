use smallvec::SmallVec;

/// A raw CAN or CAN FD frame exchanged with the adapter
///
/// Classic frames carry up to 8 data bytes, FD frames up to 64.
/// The message is immutable once constructed and owned by exactly one
/// layer at a time.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CanMessage {
    /// Arbitration id, 11 bit standard or 29 bit extended
    pub id: embedded_can::Id,
    /// Frame payload
    pub data: SmallVec<[u8; 8]>,
    /// True for a CAN FD frame
    pub fd: bool,
}

impl CanMessage {
    /// Creates a new message, the data is copied
    pub fn new(id: embedded_can::Id, data: &[u8], fd: bool) -> Self {
        Self {
            id,
            data: SmallVec::from_slice(data),
            fd,
        }
    }
    /// Raw arbitration id without the extended flag
    pub fn raw_id(&self) -> u32 {
        match self.id {
            embedded_can::Id::Standard(id) => id.as_raw() as u32,
            embedded_can::Id::Extended(id) => id.as_raw(),
        }
    }
    /// True if the message uses a 29 bit arbitration id
    pub fn is_extended(&self) -> bool {
        matches!(self.id, embedded_can::Id::Extended(_))
    }
}

/// Non blocking access to a CAN adapter
///
/// The stack never waits on the adapter, both operations must return
/// immediately.
pub trait CanDriver {
    /// Fetches one pending frame from the adapter, if any
    fn receive(&mut self) -> Option<CanMessage>;
    /// Hands one frame to the adapter for transmission
    ///
    /// Returns false if the adapter can not take the frame right now,
    /// the frame is dropped in that case.
    fn transmit(&mut self, frame: &CanMessage) -> bool;
}
