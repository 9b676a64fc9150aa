use num_enum::TryFromPrimitive;
use smallvec::SmallVec;

/// PCI and data bytes of one ISO-TP frame, without the addressing prefix
pub type FramePayload = SmallVec<[u8; 8]>;

const PCI_SINGLE: u8 = 0x0;
const PCI_FIRST: u8 = 0x1;
const PCI_CONSECUTIVE: u8 = 0x2;
const PCI_FLOW_CONTROL: u8 = 0x3;

/// Largest message length expressible in the 12 bit first frame length field
pub const MAX_12BIT_LENGTH: u32 = 4095;

/// Valid CAN FD frame lengths above 8 bytes
const FD_SIZES: [usize; 6] = [12, 16, 20, 24, 32, 48];

/// Flow status nibble of a flow control frame
#[derive(Debug, PartialEq, Eq, Clone, Copy, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FlowStatus {
    /// The peer grants transmission of the next block
    ContinueToSend = 0,
    /// The peer is alive but not ready, keep waiting
    Wait = 1,
    /// The peer can not buffer the announced message
    Overflow = 2,
}

/// A decoded flow control frame
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlowControl {
    /// Flow status of this grant
    pub status: FlowStatus,
    /// Consecutive frames allowed per block, 0 = unlimited
    pub block_size: u8,
    /// Minimum separation time between consecutive frames in microseconds
    pub st_min_us: u32,
}

/// One ISO-TP frame decoded from a raw CAN payload
///
/// Frames are transient, constructed per poll cycle and never persisted.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Frame {
    /// A complete message in one frame
    Single {
        /// Message bytes
        data: FramePayload,
    },
    /// Start of a segmented message
    First {
        /// Declared length of the whole message
        total_size: u32,
        /// Initial chunk
        data: FramePayload,
    },
    /// One segment of an ongoing message
    Consecutive {
        /// Sequence number 0..15, wrapping
        sequence_number: u8,
        /// Segment bytes, may include trailing padding
        data: FramePayload,
    },
    /// Flow control grant from the receiving side
    FlowControl(FlowControl),
}

/// A malformed frame, dropped without touching the state machines
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload ends before the PCI is complete
    #[error("frame is too short for its PCI")]
    Truncated,
    /// Reserved PCI type nibble
    #[error("unsupported PCI type {0:#x}")]
    UnsupportedPciType(u8),
    /// A frame declaring zero data bytes
    #[error("frame declares a zero length")]
    ZeroLength,
    /// The declared length does not fit the received payload
    #[error("declared length {declared} exceeds the {available} available bytes")]
    LengthExceedsPayload {
        /// Length taken from the PCI
        declared: usize,
        /// Data bytes actually present after the PCI
        available: usize,
    },
    /// Reserved flow status nibble
    #[error("invalid flow status {0:#x}")]
    InvalidFlowStatus(u8),
    /// Reserved STmin code
    #[error("invalid STmin code {0:#x}")]
    InvalidStMin(u8),
    /// The data does not fit the frame size given to the serializer
    #[error("payload does not fit into a frame of {0} bytes")]
    PayloadTooLarge(usize),
}

/// Classifies a raw CAN payload after stripping `prefix_size` addressing bytes
pub fn parse_frame(payload: &[u8], prefix_size: usize) -> Result<Frame, FrameError> {
    let pdu = payload.get(prefix_size..).ok_or(FrameError::Truncated)?;
    let pci = *pdu.first().ok_or(FrameError::Truncated)?;
    match pci >> 4 {
        PCI_SINGLE => parse_single(pdu),
        PCI_FIRST => parse_first(pdu),
        PCI_CONSECUTIVE => {
            if pdu.len() < 2 {
                return Err(FrameError::Truncated);
            }
            Ok(Frame::Consecutive {
                sequence_number: pci & 0xF,
                data: FramePayload::from_slice(&pdu[1..]),
            })
        }
        PCI_FLOW_CONTROL => parse_flow_control(pdu),
        other => Err(FrameError::UnsupportedPciType(other)),
    }
}

fn parse_single(pdu: &[u8]) -> Result<Frame, FrameError> {
    let (len, data) = if pdu[0] & 0xF == 0 {
        // FD length escape, the full length is in the second PCI byte
        let len = *pdu.get(1).ok_or(FrameError::Truncated)? as usize;
        (len, &pdu[2..])
    } else {
        ((pdu[0] & 0xF) as usize, &pdu[1..])
    };
    if len == 0 {
        return Err(FrameError::ZeroLength);
    }
    if len > data.len() {
        return Err(FrameError::LengthExceedsPayload {
            declared: len,
            available: data.len(),
        });
    }
    Ok(Frame::Single {
        data: FramePayload::from_slice(&data[..len]),
    })
}

fn parse_first(pdu: &[u8]) -> Result<Frame, FrameError> {
    if pdu.len() < 2 {
        return Err(FrameError::Truncated);
    }
    let short_size = ((pdu[0] & 0xF) as u32) << 8 | pdu[1] as u32;
    let (total_size, data) = if short_size == 0 {
        // 32 bit escape length, big endian
        if pdu.len() < 6 {
            return Err(FrameError::Truncated);
        }
        let total = u32::from_be_bytes([pdu[2], pdu[3], pdu[4], pdu[5]]);
        (total, &pdu[6..])
    } else {
        (short_size, &pdu[2..])
    };
    if total_size == 0 {
        return Err(FrameError::ZeroLength);
    }
    if data.is_empty() {
        return Err(FrameError::Truncated);
    }
    Ok(Frame::First {
        total_size,
        data: FramePayload::from_slice(data),
    })
}

fn parse_flow_control(pdu: &[u8]) -> Result<Frame, FrameError> {
    if pdu.len() < 3 {
        return Err(FrameError::Truncated);
    }
    let status =
        FlowStatus::try_from(pdu[0] & 0xF).map_err(|_| FrameError::InvalidFlowStatus(pdu[0] & 0xF))?;
    let st_min_us = decode_st_min(pdu[2])?;
    Ok(Frame::FlowControl(FlowControl {
        status,
        block_size: pdu[1],
        st_min_us,
    }))
}

/// Decodes an STmin code into microseconds
///
/// 0x00..=0x7F are milliseconds, 0xF1..=0xF9 are 100..900 microseconds,
/// everything else is reserved.
pub fn decode_st_min(code: u8) -> Result<u32, FrameError> {
    match code {
        0x00..=0x7F => Ok(code as u32 * 1000),
        0xF1..=0xF9 => Ok((code - 0xF0) as u32 * 100),
        _ => Err(FrameError::InvalidStMin(code)),
    }
}

/// Encodes a millisecond STmin into its wire code, saturating at 127 ms
pub fn encode_st_min(st_min_ms: u32) -> u8 {
    st_min_ms.min(0x7F) as u8
}

/// Serializes a single frame PCI and data
///
/// Uses the 1 byte PCI for up to 7 data bytes and the 2 byte FD length
/// escape above, consistent with [parse_frame].
pub fn single_frame_payload(data: &[u8], max_data_length: usize) -> Result<FramePayload, FrameError> {
    let pci_size = if data.len() <= 7 { 1 } else { 2 };
    if data.is_empty() {
        return Err(FrameError::ZeroLength);
    }
    if data.len() + pci_size > max_data_length {
        return Err(FrameError::PayloadTooLarge(max_data_length));
    }
    let mut payload = FramePayload::new();
    if pci_size == 1 {
        payload.push(data.len() as u8);
    } else {
        payload.push(0x00);
        payload.push(data.len() as u8);
    }
    payload.extend_from_slice(data);
    Ok(payload)
}

/// Serializes a first frame carrying the initial chunk of `total_size` bytes
pub fn first_frame_payload(
    chunk: &[u8],
    total_size: u32,
    max_data_length: usize,
) -> Result<FramePayload, FrameError> {
    let mut payload = FramePayload::new();
    if total_size <= MAX_12BIT_LENGTH {
        payload.push(0x10 | (total_size >> 8) as u8);
        payload.push(total_size as u8);
    } else {
        payload.push(0x10);
        payload.push(0x00);
        payload.extend_from_slice(&total_size.to_be_bytes());
    }
    if payload.len() + chunk.len() > max_data_length {
        return Err(FrameError::PayloadTooLarge(max_data_length));
    }
    payload.extend_from_slice(chunk);
    Ok(payload)
}

/// Serializes a consecutive frame with the given sequence number
pub fn consecutive_frame_payload(
    chunk: &[u8],
    sequence_number: u8,
    max_data_length: usize,
) -> Result<FramePayload, FrameError> {
    if 1 + chunk.len() > max_data_length {
        return Err(FrameError::PayloadTooLarge(max_data_length));
    }
    let mut payload = FramePayload::new();
    payload.push(0x20 | (sequence_number & 0xF));
    payload.extend_from_slice(chunk);
    Ok(payload)
}

/// Serializes a flow control frame with the local receive policy
pub fn flow_control_payload(status: FlowStatus, block_size: u8, st_min_ms: u32) -> FramePayload {
    let mut payload = FramePayload::new();
    payload.push(0x30 | status as u8);
    payload.push(block_size);
    payload.push(encode_st_min(st_min_ms));
    payload
}

/// Rounds a payload length up to the next valid CAN FD frame size
pub fn fd_frame_size(len: usize) -> usize {
    if len <= 8 {
        return len;
    }
    for size in FD_SIZES {
        if len <= size {
            return size;
        }
    }
    64
}
