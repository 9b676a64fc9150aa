use crate::driver::CanMessage;
use embedded_can::{ExtendedId, Id, StandardId};

const MAX_11BIT_ID: u32 = 0x7FF;
const MAX_29BIT_ID: u32 = 0x1FFF_FFFF;

/// ISO 15765-2/-4 addressing schemes
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressingMode {
    /// Normal addressing with 11 bit arbitration ids
    Normal11Bit,
    /// Normal addressing with 29 bit arbitration ids
    Normal29Bit,
    /// Normal fixed addressing, 29 bit ids derived from source and target address (ISO 15765-4)
    NormalFixed,
    /// Extended addressing, the target address prefixes the payload
    Extended,
    /// Mixed addressing, the address extension prefixes the payload
    Mixed,
}

/// Distinguishes 1:1 and 1:N requests
///
/// Functional addressing is only valid for single frame requests per
/// ISO-TP, the stack does not enforce this itself.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TargetType {
    /// Point to point request
    Physical,
    /// Broadcast request to all servers
    Functional,
}

/// Invalid addressing configuration
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressError {
    /// Tx and rx arbitration id are identical
    #[error("tx and rx arbitration ids collide")]
    IdCollision,
    /// Arbitration id does not fit the addressing mode
    #[error("arbitration id {0:#x} is out of range for the addressing mode")]
    IdOutOfRange(u32),
    /// Extended and mixed addressing require an address extension byte
    #[error("addressing mode requires an address extension byte")]
    MissingExtensionByte,
}

/// One configured address pair of a conversation
///
/// Immutable after construction, owned exclusively by one
/// [Transport](crate::transport::Transport).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Address {
    mode: AddressingMode,
    tx_id: u32,
    rx_id: u32,
    functional_tx_id: Option<u32>,
    extension: Option<u8>,
}

impl Address {
    /// Creates an address for modes without an address extension byte
    pub fn new(mode: AddressingMode, tx_id: u32, rx_id: u32) -> Result<Self, AddressError> {
        Self::build(mode, tx_id, rx_id, None)
    }

    /// Creates an extended or mixed address with the given extension byte
    pub fn with_extension(
        mode: AddressingMode,
        tx_id: u32,
        rx_id: u32,
        extension: u8,
    ) -> Result<Self, AddressError> {
        Self::build(mode, tx_id, rx_id, Some(extension))
    }

    /// Creates a normal fixed address from a source and target address pair
    ///
    /// Arbitration ids follow ISO 15765-4: 0x18DAttss for physical and
    /// 0x18DBttss for functional requests.
    pub fn normal_fixed(source_address: u8, target_address: u8) -> Self {
        Self {
            mode: AddressingMode::NormalFixed,
            tx_id: 0x18DA_0000 | (target_address as u32) << 8 | source_address as u32,
            rx_id: 0x18DA_0000 | (source_address as u32) << 8 | target_address as u32,
            functional_tx_id: Some(
                0x18DB_0000 | (target_address as u32) << 8 | source_address as u32,
            ),
            extension: None,
        }
    }

    /// Sets a dedicated arbitration id for functional requests
    pub fn with_functional_tx_id(mut self, id: u32) -> Result<Self, AddressError> {
        if id > self.max_id() {
            return Err(AddressError::IdOutOfRange(id));
        }
        self.functional_tx_id = Some(id);
        Ok(self)
    }

    fn build(
        mode: AddressingMode,
        tx_id: u32,
        rx_id: u32,
        extension: Option<u8>,
    ) -> Result<Self, AddressError> {
        let address = Self {
            mode,
            tx_id,
            rx_id,
            functional_tx_id: None,
            extension,
        };
        if tx_id == rx_id {
            return Err(AddressError::IdCollision);
        }
        for id in [tx_id, rx_id] {
            if id > address.max_id() {
                return Err(AddressError::IdOutOfRange(id));
            }
        }
        if matches!(mode, AddressingMode::Extended | AddressingMode::Mixed) && extension.is_none() {
            return Err(AddressError::MissingExtensionByte);
        }
        Ok(address)
    }

    fn max_id(&self) -> u32 {
        if self.mode == AddressingMode::Normal11Bit {
            MAX_11BIT_ID
        } else {
            MAX_29BIT_ID
        }
    }

    /// True if this address pair transmits with 29 bit arbitration ids
    pub fn is_29bit(&self) -> bool {
        match self.mode {
            AddressingMode::Normal11Bit => false,
            AddressingMode::Normal29Bit | AddressingMode::NormalFixed => true,
            // extended and mixed addressing exist in both widths,
            // derived from the configured id range
            AddressingMode::Extended | AddressingMode::Mixed => {
                self.tx_id > MAX_11BIT_ID || self.rx_id > MAX_11BIT_ID
            }
        }
    }

    /// Checks if the frame belongs to this conversation
    pub fn is_for_me(&self, msg: &CanMessage) -> bool {
        if msg.is_extended() != self.is_29bit() || msg.raw_id() != self.rx_id {
            return false;
        }
        match self.extension {
            Some(extension) => msg.data.first() == Some(&extension),
            None => true,
        }
    }

    /// Number of payload bytes consumed by addressing before the PCI
    pub fn rx_prefix_size(&self) -> usize {
        self.tx_payload_prefix().len()
    }

    /// Bytes prepended before the PCI on transmit
    pub fn tx_payload_prefix(&self) -> &[u8] {
        match &self.extension {
            Some(extension) => core::slice::from_ref(extension),
            None => &[],
        }
    }

    /// Raw arbitration id used to transmit to the given target
    ///
    /// Falls back to the physical id if no functional id is configured.
    pub fn tx_arbitration_id(&self, target: TargetType) -> u32 {
        match target {
            TargetType::Physical => self.tx_id,
            TargetType::Functional => self.functional_tx_id.unwrap_or(self.tx_id),
        }
    }

    /// Typed arbitration id used to transmit to the given target
    pub fn tx_can_id(&self, target: TargetType) -> Id {
        let id = self.tx_arbitration_id(target);
        if self.is_29bit() {
            Id::Extended(ExtendedId::new(id).unwrap())
        } else {
            Id::Standard(StandardId::new(id as u16).unwrap())
        }
    }
}
