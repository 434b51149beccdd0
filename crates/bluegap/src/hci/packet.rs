//! HCI packet structures and parsing
//!
//! This module contains the commands the security engine issues and the raw
//! event framing it receives.

use crate::gap::BdAddr;
use crate::hci::constants::*;
use byteorder::{LittleEndian, WriteBytesExt};

/// HCI commands issued by the security engine
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HciCommand {
    // Link Control Commands (OGF: 0x01)
    Disconnect { handle: u16, reason: u8 },
    AuthenticationRequested { handle: u16 },
    SetConnectionEncryption { handle: u16, enable: bool },
    LinkKeyRequestReply { bd_addr: BdAddr, link_key: [u8; 16] },
    LinkKeyRequestNegativeReply { bd_addr: BdAddr },
    PinCodeRequestReply { bd_addr: BdAddr, pin: Vec<u8> },
    PinCodeRequestNegativeReply { bd_addr: BdAddr },
    IoCapabilityRequestReply {
        bd_addr: BdAddr,
        io_capability: u8,
        oob_data_present: u8,
        authentication_requirements: u8,
    },
    IoCapabilityRequestNegativeReply { bd_addr: BdAddr, reason: u8 },
    UserConfirmationRequestReply { bd_addr: BdAddr },
    UserConfirmationRequestNegativeReply { bd_addr: BdAddr },
    UserPasskeyRequestReply { bd_addr: BdAddr, passkey: u32 },
    UserPasskeyRequestNegativeReply { bd_addr: BdAddr },
    RemoteOobDataRequestReply { bd_addr: BdAddr, c: [u8; 16], r: [u8; 16] },
    RemoteOobDataRequestNegativeReply { bd_addr: BdAddr },

    // Host Controller Commands (OGF: 0x03)
    WriteSimplePairingMode { enable: bool },
    WriteSecureConnectionsHostSupport { enable: bool },
}

impl HciCommand {
    /// Get the OGF and OCF for this command
    pub fn opcode_parts(&self) -> (u8, u16) {
        match self {
            Self::Disconnect { .. } => (OGF_LINK_CTL, OCF_DISCONNECT),
            Self::AuthenticationRequested { .. } => (OGF_LINK_CTL, OCF_AUTHENTICATION_REQUESTED),
            Self::SetConnectionEncryption { .. } => (OGF_LINK_CTL, OCF_SET_CONNECTION_ENCRYPTION),
            Self::LinkKeyRequestReply { .. } => (OGF_LINK_CTL, OCF_LINK_KEY_REQUEST_REPLY),
            Self::LinkKeyRequestNegativeReply { .. } => {
                (OGF_LINK_CTL, OCF_LINK_KEY_REQUEST_NEGATIVE_REPLY)
            }
            Self::PinCodeRequestReply { .. } => (OGF_LINK_CTL, OCF_PIN_CODE_REQUEST_REPLY),
            Self::PinCodeRequestNegativeReply { .. } => {
                (OGF_LINK_CTL, OCF_PIN_CODE_REQUEST_NEGATIVE_REPLY)
            }
            Self::IoCapabilityRequestReply { .. } => (OGF_LINK_CTL, OCF_IO_CAPABILITY_REQUEST_REPLY),
            Self::IoCapabilityRequestNegativeReply { .. } => {
                (OGF_LINK_CTL, OCF_IO_CAPABILITY_REQUEST_NEGATIVE_REPLY)
            }
            Self::UserConfirmationRequestReply { .. } => {
                (OGF_LINK_CTL, OCF_USER_CONFIRMATION_REQUEST_REPLY)
            }
            Self::UserConfirmationRequestNegativeReply { .. } => {
                (OGF_LINK_CTL, OCF_USER_CONFIRMATION_REQUEST_NEGATIVE_REPLY)
            }
            Self::UserPasskeyRequestReply { .. } => (OGF_LINK_CTL, OCF_USER_PASSKEY_REQUEST_REPLY),
            Self::UserPasskeyRequestNegativeReply { .. } => {
                (OGF_LINK_CTL, OCF_USER_PASSKEY_REQUEST_NEGATIVE_REPLY)
            }
            Self::RemoteOobDataRequestReply { .. } => {
                (OGF_LINK_CTL, OCF_REMOTE_OOB_DATA_REQUEST_REPLY)
            }
            Self::RemoteOobDataRequestNegativeReply { .. } => {
                (OGF_LINK_CTL, OCF_REMOTE_OOB_DATA_REQUEST_NEGATIVE_REPLY)
            }
            Self::WriteSimplePairingMode { .. } => (OGF_HOST_CTL, OCF_WRITE_SIMPLE_PAIRING_MODE),
            Self::WriteSecureConnectionsHostSupport { .. } => {
                (OGF_HOST_CTL, OCF_WRITE_SECURE_CONNECTIONS_HOST_SUPPORT)
            }
        }
    }

    /// Packed 16-bit opcode
    pub fn opcode(&self) -> u16 {
        let (ogf, ocf) = self.opcode_parts();
        opcode(ogf, ocf)
    }

    /// Convert the command to its raw parameter bytes
    fn parameters(&self) -> Vec<u8> {
        let mut params = Vec::new();
        // Writes into a Vec cannot fail.
        let _ = self.write_parameters(&mut params);
        params
    }

    fn write_parameters(&self, params: &mut Vec<u8>) -> std::io::Result<()> {
        match self {
            Self::Disconnect { handle, reason } => {
                params.write_u16::<LittleEndian>(*handle)?;
                params.push(*reason);
            }
            Self::AuthenticationRequested { handle } => {
                params.write_u16::<LittleEndian>(*handle)?;
            }
            Self::SetConnectionEncryption { handle, enable } => {
                params.write_u16::<LittleEndian>(*handle)?;
                params.push(*enable as u8);
            }
            Self::LinkKeyRequestReply { bd_addr, link_key } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.extend_from_slice(link_key);
            }
            Self::PinCodeRequestReply { bd_addr, pin } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.push(pin.len() as u8);
                let mut padded = [0u8; PIN_CODE_MAX_LEN];
                let len = pin.len().min(PIN_CODE_MAX_LEN);
                padded[..len].copy_from_slice(&pin[..len]);
                params.extend_from_slice(&padded);
            }
            Self::IoCapabilityRequestReply {
                bd_addr,
                io_capability,
                oob_data_present,
                authentication_requirements,
            } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.push(*io_capability);
                params.push(*oob_data_present);
                params.push(*authentication_requirements);
            }
            Self::IoCapabilityRequestNegativeReply { bd_addr, reason } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.push(*reason);
            }
            Self::UserPasskeyRequestReply { bd_addr, passkey } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.write_u32::<LittleEndian>(*passkey)?;
            }
            Self::RemoteOobDataRequestReply { bd_addr, c, r } => {
                params.extend_from_slice(bd_addr.as_slice());
                params.extend_from_slice(c);
                params.extend_from_slice(r);
            }
            Self::LinkKeyRequestNegativeReply { bd_addr }
            | Self::PinCodeRequestNegativeReply { bd_addr }
            | Self::UserConfirmationRequestReply { bd_addr }
            | Self::UserConfirmationRequestNegativeReply { bd_addr }
            | Self::UserPasskeyRequestNegativeReply { bd_addr }
            | Self::RemoteOobDataRequestNegativeReply { bd_addr } => {
                params.extend_from_slice(bd_addr.as_slice());
            }
            Self::WriteSimplePairingMode { enable }
            | Self::WriteSecureConnectionsHostSupport { enable } => {
                params.push(*enable as u8);
            }
        }
        Ok(())
    }

    /// Convert the command to a raw HCI packet
    pub fn to_packet(&self) -> Vec<u8> {
        let params = self.parameters();

        let mut packet = vec![HCI_COMMAND_PKT];
        packet.extend_from_slice(&self.opcode().to_le_bytes());
        packet.push(params.len() as u8);
        packet.extend_from_slice(&params);
        packet
    }

    /// Peer address carried by a pairing reply command
    pub fn peer_address(&self) -> Option<BdAddr> {
        match self {
            Self::LinkKeyRequestReply { bd_addr, .. }
            | Self::LinkKeyRequestNegativeReply { bd_addr }
            | Self::PinCodeRequestReply { bd_addr, .. }
            | Self::PinCodeRequestNegativeReply { bd_addr }
            | Self::IoCapabilityRequestReply { bd_addr, .. }
            | Self::IoCapabilityRequestNegativeReply { bd_addr, .. }
            | Self::UserConfirmationRequestReply { bd_addr }
            | Self::UserConfirmationRequestNegativeReply { bd_addr }
            | Self::UserPasskeyRequestReply { bd_addr, .. }
            | Self::UserPasskeyRequestNegativeReply { bd_addr }
            | Self::RemoteOobDataRequestReply { bd_addr, .. }
            | Self::RemoteOobDataRequestNegativeReply { bd_addr } => Some(*bd_addr),
            _ => None,
        }
    }
}

/// Pack an OGF/OCF pair into a 16-bit opcode
pub const fn opcode(ogf: u8, ocf: u16) -> u16 {
    ((ogf as u16) << 10) | (ocf & 0x3ff)
}

/// HCI Event packet
#[derive(Debug, Clone)]
pub struct HciEvent {
    pub event_code: u8,
    pub parameter_total_length: u8,
    pub parameters: Vec<u8>,
}

impl HciEvent {
    /// Parse an HCI event from raw bytes (without the packet type indicator)
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }

        let event_code = data[0];
        let parameter_total_length = data[1];

        if data.len() < (parameter_total_length as usize + 2) {
            return None;
        }

        let parameters = data[2..(parameter_total_length as usize + 2)].to_vec();

        Some(HciEvent {
            event_code,
            parameter_total_length,
            parameters,
        })
    }
}

/// LE Advertising Report
///
/// Owned copy of one report; the payload travels with the resolution task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeAdvertisingReport {
    pub event_type: u8,
    pub address_type: u8,
    pub address: BdAddr,
    pub data: Vec<u8>,
    pub rssi: i8,
}
