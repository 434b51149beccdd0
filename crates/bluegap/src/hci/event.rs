//! Typed decoding of the controller events the security engine consumes
//!
//! Decoding produces owned values so an event can be moved onto the
//! dispatcher without borrowing the controller's receive buffer.

use super::constants::*;
use super::packet::{HciEvent, LeAdvertisingReport};
use crate::gap::BdAddr;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

/// Controller events relevant to security orchestration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    ConnectionComplete {
        status: u8,
        handle: u16,
        bd_addr: BdAddr,
        link_type: u8,
    },
    DisconnectionComplete {
        status: u8,
        handle: u16,
        reason: u8,
    },
    AuthenticationComplete {
        status: u8,
        handle: u16,
    },
    EncryptionChange {
        status: u8,
        handle: u16,
        enabled: bool,
    },
    EncryptionKeyRefreshComplete {
        status: u8,
        handle: u16,
    },
    /// Command Complete for one of the pairing reply commands
    ReplyComplete {
        opcode: u16,
        status: u8,
        bd_addr: BdAddr,
    },
    PinCodeRequest {
        bd_addr: BdAddr,
    },
    LinkKeyRequest {
        bd_addr: BdAddr,
    },
    LinkKeyNotification {
        bd_addr: BdAddr,
        link_key: [u8; 16],
        key_type: u8,
    },
    IoCapabilityRequest {
        bd_addr: BdAddr,
    },
    IoCapabilityResponse {
        bd_addr: BdAddr,
        io_capability: u8,
        oob_data_present: u8,
        authentication_requirements: u8,
    },
    UserConfirmationRequest {
        bd_addr: BdAddr,
        numeric_value: u32,
    },
    UserPasskeyRequest {
        bd_addr: BdAddr,
    },
    UserPasskeyNotification {
        bd_addr: BdAddr,
        passkey: u32,
    },
    RemoteOobDataRequest {
        bd_addr: BdAddr,
    },
    SimplePairingComplete {
        status: u8,
        bd_addr: BdAddr,
    },
    RemoteHostSupportedFeatures {
        bd_addr: BdAddr,
        features: u64,
    },
    LeConnectionComplete {
        status: u8,
        handle: u16,
        role: u8,
        peer_address_type: u8,
        peer_address: BdAddr,
    },
    LeAdvertisingReports(Vec<LeAdvertisingReport>),
}

impl ControllerEvent {
    /// Decode a raw event. Returns `None` for events the engine ignores or
    /// that are truncated.
    pub fn decode(event: &HciEvent) -> Option<Self> {
        let mut cursor = Cursor::new(event.parameters.as_slice());
        let decoded = match event.event_code {
            EVT_CONN_COMPLETE => ControllerEvent::ConnectionComplete {
                status: cursor.read_u8().ok()?,
                handle: read_handle(&mut cursor)?,
                bd_addr: read_addr(&mut cursor)?,
                link_type: cursor.read_u8().ok()?,
            },
            EVT_DISCONN_COMPLETE => ControllerEvent::DisconnectionComplete {
                status: cursor.read_u8().ok()?,
                handle: read_handle(&mut cursor)?,
                reason: cursor.read_u8().ok()?,
            },
            EVT_AUTH_COMPLETE => ControllerEvent::AuthenticationComplete {
                status: cursor.read_u8().ok()?,
                handle: read_handle(&mut cursor)?,
            },
            EVT_ENCRYPTION_CHANGE => ControllerEvent::EncryptionChange {
                status: cursor.read_u8().ok()?,
                handle: read_handle(&mut cursor)?,
                enabled: cursor.read_u8().ok()? != 0,
            },
            EVT_ENCRYPTION_KEY_REFRESH_COMPLETE => ControllerEvent::EncryptionKeyRefreshComplete {
                status: cursor.read_u8().ok()?,
                handle: read_handle(&mut cursor)?,
            },
            EVT_CMD_COMPLETE => {
                let _num_hci_command_packets = cursor.read_u8().ok()?;
                let opcode = cursor.read_u16::<LittleEndian>().ok()?;
                if !is_reply_opcode(opcode) {
                    return None;
                }
                ControllerEvent::ReplyComplete {
                    opcode,
                    status: cursor.read_u8().ok()?,
                    bd_addr: read_addr(&mut cursor)?,
                }
            }
            EVT_PIN_CODE_REQUEST => ControllerEvent::PinCodeRequest {
                bd_addr: read_addr(&mut cursor)?,
            },
            EVT_LINK_KEY_REQUEST => ControllerEvent::LinkKeyRequest {
                bd_addr: read_addr(&mut cursor)?,
            },
            EVT_LINK_KEY_NOTIFICATION => {
                let bd_addr = read_addr(&mut cursor)?;
                let mut link_key = [0u8; 16];
                cursor.read_exact(&mut link_key).ok()?;
                ControllerEvent::LinkKeyNotification {
                    bd_addr,
                    link_key,
                    key_type: cursor.read_u8().ok()?,
                }
            }
            EVT_IO_CAPABILITY_REQUEST => ControllerEvent::IoCapabilityRequest {
                bd_addr: read_addr(&mut cursor)?,
            },
            EVT_IO_CAPABILITY_RESPONSE => ControllerEvent::IoCapabilityResponse {
                bd_addr: read_addr(&mut cursor)?,
                io_capability: cursor.read_u8().ok()?,
                oob_data_present: cursor.read_u8().ok()?,
                authentication_requirements: cursor.read_u8().ok()?,
            },
            EVT_USER_CONFIRMATION_REQUEST => ControllerEvent::UserConfirmationRequest {
                bd_addr: read_addr(&mut cursor)?,
                numeric_value: cursor.read_u32::<LittleEndian>().ok()?,
            },
            EVT_USER_PASSKEY_REQUEST => ControllerEvent::UserPasskeyRequest {
                bd_addr: read_addr(&mut cursor)?,
            },
            EVT_USER_PASSKEY_NOTIFICATION => ControllerEvent::UserPasskeyNotification {
                bd_addr: read_addr(&mut cursor)?,
                passkey: cursor.read_u32::<LittleEndian>().ok()?,
            },
            EVT_REMOTE_OOB_DATA_REQUEST => ControllerEvent::RemoteOobDataRequest {
                bd_addr: read_addr(&mut cursor)?,
            },
            EVT_SIMPLE_PAIRING_COMPLETE => ControllerEvent::SimplePairingComplete {
                status: cursor.read_u8().ok()?,
                bd_addr: read_addr(&mut cursor)?,
            },
            EVT_REMOTE_HOST_SUPPORTED_FEATURES => ControllerEvent::RemoteHostSupportedFeatures {
                bd_addr: read_addr(&mut cursor)?,
                features: cursor.read_u64::<LittleEndian>().ok()?,
            },
            EVT_LE_META_EVENT => return decode_le_meta(&mut cursor),
            _ => return None,
        };
        Some(decoded)
    }
}

fn decode_le_meta(cursor: &mut Cursor<&[u8]>) -> Option<ControllerEvent> {
    match cursor.read_u8().ok()? {
        EVT_LE_CONN_COMPLETE => Some(ControllerEvent::LeConnectionComplete {
            status: cursor.read_u8().ok()?,
            handle: read_handle(cursor)?,
            role: cursor.read_u8().ok()?,
            peer_address_type: cursor.read_u8().ok()?,
            peer_address: read_addr(cursor)?,
        }),
        EVT_LE_ADVERTISING_REPORT => {
            let num_reports = cursor.read_u8().ok()?;
            let mut reports = Vec::with_capacity(num_reports as usize);
            for _ in 0..num_reports {
                let event_type = cursor.read_u8().ok()?;
                let address_type = cursor.read_u8().ok()?;
                let address = read_addr(cursor)?;
                let data_length = cursor.read_u8().ok()?;
                let mut data = vec![0u8; data_length as usize];
                cursor.read_exact(&mut data).ok()?;
                let rssi = cursor.read_i8().ok()?;
                reports.push(LeAdvertisingReport {
                    event_type,
                    address_type,
                    address,
                    data,
                    rssi,
                });
            }
            Some(ControllerEvent::LeAdvertisingReports(reports))
        }
        _ => None,
    }
}

fn read_handle(cursor: &mut Cursor<&[u8]>) -> Option<u16> {
    cursor
        .read_u16::<LittleEndian>()
        .ok()
        .map(|handle| handle & 0x0FFF)
}

fn read_addr(cursor: &mut Cursor<&[u8]>) -> Option<BdAddr> {
    let mut bytes = [0u8; 6];
    cursor.read_exact(&mut bytes).ok()?;
    Some(BdAddr::new(bytes))
}

fn is_reply_opcode(opcode: u16) -> bool {
    use super::packet::opcode as op;
    [
        op(OGF_LINK_CTL, OCF_LINK_KEY_REQUEST_REPLY),
        op(OGF_LINK_CTL, OCF_LINK_KEY_REQUEST_NEGATIVE_REPLY),
        op(OGF_LINK_CTL, OCF_PIN_CODE_REQUEST_REPLY),
        op(OGF_LINK_CTL, OCF_PIN_CODE_REQUEST_NEGATIVE_REPLY),
        op(OGF_LINK_CTL, OCF_IO_CAPABILITY_REQUEST_REPLY),
        op(OGF_LINK_CTL, OCF_IO_CAPABILITY_REQUEST_NEGATIVE_REPLY),
        op(OGF_LINK_CTL, OCF_USER_CONFIRMATION_REQUEST_REPLY),
        op(OGF_LINK_CTL, OCF_USER_CONFIRMATION_REQUEST_NEGATIVE_REPLY),
        op(OGF_LINK_CTL, OCF_USER_PASSKEY_REQUEST_REPLY),
        op(OGF_LINK_CTL, OCF_USER_PASSKEY_REQUEST_NEGATIVE_REPLY),
        op(OGF_LINK_CTL, OCF_REMOTE_OOB_DATA_REQUEST_REPLY),
        op(OGF_LINK_CTL, OCF_REMOTE_OOB_DATA_REQUEST_NEGATIVE_REPLY),
    ]
    .contains(&opcode)
}
