//! HCI protocol constants
//!
//! This module contains the HCI opcodes, event codes and status values used by
//! the security engine.

// HCI packet types
pub const HCI_COMMAND_PKT: u8 = 0x01;
pub const HCI_EVENT_PKT: u8 = 0x04;

// Maximum size of HCI command parameters
pub const HCI_MAX_PARAM_LEN: usize = 255;

// Common OGF (Opcode Group Field) values
pub const OGF_LINK_CTL: u8 = 0x01;
pub const OGF_HOST_CTL: u8 = 0x03;

// Link Control Commands (OGF: 0x01)
pub const OCF_DISCONNECT: u16 = 0x0006;
pub const OCF_LINK_KEY_REQUEST_REPLY: u16 = 0x000B;
pub const OCF_LINK_KEY_REQUEST_NEGATIVE_REPLY: u16 = 0x000C;
pub const OCF_PIN_CODE_REQUEST_REPLY: u16 = 0x000D;
pub const OCF_PIN_CODE_REQUEST_NEGATIVE_REPLY: u16 = 0x000E;
pub const OCF_AUTHENTICATION_REQUESTED: u16 = 0x0011;
pub const OCF_SET_CONNECTION_ENCRYPTION: u16 = 0x0013;
pub const OCF_IO_CAPABILITY_REQUEST_REPLY: u16 = 0x002B;
pub const OCF_USER_CONFIRMATION_REQUEST_REPLY: u16 = 0x002C;
pub const OCF_USER_CONFIRMATION_REQUEST_NEGATIVE_REPLY: u16 = 0x002D;
pub const OCF_USER_PASSKEY_REQUEST_REPLY: u16 = 0x002E;
pub const OCF_USER_PASSKEY_REQUEST_NEGATIVE_REPLY: u16 = 0x002F;
pub const OCF_REMOTE_OOB_DATA_REQUEST_REPLY: u16 = 0x0030;
pub const OCF_REMOTE_OOB_DATA_REQUEST_NEGATIVE_REPLY: u16 = 0x0033;
pub const OCF_IO_CAPABILITY_REQUEST_NEGATIVE_REPLY: u16 = 0x0034;

// Host Controller Commands (OGF: 0x03)
pub const OCF_WRITE_SIMPLE_PAIRING_MODE: u16 = 0x0056;
pub const OCF_WRITE_SECURE_CONNECTIONS_HOST_SUPPORT: u16 = 0x007A;

// HCI Events
pub const EVT_CONN_COMPLETE: u8 = 0x03;
pub const EVT_DISCONN_COMPLETE: u8 = 0x05;
pub const EVT_AUTH_COMPLETE: u8 = 0x06;
pub const EVT_ENCRYPTION_CHANGE: u8 = 0x08;
pub const EVT_CMD_COMPLETE: u8 = 0x0E;
pub const EVT_PIN_CODE_REQUEST: u8 = 0x16;
pub const EVT_LINK_KEY_REQUEST: u8 = 0x17;
pub const EVT_LINK_KEY_NOTIFICATION: u8 = 0x18;
pub const EVT_ENCRYPTION_KEY_REFRESH_COMPLETE: u8 = 0x30;
pub const EVT_IO_CAPABILITY_REQUEST: u8 = 0x31;
pub const EVT_IO_CAPABILITY_RESPONSE: u8 = 0x32;
pub const EVT_USER_CONFIRMATION_REQUEST: u8 = 0x33;
pub const EVT_USER_PASSKEY_REQUEST: u8 = 0x34;
pub const EVT_REMOTE_OOB_DATA_REQUEST: u8 = 0x35;
pub const EVT_SIMPLE_PAIRING_COMPLETE: u8 = 0x36;
pub const EVT_USER_PASSKEY_NOTIFICATION: u8 = 0x3B;
pub const EVT_REMOTE_HOST_SUPPORTED_FEATURES: u8 = 0x3D;
pub const EVT_LE_META_EVENT: u8 = 0x3E;

// LE Meta Events
pub const EVT_LE_CONN_COMPLETE: u8 = 0x01;
pub const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// Link types in Connection Complete
pub const LINK_TYPE_ACL: u8 = 0x01;

// HCI status codes
pub const HCI_SUCCESS: u8 = 0x00;
pub const HCI_UNKNOWN_CONNECTION: u8 = 0x02;
pub const HCI_AUTHENTICATION_FAILURE: u8 = 0x05;
pub const HCI_PIN_OR_KEY_MISSING: u8 = 0x06;
pub const HCI_CONNECTION_TIMEOUT: u8 = 0x08;
pub const HCI_UNSUPPORTED_FEATURE: u8 = 0x11;
pub const HCI_INVALID_PARAMETERS: u8 = 0x12;
pub const HCI_REMOTE_USER_TERMINATED: u8 = 0x13;
pub const HCI_PAIRING_NOT_ALLOWED: u8 = 0x18;
pub const HCI_UNSPECIFIED_ERROR: u8 = 0x1F;
pub const HCI_INSUFFICIENT_SECURITY: u8 = 0x2F;

// Link key types
pub const LINK_KEY_COMBINATION: u8 = 0x00;
pub const LINK_KEY_DEBUG_COMBINATION: u8 = 0x03;
pub const LINK_KEY_UNAUTHENTICATED_P192: u8 = 0x04;
pub const LINK_KEY_AUTHENTICATED_P192: u8 = 0x05;
pub const LINK_KEY_CHANGED_COMBINATION: u8 = 0x06;
pub const LINK_KEY_UNAUTHENTICATED_P256: u8 = 0x07;
pub const LINK_KEY_AUTHENTICATED_P256: u8 = 0x08;

// Classic authentication requirements (IO Capability exchange)
pub const AUTH_REQ_NO_MITM_NO_BONDING: u8 = 0x00;
pub const AUTH_REQ_MITM_NO_BONDING: u8 = 0x01;
pub const AUTH_REQ_NO_MITM_DEDICATED_BONDING: u8 = 0x02;
pub const AUTH_REQ_MITM_DEDICATED_BONDING: u8 = 0x03;
pub const AUTH_REQ_NO_MITM_GENERAL_BONDING: u8 = 0x04;
pub const AUTH_REQ_MITM_GENERAL_BONDING: u8 = 0x05;
pub const AUTH_REQ_UNKNOWN: u8 = 0xFF;

// MITM flag as passed by profile clients
pub const MITM_NOT_REQUIRED: u8 = 0x00;
pub const MITM_REQUIRED: u8 = 0x01;

// Remote host supported features, page 1
pub const HOST_FEATURE_SSP: u64 = 0x01;

// PIN code length limit
pub const PIN_CODE_MAX_LEN: usize = 16;
