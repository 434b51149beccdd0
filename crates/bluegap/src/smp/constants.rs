//! Constants for the Security Manager Protocol

// IO Capability values
pub const SMP_IO_CAPABILITY_DISPLAY_ONLY: u8 = 0x00;
pub const SMP_IO_CAPABILITY_DISPLAY_YES_NO: u8 = 0x01;
pub const SMP_IO_CAPABILITY_KEYBOARD_ONLY: u8 = 0x02;
pub const SMP_IO_CAPABILITY_NO_INPUT_NO_OUTPUT: u8 = 0x03;
pub const SMP_IO_CAPABILITY_KEYBOARD_DISPLAY: u8 = 0x04;

// Authentication Requirements bit masks
pub const SMP_AUTH_REQ_BONDING: u8 = 0x01;
pub const SMP_AUTH_REQ_MITM: u8 = 0x04;
pub const SMP_AUTH_REQ_SC: u8 = 0x08;
pub const SMP_AUTH_REQ_KEYPRESS: u8 = 0x10;

// Pairing Failed reason codes
pub const SMP_REASON_PASSKEY_ENTRY_FAILED: u8 = 0x01;
pub const SMP_REASON_OOB_NOT_AVAILABLE: u8 = 0x02;
pub const SMP_REASON_AUTHENTICATION_REQUIREMENTS: u8 = 0x03;
pub const SMP_REASON_CONFIRM_VALUE_FAILED: u8 = 0x04;
pub const SMP_REASON_PAIRING_NOT_SUPPORTED: u8 = 0x05;
pub const SMP_REASON_ENCRYPTION_KEY_SIZE: u8 = 0x06;
pub const SMP_REASON_COMMAND_NOT_SUPPORTED: u8 = 0x07;
pub const SMP_REASON_UNSPECIFIED_REASON: u8 = 0x08;
pub const SMP_REASON_REPEATED_ATTEMPTS: u8 = 0x09;
pub const SMP_REASON_NUMERIC_COMPARISON_FAILED: u8 = 0x0C;

// SMP key distribution bit masks
pub const SMP_KEY_DIST_ENC_KEY: u8 = 0x01;
pub const SMP_KEY_DIST_ID_KEY: u8 = 0x02;
pub const SMP_KEY_DIST_SIGN_KEY: u8 = 0x04;
pub const SMP_KEY_DIST_LINK_KEY: u8 = 0x08;

// SMP encryption key size limits
pub const SMP_MIN_ENCRYPTION_KEY_SIZE: u8 = 7;
pub const SMP_MAX_ENCRYPTION_KEY_SIZE: u8 = 16;

// Pairing methods reported by the pairing engine
pub const SMP_PAIR_METHOD_JUST_WORKS: u8 = 0x00;
pub const SMP_PAIR_METHOD_PASSKEY_DISPLAY: u8 = 0x01;
pub const SMP_PAIR_METHOD_PASSKEY_ENTRY: u8 = 0x02;
pub const SMP_PAIR_METHOD_NUMERIC_COMPARISON: u8 = 0x03;
pub const SMP_PAIR_METHOD_OOB_LEGACY: u8 = 0x04;
pub const SMP_PAIR_METHOD_OOB_SC_LOCAL_SEND_PEER_RECV: u8 = 0x05;
pub const SMP_PAIR_METHOD_OOB_SC_LOCAL_RECV_PEER_SEND: u8 = 0x06;
pub const SMP_PAIR_METHOD_OOB_SC_BOTH_SEND_RECV: u8 = 0x07;

// Layout of the secure connections OOB blob: address, random, confirm
pub const SMP_SC_OOB_RANDOM_OFFSET: usize = 6;
pub const SMP_SC_OOB_CONFIRM_OFFSET: usize = 22;
pub const SMP_SC_OOB_DATA_LEN: usize = 38;

// Signature layout: sign counter followed by the truncated MAC
pub const SMP_SIGNATURE_LEN: usize = 12;
pub const SMP_SIGN_COUNTER_LEN: usize = 4;

// Result status of pairing engine completions
pub const SMP_SUCCESS: u8 = 0x00;
