// Address types
pub const PUBLIC_DEVICE_ADDRESS: u8 = 0x00;
pub const RANDOM_DEVICE_ADDRESS: u8 = 0x01;
pub const PUBLIC_IDENTITY_ADDRESS: u8 = 0x02;
pub const RANDOM_IDENTITY_ADDRESS: u8 = 0x03;

// Random address sub-type, two most significant bits of the address
pub const RANDOM_ADDRESS_TYPE_MASK: u8 = 0xC0;
pub const RESOLVABLE_PRIVATE_ADDRESS: u8 = 0x40;

// Service identifiers with special meaning to the security engine
pub const SERVICE_ID_GAP: u16 = 0x0000;
pub const SERVICE_ID_UNKNOWN: u16 = 0xFFFF;

// Classic security policy timing (milliseconds)
pub const PAIR_RETRY_COUNT: u8 = 3;
pub const PAIR_RETRY_WAIT_TIME_MS: u64 = 1000;
pub const SEC_WAIT_ENCRYPT_TIME_MS: u64 = 1000;
pub const DISC_ACL_WAIT_TIME_MS: u64 = 4000;
pub const USE_ACL_CONNECTION_TIME_MS: u64 = 10000;

// Dispatcher defaults
pub const BLOCKING_SUBMIT_TIMEOUT_MS: u64 = 5000;
pub const TASK_QUEUE_CAPACITY: usize = 128;
