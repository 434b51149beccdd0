//! Runtime configuration of the security engine

use crate::gap::constants::*;
use crate::gap::BdAddr;
use std::time::Duration;

/// Timing and policy knobs of a [`GapStack`](crate::GapStack)
#[derive(Debug, Clone)]
pub struct GapConfig {
    /// Authentication retries after a recoverable failure
    pub pair_retry_count: u8,
    /// Backoff before each authentication retry
    pub pair_retry_wait: Duration,
    /// How long an incoming link may stay unencrypted after the SSP check
    pub encrypt_wait: Duration,
    /// Delay before the engine releases its ACL reference after an action
    pub acl_hold_time: Duration,
    /// How long the ACL is kept while a peer-initiated pairing runs
    pub acl_use_time: Duration,
    /// Bound on a synchronous call waiting for the worker
    pub blocking_timeout: Duration,
    /// Capacity of the dispatcher queue
    pub queue_capacity: usize,
    /// Retry authentication when the controller reports PIN or key missing
    pub key_missing_retry: bool,
    /// Peers whose authentication failures are always retried
    pub interop_auto_retry: Vec<BdAddr>,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            pair_retry_count: PAIR_RETRY_COUNT,
            pair_retry_wait: Duration::from_millis(PAIR_RETRY_WAIT_TIME_MS),
            encrypt_wait: Duration::from_millis(SEC_WAIT_ENCRYPT_TIME_MS),
            acl_hold_time: Duration::from_millis(DISC_ACL_WAIT_TIME_MS),
            acl_use_time: Duration::from_millis(USE_ACL_CONNECTION_TIME_MS),
            blocking_timeout: Duration::from_millis(BLOCKING_SUBMIT_TIMEOUT_MS),
            queue_capacity: TASK_QUEUE_CAPACITY,
            key_missing_retry: true,
            interop_auto_retry: Vec::new(),
        }
    }
}

impl GapConfig {
    pub fn with_pair_retry(mut self, count: u8, wait: Duration) -> Self {
        self.pair_retry_count = count;
        self.pair_retry_wait = wait;
        self
    }

    pub fn with_encrypt_wait(mut self, wait: Duration) -> Self {
        self.encrypt_wait = wait;
        self
    }

    pub fn with_acl_hold_time(mut self, hold: Duration) -> Self {
        self.acl_hold_time = hold;
        self
    }

    pub fn with_blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = timeout;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_key_missing_retry(mut self, enabled: bool) -> Self {
        self.key_missing_retry = enabled;
        self
    }

    pub fn with_interop_auto_retry(mut self, peer: BdAddr) -> Self {
        self.interop_auto_retry.push(peer);
        self
    }

    /// Whether an authentication failure with `status` from `peer` is worth a retry
    pub fn is_retryable(&self, peer: &BdAddr, status: u8) -> bool {
        (status == crate::hci::constants::HCI_PIN_OR_KEY_MISSING && self.key_missing_retry)
            || self.interop_auto_retry.contains(peer)
    }
}
