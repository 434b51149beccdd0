//! Data signing jobs
//!
//! Signatures are computed by the pairing engine one at a time. Jobs wait in
//! a FIFO; the head job is started when nothing is in flight and the next one
//! starts when its result arrives.

use crate::context::GapContext;
use crate::error::{GapError, GapResult};
use crate::gap::{Address, BdAddr};
use crate::smp::constants::{SMP_SIGNATURE_LEN, SMP_SIGN_COUNTER_LEN, SMP_SUCCESS};
use crate::smp::ConnectionSignatureResolvingKey;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};
use std::collections::VecDeque;
use std::fmt;

/// Which signing counter moved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignCounterKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureResult {
    Success,
    /// Confirmation computed a different signature
    AlgorithmMismatch,
    /// The pairing engine could not compute a signature
    ExecutionError,
    /// The signature's counter is behind the stored remote counter
    CounterBehind,
}

/// Completion of a signing job with the computed signature
pub type SignatureCallback = Box<dyn FnOnce(SignatureResult, [u8; SMP_SIGNATURE_LEN]) + Send>;

/// Signing keys known for a peer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningKeys {
    pub local: Option<ConnectionSignatureResolvingKey>,
    pub remote: Option<ConnectionSignatureResolvingKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureOp {
    Generate,
    Confirm { signature: [u8; SMP_SIGNATURE_LEN] },
}

pub struct SignatureJob {
    pub addr: Address,
    pub op: SignatureOp,
    /// Counter the signature is computed with, fixed when the job starts
    pub counter: u32,
    pub data: Vec<u8>,
    callback: Option<SignatureCallback>,
}

impl fmt::Debug for SignatureJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureJob")
            .field("addr", &self.addr)
            .field("op", &self.op)
            .field("counter", &self.counter)
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl SignatureJob {
    pub fn kind(&self) -> SignCounterKind {
        match self.op {
            SignatureOp::Generate => SignCounterKind::Local,
            SignatureOp::Confirm { .. } => SignCounterKind::Remote,
        }
    }

    fn complete(mut self, result: SignatureResult, signature: [u8; SMP_SIGNATURE_LEN]) {
        if let Some(callback) = self.callback.take() {
            callback(result, signature);
        }
    }
}

/// Counter carried in the first bytes of a signature
pub fn signature_counter(signature: &[u8; SMP_SIGNATURE_LEN]) -> u32 {
    LittleEndian::read_u32(&signature[..SMP_SIGN_COUNTER_LEN])
}

#[derive(Debug, Default)]
pub struct SignatureQueue {
    jobs: VecDeque<SignatureJob>,
    in_flight: bool,
}

impl SignatureQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: SignatureJob) {
        self.jobs.push_back(job);
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Remove the queued jobs for `addr` that have not been started
    fn take_waiting_for(&mut self, addr: &BdAddr) -> Vec<SignatureJob> {
        let skip = usize::from(self.in_flight);
        let mut taken = Vec::new();
        let mut index = skip;
        while index < self.jobs.len() {
            if self.jobs[index].addr.addr == *addr {
                if let Some(job) = self.jobs.remove(index) {
                    taken.push(job);
                }
            } else {
                index += 1;
            }
        }
        taken
    }
}

impl GapContext {
    /// Store signing keys for `addr`. `None` leaves the existing key.
    pub fn le_set_signing_info(
        &mut self,
        addr: Address,
        local: Option<ConnectionSignatureResolvingKey>,
        remote: Option<ConnectionSignatureResolvingKey>,
    ) -> GapResult<()> {
        if !self.le.enabled {
            return Err(GapError::NotEnabled);
        }
        let keys = self.le.signing.entry(addr.addr).or_default();
        if local.is_some() {
            keys.local = local;
        }
        if remote.is_some() {
            keys.remote = remote;
        }
        Ok(())
    }

    pub fn le_signing_keys(&self, addr: &BdAddr) -> Option<&SigningKeys> {
        self.le.signing.get(addr)
    }

    /// Sign `data` with the local CSRK of `addr`
    pub fn le_generate_signature(
        &mut self,
        addr: Address,
        data: Vec<u8>,
        callback: Option<SignatureCallback>,
    ) -> GapResult<()> {
        if !self.le.enabled {
            return Err(GapError::NotEnabled);
        }
        let has_key = self
            .le
            .signing
            .get(&addr.addr)
            .is_some_and(|keys| keys.local.is_some());
        if !has_key {
            return Err(GapError::InvalidState);
        }

        self.le.signatures.push(SignatureJob {
            addr,
            op: SignatureOp::Generate,
            counter: 0,
            data,
            callback,
        });
        self.le_process_signatures();
        Ok(())
    }

    /// Check a signature received from `addr`. A counter behind the stored
    /// remote counter is refused with `Replay` before any computation; the
    /// callback then fires with [`SignatureResult::CounterBehind`].
    pub fn le_confirm_signature(
        &mut self,
        addr: Address,
        data: Vec<u8>,
        signature: [u8; SMP_SIGNATURE_LEN],
        callback: Option<SignatureCallback>,
    ) -> GapResult<()> {
        if !self.le.enabled {
            return Err(GapError::NotEnabled);
        }
        let remote = self
            .le
            .signing
            .get(&addr.addr)
            .and_then(|keys| keys.remote.as_ref())
            .ok_or(GapError::InvalidState)?;

        let counter = signature_counter(&signature);
        if counter < remote.sign_counter {
            warn!(
                "Signature from {} replays counter {} (stored {})",
                addr, counter, remote.sign_counter
            );
            if let Some(callback) = callback {
                callback(SignatureResult::CounterBehind, signature);
            }
            return Err(GapError::Replay);
        }

        self.le.signatures.push(SignatureJob {
            addr,
            op: SignatureOp::Confirm { signature },
            counter,
            data,
            callback,
        });
        self.le_process_signatures();
        Ok(())
    }

    /// Start the head job unless one is in flight
    fn le_process_signatures(&mut self) {
        while !self.le.signatures.in_flight {
            let Some(job) = self.le.signatures.jobs.front_mut() else {
                return;
            };
            let keys = self.le.signing.get(&job.addr.addr);
            let key = match job.op {
                SignatureOp::Generate => keys.and_then(|keys| keys.local.as_ref()),
                SignatureOp::Confirm { .. } => keys.and_then(|keys| keys.remote.as_ref()),
            };

            // A confirmation queued behind one with the same counter is stale by now.
            if let (Some(key), SignatureOp::Confirm { signature }) = (key, job.op) {
                if job.counter < key.sign_counter {
                    warn!(
                        "Signature from {} replays counter {} (stored {})",
                        job.addr, job.counter, key.sign_counter
                    );
                    if let Some(job) = self.le.signatures.jobs.pop_front() {
                        job.complete(SignatureResult::CounterBehind, signature);
                    }
                    continue;
                }
            }

            let started = match key {
                Some(key) => {
                    if job.op == SignatureOp::Generate {
                        job.counter = key.sign_counter;
                    }
                    self.smp.generate_signature(&key.key, job.counter, &job.data)
                }
                None => Err(GapError::InvalidState),
            };

            match started {
                Ok(()) => {
                    debug!("Started {:?}", job);
                    self.le.signatures.in_flight = true;
                }
                Err(err) => {
                    warn!("Signature for {} not started: {}", job.addr, err);
                    if let Some(job) = self.le.signatures.jobs.pop_front() {
                        job.complete(SignatureResult::ExecutionError, [0; SMP_SIGNATURE_LEN]);
                    }
                }
            }
        }
    }

    pub(crate) fn le_on_signature_result(
        &mut self,
        status: u8,
        signature: [u8; SMP_SIGNATURE_LEN],
    ) {
        if !self.le.signatures.in_flight {
            debug!("Signature result with no job in flight");
            return;
        }
        self.le.signatures.in_flight = false;
        let Some(job) = self.le.signatures.jobs.pop_front() else {
            return;
        };

        let result = if status != SMP_SUCCESS {
            SignatureResult::ExecutionError
        } else {
            match job.op {
                SignatureOp::Confirm { signature: expected } if expected != signature => {
                    SignatureResult::AlgorithmMismatch
                }
                _ => SignatureResult::Success,
            }
        };

        let mut advanced = None;
        if result == SignatureResult::Success {
            let kind = job.kind();
            let keys = self.le.signing.entry(job.addr.addr).or_default();
            let key = match kind {
                SignCounterKind::Local => keys.local.as_mut(),
                SignCounterKind::Remote => keys.remote.as_mut(),
            };
            if let Some(key) = key {
                advanced = Some((kind, key.advance_past(job.counter)));
            }
        } else {
            warn!("{:?} finished with {:?}", job, result);
        }

        let addr = job.addr;
        job.complete(result, signature);
        if let Some((kind, counter)) = advanced {
            if let Some(callback) = self.le.security_callback.as_mut() {
                callback.sign_counter_change(&addr, kind, counter);
            }
        }

        self.le_process_signatures();
    }

    /// Fail the jobs of a link that went away and have not started yet
    pub(crate) fn le_fail_signatures_for(&mut self, addr: &BdAddr) {
        for job in self.le.signatures.take_waiting_for(addr) {
            job.complete(SignatureResult::ExecutionError, [0; SMP_SIGNATURE_LEN]);
        }
    }
}
