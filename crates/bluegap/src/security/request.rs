//! Classic security requests and their FIFO queue

use super::callbacks::SecurityResultCallback;
use crate::dispatch::TimerId;
use crate::gap::{
    BdAddr, Direction, SecurityMode, SecurityModeFlags, SecurityResult, ServiceId, ServiceInfo,
};
use crate::hci::constants::HCI_SUCCESS;
use std::collections::VecDeque;
use std::fmt;

/// Identifies a queued request; stands in for a pointer in connection slots
/// and timer closures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    WaitConnect,
    WaitFeature,
    WaitEncrypt,
    WaitAction,
    Action,
    Success,
    Failed,
}

impl RequestStatus {
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            RequestStatus::WaitConnect | RequestStatus::WaitFeature | RequestStatus::WaitEncrypt
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Success | RequestStatus::Failed)
    }
}

/// One pending security decision for a profile connection
pub struct SecurityRequest {
    pub id: RequestId,
    pub addr: BdAddr,
    pub info: ServiceInfo,
    pub need_authentication: bool,
    pub need_unauthentication: bool,
    pub need_encryption: bool,
    pub need_authorization: bool,
    pub need_mitm: bool,
    pub status: RequestStatus,
    pub hci_status: u8,
    pub timed_out: bool,
    pub retry_count: u8,
    pub retry_timer: Option<TimerId>,
    pub callback_fired: bool,
    pub authorization_pending: bool,
    callback: Option<SecurityResultCallback>,
}

impl fmt::Debug for SecurityRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityRequest")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("info", &self.info)
            .field("status", &self.status)
            .field("hci_status", &self.hci_status)
            .field("retry_count", &self.retry_count)
            .finish_non_exhaustive()
    }
}

impl SecurityRequest {
    /// Derive the needs of a request from the registered requirements
    pub fn new(
        id: RequestId,
        addr: BdAddr,
        info: ServiceInfo,
        flags: SecurityModeFlags,
        mode: SecurityMode,
        callback: Option<SecurityResultCallback>,
    ) -> Self {
        let (need_authentication, mut need_encryption, need_authorization) = match info.direction {
            Direction::Outgoing => (
                flags.contains(SecurityModeFlags::OUT_AUTHENTICATION),
                flags.contains(SecurityModeFlags::OUT_ENCRYPTION),
                false,
            ),
            Direction::Incoming => (
                flags.contains(SecurityModeFlags::IN_AUTHENTICATION),
                flags.contains(SecurityModeFlags::IN_ENCRYPTION),
                flags.contains(SecurityModeFlags::IN_AUTHORIZATION),
            ),
        };
        if mode != SecurityMode::Mode2 {
            need_encryption = true;
        }

        Self {
            id,
            addr,
            info,
            need_authentication,
            need_unauthentication: need_encryption && !need_authentication,
            need_encryption,
            need_authorization,
            need_mitm: flags.contains(SecurityModeFlags::MITM),
            status: RequestStatus::WaitAction,
            hci_status: HCI_SUCCESS,
            timed_out: false,
            retry_count: 0,
            retry_timer: None,
            callback_fired: false,
            authorization_pending: false,
            callback,
        }
    }

    /// Dedicated bonding request driven by GAP itself
    pub fn is_dedicated_bonding(&self) -> bool {
        self.info.service == ServiceId::GAP
    }

    /// Any need that requires a link action
    pub fn needs_action(&self) -> bool {
        self.need_authorization
            || self.need_authentication
            || self.need_unauthentication
            || self.need_encryption
    }

    pub fn fail(&mut self, hci_status: u8) {
        self.status = RequestStatus::Failed;
        self.hci_status = hci_status;
    }

    pub fn fail_timeout(&mut self) {
        self.status = RequestStatus::Failed;
        self.timed_out = true;
    }

    pub fn result(&self) -> SecurityResult {
        match self.status {
            RequestStatus::Success => SecurityResult::Success,
            _ if self.hci_status != HCI_SUCCESS => SecurityResult::Controller(self.hci_status),
            _ if self.timed_out => SecurityResult::Timeout,
            _ => SecurityResult::Failed,
        }
    }

    /// Hand the result to the client. Only the first call has an effect.
    pub fn fire(&mut self) {
        if self.callback_fired {
            return;
        }
        self.callback_fired = true;
        if let Some(callback) = self.callback.take() {
            callback(self.result(), self.info);
        }
    }
}

/// Requests in arrival order
#[derive(Debug, Default)]
pub struct RequestQueue {
    next_id: u64,
    requests: VecDeque<SecurityRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> RequestId {
        self.next_id += 1;
        RequestId(self.next_id)
    }

    pub fn push_back(&mut self, request: SecurityRequest) {
        self.requests.push_back(request);
    }

    pub fn push_front(&mut self, request: SecurityRequest) {
        self.requests.push_front(request);
    }

    pub fn get(&self, id: RequestId) -> Option<&SecurityRequest> {
        self.requests.iter().find(|request| request.id == id)
    }

    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut SecurityRequest> {
        self.requests.iter_mut().find(|request| request.id == id)
    }

    pub fn remove(&mut self, id: RequestId) -> Option<SecurityRequest> {
        let index = self.requests.iter().position(|request| request.id == id)?;
        self.requests.remove(index)
    }

    /// Snapshot of ids in queue order
    pub fn ids(&self) -> Vec<RequestId> {
        self.requests.iter().map(|request| request.id).collect()
    }

    /// Requests addressed to `addr`, in queue order
    pub fn for_peer_mut<'a>(
        &'a mut self,
        addr: &'a BdAddr,
    ) -> impl Iterator<Item = &'a mut SecurityRequest> + 'a {
        self.requests
            .iter_mut()
            .filter(move |request| request.addr == *addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SecurityRequest> {
        self.requests.iter()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
