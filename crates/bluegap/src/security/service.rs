//! Registry of per-service security requirements

use crate::error::{GapError, GapResult};
use crate::gap::{BdAddr, SecurityModeFlags, ServiceInfo};
use std::collections::BTreeMap;

/// Security requirements a profile registered for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileRegistration {
    /// `None` applies to every peer
    pub addr: Option<BdAddr>,
    pub info: ServiceInfo,
    pub flags: SecurityModeFlags,
}

/// Registrations grouped by peer address, wildcard entries under `None`
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ServiceRegistry {
    entries: BTreeMap<Option<BdAddr>, Vec<ProfileRegistration>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        addr: Option<BdAddr>,
        info: ServiceInfo,
        flags: SecurityModeFlags,
    ) -> GapResult<()> {
        let scoped = self.entries.entry(addr).or_default();
        if scoped.iter().any(|entry| entry.info.matches(&info)) {
            return Err(GapError::Repeated);
        }
        scoped.push(ProfileRegistration { addr, info, flags });
        Ok(())
    }

    pub fn deregister(&mut self, addr: Option<BdAddr>, info: &ServiceInfo) -> GapResult<()> {
        let scoped = self
            .entries
            .get_mut(&addr)
            .ok_or_else(|| GapError::InvalidParameter("service is not registered".into()))?;
        let index = scoped
            .iter()
            .position(|entry| entry.info.matches(info))
            .ok_or_else(|| GapError::InvalidParameter("service is not registered".into()))?;
        scoped.remove(index);
        if scoped.is_empty() {
            self.entries.remove(&addr);
        }
        Ok(())
    }

    /// Registration governing `info` towards `addr`; an entry for the exact
    /// address wins over a wildcard one.
    pub fn find(&self, addr: &BdAddr, info: &ServiceInfo) -> Option<&ProfileRegistration> {
        let lookup = |key: Option<BdAddr>| {
            self.entries
                .get(&key)
                .and_then(|scoped| scoped.iter().find(|entry| entry.info.matches(info)))
        };
        lookup(Some(*addr)).or_else(|| lookup(None))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
