//! Connection registry shared by the classic and LE engines
//!
//! Entries are keyed by peer address in an ordered map; a secondary index maps
//! link handles to addresses.

use super::types::BdAddr;
use std::collections::{BTreeMap, HashMap};

/// A per-link record that can be stored in a [`LinkRegistry`]
pub trait LinkEntry {
    fn address(&self) -> BdAddr;
    fn handle(&self) -> u16;
}

/// Links by address, with lookup by handle
#[derive(Debug)]
pub struct LinkRegistry<T> {
    by_address: BTreeMap<BdAddr, T>,
    by_handle: HashMap<u16, BdAddr>,
}

impl<T> Default for LinkRegistry<T> {
    fn default() -> Self {
        Self {
            by_address: BTreeMap::new(),
            by_handle: HashMap::new(),
        }
    }
}

impl<T: LinkEntry> LinkRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a link, replacing any previous entry for the same address.
    /// Returns the replaced entry.
    pub fn insert(&mut self, entry: T) -> Option<T> {
        let addr = entry.address();
        let previous = self.remove(&addr);
        self.by_handle.insert(entry.handle(), addr);
        self.by_address.insert(addr, entry);
        previous
    }

    pub fn get(&self, addr: &BdAddr) -> Option<&T> {
        self.by_address.get(addr)
    }

    pub fn get_mut(&mut self, addr: &BdAddr) -> Option<&mut T> {
        self.by_address.get_mut(addr)
    }

    pub fn contains(&self, addr: &BdAddr) -> bool {
        self.by_address.contains_key(addr)
    }

    /// Address of the link with this handle
    pub fn address_of(&self, handle: u16) -> Option<BdAddr> {
        self.by_handle.get(&handle).copied()
    }

    pub fn by_handle(&self, handle: u16) -> Option<&T> {
        let addr = self.by_handle.get(&handle)?;
        self.by_address.get(addr)
    }

    pub fn by_handle_mut(&mut self, handle: u16) -> Option<&mut T> {
        let addr = self.by_handle.get(&handle)?;
        self.by_address.get_mut(addr)
    }

    pub fn remove(&mut self, addr: &BdAddr) -> Option<T> {
        let entry = self.by_address.remove(addr)?;
        self.by_handle.remove(&entry.handle());
        Some(entry)
    }

    pub fn remove_by_handle(&mut self, handle: u16) -> Option<T> {
        let addr = self.by_handle.remove(&handle)?;
        self.by_address.remove(&addr)
    }

    /// Addresses in key order
    pub fn addresses(&self) -> Vec<BdAddr> {
        self.by_address.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.by_address.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.by_address.values_mut()
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}
