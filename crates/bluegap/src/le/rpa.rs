//! Resolution of resolvable private addresses in advertising reports
//!
//! Each report with an RPA becomes a task holding a snapshot of the known
//! IRKs. Tasks are resolved in arrival order, one candidate IRK per request
//! to the pairing engine, so at most one resolution is outstanding.

use crate::context::GapContext;
use crate::error::GapResult;
use crate::gap::{Address, AddressType, BdAddr};
use crate::hci::LeAdvertisingReport;
use crate::smp::constants::SMP_SUCCESS;
use crate::smp::IdentityResolvingKey;
use log::{debug, trace, warn};
use std::collections::VecDeque;

#[derive(Debug)]
pub struct RpaResolutionTask {
    pub report: LeAdvertisingReport,
    pub candidates: Vec<IdentityResolvingKey>,
    /// Index of the candidate being tried
    pub cursor: usize,
}

impl RpaResolutionTask {
    pub fn new(report: LeAdvertisingReport, candidates: Vec<IdentityResolvingKey>) -> Self {
        Self {
            report,
            candidates,
            cursor: 0,
        }
    }

    pub fn current(&self) -> Option<&IdentityResolvingKey> {
        self.candidates.get(self.cursor)
    }
}

#[derive(Debug, Default)]
pub struct RpaQueue {
    tasks: VecDeque<RpaResolutionTask>,
    processing: bool,
}

impl RpaQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }
}

fn is_resolvable(report: &LeAdvertisingReport) -> bool {
    AddressType::from(report.address_type) == AddressType::Random
        && report.address.is_resolvable_private()
}

impl GapContext {
    /// Add or replace the IRK of a bonded peer
    pub fn le_add_identity_resolving_key(&mut self, irk: IdentityResolvingKey) -> GapResult<()> {
        self.le.irks.retain(|known| known.identity != irk.identity);
        self.le.irks.push(irk);
        Ok(())
    }

    pub fn le_remove_identity_resolving_key(&mut self, identity: &Address) -> GapResult<()> {
        self.le.irks.retain(|known| known.identity != *identity);
        self.le.current_addresses.remove(&identity.addr);
        Ok(())
    }

    /// Last private address a known identity was seen with
    pub fn le_current_address(&self, identity: &BdAddr) -> Option<Address> {
        self.le.current_addresses.get(identity).copied()
    }

    pub(crate) fn le_on_advertising_report(&mut self, report: LeAdvertisingReport) {
        if !is_resolvable(&report) {
            self.le_deliver_report(&report, None);
            return;
        }
        trace!("Queueing {} for resolution", report.address);
        let task = RpaResolutionTask::new(report, self.le.irks.clone());
        self.le.rpa.tasks.push_back(task);
        self.le_process_rpa();
    }

    /// Hand the head task to the resolver unless one is already out
    fn le_process_rpa(&mut self) {
        while !self.le.rpa.processing {
            let Some(task) = self.le.rpa.tasks.front() else {
                return;
            };
            let Some(irk) = task.current() else {
                self.le_complete_rpa(None);
                continue;
            };
            match self.smp.resolve_rpa(&task.report.address, &irk.key) {
                Ok(()) => self.le.rpa.processing = true,
                Err(err) => {
                    warn!("Resolution of {} not started: {}", task.report.address, err);
                    self.le_complete_rpa(None);
                }
            }
        }
    }

    pub(crate) fn le_on_resolve_result(&mut self, status: u8, matched: bool) {
        if !self.le.rpa.processing {
            debug!("Resolution result with nothing in flight");
            return;
        }
        self.le.rpa.processing = false;
        let Some(task) = self.le.rpa.tasks.front_mut() else {
            return;
        };

        if status != SMP_SUCCESS {
            warn!("Resolution of {} failed: 0x{:02X}", task.report.address, status);
            self.le_complete_rpa(None);
        } else if matched {
            let identity = task.current().map(|irk| irk.identity);
            if let Some(identity) = identity {
                let current = Address::new(task.report.address, AddressType::Random);
                debug!("{} resolved to {}", current, identity);
                self.le.current_addresses.insert(identity.addr, current);
            }
            self.le_complete_rpa(identity);
        } else {
            task.cursor += 1;
            if task.cursor >= task.candidates.len() {
                self.le_complete_rpa(None);
            }
        }

        self.le_process_rpa();
    }

    /// Deliver the head task and drop it
    fn le_complete_rpa(&mut self, identity: Option<Address>) {
        if let Some(task) = self.le.rpa.tasks.pop_front() {
            self.le_deliver_report(&task.report, identity.as_ref());
        }
    }

    fn le_deliver_report(&mut self, report: &LeAdvertisingReport, identity: Option<&Address>) {
        for subscriber in self.le.report_subscribers.iter_mut() {
            subscriber.on_report(report, identity);
        }
    }
}
