//! Engine state owned by the dispatcher worker

use crate::config::GapConfig;
use crate::dispatch::{TimerHost, Timers};
use crate::hci::{Controller, LinkManager};
use crate::le::{
    LeConnectionCallback, LePairCallback, LeSecurityCallback, LeState, ReportSubscriber,
};
use crate::security::{AuthenticationCallback, ClassicState, SecurityCallback};
use crate::smp::SecurityManager;
use log::debug;
use std::fmt;

/// Lower-layer services the engine drives
pub struct Collaborators {
    pub controller: Box<dyn Controller>,
    pub links: Box<dyn LinkManager>,
    pub security_manager: Box<dyn SecurityManager>,
}

/// Everything the classic and LE engines mutate. Lives on the dispatcher
/// worker and is only reachable through submitted tasks and timers.
pub struct GapContext {
    pub(crate) config: GapConfig,
    pub(crate) timers: Timers<GapContext>,
    pub(crate) controller: Box<dyn Controller>,
    pub(crate) links: Box<dyn LinkManager>,
    pub(crate) smp: Box<dyn SecurityManager>,
    pub(crate) classic: ClassicState,
    pub(crate) le: LeState,
}

impl fmt::Debug for GapContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GapContext")
            .field("config", &self.config)
            .field("timers", &self.timers)
            .field("classic", &self.classic)
            .field("le", &self.le)
            .finish_non_exhaustive()
    }
}

impl TimerHost for GapContext {
    fn timers(&mut self) -> &mut Timers<Self> {
        &mut self.timers
    }
}

impl GapContext {
    pub fn new(config: GapConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            timers: Timers::new(),
            controller: collaborators.controller,
            links: collaborators.links,
            smp: collaborators.security_manager,
            classic: ClassicState::default(),
            le: LeState::default(),
        }
    }

    pub fn config(&self) -> &GapConfig {
        &self.config
    }

    pub fn classic(&self) -> &ClassicState {
        &self.classic
    }

    pub fn le(&self) -> &LeState {
        &self.le
    }

    pub fn set_classic_enabled(&mut self, enabled: bool) {
        debug!("Classic security {}", if enabled { "enabled" } else { "disabled" });
        self.classic.enabled = enabled;
    }

    pub fn set_le_enabled(&mut self, enabled: bool) {
        debug!("LE security {}", if enabled { "enabled" } else { "disabled" });
        self.le.enabled = enabled;
    }

    pub fn register_security_callback(&mut self, callback: Box<dyn SecurityCallback>) {
        self.classic.security_callback = Some(callback);
    }

    pub fn clear_security_callback(&mut self) {
        self.classic.security_callback = None;
    }

    pub fn register_authentication_callback(&mut self, callback: Box<dyn AuthenticationCallback>) {
        self.classic.auth_callback = Some(callback);
    }

    pub fn clear_authentication_callback(&mut self) {
        self.classic.auth_callback = None;
    }

    pub fn register_le_pair_callback(&mut self, callback: Box<dyn LePairCallback>) {
        self.le.pair_callback = Some(callback);
    }

    pub fn clear_le_pair_callback(&mut self) {
        self.le.pair_callback = None;
    }

    pub fn register_le_security_callback(&mut self, callback: Box<dyn LeSecurityCallback>) {
        self.le.security_callback = Some(callback);
    }

    pub fn clear_le_security_callback(&mut self) {
        self.le.security_callback = None;
    }

    pub fn register_le_connection_callback(&mut self, callback: Box<dyn LeConnectionCallback>) {
        self.le.connection_callback = Some(callback);
    }

    pub fn clear_le_connection_callback(&mut self) {
        self.le.connection_callback = None;
    }

    pub fn register_report_subscriber(&mut self, subscriber: Box<dyn ReportSubscriber>) {
        self.le.report_subscribers.push(subscriber);
    }

    pub fn clear_report_subscribers(&mut self) {
        self.le.report_subscribers.clear();
    }
}
