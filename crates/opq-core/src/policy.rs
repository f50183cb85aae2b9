//! Offliner policy: the immutable thresholds and ordering preferences that
//! drive picking and the coordinator's time budgets.
//!
//! This is a plain configuration value, not a trait: the only tunable
//! behavior beyond numbers is the comparator choice, expressed as
//! [`OrderPreference`].

use std::time::Duration;

use crate::conditions::TriggerConditions;

/// Which processing window the coordinator is running under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingWindow {
    /// Triggered by the external job scheduler (background window).
    Scheduled,
    /// Triggered by the "start now if connected" fast path.
    Immediate,
}

/// Primary sort key used when two eligible requests share the same
/// user-requestedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPreference {
    /// Compare attempt counts first, creation time second.
    RetryCountFirst,
    /// Compare creation time first, attempt counts second.
    RecencyFirst,
}

/// Immutable scheduling policy. Owned by the coordinator; the picker borrows
/// it for the duration of one pass.
#[derive(Debug, Clone)]
pub struct OfflinerPolicy {
    /// A request whose started count reaches this is never dispatched again.
    pub max_started_tries: u32,
    /// A request whose completed count reaches this is removed.
    pub max_completed_tries: u32,
    /// Requests older than this are dropped on the next pick pass.
    pub request_expiration: Duration,

    /// Overall dispatch budget for a scheduled (background) window.
    pub scheduled_window_budget: Duration,
    /// Overall dispatch budget for an immediate (foreground-triggered) window.
    pub immediate_window_budget: Duration,
    /// Watchdog limit for a single page in a scheduled window.
    pub scheduled_page_time_limit: Duration,
    /// Watchdog limit for a single page in an immediate window.
    pub immediate_page_time_limit: Duration,

    /// Gating for background (non-user-requested) work.
    pub power_required_for_background: bool,
    pub unmetered_required_for_background: bool,
    pub minimum_battery_for_background: u32,
    /// Gating for user-requested work. Defaults are permissive: user intent
    /// outranks device-condition caution.
    pub power_required_for_user_requested: bool,
    pub unmetered_required_for_user_requested: bool,
    pub minimum_battery_for_user_requested: u32,

    /// Comparator choice for same-intent requests.
    pub order: OrderPreference,
    /// Fewer completed attempts wins (true) or more wins (false).
    pub prefer_untried_requests: bool,
    /// Older creation time wins (true) or newer wins (false).
    pub prefer_earlier_requests: bool,

    /// Delay for the backup wake-up armed while disabled requests remain.
    pub backup_wakeup_delay: Duration,
}

impl Default for OfflinerPolicy {
    fn default() -> Self {
        Self {
            max_started_tries: 5,
            max_completed_tries: 3,
            request_expiration: Duration::from_secs(7 * 24 * 3600),
            scheduled_window_budget: Duration::from_secs(170),
            immediate_window_budget: Duration::from_secs(300),
            scheduled_page_time_limit: Duration::from_secs(120),
            immediate_page_time_limit: Duration::from_secs(300),
            power_required_for_background: false,
            unmetered_required_for_background: true,
            minimum_battery_for_background: 50,
            power_required_for_user_requested: false,
            unmetered_required_for_user_requested: false,
            minimum_battery_for_user_requested: 0,
            order: OrderPreference::RetryCountFirst,
            prefer_untried_requests: true,
            prefer_earlier_requests: true,
            backup_wakeup_delay: Duration::from_secs(5 * 60),
        }
    }
}

impl OfflinerPolicy {
    pub fn power_required(&self, user_requested: bool) -> bool {
        if user_requested {
            self.power_required_for_user_requested
        } else {
            self.power_required_for_background
        }
    }

    pub fn unmetered_required(&self, user_requested: bool) -> bool {
        if user_requested {
            self.unmetered_required_for_user_requested
        } else {
            self.unmetered_required_for_background
        }
    }

    pub fn minimum_battery(&self, user_requested: bool) -> u32 {
        if user_requested {
            self.minimum_battery_for_user_requested
        } else {
            self.minimum_battery_for_background
        }
    }

    pub fn window_budget(&self, window: ProcessingWindow) -> Duration {
        match window {
            ProcessingWindow::Scheduled => self.scheduled_window_budget,
            ProcessingWindow::Immediate => self.immediate_window_budget,
        }
    }

    pub fn page_time_limit(&self, window: ProcessingWindow) -> Duration {
        match window {
            ProcessingWindow::Scheduled => self.scheduled_page_time_limit,
            ProcessingWindow::Immediate => self.immediate_page_time_limit,
        }
    }

    /// Derive the device state that should wake the scheduler again.
    /// User-requested work pending means permissive gates so the wake-up
    /// fires as soon as possible.
    pub fn trigger_conditions(&self, user_requested_pending: bool) -> TriggerConditions {
        TriggerConditions {
            require_power: self.power_required(user_requested_pending),
            minimum_battery_percentage: self.minimum_battery(user_requested_pending),
            require_unmetered_network: self.unmetered_required(user_requested_pending),
        }
    }
}
