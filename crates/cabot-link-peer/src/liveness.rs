//! Heartbeat-driven connection state.
//!
//! The monitor is a plain state machine advanced once per heartbeat tick. It
//! does not own a timer or touch the link; the adapter feeds it the outcome of
//! each heartbeat and applies the returned advertising action.
//!
//! ```text
//!   Idle ──subscribe──► Probing ──ok──► Alive ◄──ok── Suspect
//!                          │              │             ▲ │
//!                          │            fail ───────────┘ │
//!                          └──budget spent──► Dead ◄──────┘
//! ```

use std::fmt;
use std::time::Duration;

/// Consecutive failed heartbeats tolerated before the link counts as lost.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Ticks without a subscriber before the advertisement is cycled.
pub const DEFAULT_READVERTISE_TICKS: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    pub max_retries: u32,
    pub readvertise_after: u32,
    /// Nominal heartbeat period.
    pub interval: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            readvertise_after: DEFAULT_READVERTISE_TICKS,
            interval: Duration::from_secs(1),
        }
    }
}

impl LivenessConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_readvertise_after(mut self, ticks: u32) -> Self {
        self.readvertise_after = ticks;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LivenessState {
    /// Nobody has subscribed or connected yet.
    Idle,
    /// A peer appeared but no heartbeat has succeeded.
    Probing,
    Alive,
    /// Heartbeats failing, budget not yet spent.
    Suspect,
    Dead,
}

impl LivenessState {
    pub fn is_connected(self) -> bool {
        matches!(self, LivenessState::Alive | LivenessState::Suspect)
    }
}

impl fmt::Display for LivenessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LivenessState::Idle => "idle",
            LivenessState::Probing => "probing",
            LivenessState::Alive => "alive",
            LivenessState::Suspect => "suspect",
            LivenessState::Dead => "dead",
        };
        f.write_str(name)
    }
}

/// What the adapter should do with the advertisement after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisingAction {
    Keep,
    Start,
    Stop,
    /// Stop now; the next tick starts it again.
    Cycle,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// `Some` only when `connected` flipped on this tick.
    pub connected_changed: Option<bool>,
    pub advertising: AdvertisingAction,
}

#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    config: LivenessConfig,
    state: LivenessState,
    budget: u32,
    advertising: bool,
    unsubscribed_ticks: u32,
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new(LivenessConfig::default())
    }
}

impl LivenessMonitor {
    pub fn new(config: LivenessConfig) -> Self {
        let config = LivenessConfig {
            max_retries: config.max_retries.max(1),
            ..config
        };
        Self {
            budget: config.max_retries,
            config,
            state: LivenessState::Idle,
            advertising: false,
            unsubscribed_ticks: 0,
        }
    }

    pub fn state(&self) -> LivenessState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Whether the monitor believes the advertisement is running.
    pub fn advertising(&self) -> bool {
        self.advertising
    }

    /// First subscription or connection; no effect unless idle.
    pub fn start_probing(&mut self) {
        if self.state == LivenessState::Idle {
            self.state = LivenessState::Probing;
            self.budget = self.config.max_retries;
        }
    }

    /// Back to `Idle`, e.g. when the link is torn down.
    ///
    /// Returns `Some(false)` if this ends a connected period.
    pub fn reset(&mut self) -> Option<bool> {
        let was_connected = self.is_connected();
        self.state = LivenessState::Idle;
        self.budget = self.config.max_retries;
        self.advertising = false;
        self.unsubscribed_ticks = 0;
        was_connected.then_some(false)
    }

    /// Advance by one heartbeat period.
    ///
    /// `heartbeat_ok` is the outcome of this tick's heartbeat; `subscribed`
    /// says whether a central currently listens (always `true` for a socket).
    pub fn tick(&mut self, heartbeat_ok: bool, subscribed: bool) -> Tick {
        let was_connected = self.is_connected();

        if self.state == LivenessState::Idle && (subscribed || heartbeat_ok) {
            self.start_probing();
        }

        if self.state != LivenessState::Idle {
            if heartbeat_ok {
                self.budget = self.config.max_retries;
                self.state = LivenessState::Alive;
            } else {
                self.budget = self.budget.saturating_sub(1);
                self.state = match self.state {
                    _ if self.budget == 0 => LivenessState::Dead,
                    LivenessState::Probing => LivenessState::Probing,
                    _ => LivenessState::Suspect,
                };
            }
        }

        let connected = self.is_connected();
        Tick {
            connected_changed: (connected != was_connected).then_some(connected),
            advertising: self.advertising_action(subscribed),
        }
    }

    fn advertising_action(&mut self, subscribed: bool) -> AdvertisingAction {
        if subscribed {
            self.unsubscribed_ticks = 0;
        } else {
            self.unsubscribed_ticks += 1;
            if self.unsubscribed_ticks > self.config.readvertise_after {
                self.unsubscribed_ticks = 0;
                if self.advertising {
                    self.advertising = false;
                    return AdvertisingAction::Cycle;
                }
            }
        }

        let wanted = !subscribed
            || matches!(self.state, LivenessState::Idle | LivenessState::Dead);
        match (wanted, self.advertising) {
            (true, false) => {
                self.advertising = true;
                AdvertisingAction::Start
            }
            (false, true) => {
                self.advertising = false;
                AdvertisingAction::Stop
            }
            _ => AdvertisingAction::Keep,
        }
    }
}
