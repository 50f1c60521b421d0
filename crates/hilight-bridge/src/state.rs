//! Supervisor state record and its pure transitions.
//!
//! Every decision the supervisor takes (ping or force-close, reconnect or
//! stop) is made here without touching a socket or a timer, so the policy
//! is testable on its own. The supervisor task owns one `SupervisorState`
//! and performs the side effects each transition returns.

use std::time::Duration;

use serde::Serialize;

use hilight_core::account::ResolvedAccount;

use crate::backoff::reconnect_delay;
use crate::error::is_auth_close;

/// Connection phase. Exactly one at a time per supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Stopped,
}

/// What a heartbeat tick asks the supervisor to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Send a ping; `missed` is the count of pings now awaiting a pong.
    SendPing { missed: u32 },
    /// Too many pings went unanswered; close with 4000 "pong timeout".
    ForceClose { missed: u32 },
}

/// How a socket ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: Option<u16>,
    pub reason: String,
    /// Set when the failure was already classified as an auth rejection
    /// (e.g. HTTP 401 on upgrade).
    pub auth_rejected: bool,
}

impl CloseInfo {
    pub fn new(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            auth_rejected: false,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        self.auth_rejected || is_auth_close(self.code, &self.reason)
    }
}

/// What the supervisor does after a close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseAction {
    /// Stop was requested; resolve completion and do nothing else.
    Resolve,
    /// Credentials rejected; stop permanently.
    Terminal,
    /// Sleep `delay`, then connect again.
    Reconnect { attempt: u32, delay: Duration },
}

/// Point-in-time status of one account, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub phase: Phase,
    pub running: bool,
    pub reconnect_attempts: u32,
    /// RFC 3339.
    pub last_start_at: Option<String>,
    pub last_stop_at: Option<String>,
    pub last_error: Option<String>,
}

impl AccountSnapshot {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            phase: Phase::Idle,
            running: false,
            reconnect_attempts: 0,
            last_start_at: None,
            last_stop_at: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorState {
    phase: Phase,
    reconnect_attempts: u32,
    missed_pongs: u32,
    max_missed_pongs: u32,
    validated: bool,
    stopped: bool,
    heartbeat_active: bool,
    base_ms: u64,
    max_ms: u64,
}

impl SupervisorState {
    pub fn new(account: &ResolvedAccount) -> Self {
        Self {
            phase: Phase::Idle,
            reconnect_attempts: 0,
            missed_pongs: 0,
            max_missed_pongs: account.max_missed_pongs,
            validated: false,
            stopped: false,
            heartbeat_active: false,
            base_ms: account.reconnect_interval_ms,
            max_ms: account.max_reconnect_interval_ms,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn missed_pongs(&self) -> u32 {
        self.missed_pongs
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    pub fn heartbeat_active(&self) -> bool {
        self.heartbeat_active
    }

    /// Enter `Connecting`. Returns `false` (and changes nothing) once stopped.
    pub fn begin_connect(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        self.phase = Phase::Connecting;
        true
    }

    /// Socket is open: fresh liveness state, heartbeat armed.
    ///
    /// The attempt counter is left alone; only a pong proves the relay
    /// accepted us.
    pub fn on_open(&mut self) {
        self.phase = Phase::Open;
        self.missed_pongs = 0;
        self.validated = false;
        self.heartbeat_active = true;
    }

    pub fn on_heartbeat_tick(&mut self) -> TickAction {
        if self.missed_pongs >= self.max_missed_pongs {
            self.heartbeat_active = false;
            return TickAction::ForceClose {
                missed: self.missed_pongs,
            };
        }
        self.missed_pongs += 1;
        TickAction::SendPing {
            missed: self.missed_pongs,
        }
    }

    pub fn on_pong(&mut self) {
        self.missed_pongs = 0;
        self.validated = true;
        self.reconnect_attempts = 0;
    }

    pub fn on_close(&mut self, close: &CloseInfo) -> CloseAction {
        self.heartbeat_active = false;
        if self.stopped {
            return CloseAction::Resolve;
        }
        if close.is_auth_failure() {
            self.mark_stopped();
            return CloseAction::Terminal;
        }
        self.schedule_reconnect()
    }

    fn schedule_reconnect(&mut self) -> CloseAction {
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        self.phase = Phase::Reconnecting;
        CloseAction::Reconnect {
            attempt: self.reconnect_attempts,
            delay: reconnect_delay(self.base_ms, self.max_ms, self.reconnect_attempts),
        }
    }

    /// Returns `true` only for the call that actually stopped the supervisor.
    pub fn mark_stopped(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        self.stopped = true;
        self.heartbeat_active = false;
        self.phase = Phase::Stopped;
        true
    }
}
