//! Run state machine and the control surface shared with callers
//!
//! The orchestrator loop owns the state transitions; callers only raise requests
//! (`resume`, `skip_current`, `stop`) that the loop observes at its next
//! suspension point. A request wakes a waiting loop immediately through a
//! [`Notify`]; the loop also polls every [`POLL_INTERVAL`], so a request is
//! observed within that bound even if a wakeup is missed.

use crate::{HarvestError, Result};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Upper bound on how long a paused loop goes without re-checking its flags
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle of one orchestrator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Completed,
    Stopped,
}

impl RunState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped)
    }

    /// Returns true if the transition is part of the lifecycle
    ///
    /// `Idle -> Running -> {Paused <-> Running} -> {Completed | Stopped}`; any
    /// non-terminal state may move to `Stopped`.
    pub fn can_transition_to(&self, to: RunState) -> bool {
        matches!(
            (self, to),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Paused)
                | (Self::Paused, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Idle, Self::Stopped)
                | (Self::Running, Self::Stopped)
                | (Self::Paused, Self::Stopped)
        )
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Paused => 2,
            Self::Completed => 3,
            Self::Stopped => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::Completed,
            4 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// What a paused run should do with the result that paused it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep the result and continue
    Resume,
    /// Discard the result and continue
    Skip,
    /// Discard the result and end the run
    Stop,
}

const NO_DECISION: u8 = 0;
const DECIDED_RESUME: u8 = 1;
const DECIDED_SKIP: u8 = 2;

/// Flags shared between the orchestrator loop, the engine and external callers
#[derive(Debug)]
pub struct RunControl {
    state: AtomicU8,
    stop_requested: AtomicBool,
    decision: AtomicU8,
    notify: Notify,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(RunState::Idle.as_u8()),
            stop_requested: AtomicBool::new(false),
            decision: AtomicU8::new(NO_DECISION),
            notify: Notify::new(),
        }
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Moves to `to` if the lifecycle allows it from the current state
    pub(crate) fn transition(&self, to: RunState) -> Result<()> {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            let from = RunState::from_u8(current);
            if !from.can_transition_to(to) {
                return Err(HarvestError::InvalidTransition { from, to });
            }
            match self.state.compare_exchange(
                current,
                to.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    tracing::debug!("Run state {} -> {}", from, to);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Enters `Paused`, clearing any decision left from an earlier pause
    pub(crate) fn pause(&self) -> Result<()> {
        self.decision.store(NO_DECISION, Ordering::SeqCst);
        self.transition(RunState::Paused)
    }

    /// Asks a paused run to keep the current result and continue
    ///
    /// Returns false if the run is not paused.
    pub fn resume(&self) -> bool {
        self.decide(DECIDED_RESUME)
    }

    /// Asks a paused run to discard the current result and continue
    ///
    /// Returns false if the run is not paused.
    pub fn skip_current(&self) -> bool {
        self.decide(DECIDED_SKIP)
    }

    fn decide(&self, decision: u8) -> bool {
        if self.state() != RunState::Paused {
            return false;
        }
        self.decision.store(decision, Ordering::SeqCst);
        self.notify.notify_waiters();
        true
    }

    /// Requests the run to end; valid in any state and idempotent
    ///
    /// In-flight fetches are abandoned and the queue is discarded. Results already
    /// emitted stay emitted.
    pub fn stop(&self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            tracing::info!("Stop requested");
        }
        self.notify.notify_waiters();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// True while the run is `Running` or `Paused`
    pub fn is_running(&self) -> bool {
        matches!(self.state(), RunState::Running | RunState::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.state() == RunState::Paused
    }

    /// Completes once a stop has been requested
    ///
    /// Meant to be raced against in-flight work with `tokio::select!`.
    pub async fn stopped(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Waits in `Paused` until a caller decides
    ///
    /// Wakes on every request and re-checks at least every [`POLL_INTERVAL`].
    /// A stop request wins over a pending resume or skip.
    pub(crate) async fn wait_for_decision(&self) -> Decision {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_stop_requested() {
                return Decision::Stop;
            }
            match self.decision.swap(NO_DECISION, Ordering::SeqCst) {
                DECIDED_RESUME => return Decision::Resume,
                DECIDED_SKIP => return Decision::Skip,
                _ => {}
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }
}

/// Cloneable control surface for a run, usable from any task
#[derive(Debug, Clone)]
pub struct RunHandle {
    control: Arc<RunControl>,
}

impl RunHandle {
    pub(crate) fn new(control: Arc<RunControl>) -> Self {
        Self { control }
    }

    pub fn resume(&self) -> bool {
        self.control.resume()
    }

    pub fn skip_current(&self) -> bool {
        self.control.skip_current()
    }

    pub fn stop(&self) {
        self.control.stop()
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn state(&self) -> RunState {
        self.control.state()
    }
}
