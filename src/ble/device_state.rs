//! Device operating mode and boot-time setup sequence.
//!
//! The device is in exactly one [`DeviceState`]. Transitions happen only
//! when the host stack confirms them; while a confirmation is outstanding
//! the matching [`PendingOp`] blocks any other state-changing request.

use crate::ble::Status;
use crate::error::{Error, Result};

/// Operating mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    /// Boot: setup sequence not finished (or failed).
    Init,
    /// Resting state; inquiry, advertising or connection may start.
    Idle,
    /// Inquiry running.
    Scanning,
    /// Advertising running.
    Advertising,
}

/// Setup steps issued from `Init`, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetupStep {
    SetSecurityPolicy,
    ReadVersion,
    ReadLocalAddress,
    CreateDatabase,
    InitKeys,
}

impl SetupStep {
    pub const SEQUENCE: [SetupStep; 5] = [
        SetupStep::SetSecurityPolicy,
        SetupStep::ReadVersion,
        SetupStep::ReadLocalAddress,
        SetupStep::CreateDatabase,
        SetupStep::InitKeys,
    ];

    pub fn next(self) -> Option<SetupStep> {
        let index = Self::SEQUENCE.iter().position(|s| *s == self)?;
        Self::SEQUENCE.get(index + 1).copied()
    }
}

/// Device-level request awaiting its confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PendingOp {
    AdvertisingStart,
    AdvertisingStop,
    InquiryStop,
    Connect,
    ConnectCancel,
}

/// Progress of the setup sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetupProgress {
    NotStarted,
    Waiting(SetupStep),
    Done,
    Failed { step: SetupStep, status: Status },
}

/// What a setup confirmation means for the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Issue this step next.
    Next(SetupStep),
    /// Every step succeeded; the device is now Idle.
    Complete,
    /// Setup aborted at `step`.
    Failed { step: SetupStep, status: Status },
    /// Confirmation not expected right now; nothing changed.
    Ignored,
}

pub struct DeviceMachine {
    state: DeviceState,
    pending: Option<PendingOp>,
    setup: SetupProgress,
}

impl DeviceMachine {
    pub const fn new() -> Self {
        Self {
            state: DeviceState::Init,
            pending: None,
            setup: SetupProgress::NotStarted,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn pending(&self) -> Option<PendingOp> {
        self.pending
    }

    pub fn setup(&self) -> SetupProgress {
        self.setup
    }

    /// Back to a fresh `Init`, ready for `begin_setup`.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Start the setup sequence; returns the first step to issue.
    pub fn begin_setup(&mut self) -> Result<SetupStep> {
        if self.state != DeviceState::Init || self.setup != SetupProgress::NotStarted {
            return Err(Error::InvalidState(self.state));
        }
        let first = SetupStep::SEQUENCE[0];
        self.setup = SetupProgress::Waiting(first);
        Ok(first)
    }

    /// Apply a setup confirmation. Steps must complete in order.
    pub fn on_setup_complete(&mut self, step: SetupStep, status: Status) -> SetupOutcome {
        let SetupProgress::Waiting(expected) = self.setup else {
            return SetupOutcome::Ignored;
        };

        if step != expected || !status.is_success() {
            let status = if status.is_success() {
                // Out-of-order success still breaks the sequence.
                Status::Failed(0xFF)
            } else {
                status
            };
            self.setup = SetupProgress::Failed {
                step: expected,
                status,
            };
            return SetupOutcome::Failed {
                step: expected,
                status,
            };
        }

        match step.next() {
            Some(next) => {
                self.setup = SetupProgress::Waiting(next);
                SetupOutcome::Next(next)
            }
            None => {
                self.setup = SetupProgress::Done;
                self.state = DeviceState::Idle;
                SetupOutcome::Complete
            }
        }
    }

    /// Give up on the step being waited for. Returns it, if there was one.
    pub fn abort_setup(&mut self, status: Status) -> Option<SetupStep> {
        let SetupProgress::Waiting(step) = self.setup else {
            return None;
        };
        self.setup = SetupProgress::Failed { step, status };
        Some(step)
    }

    /// Check that a new device-level operation may start from `required`.
    pub fn require(&self, required: DeviceState) -> Result<()> {
        if self.state != required {
            return Err(Error::InvalidState(self.state));
        }
        if self.pending.is_some() {
            return Err(Error::OperationPending);
        }
        Ok(())
    }

    pub fn set_pending(&mut self, op: PendingOp) {
        self.pending = Some(op);
    }

    /// Clear `op` if it is the outstanding one. Returns whether it was.
    pub fn take_pending(&mut self, op: PendingOp) -> bool {
        if self.pending == Some(op) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Move to `state`. Only the controller calls this, and only on a
    /// confirmation (or the inquiry start, which has none).
    pub fn enter(&mut self, state: DeviceState) {
        self.state = state;
    }
}

impl Default for DeviceMachine {
    fn default() -> Self {
        Self::new()
    }
}
