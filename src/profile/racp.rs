//! Record Access Control Point gate.
//!
//! A RACP-capable profile instance runs at most one long-running operation
//! at a time. While one is outstanding only a single abort is accepted;
//! the instance is Idle again once the response (or abort confirmation)
//! arrives, or when the link goes away.

use crate::error::{Error, Result};

/// RACP op codes issued by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RacpOpCode {
    ReportStoredRecords,
    DeleteStoredRecords,
    Abort,
    ReportNumberOfRecords,
}

impl RacpOpCode {
    pub fn code(self) -> u8 {
        match self {
            RacpOpCode::ReportStoredRecords => 0x01,
            RacpOpCode::DeleteStoredRecords => 0x02,
            RacpOpCode::Abort => 0x03,
            RacpOpCode::ReportNumberOfRecords => 0x04,
        }
    }
}

/// Record filter applied by the operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RacpOperator {
    Null,
    AllRecords,
    LessOrEqual(u16),
    GreaterOrEqual(u16),
    WithinRange(u16, u16),
    First,
    Last,
}

/// Full RACP request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RacpRequest {
    pub op: RacpOpCode,
    pub operator: RacpOperator,
}

impl RacpRequest {
    pub const fn abort() -> Self {
        Self {
            op: RacpOpCode::Abort,
            operator: RacpOperator::Null,
        }
    }
}

/// RACP response codes reported by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RacpStatus {
    Success,
    OpCodeNotSupported,
    InvalidOperator,
    OperatorNotSupported,
    InvalidOperand,
    NoRecordsFound,
    AbortUnsuccessful,
    ProcedureNotCompleted,
    OperandNotSupported,
    Other(u8),
}

impl From<u8> for RacpStatus {
    fn from(code: u8) -> Self {
        match code {
            0x01 => RacpStatus::Success,
            0x02 => RacpStatus::OpCodeNotSupported,
            0x03 => RacpStatus::InvalidOperator,
            0x04 => RacpStatus::OperatorNotSupported,
            0x05 => RacpStatus::InvalidOperand,
            0x06 => RacpStatus::NoRecordsFound,
            0x07 => RacpStatus::AbortUnsuccessful,
            0x08 => RacpStatus::ProcedureNotCompleted,
            0x09 => RacpStatus::OperandNotSupported,
            other => RacpStatus::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RacpState {
    Idle,
    Ongoing {
        op: RacpOpCode,
        abort_requested: bool,
    },
}

impl RacpState {
    /// Admit `request`, moving to `Ongoing` or recording the abort.
    pub fn admit(&mut self, request: &RacpRequest) -> Result<()> {
        match (*self, request.op) {
            (RacpState::Idle, RacpOpCode::Abort) => Err(Error::NotFound),
            (RacpState::Idle, op) => {
                *self = RacpState::Ongoing {
                    op,
                    abort_requested: false,
                };
                Ok(())
            }
            (
                RacpState::Ongoing {
                    op,
                    abort_requested: false,
                },
                RacpOpCode::Abort,
            ) => {
                *self = RacpState::Ongoing {
                    op,
                    abort_requested: true,
                };
                Ok(())
            }
            (RacpState::Ongoing { .. }, _) => Err(Error::Busy),
        }
    }

    /// The outstanding operation finished (response or abort confirmation).
    pub fn complete(&mut self) -> Option<RacpOpCode> {
        match core::mem::replace(self, RacpState::Idle) {
            RacpState::Ongoing { op, .. } => Some(op),
            RacpState::Idle => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, RacpState::Idle)
    }
}

impl Default for RacpState {
    fn default() -> Self {
        RacpState::Idle
    }
}
