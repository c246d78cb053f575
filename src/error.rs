//! Domain error types shared by the workflow modules.

use thiserror::Error;

use crate::models::{Role, Shift, SwapStatus, VacationStatus};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EscalaError {
    #[error("invalid month {0}")]
    InvalidMonth(u32),

    #[error("year {0} is outside 1..=9999")]
    InvalidYear(i32),

    #[error("invalid date '{0}'")]
    InvalidDate(String),

    #[error("{0} is not allowed to perform this action")]
    NotAuthorized(String),

    #[error("swap request cannot go from {from} to {to}")]
    InvalidSwapTransition { from: SwapStatus, to: SwapStatus },

    #[error("vacation request cannot go from {from} to {to}")]
    InvalidVacationTransition {
        from: VacationStatus,
        to: VacationStatus,
    },

    #[error("{name} is not scheduled for {shift} on {date}")]
    SlotMismatch {
        name: String,
        date: String,
        shift: Shift,
    },

    #[error("date {0} is not part of the schedule")]
    DateOutsideSchedule(String),

    #[error("an operator cannot swap with themselves")]
    SelfSwap,

    #[error("vacation ends before it starts ({start} > {end})")]
    InvertedRange { start: String, end: String },

    #[error("vacation overlaps an existing request from {start} to {end}")]
    OverlappingVacation { start: String, end: String },

    #[error("user {0} is inactive")]
    InactiveUser(String),

    #[error("'{name}' clashes with the registered name '{existing}'")]
    DuplicateName { name: String, existing: String },

    #[error("the first account must be super_admin, not {0}")]
    BootstrapRole(Role),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("unknown value '{0}'")]
    UnknownValue(String),
}

pub type EscalaResult<T> = Result<T, EscalaError>;
