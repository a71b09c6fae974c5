use time::Date;

use crate::record::PermitDomain;

/// Input rejected locally before anything reaches the backend.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ValidationError {
    #[error("a reason is required when setting status to {status}")]
    MissingReason { status: &'static str },
    #[error("unknown status value: {0:?}")]
    UnknownStatus(String),
    #[error("status {status} is not part of the {domain} workflow")]
    StatusNotInDomain { domain: PermitDomain, status: &'static str },
    #[error("transition from {from} to {to} is not allowed")]
    IllegalTransition { from: String, to: &'static str },
    #[error("{0} must not be empty")]
    EmptyInput(&'static str),
    #[error("date range start {start} is after end {end}")]
    InvalidDateRange { start: Date, end: Date },
    #[error("cannot determine the permit domain of application {0}")]
    UnknownDomain(String),
}
