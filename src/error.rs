use std::time::Duration;

use thiserror::Error;

use crate::data::{CohortId, OfferId, PeriodId, StudentId};

/// Everything that makes a solve fail. Unsatisfiable placements are not
/// errors: they end up in a fallback tier and are only counted.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("cohort {cohort} has no default organization (reference {reference})")]
    MissingDefaultOrganization { cohort: CohortId, reference: String },

    #[error("cohort {cohort} has no pending organization (reference {reference})")]
    MissingPendingOrganization { cohort: CohortId, reference: String },

    #[error("cohort {cohort} has no default speciality (acronym {acronym})")]
    MissingDefaultSpeciality { cohort: CohortId, acronym: String },

    #[error("cohort {0} is already published")]
    CohortPublished(CohortId),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no capacity record for offer {offer} in period {period}")]
    MissingPlaceRecord { offer: OfferId, period: PeriodId },

    #[error("capacity of offer {offer} in period {period} would drop below zero")]
    CapacityUnderflow { offer: OfferId, period: PeriodId },

    #[error("student {student} is already placed in period {period}")]
    DoubleBooking { student: StudentId, period: PeriodId },

    #[error("student {student} would hold more than {limit} periods")]
    TooManyPeriods { student: StudentId, limit: usize },

    #[error("solve cancelled")]
    Cancelled,

    #[error("solve exceeded its time budget of {limit:?} (ran {elapsed:?})")]
    TimeBudgetExceeded { limit: Duration, elapsed: Duration },
}

impl SolverError {
    /// Problems with the cohort set-up, detected before any assignment work.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SolverError::MissingDefaultOrganization { .. }
                | SolverError::MissingPendingOrganization { .. }
                | SolverError::MissingDefaultSpeciality { .. }
                | SolverError::CohortPublished(_)
                | SolverError::InvalidInput(_)
        )
    }

    /// Corruption of the in-memory state during a solve.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            SolverError::MissingPlaceRecord { .. }
                | SolverError::CapacityUnderflow { .. }
                | SolverError::DoubleBooking { .. }
                | SolverError::TooManyPeriods { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cohort {0} not found")]
    UnknownCohort(CohortId),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failure of a full load, solve and persist run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Solver(#[from] SolverError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {name} has an invalid value '{value}'")]
    InvalidValue { name: &'static str, value: String },
}
