use chrono::NaiveDate;
use thiserror::Error;
use ulid::Ulid;

use crate::catalog::CatalogError;
use crate::model::{BookingStatus, TimeRange};

/// Every way a booking operation can fail. Display text is meant to be shown
/// to the requesting user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    #[error("facility not found: {0}")]
    FacilityNotFound(String),

    #[error("participants must be between 1 and {capacity}, got {requested}")]
    InvalidParticipantCount { requested: u32, capacity: u32 },

    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("{date} is outside the booking window {earliest} to {latest}")]
    OutsideBookingWindow {
        date: NaiveDate,
        earliest: NaiveDate,
        latest: NaiveDate,
    },

    #[error("invalid recurrence: {0}")]
    InvalidRecurrence(&'static str),

    #[error("{requested} is outside facility hours {open}")]
    FacilityHoursViolation { requested: TimeRange, open: TimeRange },

    #[error("{requested} is not available")]
    SlotUnavailable { requested: TimeRange },

    #[error("conflicts with existing booking {0}")]
    BookingConflict(Ulid),

    #[error("booking not found: {0}")]
    BookingNotFound(Ulid),

    #[error("not permitted: {0}")]
    NotPermitted(&'static str),

    #[error("cannot change booking from {from} to {to}")]
    InvalidStatusTransition { from: BookingStatus, to: BookingStatus },

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("store access failure: {0}")]
    StoreAccessFailure(String),
}

impl BookingError {
    /// Short stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::FacilityNotFound(_) => "facility_not_found",
            BookingError::InvalidParticipantCount { .. } => "invalid_participant_count",
            BookingError::InvalidTimeRange(_) => "invalid_time_range",
            BookingError::OutsideBookingWindow { .. } => "outside_booking_window",
            BookingError::InvalidRecurrence(_) => "invalid_recurrence",
            BookingError::FacilityHoursViolation { .. } => "facility_hours_violation",
            BookingError::SlotUnavailable { .. } => "slot_unavailable",
            BookingError::BookingConflict(_) => "booking_conflict",
            BookingError::BookingNotFound(_) => "booking_not_found",
            BookingError::NotPermitted(_) => "not_permitted",
            BookingError::InvalidStatusTransition { .. } => "invalid_status_transition",
            BookingError::LimitExceeded(_) => "limit_exceeded",
            BookingError::StoreAccessFailure(_) => "store_access_failure",
        }
    }
}

impl From<std::io::Error> for BookingError {
    fn from(e: std::io::Error) -> Self {
        BookingError::StoreAccessFailure(e.to_string())
    }
}

impl From<CatalogError> for BookingError {
    fn from(e: CatalogError) -> Self {
        BookingError::StoreAccessFailure(e.to_string())
    }
}
