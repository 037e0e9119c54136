use std::ops::Range;

use chrono::{Days, NaiveDate};

use crate::limits::*;
use crate::model::*;

use super::recurring::{exceeds_occurrence_limit, SERIES_TOO_LONG};
use super::slots::covering_slots;
use super::BookingError;

pub(crate) fn validate_participants(facility: &Facility, participants: u32) -> Result<(), BookingError> {
    if participants == 0 || participants > facility.capacity {
        return Err(BookingError::InvalidParticipantCount {
            requested: participants,
            capacity: facility.capacity,
        });
    }
    Ok(())
}

/// `end > start`, and the duration inside the facility's min/max (0 = unbounded).
pub(crate) fn validate_time_range(
    facility: &Facility,
    start: TimeOfDay,
    end: TimeOfDay,
) -> Result<TimeRange, BookingError> {
    let range = TimeRange::checked(start, end)
        .ok_or_else(|| BookingError::InvalidTimeRange(format!("end {end} is not after start {start}")))?;
    let minutes = range.duration_minutes();
    let min = facility.min_booking_duration_minutes;
    let max = facility.max_booking_duration_minutes;
    if min > 0 && minutes < min {
        return Err(BookingError::InvalidTimeRange(format!(
            "{minutes} minutes is shorter than the minimum of {min}"
        )));
    }
    if max > 0 && minutes > max {
        return Err(BookingError::InvalidTimeRange(format!(
            "{minutes} minutes is longer than the maximum of {max}"
        )));
    }
    Ok(range)
}

/// Not in the past, and not beyond the facility's advance-booking horizon.
pub(crate) fn validate_booking_window(
    facility: &Facility,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<(), BookingError> {
    let latest = if facility.advance_booking_limit_days == 0 {
        NaiveDate::MAX
    } else {
        today
            .checked_add_days(Days::new(facility.advance_booking_limit_days.into()))
            .unwrap_or(NaiveDate::MAX)
    };
    if date < today || date > latest {
        return Err(BookingError::OutsideBookingWindow {
            date,
            earliest: today,
            latest,
        });
    }
    Ok(())
}

pub(crate) fn validate_recurrence(
    recurrence: Option<&RecurrenceDescriptor>,
    date: NaiveDate,
) -> Result<(), BookingError> {
    let Some(desc) = recurrence.filter(|d| d.is_recurring) else {
        return Ok(());
    };
    let Some(frequency) = desc.frequency else {
        return Err(BookingError::InvalidRecurrence("frequency is required"));
    };
    match desc.end_date {
        None => Err(BookingError::InvalidRecurrence("end date is required")),
        Some(end) if end <= date => Err(BookingError::InvalidRecurrence(
            "end date must be after the first booking",
        )),
        Some(end) if exceeds_occurrence_limit(date, frequency, end) => {
            Err(BookingError::LimitExceeded(SERIES_TOO_LONG))
        }
        Some(_) => Ok(()),
    }
}

pub(crate) fn validate_notes(notes: &str) -> Result<(), BookingError> {
    if notes.len() > MAX_NOTES_LEN {
        return Err(BookingError::LimitExceeded("notes too long"));
    }
    Ok(())
}

/// Fast pre-filter against the day document.
///
/// 1. The range must sit inside the facility's opening window.
/// 2. The range must be tiled exactly by contiguous slots, all available.
///
/// Returns the covered slot indices.
pub(crate) fn check_availability(
    window: &TimeRange,
    day: &DayState,
    range: &TimeRange,
) -> Result<Range<usize>, BookingError> {
    if !window.contains_range(range) {
        return Err(BookingError::FacilityHoursViolation {
            requested: *range,
            open: *window,
        });
    }
    let unavailable = || BookingError::SlotUnavailable { requested: *range };
    let covered = covering_slots(&day.slots, range).ok_or_else(unavailable)?;
    if day.slots[covered.clone()].iter().all(|s| s.available) {
        Ok(covered)
    } else {
        Err(unavailable())
    }
}

/// Authoritative overlap scan over every non-cancelled booking of the day.
pub(crate) fn check_no_overlap(day: &DayState, range: &TimeRange) -> Result<(), BookingError> {
    if let Some(existing) = day.active_overlapping(range).next() {
        return Err(BookingError::BookingConflict(existing.id));
    }
    let active = day.bookings.iter().filter(|b| b.status.is_active()).count();
    if active >= MAX_BOOKINGS_PER_DAY {
        return Err(BookingError::LimitExceeded("too many bookings on this day"));
    }
    Ok(())
}
