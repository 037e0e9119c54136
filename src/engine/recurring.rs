use chrono::{Days, Months, NaiveDate};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::MAX_RECURRING_OCCURRENCES;
use crate::model::*;

use super::conflict::{check_availability, check_no_overlap};
use super::slots::{opening_window, reserve};
use super::{BookingError, Engine};

pub(crate) const SERIES_TOO_LONG: &str = "too many occurrences in recurring series";

/// An occurrence that could not be booked, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedOccurrence {
    pub date: NaiveDate,
    pub reason: BookingError,
}

/// What a recurring expansion produced. Occurrences are never fatal: each
/// one ends up in exactly one of the two lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecurringOutcome {
    pub created: Vec<Booking>,
    pub skipped: Vec<SkippedOccurrence>,
}

/// Occurrence `n` of a series starting at `first` (occurrence 0).
///
/// Computed from `first` rather than from occurrence `n - 1`, so a monthly
/// series on the 31st lands on each month's last day without drifting.
fn nth_occurrence(first: NaiveDate, frequency: Frequency, n: u32) -> Option<NaiveDate> {
    match frequency {
        Frequency::Weekly => first.checked_add_days(Days::new(7 * u64::from(n))),
        Frequency::Monthly => first.checked_add_months(Months::new(n)),
    }
}

/// True if `until` admits more than `MAX_RECURRING_OCCURRENCES` dates after
/// `first`. Such a series is refused outright rather than cut short.
pub fn exceeds_occurrence_limit(first: NaiveDate, frequency: Frequency, until: NaiveDate) -> bool {
    nth_occurrence(first, frequency, MAX_RECURRING_OCCURRENCES as u32 + 1)
        .is_some_and(|date| date <= until)
}

/// Dates after `first`, one period apart, up to and including `until`.
/// Never longer than `MAX_RECURRING_OCCURRENCES`; callers check
/// `exceeds_occurrence_limit` first.
pub fn occurrence_dates(first: NaiveDate, frequency: Frequency, until: NaiveDate) -> Vec<NaiveDate> {
    (1..=MAX_RECURRING_OCCURRENCES as u32)
        .map_while(|n| nth_occurrence(first, frequency, n).filter(|date| *date <= until))
        .collect()
}

impl Engine {
    /// Book every later occurrence of `original`'s slot. Unavailable or failing
    /// occurrences are reported in `skipped`; the rest are committed one day
    /// at a time as instances pointing back at `original`.
    pub async fn expand_recurring(
        &self,
        original: &Booking,
        frequency: Frequency,
        until: NaiveDate,
    ) -> Result<RecurringOutcome, BookingError> {
        if exceeds_occurrence_limit(original.date, frequency, until) {
            return Err(BookingError::LimitExceeded(SERIES_TOO_LONG));
        }
        let facility = self.facility(&original.facility_id).await?;
        Ok(self.expand_with(&facility, original, frequency, until).await)
    }

    /// Expansion against an already loaded facility. Infallible: every date
    /// ends up in `created` or `skipped`.
    pub(super) async fn expand_with(
        &self,
        facility: &Facility,
        original: &Booking,
        frequency: Frequency,
        until: NaiveDate,
    ) -> RecurringOutcome {
        let mut outcome = RecurringOutcome::default();

        for date in occurrence_dates(original.date, frequency, until) {
            match self.commit_occurrence(facility, original, date).await {
                Ok(booking) => outcome.created.push(booking),
                Err(reason) => {
                    metrics::counter!(crate::observability::RECURRING_SKIPPED_TOTAL, "reason" => reason.kind())
                        .increment(1);
                    debug!(original = %original.id, %date, "skipped occurrence: {reason}");
                    outcome.skipped.push(SkippedOccurrence { date, reason });
                }
            }
        }

        info!(
            original = %original.id,
            created = outcome.created.len(),
            skipped = outcome.skipped.len(),
            "expanded recurring booking"
        );
        outcome
    }

    async fn commit_occurrence(
        &self,
        facility: &Facility,
        original: &Booking,
        date: NaiveDate,
    ) -> Result<Booking, BookingError> {
        let range = original.range();
        let window = opening_window(facility, self.settings.default_window);
        let mut txn = self.begin_open_day(facility, date).await?;
        let covered = check_availability(&window, &txn, &range)?;
        check_no_overlap(&txn, &range)?;

        let booking = Booking {
            id: Ulid::new(),
            date,
            recurring: None,
            is_recurring_instance: true,
            original_booking_id: Some(original.id),
            created_at: self.clock.now_ms(),
            ..original.clone()
        };
        let slots = reserve(&txn.slots, covered, booking.id);
        let event = Event::BookingCommitted {
            booking: booking.clone(),
            slots,
        };
        self.persist_and_apply(&mut txn, &event).await?;

        metrics::counter!(
            crate::observability::BOOKINGS_CREATED_TOTAL,
            "kind" => "recurring_instance",
            "status" => booking.status.as_str()
        )
        .increment(1);
        Ok(booking)
    }
}
