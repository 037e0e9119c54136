use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;

use super::conflict::*;
use super::recurring::RecurringOutcome;
use super::slots::{release, reserve};
use super::{BookingError, Engine};

/// Fee text meaning "no charge".
pub const FREE_FEE_SENTINEL: &str = "Free for residents";

/// Payment fields for a new booking, from the facility's free-form fee.
///
/// The sentinel, an empty fee and a zero amount are free. Otherwise the first
/// number in the text is read as the amount in major units (`"$25.50 per
/// session"` → 2550); text with no number is pending with amount 0.
pub fn payment_terms(fee: &str) -> (PaymentStatus, u64) {
    let fee = fee.trim();
    if fee.is_empty() || fee.eq_ignore_ascii_case(FREE_FEE_SENTINEL) {
        return (PaymentStatus::Free, 0);
    }
    match parse_amount_minor(fee) {
        Some(0) => (PaymentStatus::Free, 0),
        Some(amount) => (PaymentStatus::Pending, amount),
        None => (PaymentStatus::Pending, 0),
    }
}

fn parse_amount_minor(text: &str) -> Option<u64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(rest.len());
    let number: String = rest[..end].chars().filter(|c| *c != ',').collect();
    let (whole, frac) = number.split_once('.').unwrap_or((&number, ""));
    let whole: u64 = whole.parse().ok()?;
    let cents = match frac.len() {
        0 => 0,
        1 => frac.parse::<u64>().ok()? * 10,
        _ => frac[..2].parse::<u64>().ok()?,
    };
    whole.checked_mul(100)?.checked_add(cents)
}

/// A created booking plus, for recurring requests, what the series produced.
#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub booking: Booking,
    pub series: Option<RecurringOutcome>,
}

fn reject<T>(err: BookingError) -> Result<T, BookingError> {
    metrics::counter!(crate::observability::BOOKINGS_REJECTED_TOTAL, "reason" => err.kind())
        .increment(1);
    debug!("booking rejected: {err}");
    Err(err)
}

impl Engine {
    /// Create one booking. Every precondition is checked before any write;
    /// the slot check, the overlap scan and the commit run inside the day's
    /// transaction.
    pub async fn create_booking(
        &self,
        ctx: &UserContext,
        request: &BookingRequest,
    ) -> Result<Booking, BookingError> {
        self.commit_booking(ctx, request).await.map(|(booking, _)| booking)
    }

    /// `create_booking`, also handing back the facility it was checked against.
    async fn commit_booking(
        &self,
        ctx: &UserContext,
        request: &BookingRequest,
    ) -> Result<(Booking, Facility), BookingError> {
        let facility = match self.facility(&request.facility_id).await {
            Ok(f) => f,
            Err(e) => return reject(e),
        };
        let range = match self.validate_request(&facility, request) {
            Ok(range) => range,
            Err(e) => return reject(e),
        };

        let window = super::slots::opening_window(&facility, self.settings.default_window);
        let mut txn = self.begin_open_day(&facility, request.date).await?;
        let covered = match check_availability(&window, &txn, &range)
            .and_then(|covered| check_no_overlap(&txn, &range).map(|()| covered))
        {
            Ok(covered) => covered,
            Err(e) => return reject(e),
        };

        let (payment_status, payment_amount) = payment_terms(&facility.fee);
        let booking = Booking {
            id: Ulid::new(),
            facility_id: facility.id.clone(),
            facility_name: facility.name.clone(),
            user_id: ctx.user_id.clone(),
            user_name: ctx.user_name.clone(),
            date: request.date,
            start_time: range.start,
            end_time: range.end,
            status: if facility.requires_staff_approval {
                BookingStatus::Pending
            } else {
                BookingStatus::Confirmed
            },
            participants: request.participants,
            notes: request.notes.clone(),
            payment_status,
            payment_amount,
            recurring: request.recurrence.clone().filter(|r| r.is_recurring),
            is_recurring_instance: false,
            original_booking_id: None,
            created_at: self.clock.now_ms(),
        };
        let slots = reserve(&txn.slots, covered, booking.id);
        let event = Event::BookingCommitted {
            booking: booking.clone(),
            slots,
        };
        self.persist_and_apply(&mut txn, &event).await?;

        metrics::counter!(
            crate::observability::BOOKINGS_CREATED_TOTAL,
            "kind" => "single",
            "status" => booking.status.as_str()
        )
        .increment(1);
        info!(
            booking = %booking.id,
            day = %txn.key,
            range = %range,
            user = %booking.user_id,
            status = booking.status.as_str(),
            "booking committed"
        );
        Ok((booking, facility))
    }

    /// Precondition chain, first failure wins.
    fn validate_request(
        &self,
        facility: &Facility,
        request: &BookingRequest,
    ) -> Result<TimeRange, BookingError> {
        validate_participants(facility, request.participants)?;
        let range = validate_time_range(facility, request.start_time, request.end_time)?;
        validate_booking_window(facility, request.date, self.clock.today())?;
        validate_recurrence(request.recurrence.as_ref(), request.date)?;
        validate_notes(&request.notes)?;
        Ok(range)
    }

    /// Create the booking and, if the request recurs, expand the series.
    /// Once the original is committed this returns `Ok`: the series reuses the
    /// facility already loaded, and a failing occurrence only lands in
    /// `skipped`.
    pub async fn book(
        &self,
        ctx: &UserContext,
        request: &BookingRequest,
    ) -> Result<BookingOutcome, BookingError> {
        let (booking, facility) = self.commit_booking(ctx, request).await?;
        let series = match &booking.recurring {
            Some(RecurrenceDescriptor {
                is_recurring: true,
                frequency: Some(frequency),
                end_date: Some(until),
            }) => Some(self.expand_with(&facility, &booking, *frequency, *until).await),
            _ => None,
        };
        Ok(BookingOutcome { booking, series })
    }

    /// Cancel a booking and free its slots. Owners may cancel their own
    /// bookings; staff may cancel any.
    pub async fn cancel_booking(&self, ctx: &UserContext, id: Ulid) -> Result<Booking, BookingError> {
        self.transition(ctx, id, None, BookingStatus::Cancelled).await
    }

    /// Staff only: `pending → confirmed`.
    pub async fn approve_booking(&self, ctx: &UserContext, id: Ulid) -> Result<Booking, BookingError> {
        if !ctx.is_staff() {
            return Err(BookingError::NotPermitted("only staff may approve bookings"));
        }
        self.transition(ctx, id, Some(BookingStatus::Pending), BookingStatus::Confirmed)
            .await
    }

    /// Staff only: `pending → cancelled`.
    pub async fn reject_booking(&self, ctx: &UserContext, id: Ulid) -> Result<Booking, BookingError> {
        if !ctx.is_staff() {
            return Err(BookingError::NotPermitted("only staff may reject bookings"));
        }
        self.transition(ctx, id, Some(BookingStatus::Pending), BookingStatus::Cancelled)
            .await
    }

    /// Move a booking to `to`, optionally only from status `from`.
    async fn transition(
        &self,
        ctx: &UserContext,
        id: Ulid,
        from: Option<BookingStatus>,
        to: BookingStatus,
    ) -> Result<Booking, BookingError> {
        let key = self
            .get_booking(id)
            .ok_or(BookingError::BookingNotFound(id))?
            .day_key();
        let mut txn = self.begin(&key).await.ok_or(BookingError::BookingNotFound(id))?;

        // Re-read under the day lock: the status may have moved meanwhile.
        let current = self.get_booking(id).ok_or(BookingError::BookingNotFound(id))?;
        if !ctx.is_staff() && current.user_id != ctx.user_id {
            return Err(BookingError::NotPermitted("booking belongs to another user"));
        }
        if !current.status.can_transition_to(to) || from.is_some_and(|f| f != current.status) {
            return Err(BookingError::InvalidStatusTransition {
                from: current.status,
                to,
            });
        }

        let slots = if to.is_active() {
            txn.slots.clone()
        } else {
            release(&txn.slots, id)
        };
        let event = Event::BookingStatusChanged {
            id,
            facility_id: key.facility_id.clone(),
            date: key.date,
            status: to,
            slots,
        };
        self.persist_and_apply(&mut txn, &event).await?;

        metrics::counter!(crate::observability::BOOKING_STATUS_CHANGES_TOTAL, "status" => to.as_str())
            .increment(1);
        info!(booking = %id, day = %key, from = current.status.as_str(), to = to.as_str(), by = %ctx.user_id, "booking status changed");
        Ok(Booking { status: to, ..current })
    }
}
