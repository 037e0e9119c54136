use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::Engine;

impl Engine {
    pub fn get_booking(&self, id: Ulid) -> Option<Booking> {
        self.bookings.get(&id).map(|e| e.value().clone())
    }

    /// Every booking on a facility's day, cancelled included, by start time.
    pub async fn bookings_for_day(&self, facility_id: &str, date: NaiveDate) -> Vec<Booking> {
        let Some(day) = self.existing_day(&DayKey::new(facility_id, date)) else {
            return vec![];
        };
        let guard = day.read().await;
        guard
            .bookings
            .iter()
            .filter_map(|span| self.get_booking(span.id))
            .collect()
    }

    /// The user's denormalized booking list, by date then start time.
    pub fn user_bookings(&self, user_id: &str) -> Vec<UserBookingEntry> {
        let mut entries = self
            .user_bookings
            .get(user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        entries.sort_by_key(|e| (e.date, e.start_time));
        entries
    }

    /// Recurring instances created from `original_id`, by date.
    pub fn series(&self, original_id: Ulid) -> Vec<Booking> {
        let ids = self
            .series
            .get(&original_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut instances: Vec<Booking> = ids.into_iter().filter_map(|id| self.get_booking(id)).collect();
        instances.sort_by_key(|b| b.date);
        instances
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }
}
