use chrono::NaiveDate;

use crate::model::*;

use super::{BookingError, Engine};

// ── Availability store access ─────────────────────────────────────

impl Engine {
    /// The day document for (facility, date), created and persisted with the
    /// canonical slot list on first access. Existing documents are returned
    /// verbatim, reserved slots included.
    pub async fn get_or_create_day_availability(
        &self,
        facility_id: &str,
        date: NaiveDate,
    ) -> Result<DayAvailability, BookingError> {
        let facility = self.facility(facility_id).await?;
        let txn = self.begin_open_day(&facility, date).await?;
        Ok(txn.snapshot())
    }

    /// Read-only view. `None` if the day document has never been created.
    pub async fn day_availability(&self, facility_id: &str, date: NaiveDate) -> Option<DayAvailability> {
        let day = self.existing_day(&DayKey::new(facility_id, date))?;
        let guard = day.read().await;
        guard.opened.then(|| guard.snapshot())
    }
}
