use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

/// Unix milliseconds.
pub type Ms = i64;

/// Minutes in a day; `24:00` is the only accepted value at this bound.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Wall-clock time within the facility's single timezone, stored as minutes
/// since midnight. Serialized as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(MINUTES_PER_DAY);

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes <= MINUTES_PER_DAY).then_some(Self(minutes))
    }

    /// For constants: an out-of-range time fails const evaluation. Runtime
    /// input goes through `from_minutes` or `FromStr`.
    pub const fn hm(hour: u16, minute: u16) -> Self {
        assert!(
            (hour < 24 && minute < 60) || (hour == 24 && minute == 0),
            "time of day out of range"
        );
        Self(hour * 60 + minute)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }

    pub fn checked_add_minutes(self, minutes: u16) -> Option<Self> {
        self.0.checked_add(minutes).and_then(Self::from_minutes)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeError(String);

impl fmt::Display for ParseTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time of day: {:?}", self.0)
    }
}

impl std::error::Error for ParseTimeError {}

impl FromStr for TimeOfDay {
    type Err = ParseTimeError;

    /// Accepts `H:MM` or `HH:MM`; `24:00` is the end of day.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeError(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(err)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(err());
        }
        let hour: u16 = h.parse().map_err(|_| err())?;
        let minute: u16 = m.parse().map_err(|_| err())?;
        if minute >= 60 || hour > 24 || (hour == 24 && minute != 0) {
            return Err(err());
        }
        Ok(Self(hour * 60 + minute))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Half-open interval `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeRange {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        debug_assert!(start < end, "TimeRange start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn checked(start: TimeOfDay, end: TimeOfDay) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes() - self.start.minutes()
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_range(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

// ── Facility catalog ─────────────────────────────────────────────

/// Static facility metadata owned by administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facility {
    #[serde(rename = "facilityId")]
    pub id: String,
    pub name: String,
    /// Free text, normally `"HH:MM - HH:MM"`.
    pub opening_hours: String,
    pub capacity: u32,
    /// 0 means no lower bound.
    #[serde(default)]
    pub min_booking_duration_minutes: u16,
    /// 0 means no upper bound.
    #[serde(default)]
    pub max_booking_duration_minutes: u16,
    /// 0 means no horizon.
    #[serde(default)]
    pub advance_booking_limit_days: u32,
    #[serde(default)]
    pub fee: String,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub requires_staff_approval: bool,
}

// ── Availability store ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub available: bool,
    pub booking_id: Option<Ulid>,
}

impl Slot {
    pub fn open(range: TimeRange) -> Self {
        Self {
            start_time: range.start,
            end_time: range.end,
            available: true,
            booking_id: None,
        }
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }
}

/// Identity of a day document: one per (facility, calendar day).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DayKey {
    pub facility_id: String,
    pub date: NaiveDate,
}

impl DayKey {
    pub fn new(facility_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            facility_id: facility_id.into(),
            date,
        }
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.facility_id, self.date)
    }
}

/// A booking as seen from its day: enough for the overlap scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingSpan {
    pub id: Ulid,
    pub range: TimeRange,
    pub status: BookingStatus,
}

/// In-memory state of one day document. Guarded by a per-day lock.
#[derive(Debug, Clone)]
pub struct DayState {
    pub key: DayKey,
    /// False until the canonical slots have been generated and persisted.
    pub opened: bool,
    pub slots: Vec<Slot>,
    /// Every booking ever made for this day, sorted by `range.start`.
    pub bookings: Vec<BookingSpan>,
}

impl DayState {
    pub fn new(key: DayKey) -> Self {
        Self {
            key,
            opened: false,
            slots: Vec::new(),
            bookings: Vec::new(),
        }
    }

    /// Insert a booking span maintaining sort order by start.
    pub fn insert_booking(&mut self, span: BookingSpan) {
        let pos = self
            .bookings
            .partition_point(|b| b.range.start <= span.range.start);
        self.bookings.insert(pos, span);
    }

    pub fn set_status(&mut self, id: Ulid, status: BookingStatus) -> bool {
        match self.bookings.iter_mut().find(|b| b.id == id) {
            Some(b) => {
                b.status = status;
                true
            }
            None => false,
        }
    }

    /// Non-cancelled bookings whose range overlaps `query`.
    /// Binary search skips bookings starting at or after `query.end`.
    pub fn active_overlapping(&self, query: &TimeRange) -> impl Iterator<Item = &BookingSpan> {
        let right_bound = self.bookings.partition_point(|b| b.range.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.range.end > query.start && b.status.is_active())
    }

    pub fn snapshot(&self) -> DayAvailability {
        DayAvailability {
            facility_id: self.key.facility_id.clone(),
            date: self.key.date,
            slots: self.slots.clone(),
        }
    }
}

/// Read view of a day document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAvailability {
    pub facility_id: String,
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
}

impl DayAvailability {
    pub fn free_slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|s| s.available)
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Pending,
    Cancelled,
}

impl BookingStatus {
    /// Active bookings hold their slots and take part in conflict checks.
    pub fn is_active(self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Pending => "pending",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Free,
    Pending,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceDescriptor {
    pub is_recurring: bool,
    pub frequency: Option<Frequency>,
    pub end_date: Option<NaiveDate>,
}

impl RecurrenceDescriptor {
    pub fn weekly(end_date: NaiveDate) -> Self {
        Self {
            is_recurring: true,
            frequency: Some(Frequency::Weekly),
            end_date: Some(end_date),
        }
    }

    pub fn monthly(end_date: NaiveDate) -> Self {
        Self {
            is_recurring: true,
            frequency: Some(Frequency::Monthly),
            end_date: Some(end_date),
        }
    }
}

/// The authoritative booking record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Ulid,
    pub facility_id: String,
    pub facility_name: String,
    pub user_id: String,
    pub user_name: String,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub status: BookingStatus,
    pub participants: u32,
    pub notes: String,
    pub payment_status: PaymentStatus,
    /// Minor currency units.
    pub payment_amount: u64,
    pub recurring: Option<RecurrenceDescriptor>,
    pub is_recurring_instance: bool,
    pub original_booking_id: Option<Ulid>,
    pub created_at: Ms,
}

impl Booking {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    pub fn day_key(&self) -> DayKey {
        DayKey::new(self.facility_id.clone(), self.date)
    }

    pub fn span(&self) -> BookingSpan {
        BookingSpan {
            id: self.id,
            range: self.range(),
            status: self.status,
        }
    }
}

/// Denormalized copy kept under the user's own booking list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBookingEntry {
    pub booking_id: Ulid,
    pub facility_id: String,
    pub facility_name: String,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub status: BookingStatus,
}

impl From<&Booking> for UserBookingEntry {
    fn from(b: &Booking) -> Self {
        Self {
            booking_id: b.id,
            facility_id: b.facility_id.clone(),
            facility_name: b.facility_name.clone(),
            date: b.date,
            start_time: b.start_time,
            end_time: b.end_time,
            status: b.status,
        }
    }
}

// ── Request context ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Resident,
    Staff,
}

/// Who is acting. Passed explicitly into every engine entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub community_id: String,
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
}

impl UserContext {
    pub fn resident(
        community_id: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            community_id: community_id.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            role: Role::Resident,
        }
    }

    pub fn staff(
        community_id: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Staff,
            ..Self::resident(community_id, user_id, user_name)
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub facility_id: String,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub participants: u32,
    pub notes: String,
    pub recurrence: Option<RecurrenceDescriptor>,
}

// ── Durable log records ──────────────────────────────────────────

/// The event types. This is the durable log record format.
///
/// Each record is applied to exactly one day document, so a commit is
/// all-or-nothing: the booking, its user-list copy and the slot rewrite
/// land together or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    DayOpened {
        facility_id: String,
        date: NaiveDate,
        slots: Vec<Slot>,
    },
    BookingCommitted {
        booking: Booking,
        slots: Vec<Slot>,
    },
    BookingStatusChanged {
        id: Ulid,
        facility_id: String,
        date: NaiveDate,
        status: BookingStatus,
        slots: Vec<Slot>,
    },
}

impl Event {
    pub fn day_key(&self) -> DayKey {
        match self {
            Event::DayOpened { facility_id, date, .. }
            | Event::BookingStatusChanged { facility_id, date, .. } => {
                DayKey::new(facility_id.clone(), *date)
            }
            Event::BookingCommitted { booking, .. } => booking.day_key(),
        }
    }

    pub fn facility_id(&self) -> &str {
        match self {
            Event::DayOpened { facility_id, .. }
            | Event::BookingStatusChanged { facility_id, .. } => facility_id,
            Event::BookingCommitted { booking, .. } => &booking.facility_id,
        }
    }
}
