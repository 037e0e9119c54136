use crate::model::*;

// ── Slot generation ──────────────────────────────────────────────

/// Parse `"HH:MM - HH:MM"`. `None` on anything else, including an empty or
/// inverted window.
pub fn parse_opening_hours(text: &str) -> Option<TimeRange> {
    let (open, close) = text.split_once(" - ")?;
    let open: TimeOfDay = open.parse().ok()?;
    let close: TimeOfDay = close.parse().ok()?;
    TimeRange::checked(open, close)
}

/// Opening window for a facility. Malformed hours degrade to `fallback`
/// rather than failing the booking flow.
pub fn opening_window(facility: &Facility, fallback: TimeRange) -> TimeRange {
    parse_opening_hours(&facility.opening_hours).unwrap_or(fallback)
}

/// One slot per `granularity_minutes` step from `window.start` (inclusive) to
/// `window.end` (exclusive). A trailing step shorter than the granularity is
/// not bookable and is dropped.
pub fn generate_slots(window: TimeRange, granularity_minutes: u16) -> Vec<TimeRange> {
    if granularity_minutes == 0 {
        return Vec::new();
    }
    let mut slots = Vec::new();
    let mut start = window.start;
    while let Some(end) = start.checked_add_minutes(granularity_minutes) {
        if end > window.end {
            break;
        }
        slots.push(TimeRange::new(start, end));
        start = end;
    }
    slots
}

/// Fresh, fully available slot list for a day document.
pub fn seed_slots(window: TimeRange, granularity_minutes: u16) -> Vec<Slot> {
    generate_slots(window, granularity_minutes)
        .into_iter()
        .map(Slot::open)
        .collect()
}

/// Indices of the contiguous run of slots that exactly tiles `range`, if any.
/// Availability is not considered here.
pub fn covering_slots(slots: &[Slot], range: &TimeRange) -> Option<std::ops::Range<usize>> {
    let first = slots.iter().position(|s| s.start_time == range.start)?;
    let mut cursor = range.start;
    for (i, slot) in slots.iter().enumerate().skip(first) {
        if slot.start_time != cursor || slot.end_time > range.end {
            return None;
        }
        cursor = slot.end_time;
        if cursor == range.end {
            return Some(first..i + 1);
        }
    }
    None
}

/// Copy of `slots` with the covered run reserved for `booking_id`.
pub fn reserve(slots: &[Slot], covered: std::ops::Range<usize>, booking_id: ulid::Ulid) -> Vec<Slot> {
    let mut next = slots.to_vec();
    for slot in &mut next[covered] {
        slot.available = false;
        slot.booking_id = Some(booking_id);
    }
    next
}

/// Copy of `slots` with every slot held by `booking_id` freed.
pub fn release(slots: &[Slot], booking_id: ulid::Ulid) -> Vec<Slot> {
    let mut next = slots.to_vec();
    for slot in next.iter_mut().filter(|s| s.booking_id == Some(booking_id)) {
        slot.available = true;
        slot.booking_id = None;
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn window(open: &str, close: &str) -> TimeRange {
        TimeRange::new(t(open), t(close))
    }

    #[test]
    fn parses_opening_hours() {
        assert_eq!(parse_opening_hours("09:00 - 17:00"), Some(window("09:00", "17:00")));
        assert_eq!(parse_opening_hours("6:30 - 24:00"), Some(window("06:30", "24:00")));
        assert_eq!(parse_opening_hours("09:00-17:00"), None);
        assert_eq!(parse_opening_hours("17:00 - 09:00"), None);
        assert_eq!(parse_opening_hours("Open 24 hours"), None);
        assert_eq!(parse_opening_hours(""), None);
    }

    #[test]
    fn malformed_hours_fall_back() {
        let facility = Facility {
            id: "hall".into(),
            name: "Hall".into(),
            opening_hours: "by appointment".into(),
            capacity: 50,
            min_booking_duration_minutes: 0,
            max_booking_duration_minutes: 0,
            advance_booking_limit_days: 0,
            fee: String::new(),
            rules: vec![],
            requires_staff_approval: false,
        };
        let fallback = window("07:00", "21:00");
        assert_eq!(opening_window(&facility, fallback), fallback);
    }

    #[test]
    fn hourly_slots_cover_window() {
        let slots = generate_slots(window("09:00", "17:00"), 60);
        assert_eq!(slots.len(), 8);
        assert_eq!(slots[0], window("09:00", "10:00"));
        assert_eq!(slots[7], window("16:00", "17:00"));
        for pair in slots.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn partial_trailing_step_dropped() {
        let slots = generate_slots(window("09:00", "11:30"), 60);
        assert_eq!(slots, vec![window("09:00", "10:00"), window("10:00", "11:00")]);
    }

    #[test]
    fn slots_run_to_end_of_day() {
        let slots = generate_slots(window("22:00", "24:00"), 30);
        assert_eq!(slots.len(), 4);
        assert_eq!(slots[3].end, TimeOfDay::END_OF_DAY);
    }

    #[test]
    fn zero_granularity_yields_nothing() {
        assert!(generate_slots(window("09:00", "17:00"), 0).is_empty());
    }

    #[test]
    fn covering_exact_and_multi_slot() {
        let slots = seed_slots(window("09:00", "13:00"), 60);
        assert_eq!(covering_slots(&slots, &window("10:00", "11:00")), Some(1..2));
        assert_eq!(covering_slots(&slots, &window("10:00", "12:00")), Some(1..3));
        assert_eq!(covering_slots(&slots, &window("10:30", "11:30")), None);
        assert_eq!(covering_slots(&slots, &window("10:00", "10:30")), None);
        assert_eq!(covering_slots(&slots, &window("12:00", "14:00")), None);
    }

    #[test]
    fn reserve_then_release() {
        let id = ulid::Ulid::new();
        let slots = seed_slots(window("09:00", "12:00"), 60);
        let reserved = reserve(&slots, 0..2, id);
        assert!(!reserved[0].available && !reserved[1].available);
        assert_eq!(reserved[1].booking_id, Some(id));
        assert!(reserved[2].available);

        let released = release(&reserved, id);
        assert_eq!(released, slots);
    }
}
