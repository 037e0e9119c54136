use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use ulid::Ulid;

use amenity::catalog::InMemoryCatalog;
use amenity::clock::FixedClock;
use amenity::community::CommunityManager;
use amenity::config::Config;
use amenity::engine::BookingError;
use amenity::model::{BookingRequest, BookingStatus, Event, RecurrenceDescriptor, UserContext};

// ── Test infrastructure ──────────────────────────────────────

const CATALOG: &str = r#"{
    "oakwood": [
        {
            "facilityId": "pool",
            "name": "Swimming Pool",
            "openingHours": "06:00 - 10:00",
            "capacity": 12,
            "minBookingDurationMinutes": 60,
            "maxBookingDurationMinutes": 120,
            "advanceBookingLimitDays": 28,
            "fee": "Free for residents",
            "rules": ["Shower before swimming"]
        },
        {
            "facilityId": "studio",
            "name": "Music Studio",
            "openingHours": "10:00 - 22:00",
            "capacity": 6,
            "fee": "$15.00 per session",
            "requiresStaffApproval": true
        }
    ],
    "birch": [
        {
            "facilityId": "pool",
            "name": "Birch Pool",
            "openingHours": "08:00 - 12:00",
            "capacity": 8
        }
    ]
}"#;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn manager() -> CommunityManager {
    let dir = std::env::temp_dir().join(format!("amenity_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let config = Config {
        data_dir: dir,
        compact_interval: Duration::from_secs(3600),
        ..Config::default()
    };
    let catalog = Arc::new(InMemoryCatalog::from_json(CATALOG).unwrap());
    CommunityManager::new(&config, catalog).with_clock(Arc::new(FixedClock(date(2026, 5, 4))))
}

fn request(facility: &str, on: NaiveDate, start: &str, end: &str) -> BookingRequest {
    BookingRequest {
        facility_id: facility.into(),
        date: on,
        start_time: start.parse().unwrap(),
        end_time: end.parse().unwrap(),
        participants: 2,
        notes: "lane swim".into(),
        recurrence: None,
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn weekly_series_reports_each_occurrence() {
    let cm = manager();
    let engine = cm.get_or_create("oakwood").unwrap();
    let resident = UserContext::resident("oakwood", "u-1", "Dana");
    let neighbour = UserContext::resident("oakwood", "u-2", "Sam");

    // Five weekly dates after the first; the third is already taken.
    engine
        .create_booking(&neighbour, &request("pool", date(2026, 5, 25), "07:00", "08:00"))
        .await
        .unwrap();

    let mut req = request("pool", date(2026, 5, 4), "07:00", "08:00");
    req.recurrence = Some(RecurrenceDescriptor::weekly(date(2026, 6, 8)));
    let outcome = engine.book(&resident, &req).await.unwrap();

    let series = outcome.series.expect("recurring request expands");
    assert_eq!(series.created.len(), 4);
    assert_eq!(series.skipped.len(), 1);
    assert_eq!(series.skipped[0].date, date(2026, 5, 25));
    assert!(matches!(
        series.skipped[0].reason,
        BookingError::SlotUnavailable { .. }
    ));
    // Past the 28-day horizon, still booked as part of the series.
    assert!(series.created.iter().any(|b| b.date == date(2026, 6, 8)));

    let mine = engine.user_bookings("u-1");
    assert_eq!(mine.len(), 5);
    assert!(mine.iter().all(|e| e.status == BookingStatus::Confirmed));
}

#[tokio::test]
async fn change_feed_sees_commits_and_approvals() {
    let cm = manager();
    let engine = cm.get_or_create("oakwood").unwrap();
    let mut rx = engine.notify.subscribe("studio");

    let resident = UserContext::resident("oakwood", "u-1", "Dana");
    let staff = UserContext::staff("oakwood", "u-9", "Office");
    let booking = engine
        .create_booking(&resident, &request("studio", date(2026, 5, 6), "19:00", "21:00"))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.payment_amount, 1500);

    engine.approve_booking(&staff, booking.id).await.unwrap();

    let mut statuses = Vec::new();
    for _ in 0..3 {
        match rx.recv().await.unwrap() {
            Event::DayOpened { .. } => statuses.push("opened"),
            Event::BookingCommitted { .. } => statuses.push("committed"),
            Event::BookingStatusChanged { status, .. } => statuses.push(status.as_str()),
        }
    }
    assert_eq!(statuses, vec!["opened", "committed", "confirmed"]);
}

#[tokio::test]
async fn communities_are_isolated() {
    let cm = manager();
    let oakwood = cm.get_or_create("oakwood").unwrap();
    let birch = cm.get_or_create("birch").unwrap();
    let on = date(2026, 5, 5);

    let a = oakwood.get_or_create_day_availability("pool", on).await.unwrap();
    let b = birch.get_or_create_day_availability("pool", on).await.unwrap();
    assert_eq!(a.slots.len(), 4);
    assert_eq!(b.slots.len(), 4);
    assert_ne!(a.slots[0].start_time, b.slots[0].start_time);

    let resident = UserContext::resident("birch", "u-1", "Dana");
    birch
        .create_booking(&resident, &request("pool", on, "08:00", "09:00"))
        .await
        .unwrap();
    assert_eq!(birch.booking_count(), 1);
    assert_eq!(oakwood.booking_count(), 0);

    let err = birch
        .create_booking(&resident, &request("studio", on, "10:00", "11:00"))
        .await
        .unwrap_err();
    assert_eq!(err, BookingError::FacilityNotFound("studio".into()));
}
