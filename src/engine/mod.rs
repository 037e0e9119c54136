mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod recurring;
pub mod slots;

pub use error::BookingError;
pub use mutations::{payment_terms, BookingOutcome, FREE_FEE_SENTINEL};
pub use recurring::{exceeds_occurrence_limit, occurrence_dates, RecurringOutcome, SkippedOccurrence};

use std::io;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::catalog::FacilityCatalog;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineSettings;
use crate::limits::LOG_CHANNEL_CAPACITY;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedDayState = Arc<RwLock<DayState>>;

// ── Group-commit log channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the log and batches appends for group commit.
/// Blocks for one append, drains whatever else is queued, then fsyncs once
/// and answers every caller in the batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let _ = tx.send(match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            });
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

/// All or nothing: on any failure the log is truncated back to where the
/// batch started, so no caller that sees an error can reappear on replay.
fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mark = wal.checkpoint()?;
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if let Err(e) = result {
        if let Err(rollback_err) = wal.rollback(mark) {
            warn!("log rollback after failed batch also failed: {rollback_err}");
        }
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// Write access to one day document for the length of a transaction.
///
/// Holds the engine's log gate (shared) and the day's lock (exclusive). The
/// gate is always taken first; compaction takes it exclusively.
pub(super) struct DayTxn {
    _gate: OwnedRwLockReadGuard<()>,
    day: OwnedRwLockWriteGuard<DayState>,
}

impl Deref for DayTxn {
    type Target = DayState;

    fn deref(&self) -> &DayState {
        &self.day
    }
}

impl DerefMut for DayTxn {
    fn deref_mut(&mut self) -> &mut DayState {
        &mut self.day
    }
}

/// Booking engine for one community.
///
/// Each (facility, date) day document sits behind its own lock. Every commit
/// takes that lock, re-validates, appends one record to the durable log and
/// only then applies it, so concurrent requests for one day serialize and a
/// failed append leaves nothing behind.
pub struct Engine {
    pub(super) community_id: String,
    pub(super) days: DashMap<DayKey, SharedDayState>,
    pub(super) bookings: DashMap<Ulid, Booking>,
    /// Denormalized per-user lists, keyed by user id.
    pub(super) user_bookings: DashMap<String, Vec<UserBookingEntry>>,
    /// Original booking id → recurring instance ids.
    pub(super) series: DashMap<Ulid, Vec<Ulid>>,
    pub(super) catalog: Arc<dyn FacilityCatalog>,
    pub(super) settings: EngineSettings,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    log_gate: Arc<RwLock<()>>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(
        community_id: impl Into<String>,
        wal_path: PathBuf,
        catalog: Arc<dyn FacilityCatalog>,
        notify: Arc<NotifyHub>,
        settings: EngineSettings,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            community_id: community_id.into(),
            days: DashMap::new(),
            bookings: DashMap::new(),
            user_bookings: DashMap::new(),
            series: DashMap::new(),
            catalog,
            settings,
            clock: Arc::new(SystemClock),
            wal_tx,
            log_gate: Arc::new(RwLock::new(())),
            notify,
        };

        // Sole owner of every lock here, so try_write always succeeds. Never
        // block: this can run inside an async context (lazy community load).
        for event in &events {
            let day = engine.day_handle(event.day_key());
            let mut guard = day.try_write().expect("replay: uncontended write");
            engine.apply(&mut guard, event);
        }
        info!(
            community = %engine.community_id,
            events = events.len(),
            days = engine.days.len(),
            bookings = engine.bookings.len(),
            "replayed booking log"
        );

        Ok(engine)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn community_id(&self) -> &str {
        &self.community_id
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    /// Get or insert the lock for a day. Inserting does not create the day
    /// document; see `begin_open_day`.
    pub(super) fn day_handle(&self, key: DayKey) -> SharedDayState {
        if let Some(day) = self.existing_day(&key) {
            return day;
        }
        self.days
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(key))))
            .value()
            .clone()
    }

    pub(super) fn existing_day(&self, key: &DayKey) -> Option<SharedDayState> {
        self.days.get(key).map(|e| e.value().clone())
    }

    pub(super) async fn facility(&self, facility_id: &str) -> Result<Facility, BookingError> {
        self.catalog
            .get_facility(&self.community_id, facility_id)
            .await?
            .ok_or_else(|| BookingError::FacilityNotFound(facility_id.to_string()))
    }

    /// Open a transaction on an existing day document.
    pub(super) async fn begin(&self, key: &DayKey) -> Option<DayTxn> {
        let gate = self.log_gate.clone().read_owned().await;
        let day = self.existing_day(key)?.write_owned().await;
        Some(DayTxn { _gate: gate, day })
    }

    /// Open a transaction on a day, generating and persisting its slots first
    /// if the document does not exist yet.
    pub(super) async fn begin_open_day(
        &self,
        facility: &Facility,
        date: chrono::NaiveDate,
    ) -> Result<DayTxn, BookingError> {
        let gate = self.log_gate.clone().read_owned().await;
        let day = self
            .day_handle(DayKey::new(facility.id.clone(), date))
            .write_owned()
            .await;
        let mut txn = DayTxn { _gate: gate, day };
        if !txn.opened {
            let window = slots::opening_window(facility, self.settings.default_window);
            let event = Event::DayOpened {
                facility_id: facility.id.clone(),
                date,
                slots: slots::seed_slots(window, self.settings.slot_minutes),
            };
            self.persist_and_apply(&mut txn, &event).await?;
            metrics::counter!(crate::observability::DAYS_OPENED_TOTAL).increment(1);
            debug!(day = %txn.key, slots = txn.slots.len(), "opened day");
        }
        Ok(txn)
    }

    /// Durable append through the group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), BookingError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| BookingError::StoreAccessFailure("log writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::StoreAccessFailure("log writer dropped response".into()))??;
        Ok(())
    }

    /// Append, apply, publish. The caller holds the day's write lock.
    pub(super) async fn persist_and_apply(
        &self,
        day: &mut DayState,
        event: &Event,
    ) -> Result<(), BookingError> {
        self.wal_append(event).await?;
        self.apply(day, event);
        self.notify.send(event);
        Ok(())
    }

    /// Apply one record to its day document and the booking indexes.
    fn apply(&self, day: &mut DayState, event: &Event) {
        match event {
            Event::DayOpened { slots, .. } => {
                day.opened = true;
                day.slots = slots.clone();
            }
            Event::BookingCommitted { booking, slots } => {
                day.opened = true;
                day.slots = slots.clone();
                day.insert_booking(booking.span());
                self.user_bookings
                    .entry(booking.user_id.clone())
                    .or_default()
                    .push(UserBookingEntry::from(booking));
                if let Some(original) = booking.original_booking_id {
                    self.series.entry(original).or_default().push(booking.id);
                }
                self.bookings.insert(booking.id, booking.clone());
            }
            Event::BookingStatusChanged { id, status, slots, .. } => {
                day.slots = slots.clone();
                day.set_status(*id, *status);
                if let Some(mut booking) = self.bookings.get_mut(id) {
                    booking.status = *status;
                    if let Some(mut entries) = self.user_bookings.get_mut(&booking.user_id)
                        && let Some(entry) = entries.iter_mut().find(|e| e.booking_id == *id)
                    {
                        entry.status = *status;
                    }
                }
            }
        }
    }

    /// Rewrite the log with the minimal record set for the current state.
    /// Waits for in-flight transactions and blocks new ones until done.
    pub async fn compact_log(&self) -> Result<(), BookingError> {
        let _gate = self.log_gate.write().await;
        let mut keys: Vec<DayKey> = self.days.iter().map(|e| e.key().clone()).collect();
        keys.sort();

        let mut events = Vec::new();
        for key in keys {
            let Some(day) = self.existing_day(&key) else { continue };
            let guard = day.read().await;
            if !guard.opened {
                continue;
            }
            events.push(Event::DayOpened {
                facility_id: key.facility_id.clone(),
                date: key.date,
                slots: guard.slots.clone(),
            });
            // Every record carries the final slot array, so replay order
            // within a day cannot regress it.
            for span in &guard.bookings {
                if let Some(booking) = self.bookings.get(&span.id) {
                    events.push(Event::BookingCommitted {
                        booking: booking.clone(),
                        slots: guard.slots.clone(),
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| BookingError::StoreAccessFailure("log writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::StoreAccessFailure("log writer dropped response".into()))??;
        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!(community = %self.community_id, "compacted booking log");
        Ok(())
    }

    pub async fn log_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
