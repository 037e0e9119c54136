/// Maximum communities (engines) loaded by one manager.
pub const MAX_COMMUNITIES: usize = 1_000;

/// Maximum length of a community name.
pub const MAX_COMMUNITY_NAME_LEN: usize = 128;

/// Maximum length of free-text booking notes.
pub const MAX_NOTES_LEN: usize = 2_000;

/// Upper bound on occurrences generated for one recurring series.
pub const MAX_RECURRING_OCCURRENCES: usize = 104;

/// Maximum bookings recorded against a single day document.
pub const MAX_BOOKINGS_PER_DAY: usize = 1_000;

/// Slot granularity bounds accepted from configuration.
pub const MIN_SLOT_MINUTES: u16 = 5;
pub const MAX_SLOT_MINUTES: u16 = 12 * 60;

/// Bounded queue in front of the durable log writer.
pub const LOG_CHANNEL_CAPACITY: usize = 4_096;
