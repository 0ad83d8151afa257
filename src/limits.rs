//! Service limits. Every write path validates against these before touching
//! state, so a misbehaving client cannot grow a table or a profile without
//! bound.

use crate::model::Ms;

pub const MAX_NAME_LEN: usize = 128;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_TIMEZONE_LEN: usize = 64;
pub const MAX_SUBJECT_LEN: usize = 64;
pub const MAX_SUBJECTS_PER_TUTOR: usize = 32;
pub const MAX_REASON_LEN: usize = 512;
pub const MAX_PREFERENCES_PER_STUDENT: usize = 32;

pub const MAX_BLOCKS_PER_TUTOR: usize = 64;

/// Session lengths the marketplace sells.
pub const ALLOWED_DURATIONS_MIN: [i64; 4] = [30, 60, 90, 120];

/// Timestamps outside [2000-01-01, 2100-01-01) are treated as malformed.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

pub const MAX_USERS: usize = 1_000_000;
pub const MAX_BOOKINGS: usize = 10_000_000;
