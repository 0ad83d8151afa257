use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unix milliseconds UTC — the only time type in the core.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const MINUTES_PER_DAY: u16 = 1_440;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as Ms
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration_ms() / MINUTE_MS
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

// ── Entity ids ───────────────────────────────────────────────────

/// Kind-prefixed counter ids (`user-3`, `booking-57`): allocated from a
/// per-kind monotonic counter persisted with the kind's snapshot record.
/// Rendered as the prefixed string everywhere, including serde.
macro_rules! entity_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub const PREFIX: &'static str = $prefix;
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let rest = s
                    .strip_prefix($prefix)
                    .and_then(|r| r.strip_prefix('-'))
                    .ok_or(ParseIdError { expected: $prefix })?;
                rest.parse::<u64>()
                    .map($name)
                    .map_err(|_| ParseIdError { expected: $prefix })
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(d)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

entity_id!(UserId, "user");
entity_id!(BookingId, "booking");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseIdError {
    pub expected: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed id: expected {}-<n>", self.expected)
    }
}

impl std::error::Error for ParseIdError {}

// ── Users & profiles ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Tutor,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Pending,
    Active,
    Suspended,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    /// IANA timezone name, interpreted by the edges only — the core is UTC.
    pub timezone: String,
    pub created_at: Ms,
}

/// One recurring weekly availability window, minutes from UTC midnight,
/// half-open `[start_minute, end_minute)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityBlock {
    /// 0 = Sunday … 6 = Saturday.
    pub day_of_week: u8,
    pub start_minute: u16,
    pub end_minute: u16,
    pub is_recurring: bool,
}

impl AvailabilityBlock {
    /// Concrete span of this block on the day starting at `day_start` (UTC midnight).
    pub fn span_on(&self, day_start: Ms) -> Span {
        Span::new(
            day_start + Ms::from(self.start_minute) * MINUTE_MS,
            day_start + Ms::from(self.end_minute) * MINUTE_MS,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorProfile {
    pub user_id: UserId,
    pub hourly_rate_cents: i64,
    pub currency: String,
    pub subjects: BTreeSet<String>,
    /// Invariant: blocks sharing a `day_of_week` never overlap
    /// (enforced at the write point, assumed by the resolver).
    pub blocks: Vec<AvailabilityBlock>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub user_id: UserId,
    pub grade_level: String,
    pub budget_min_cents: i64,
    pub budget_max_cents: i64,
    pub preferences: Vec<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
    Completed,
    Refunded,
}

impl BookingStatus {
    /// Statuses that occupy the tutor's calendar. REJECTED/CANCELLED never
    /// block a slot; COMPLETED/REFUNDED are settled history.
    pub fn blocks_slot(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
            BookingStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub student_id: UserId,
    pub tutor_id: UserId,
    pub subject_id: String,
    pub start: Ms,
    pub end: Ms,
    pub status: BookingStatus,
    pub price_cents: i64,
    pub currency: String,
    pub status_reason: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Booking {
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    pub fn duration_minutes(&self) -> i64 {
        self.span().duration_minutes()
    }
}

/// `round(hourly_rate_cents × duration_minutes / 60)`, half-up.
pub fn price_cents_for(hourly_rate_cents: i64, duration_minutes: i64) -> i64 {
    (hourly_rate_cents * duration_minutes + 30) / 60
}

// ── Notification record ──────────────────────────────────────────

/// What the engine publishes after a successful mutation — flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingEvent {
    Created {
        booking: Booking,
    },
    StatusChanged {
        booking: Booking,
        previous: BookingStatus,
    },
}

impl BookingEvent {
    pub fn booking(&self) -> &Booking {
        match self {
            BookingEvent::Created { booking } | BookingEvent::StatusChanged { booking, .. } => {
                booking
            }
        }
    }
}
