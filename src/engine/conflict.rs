use chrono::{DateTime, Datelike, Timelike};

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

/// Result of an availability check. `reason` is present iff unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    pub reason: Option<String>,
}

impl Availability {
    pub(super) fn ok() -> Self {
        Self { available: true, reason: None }
    }

    pub(super) fn no(reason: impl Into<String>) -> Self {
        Self { available: false, reason: Some(reason.into()) }
    }
}

pub(super) fn validate_duration(minutes: i64) -> Result<Ms, EngineError> {
    if minutes <= 0 {
        return Err(EngineError::Validation("duration must be positive".into()));
    }
    if !ALLOWED_DURATIONS_MIN.contains(&minutes) {
        return Err(EngineError::Validation(format!(
            "duration must be one of {ALLOWED_DURATIONS_MIN:?} minutes, got {minutes}"
        )));
    }
    Ok(minutes * MINUTE_MS)
}

pub(super) fn validate_interval(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if !(MIN_VALID_TIMESTAMP_MS..MAX_VALID_TIMESTAMP_MS).contains(&start)
        || !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&end)
    {
        return Err(EngineError::Validation("timestamp out of range".into()));
    }
    if end <= start {
        return Err(EngineError::Validation("end must be after start".into()));
    }
    Ok(Span::new(start, end))
}

/// The half-open overlap test against a tutor's active bookings. Returns the
/// first offending booking so callers can name it in the reason.
pub(super) fn find_conflict<'a>(active: &'a [Booking], window: &Span) -> Option<&'a Booking> {
    active.iter().find(|b| b.span().overlaps(window))
}

/// Whether `window` falls fully inside at least one of the tutor's blocks
/// for the weekday the window starts on.
pub(super) fn within_availability(profile: &TutorProfile, window: &Span) -> bool {
    let start = DateTime::from_timestamp_millis(window.start);
    let Some(start) = start else { return false };
    let weekday = start.weekday().num_days_from_sunday() as u8;
    let day_start = window.start - i64::from(start.time().num_seconds_from_midnight()) * 1000
        - i64::from(start.timestamp_subsec_millis());

    profile
        .blocks
        .iter()
        .filter(|b| b.day_of_week == weekday)
        .any(|b| b.span_on(day_start).contains_span(window))
}

impl Engine {
    /// The Conflict Checker: admissibility of `[start, start + duration)`
    /// for this tutor, safe to call standalone — it never assumes the
    /// candidate came out of the resolver. This is the authoritative gate;
    /// `create_booking` re-runs it under the per-tutor lock.
    pub async fn is_available(
        &self,
        tutor_id: UserId,
        start: Ms,
        duration_minutes: i64,
    ) -> Result<Availability, EngineError> {
        let duration_ms = validate_duration(duration_minutes)?;
        let window = validate_interval(start, start + duration_ms)?;
        let profile = self.require_tutor(tutor_id).await?;

        let active = self.active_bookings(tutor_id).await;
        Ok(check_window(&profile, &active, &window))
    }
}

/// Shared between the standalone check and the create path (which runs it
/// again under the tutor lock).
pub(super) fn check_window(
    profile: &TutorProfile,
    active: &[Booking],
    window: &Span,
) -> Availability {
    if !within_availability(profile, window) {
        return Availability::no("outside tutor's availability");
    }
    if let Some(existing) = find_conflict(active, window) {
        return Availability::no(format!(
            "overlaps existing {} session {}",
            existing.status, existing.id
        ));
    }
    Availability::ok()
}
