use crate::limits::*;
use crate::model::*;
use crate::store::{NewBooking, NewUser};

use super::conflict::{check_window, validate_duration, validate_interval};
use super::{Engine, EngineError};

/// A resolved `(actor_id, actor_role)` pair. Produced by the transport edge;
/// the core assumes nothing about how it was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::Student => "student",
        Role::Tutor => "tutor",
        Role::Admin => "admin",
    }
}

// ── The state machine ────────────────────────────────────────────

/// The allowed-transition table. REFUNDED is the administrative overlay
/// reachable from CANCELLED/COMPLETED, and REFUNDED → COMPLETED is the one
/// non-monotonic edge ("reopen"). Kept as an explicit table, never inferred.
pub(super) fn transition_allowed(from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;
    matches!(
        (from, to),
        (Pending, Confirmed | Rejected | Cancelled)
            | (Confirmed, Completed | Cancelled)
            | (Cancelled | Completed, Refunded)
            | (Refunded, Completed)
    )
}

/// Which of the allowed edges each role may drive. Ownership is checked
/// separately; admins additionally act on any booking.
pub(super) fn actor_allowed(role: Role, from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;
    match role {
        Role::Admin => true,
        Role::Student => matches!((from, to), (Pending | Confirmed, Cancelled)),
        Role::Tutor => matches!(
            (from, to),
            (Pending, Confirmed | Rejected) | (Confirmed, Completed)
        ),
    }
}

/// Request to create a booking. `student_id` is the resolved acting student.
#[derive(Debug, Clone)]
pub struct CreateBooking {
    pub student_id: UserId,
    pub tutor_id: UserId,
    pub subject_id: String,
    pub start: Ms,
    pub end: Ms,
    pub price_cents: i64,
    pub currency: String,
}

fn validate_blocks(blocks: &[AvailabilityBlock]) -> Result<(), EngineError> {
    if blocks.len() > MAX_BLOCKS_PER_TUTOR {
        return Err(EngineError::Validation("too many availability blocks".into()));
    }
    for b in blocks {
        if b.day_of_week > 6 {
            return Err(EngineError::Validation(format!(
                "day_of_week must be 0..=6, got {}",
                b.day_of_week
            )));
        }
        if b.start_minute >= b.end_minute || b.end_minute > MINUTES_PER_DAY {
            return Err(EngineError::Validation(format!(
                "block [{}, {}) is not a valid window within a day",
                b.start_minute, b.end_minute
            )));
        }
    }
    // Blocks sharing a weekday must not overlap: the resolver assumes it.
    for (i, a) in blocks.iter().enumerate() {
        for b in &blocks[i + 1..] {
            if a.day_of_week == b.day_of_week
                && a.start_minute < b.end_minute
                && b.start_minute < a.end_minute
            {
                return Err(EngineError::Validation(format!(
                    "availability blocks overlap on day {}",
                    a.day_of_week
                )));
            }
        }
    }
    Ok(())
}

impl Engine {
    // ── Booking creation ─────────────────────────────────────────

    /// Create a booking in its initial PENDING state. The conflict check is
    /// re-run here, under the same per-tutor critical section that persists
    /// the booking: "list slots" → "create" is not atomic across calls, and
    /// this is where that race closes.
    pub async fn create_booking(&self, req: CreateBooking) -> Result<Booking, EngineError> {
        let window = validate_interval(req.start, req.end)?;
        if window.duration_ms() % MINUTE_MS != 0 {
            return Err(EngineError::Validation(
                "interval must be whole minutes".into(),
            ));
        }
        let minutes = window.duration_minutes();
        validate_duration(minutes)?;
        if req.subject_id.is_empty() || req.subject_id.len() > MAX_SUBJECT_LEN {
            return Err(EngineError::Validation("bad subject id".into()));
        }

        let student = self
            .store
            .get_user(req.student_id)
            .await
            .ok_or_else(|| EngineError::NotFound(format!("student {}", req.student_id)))?;
        if student.role != Role::Student {
            return Err(EngineError::Validation(format!(
                "{} is not a student",
                student.id
            )));
        }

        // Profile, price and conflict state are all read under the tutor
        // lock so a concurrent rate change or booking cannot slip between
        // check and append.
        let lock = self.tutor_lock(req.tutor_id);
        let _guard = lock.lock().await;

        let profile = self.require_tutor(req.tutor_id).await?;

        // The price is derived state; the submitted value must agree with
        // the tutor's current rate or the caller is working from stale data.
        let expected = price_cents_for(profile.hourly_rate_cents, minutes);
        if req.price_cents != expected {
            return Err(EngineError::Validation(format!(
                "price mismatch: expected {expected} {}, got {} {}",
                profile.currency, req.price_cents, req.currency
            )));
        }
        if req.currency != profile.currency {
            return Err(EngineError::Validation(format!(
                "currency mismatch: tutor charges {}",
                profile.currency
            )));
        }

        let active = self.active_bookings(req.tutor_id).await;
        let check = check_window(&profile, &active, &window);
        if let Some(reason) = check.reason {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::Conflict(reason));
        }

        let booking = self
            .store
            .create_booking(NewBooking {
                student_id: req.student_id,
                tutor_id: req.tutor_id,
                subject_id: req.subject_id,
                start: window.start,
                end: window.end,
                price_cents: req.price_cents,
                currency: req.currency,
            })
            .await?;

        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        self.notify
            .send(req.tutor_id, &BookingEvent::Created { booking: booking.clone() });
        Ok(booking)
    }

    // ── Status transitions ───────────────────────────────────────

    /// Apply one state-machine transition on behalf of `actor`. Effectively
    /// atomic per booking: the per-tutor lock serializes this with every
    /// other mutation of the same tutor's bookings, and the status is
    /// re-read under the lock.
    pub async fn transition(
        &self,
        booking_id: BookingId,
        actor: Actor,
        target: BookingStatus,
        reason: Option<String>,
    ) -> Result<Booking, EngineError> {
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN {
                return Err(EngineError::Validation("status reason too long".into()));
            }

        let tutor_id = self
            .store
            .get_booking(booking_id)
            .await
            .ok_or_else(|| EngineError::NotFound(booking_id.to_string()))?
            .tutor_id;

        let lock = self.tutor_lock(tutor_id);
        let _guard = lock.lock().await;

        let booking = self
            .store
            .get_booking(booking_id)
            .await
            .ok_or_else(|| EngineError::NotFound(booking_id.to_string()))?;

        let owns = match actor.role {
            Role::Admin => true,
            Role::Student => booking.student_id == actor.id,
            Role::Tutor => booking.tutor_id == actor.id,
        };
        if !owns {
            return Err(EngineError::Forbidden(format!(
                "{} does not belong to {}",
                booking.id, actor.id
            )));
        }

        if !transition_allowed(booking.status, target) {
            metrics::counter!(crate::observability::INVALID_TRANSITIONS_TOTAL).increment(1);
            return Err(EngineError::InvalidTransition {
                from: booking.status,
                to: target,
            });
        }
        if !actor_allowed(actor.role, booking.status, target) {
            return Err(EngineError::Forbidden(format!(
                "{} may not transition {} to {}",
                role_name(actor.role),
                booking.status,
                target
            )));
        }

        let previous = booking.status;
        let updated = self
            .store
            .update_booking_status(booking_id, target, reason)
            .await?;

        metrics::counter!(
            crate::observability::TRANSITIONS_TOTAL,
            "to" => target.to_string()
        )
        .increment(1);
        self.notify.send(
            updated.tutor_id,
            &BookingEvent::StatusChanged { booking: updated.clone(), previous },
        );
        Ok(updated)
    }

    // ── Registration boundary ────────────────────────────────────

    /// Create a User record (the external registration flow lands here).
    pub async fn register_user(&self, new: NewUser) -> Result<User, EngineError> {
        if new.display_name.is_empty() || new.display_name.len() > MAX_NAME_LEN {
            return Err(EngineError::Validation("bad display name".into()));
        }
        if !new.email.contains('@') || new.email.len() > MAX_EMAIL_LEN {
            return Err(EngineError::Validation("bad email".into()));
        }
        if new.timezone.is_empty() || new.timezone.len() > MAX_TIMEZONE_LEN {
            return Err(EngineError::Validation("bad timezone".into()));
        }
        Ok(self.store.create_user(new).await?)
    }

    /// Create or update a tutor's profile. Availability blocks are managed
    /// separately via [`Engine::set_availability`] and survive this call.
    pub async fn upsert_tutor_profile(
        &self,
        user_id: UserId,
        hourly_rate_cents: i64,
        currency: String,
        subjects: std::collections::BTreeSet<String>,
    ) -> Result<TutorProfile, EngineError> {
        let user = self
            .store
            .get_user(user_id)
            .await
            .ok_or_else(|| EngineError::NotFound(user_id.to_string()))?;
        if user.role != Role::Tutor {
            return Err(EngineError::Validation(format!("{user_id} is not a tutor")));
        }
        if hourly_rate_cents <= 0 {
            return Err(EngineError::Validation("hourly rate must be positive".into()));
        }
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(EngineError::Validation("currency must be a 3-letter code".into()));
        }
        if subjects.len() > MAX_SUBJECTS_PER_TUTOR
            || subjects.iter().any(|s| s.is_empty() || s.len() > MAX_SUBJECT_LEN)
        {
            return Err(EngineError::Validation("bad subject list".into()));
        }

        let blocks = self
            .store
            .get_tutor_profile(user_id)
            .await
            .map(|p| p.blocks)
            .unwrap_or_default();

        Ok(self
            .store
            .put_tutor_profile(TutorProfile {
                user_id,
                hourly_rate_cents,
                currency,
                subjects,
                blocks,
                created_at: 0,
                updated_at: 0,
            })
            .await?)
    }

    /// Replace the tutor's recurring weekly availability. Rejects blocks
    /// that overlap on the same weekday, so the resolver never has to cope
    /// with them.
    pub async fn set_availability(
        &self,
        user_id: UserId,
        blocks: Vec<AvailabilityBlock>,
    ) -> Result<TutorProfile, EngineError> {
        validate_blocks(&blocks)?;
        // Serialized with this tutor's booking mutations: a create in flight
        // sees either the old grid or the new one, never a torn mix.
        let lock = self.tutor_lock(user_id);
        let _guard = lock.lock().await;
        let mut profile = self.require_tutor(user_id).await?;
        profile.blocks = blocks;
        Ok(self.store.put_tutor_profile(profile).await?)
    }

    pub async fn upsert_student_profile(
        &self,
        user_id: UserId,
        grade_level: String,
        budget_min_cents: i64,
        budget_max_cents: i64,
        preferences: Vec<String>,
    ) -> Result<StudentProfile, EngineError> {
        let user = self
            .store
            .get_user(user_id)
            .await
            .ok_or_else(|| EngineError::NotFound(user_id.to_string()))?;
        if user.role != Role::Student {
            return Err(EngineError::Validation(format!("{user_id} is not a student")));
        }
        if budget_min_cents < 0 || budget_max_cents < budget_min_cents {
            return Err(EngineError::Validation("bad budget range".into()));
        }
        if preferences.len() > MAX_PREFERENCES_PER_STUDENT {
            return Err(EngineError::Validation("too many preferences".into()));
        }

        Ok(self
            .store
            .put_student_profile(StudentProfile {
                user_id,
                grade_level,
                budget_min_cents,
                budget_max_cents,
                preferences,
                created_at: 0,
                updated_at: 0,
            })
            .await?)
    }
}
