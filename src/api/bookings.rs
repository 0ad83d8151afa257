use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{Actor, CreateBooking};
use crate::model::*;

use super::actor::ResolvedActor;
use super::error::ApiError;
use super::{to_datetime, to_ms, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub id: BookingId,
    pub student_id: UserId,
    pub tutor_id: UserId,
    pub subject_id: String,
    #[serde(rename = "startAtUTC")]
    pub start_at_utc: DateTime<Utc>,
    #[serde(rename = "endAtUTC")]
    pub end_at_utc: DateTime<Utc>,
    pub status: BookingStatus,
    pub price_cents: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(value: Booking) -> Self {
        let Booking {
            id,
            student_id,
            tutor_id,
            subject_id,
            start,
            end,
            status,
            price_cents,
            currency,
            status_reason,
            created_at,
            updated_at,
        } = value;
        Self {
            id,
            student_id,
            tutor_id,
            subject_id,
            start_at_utc: to_datetime(start),
            end_at_utc: to_datetime(end),
            status,
            price_cents,
            currency,
            status_reason,
            created_at: to_datetime(created_at),
            updated_at: to_datetime(updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingEnvelope {
    pub booking: BookingResponse,
}

#[derive(Debug, Serialize)]
pub struct BookingsResponse {
    pub bookings: Vec<BookingResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub tutor_id: UserId,
    pub subject_id: String,
    #[serde(rename = "startAtUTC")]
    pub start_at_utc: DateTime<Utc>,
    #[serde(rename = "endAtUTC")]
    pub end_at_utc: DateTime<Utc>,
    pub price_cents: i64,
    pub currency: String,
}

/// POST /bookings — the acting student books a slot. On 409 the caller is
/// expected to re-fetch the slot list and resubmit with a different slot.
pub async fn create(
    ResolvedActor(actor): ResolvedActor,
    State(state): State<AppState>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingEnvelope>), ApiError> {
    if actor.role != Role::Student {
        return Err(ApiError::forbidden("only students create bookings"));
    }
    let booking = state
        .engine
        .create_booking(CreateBooking {
            student_id: actor.id,
            tutor_id: req.tutor_id,
            subject_id: req.subject_id,
            start: to_ms(req.start_at_utc),
            end: to_ms(req.end_at_utc),
            price_cents: req.price_cents,
            currency: req.currency,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(BookingEnvelope { booking: booking.into() }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: BookingStatus,
    pub reason: Option<String>,
}

/// PUT /bookings/{id}/status — role-scoped transition, authority and
/// ownership enforced by the lifecycle manager.
pub async fn update_status(
    ResolvedActor(actor): ResolvedActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<BookingEnvelope>, ApiError> {
    let id: BookingId = super::parse_id(&id)?;
    let booking = state
        .engine
        .transition(id, actor, req.status, req.reason)
        .await?;
    Ok(Json(BookingEnvelope { booking: booking.into() }))
}

fn may_view(actor: Actor, booking: &Booking) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Student => booking.student_id == actor.id,
        Role::Tutor => booking.tutor_id == actor.id,
    }
}

/// GET /bookings/{id}
pub async fn get_booking(
    ResolvedActor(actor): ResolvedActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookingEnvelope>, ApiError> {
    let id: BookingId = super::parse_id(&id)?;
    let booking = state.engine.get_booking(id).await?;
    if !may_view(actor, &booking) {
        return Err(ApiError::forbidden(format!("{id} does not belong to {}", actor.id)));
    }
    Ok(Json(BookingEnvelope { booking: booking.into() }))
}

/// GET /tutors/{id}/bookings
pub async fn list_for_tutor(
    ResolvedActor(actor): ResolvedActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookingsResponse>, ApiError> {
    let tutor_id: UserId = super::parse_id(&id)?;
    if actor.role != Role::Admin && actor.id != tutor_id {
        return Err(ApiError::forbidden("not your booking list"));
    }
    let bookings = state.engine.bookings_for_tutor(tutor_id).await?;
    Ok(Json(BookingsResponse {
        bookings: bookings.into_iter().map(Into::into).collect(),
    }))
}

/// GET /students/{id}/bookings
pub async fn list_for_student(
    ResolvedActor(actor): ResolvedActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookingsResponse>, ApiError> {
    let student_id: UserId = super::parse_id(&id)?;
    if actor.role != Role::Admin && actor.id != student_id {
        return Err(ApiError::forbidden("not your booking list"));
    }
    let bookings = state.engine.bookings_for_student(student_id).await?;
    Ok(Json(BookingsResponse {
        bookings: bookings.into_iter().map(Into::into).collect(),
    }))
}
