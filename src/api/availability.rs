use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::UserId;

use super::error::ApiError;
use super::{to_datetime, to_ms, AppState};

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    /// UTC calendar day, `YYYY-MM-DD`.
    pub date: NaiveDate,
    /// Session length in minutes.
    pub duration: i64,
}

#[derive(Debug, Serialize)]
pub struct SlotsResponse {
    pub slots: Vec<DateTime<Utc>>,
}

/// GET /tutors/{id}/availability/slots?date&duration
pub async fn list_slots(
    State(state): State<AppState>,
    Path(tutor_id): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, ApiError> {
    let tutor_id: UserId = super::parse_id(&tutor_id)?;
    let slots = state
        .engine
        .list_slots(tutor_id, query.date, query.duration)
        .await?;
    Ok(Json(SlotsResponse {
        slots: slots.into_iter().map(to_datetime).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    pub duration: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    #[serde(rename = "isAvailable")]
    pub is_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// POST /tutors/{id}/availability/check
///
/// The authoritative pre-submission gate; callers hit this right before
/// POST /bookings to shrink the race window, and create re-checks anyway.
pub async fn check(
    State(state): State<AppState>,
    Path(tutor_id): Path<String>,
    Json(req): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, ApiError> {
    let tutor_id: UserId = super::parse_id(&tutor_id)?;
    let result = state
        .engine
        .is_available(tutor_id, to_ms(req.start_time), req.duration)
        .await?;
    Ok(Json(CheckResponse {
        is_available: result.available,
        reason: result.reason,
    }))
}
