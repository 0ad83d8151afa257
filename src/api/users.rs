use std::collections::BTreeSet;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::*;
use crate::store::NewUser;

use super::actor::ResolvedActor;
use super::error::ApiError;
use super::{to_datetime, AppState};

// ── Users ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub display_name: String,
    pub email: String,
    pub role: Role,
    /// Defaults to ACTIVE; the approval flow upstream sets PENDING itself.
    pub status: Option<AccountStatus>,
    pub timezone: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(value: User) -> Self {
        let User { id, display_name, email, role, status, timezone, created_at } = value;
        Self {
            id,
            display_name,
            email,
            role,
            status,
            timezone,
            created_at: to_datetime(created_at),
        }
    }
}

/// POST /users — the registration boundary lands here.
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state
        .engine
        .register_user(NewUser {
            display_name: req.display_name,
            email: req.email,
            role: req.role,
            status: req.status.unwrap_or(AccountStatus::Active),
            timezone: req.timezone,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let id: UserId = super::parse_id(&id)?;
    Ok(Json(state.engine.get_user(id).await?.into()))
}

// ── Tutor profiles ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutTutorProfileRequest {
    pub hourly_rate_cents: i64,
    pub currency: String,
    pub subjects: BTreeSet<String>,
}

/// Wire shape of one availability block: times as `HH:MM` UTC.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockDto {
    #[serde(rename = "dayOfWeek")]
    pub day_of_week: u8,
    #[serde(rename = "startTimeUTC")]
    pub start_time_utc: String,
    #[serde(rename = "endTimeUTC")]
    pub end_time_utc: String,
    #[serde(rename = "isRecurring", default = "default_recurring")]
    pub is_recurring: bool,
}

fn default_recurring() -> bool {
    true
}

fn parse_hhmm(raw: &str) -> Result<u16, ApiError> {
    let (h, m) = raw
        .split_once(':')
        .ok_or_else(|| ApiError::validation(format!("bad time of day: {raw:?}")))?;
    let hours: u16 = h
        .parse()
        .map_err(|_| ApiError::validation(format!("bad time of day: {raw:?}")))?;
    let minutes: u16 = m
        .parse()
        .map_err(|_| ApiError::validation(format!("bad time of day: {raw:?}")))?;
    if hours > 24 || minutes > 59 {
        return Err(ApiError::validation(format!("bad time of day: {raw:?}")));
    }
    Ok(hours * 60 + minutes)
}

fn format_hhmm(minute: u16) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

impl BlockDto {
    fn into_block(self) -> Result<AvailabilityBlock, ApiError> {
        Ok(AvailabilityBlock {
            day_of_week: self.day_of_week,
            start_minute: parse_hhmm(&self.start_time_utc)?,
            end_minute: parse_hhmm(&self.end_time_utc)?,
            is_recurring: self.is_recurring,
        })
    }
}

impl From<AvailabilityBlock> for BlockDto {
    fn from(value: AvailabilityBlock) -> Self {
        Self {
            day_of_week: value.day_of_week,
            start_time_utc: format_hhmm(value.start_minute),
            end_time_utc: format_hhmm(value.end_minute),
            is_recurring: value.is_recurring,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorProfileResponse {
    pub user_id: UserId,
    pub hourly_rate_cents: i64,
    pub currency: String,
    pub subjects: BTreeSet<String>,
    pub blocks: Vec<BlockDto>,
    pub updated_at: DateTime<Utc>,
}

impl From<TutorProfile> for TutorProfileResponse {
    fn from(value: TutorProfile) -> Self {
        Self {
            user_id: value.user_id,
            hourly_rate_cents: value.hourly_rate_cents,
            currency: value.currency,
            subjects: value.subjects,
            blocks: value.blocks.into_iter().map(Into::into).collect(),
            updated_at: to_datetime(value.updated_at),
        }
    }
}

fn require_self_or_admin(actor: crate::engine::Actor, target: UserId) -> Result<(), ApiError> {
    if actor.role != Role::Admin && actor.id != target {
        return Err(ApiError::forbidden("not your profile"));
    }
    Ok(())
}

/// PUT /tutors/{id}/profile
pub async fn put_tutor_profile(
    ResolvedActor(actor): ResolvedActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PutTutorProfileRequest>,
) -> Result<Json<TutorProfileResponse>, ApiError> {
    let user_id: UserId = super::parse_id(&id)?;
    require_self_or_admin(actor, user_id)?;
    let profile = state
        .engine
        .upsert_tutor_profile(user_id, req.hourly_rate_cents, req.currency, req.subjects)
        .await?;
    Ok(Json(profile.into()))
}

/// GET /tutors/{id}/profile
pub async fn get_tutor_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TutorProfileResponse>, ApiError> {
    let user_id: UserId = super::parse_id(&id)?;
    Ok(Json(state.engine.get_tutor_profile(user_id).await?.into()))
}

#[derive(Debug, Deserialize)]
pub struct PutAvailabilityRequest {
    pub blocks: Vec<BlockDto>,
}

/// PUT /tutors/{id}/availability — replaces the weekly grid; same-day
/// overlaps come back as 400 before anything is written.
pub async fn put_availability(
    ResolvedActor(actor): ResolvedActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PutAvailabilityRequest>,
) -> Result<Json<TutorProfileResponse>, ApiError> {
    let user_id: UserId = super::parse_id(&id)?;
    require_self_or_admin(actor, user_id)?;
    let blocks = req
        .blocks
        .into_iter()
        .map(BlockDto::into_block)
        .collect::<Result<Vec<_>, _>>()?;
    let profile = state.engine.set_availability(user_id, blocks).await?;
    Ok(Json(profile.into()))
}

/// GET /tutors/{id}/availability
pub async fn get_availability(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PutAvailabilityResponse>, ApiError> {
    let user_id: UserId = super::parse_id(&id)?;
    let profile = state.engine.get_tutor_profile(user_id).await?;
    Ok(Json(PutAvailabilityResponse {
        blocks: profile.blocks.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Debug, Serialize)]
pub struct PutAvailabilityResponse {
    pub blocks: Vec<BlockDto>,
}

// ── Student profiles ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutStudentProfileRequest {
    pub grade_level: String,
    pub budget_min_cents: i64,
    pub budget_max_cents: i64,
    #[serde(default)]
    pub preferences: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfileResponse {
    pub user_id: UserId,
    pub grade_level: String,
    pub budget_min_cents: i64,
    pub budget_max_cents: i64,
    pub preferences: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<StudentProfile> for StudentProfileResponse {
    fn from(value: StudentProfile) -> Self {
        Self {
            user_id: value.user_id,
            grade_level: value.grade_level,
            budget_min_cents: value.budget_min_cents,
            budget_max_cents: value.budget_max_cents,
            preferences: value.preferences,
            updated_at: to_datetime(value.updated_at),
        }
    }
}

/// PUT /students/{id}/profile
pub async fn put_student_profile(
    ResolvedActor(actor): ResolvedActor,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PutStudentProfileRequest>,
) -> Result<Json<StudentProfileResponse>, ApiError> {
    let user_id: UserId = super::parse_id(&id)?;
    require_self_or_admin(actor, user_id)?;
    let profile = state
        .engine
        .upsert_student_profile(
            user_id,
            req.grade_level,
            req.budget_min_cents,
            req.budget_max_cents,
            req.preferences,
        )
        .await?;
    Ok(Json(profile.into()))
}

/// GET /students/{id}/profile
pub async fn get_student_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StudentProfileResponse>, ApiError> {
    let user_id: UserId = super::parse_id(&id)?;
    Ok(Json(state.engine.get_student_profile(user_id).await?.into()))
}
