mod actor;
mod availability;
mod bookings;
mod error;
mod users;

pub use error::{ApiError, ErrorResponse};

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::model::Ms;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Registration boundary
        .route("/users", post(users::create_user))
        .route("/users/:id", get(users::get_user))
        // Tutor profiles & availability
        .route(
            "/tutors/:id/profile",
            put(users::put_tutor_profile).get(users::get_tutor_profile),
        )
        .route(
            "/tutors/:id/availability",
            put(users::put_availability).get(users::get_availability),
        )
        .route("/tutors/:id/availability/slots", get(availability::list_slots))
        .route("/tutors/:id/availability/check", post(availability::check))
        .route("/tutors/:id/bookings", get(bookings::list_for_tutor))
        // Student profiles
        .route(
            "/students/:id/profile",
            put(users::put_student_profile).get(users::get_student_profile),
        )
        .route("/students/:id/bookings", get(bookings::list_for_student))
        // Bookings
        .route("/bookings", post(bookings::create))
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/status", put(bookings::update_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Parse a kind-prefixed id out of a path segment; malformed ids are the
/// caller's mistake, not a lookup miss.
pub(super) fn parse_id<T: FromStr<Err = crate::model::ParseIdError>>(
    raw: &str,
) -> Result<T, ApiError> {
    raw.parse().map_err(|e: crate::model::ParseIdError| ApiError::bad_request(e.to_string()))
}

pub(super) fn to_datetime(ms: Ms) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).expect("timestamps validated within range")
}

pub(super) fn to_ms(dt: DateTime<Utc>) -> Ms {
    dt.timestamp_millis()
}
