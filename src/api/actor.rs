use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::engine::Actor;
use crate::model::Role;

use super::error::ApiError;

/// The resolved `(actor_id, actor_role)` pair, carried on every
/// booking-affecting request as `X-Actor-Id` / `X-Actor-Role` headers.
/// Authentication happens upstream; this core only consumes the result and
/// assumes nothing about how the pair was produced.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedActor(pub Actor);

fn parse_role(raw: &str) -> Option<Role> {
    match raw {
        "STUDENT" => Some(Role::Student),
        "TUTOR" => Some(Role::Tutor),
        "ADMIN" => Some(Role::Admin),
        _ => None,
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ResolvedActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-actor-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let role = parts
            .headers
            .get("x-actor-role")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_role);

        match (id, role) {
            (Some(id), Some(role)) => Ok(ResolvedActor(Actor { id, role })),
            _ => Err(ApiError::unauthorized(
                "missing or malformed X-Actor-Id / X-Actor-Role headers",
            )),
        }
    }
}
