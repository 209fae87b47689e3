//! Actor identity extraction
//!
//! Identity is supplied by the authentication layer in front of this API
//! via trusted headers; the extractors here only assert presence and
//! role-gate admin routes. The loan core itself never inspects roles.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::HeaderMap, request::Parts},
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Actor roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    User,
    Admin,
}

impl ActorRole {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(ActorRole::User),
            "admin" => Some(ActorRole::Admin),
            _ => None,
        }
    }
}

/// The authenticated actor behind a request
#[derive(Debug, Clone, Copy)]
pub struct ActorContext {
    pub actor_id: Uuid,
    pub role: ActorRole,
}

fn actor_from_headers(headers: &HeaderMap) -> Result<ActorContext, ApiError> {
    let actor_id = headers
        .get(ACTOR_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing actor identity".to_string()))?
        .parse::<Uuid>()
        .map_err(|_| ApiError::Unauthorized("Invalid actor id".to_string()))?;

    let role = headers
        .get(ACTOR_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(ActorRole::parse)
        .ok_or_else(|| ApiError::Unauthorized("Missing or invalid actor role".to_string()))?;

    Ok(ActorContext { actor_id, role })
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)
    }
}

/// Extractor that additionally requires the admin role
#[derive(Debug, Clone, Copy)]
pub struct AdminActor(pub ActorContext);

#[async_trait]
impl<S> FromRequestParts<S> for AdminActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = actor_from_headers(&parts.headers)?;

        if actor.role != ActorRole::Admin {
            return Err(ApiError::Forbidden(
                "This operation requires the admin role".to_string(),
            ));
        }

        Ok(AdminActor(actor))
    }
}
