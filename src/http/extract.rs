use axum::extract::{FromRequest, FromRequestParts};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use super::error::ApiError;
use crate::limits::MAX_ACTOR_LEN;

/// `Json` whose rejection renders through [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct AppPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct AppQuery<T>(pub T);

pub const ACTOR_HEADER: &str = "x-actor";

/// Who is making the change, from the `x-actor` header. Defaults to `api`.
pub struct Actor(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(ACTOR_HEADER) else {
            return Ok(Actor("api".into()));
        };
        let actor = value
            .to_str()
            .map_err(|_| ApiError::BadRequest(format!("{ACTOR_HEADER} must be visible ASCII")))?
            .trim();
        if actor.is_empty() || actor.len() > MAX_ACTOR_LEN {
            return Err(ApiError::BadRequest(format!(
                "{ACTOR_HEADER} must be 1 to {MAX_ACTOR_LEN} characters"
            )));
        }
        Ok(Actor(actor.to_string()))
    }
}

/// Parse a JSON body that may be omitted entirely.
pub fn optional_body<T: DeserializeOwned + Default>(bytes: &[u8]) -> Result<T, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}
