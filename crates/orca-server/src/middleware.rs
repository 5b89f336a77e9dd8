use axum::{body::Body, http::Request, middleware::Next, response::Response};
use orca_rooms::{RoomError, User};
use std::sync::Arc;

use crate::api::{with_conn, ApiError};
use crate::AppState;

/// The authenticated caller, stored in request extensions.
#[derive(Clone, Debug)]
pub struct AuthUser(pub User);

/// Extracts the caller's user id from `X-Orca-User` or `Authorization: Bearer`.
fn caller_id(req: &Request<Body>) -> Result<String, ApiError> {
    let id = if let Some(val) = req.headers().get("X-Orca-User") {
        val.to_str().map_err(|_| ApiError::NotAuthenticated)?
    } else if let Some(val) = req.headers().get("Authorization") {
        let val_str = val.to_str().map_err(|_| ApiError::NotAuthenticated)?;
        val_str
            .strip_prefix("Bearer ")
            .ok_or(ApiError::NotAuthenticated)?
    } else {
        return Err(ApiError::NotAuthenticated);
    };

    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::NotAuthenticated);
    }
    Ok(id.to_string())
}

/// Authenticates requests against the user store.
///
/// Identity is issued by the external auth provider; the bearer value is the
/// user id it assigned. Unknown ids are rejected.
pub async fn auth_middleware(mut req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let user_id = caller_id(&req)?;

    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or_else(|| ApiError::Internal("application state missing".to_string()))?
        .clone();

    let user = with_conn(&state, move |conn| match orca_rooms::get_user(conn, &user_id) {
        Ok(user) => Ok(user),
        Err(RoomError::NotFound(_)) => Err(ApiError::NotAuthenticated),
        Err(e) => Err(e.into()),
    })
    .await?;

    req.extensions_mut().insert(AuthUser(user));

    Ok(next.run(req).await)
}
