//! Caller identification for wallet routes and bearer-token guard for admin routes.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::{AppError, AppErrorKind, AuthError};
use crate::payments::utils::secure_eq;

/// The user a wallet-facing request acts for, taken from `x-user-id`.
///
/// Sessions and KYC live in front of this service; by the time a request
/// arrives here the gateway has already resolved the caller.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::new(AppErrorKind::Auth(AuthError::MissingCredentials)))?;

        Uuid::parse_str(raw.trim())
            .map(CurrentUser)
            .map_err(|_| AppError::new(AppErrorKind::Auth(AuthError::InvalidCredentials)))
    }
}

/// Admin identity recorded on reviews and manual refunds.
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub actor: String,
}

/// Rejects admin requests whose `Authorization: Bearer` token does not match
/// the configured admin token. With no token configured every admin request
/// is rejected.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state
        .admin_token
        .as_deref()
        .ok_or_else(|| AppError::new(AppErrorKind::Auth(AuthError::InvalidCredentials)))?;

    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::new(AppErrorKind::Auth(AuthError::MissingCredentials)))?;

    if !secure_eq(token.as_bytes(), expected.as_bytes()) {
        return Err(AppError::new(AppErrorKind::Auth(
            AuthError::InvalidCredentials,
        )));
    }

    let actor = request
        .headers()
        .get("x-admin-actor")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("admin")
        .to_string();
    request.extensions_mut().insert(AdminContext { actor });

    Ok(next.run(request).await)
}
