use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use chrono::{Duration, Utc};
use easybook_core::User;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::{AppState, AuthConfig};

pub const TOKEN_COOKIE: &str = "token";

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

/// The authenticated account, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

pub fn issue_token(user: &User, auth: &AuthConfig) -> Result<String, AppError> {
    let expiration = Utc::now() + Duration::seconds(auth.expiration as i64);
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: user.role.to_string(),
        exp: expiration.timestamp() as usize,
    };

    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(auth.secret.as_bytes()))?;
    Ok(token)
}

/// Cookie first, then `Authorization: Bearer`.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = CookieJar::from_headers(headers).get(TOKEN_COOKIE) {
        return Some(cookie.value().to_string());
    }
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let token = extract_token(headers)
        .ok_or_else(|| AppError::AuthenticationError("Authentication token is missing".to_string()))?;

    let token_data = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::AuthenticationError("Token has expired".to_string()),
        _ => AppError::AuthenticationError("Invalid token".to_string()),
    })?;

    let user_id = Uuid::parse_str(&token_data.claims.sub)
        .map_err(|_| AppError::AuthenticationError("Invalid token".to_string()))?;
    let user = state
        .users
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::AuthenticationError("Invalid token".to_string()))?;

    if !user.is_active {
        return Err(AppError::AuthenticationError("Account is disabled".to_string()));
    }
    Ok(user)
}

// ============================================================================
// Authentication Middleware
// ============================================================================

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, req.headers()).await?;
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

// ============================================================================
// Admin Middleware
// ============================================================================

pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, req.headers()).await?;
    if !user.is_admin() {
        return Err(AppError::AuthorizationError("Administrator access required".to_string()));
    }
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
