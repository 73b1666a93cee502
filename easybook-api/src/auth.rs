use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use easybook_core::{CoreError, Role, User};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;
use crate::extract::{validate_phone, ValidatedJson};
use crate::middleware::auth::TOKEN_COOKIE;
use crate::middleware::{issue_token, require_auth, CurrentUser};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 2, max = 50, message = "Name must be 2-50 characters"))]
    pub name: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, max = 50, message = "Name must be 2-50 characters"))]
    pub name: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    #[validate(url(message = "Avatar must be a valid URL"))]
    pub avatar: Option<String>,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthPayload {
    pub user: User,
    pub token: String,
}

pub fn routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/api/auth/me", get(me).put(update_me))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .merge(protected)
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.environment == "production")
        .build()
}

async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<(CookieJar, (axum::http::StatusCode, Json<ApiResponse<AuthPayload>>)), AppError> {
    if state.users.find_by_email(&payload.email).await?.is_some() {
        return Err(CoreError::Conflict("Email is already registered".to_string()).into());
    }

    let user = User::new(
        &payload.email,
        &payload.password,
        &payload.name,
        payload.phone,
        Role::User,
        state.auth.password_cost,
    )?;
    state.users.create_user(&user).await?;
    tracing::info!(user_id = %user.id, "User registered");

    let token = issue_token(&user, &state.auth)?;
    let jar = jar.add(session_cookie(&state, token.clone()));
    Ok((jar, ApiResponse::created("Registration successful", AuthPayload { user, token })))
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<(CookieJar, Json<ApiResponse<AuthPayload>>), AppError> {
    let invalid = || AppError::AuthenticationError("Invalid email or password".to_string());

    let user = state.users.find_by_email(&payload.email).await?.ok_or_else(invalid)?;
    if !user.verify_password(&payload.password) {
        return Err(invalid());
    }
    if !user.is_active {
        return Err(AppError::AuthenticationError("Account is disabled".to_string()));
    }

    let token = issue_token(&user, &state.auth)?;
    let jar = jar.add(session_cookie(&state, token.clone()));
    Ok((jar, ApiResponse::ok("Login successful", AuthPayload { user, token })))
}

async fn logout(jar: CookieJar) -> (CookieJar, Json<ApiResponse<()>>) {
    (jar.remove(Cookie::build(TOKEN_COOKIE).path("/")), ApiResponse::ok("Logged out", ()))
}

async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<ApiResponse<User>> {
    ApiResponse::ok("Profile loaded", user)
}

async fn update_me(
    State(state): State<AppState>,
    Extension(CurrentUser(mut user)): Extension<CurrentUser>,
    ValidatedJson(payload): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    if let Some(name) = payload.name {
        user.name = name.trim().to_string();
    }
    if let Some(phone) = payload.phone {
        user.phone = Some(phone);
    }
    if let Some(avatar) = payload.avatar {
        user.avatar = avatar;
    }
    if let Some(password) = payload.password {
        user.change_password(&password, state.auth.password_cost)?;
    }
    user.updated_at = chrono::Utc::now();

    state.users.update_user(&user).await?;
    Ok(ApiResponse::ok("Profile updated", user))
}
