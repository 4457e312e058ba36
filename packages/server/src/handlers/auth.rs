use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr};
use tracing::{info, instrument, warn};

use crate::{
    entity::{
        plan::{self, PlanTier},
        user,
    },
    error::{AppError, ErrorBody},
    extractors::{AppJson, AuthUser},
    models::auth::{
        ForgotPasswordRequest, LoginRequest, LoginResponse, MessageResponse, RegisterRequest,
        RegisterResponse, ResetPasswordRequest, UserListResponse, UserResponse, VerifyRequest,
        validate_email, validate_login_request, validate_password, validate_register_request,
    },
    services::subscriptions,
    state::AppState,
    utils::{jwt, password},
};

#[utoipa::path(
    post,
    path = "/register",
    tag = "Auth",
    operation_id = "auth_register",
    summary = "Create an account",
    description = "Creates an inactive account and emails a six-digit verification code. \
                   The account starts on the free plan.",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification pending", body = RegisterResponse),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    validate_register_request(&payload)?;

    let hashed = password::hash_password(&payload.password)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;

    let account = user::ActiveModel {
        email: Set(payload.email.trim().to_owned()),
        name: Set(payload.name.trim().to_owned()),
        password: Set(hashed),
        is_active: Set(false),
        is_admin: Set(false),
        storage_quota_mb: Set(state.config.quota.default_user_quota_mb),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let account = match account.insert(&state.db).await {
        Ok(account) => account,
        Err(err) => {
            if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
                return Err(AppError::EmailTaken);
            }
            return Err(err.into());
        }
    };

    // Best-effort free-plan enrollment; without a subscription the
    // account quota gates admission.
    match plan::Entity::find()
        .filter(plan::Column::Tier.eq(PlanTier::Free))
        .filter(plan::Column::IsActive.eq(true))
        .one(&state.db)
        .await
    {
        Ok(Some(free)) => {
            if let Err(err) =
                subscriptions::activate(&state.db, account.id, &free, false, None).await
            {
                warn!(user_id = account.id, "could not start free subscription: {err:?}");
            }
        }
        Ok(None) => warn!("no active free plan seeded, skipping initial subscription"),
        Err(err) => warn!(user_id = account.id, "free plan lookup failed: {err}"),
    }

    let code = state.otp.issue(&account.email);
    if let Err(err) = state.mailer.send_verification_code(&account.email, &code).await {
        warn!(user_id = account.id, "verification mail not sent: {err}");
    }

    info!(user_id = account.id, "account registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: account.id,
            name: account.name,
            email: account.email,
            message: "Verification code sent".into(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/verify",
    tag = "Auth",
    operation_id = "auth_verify",
    summary = "Verify an email address",
    description = "Confirms the emailed code and activates the account. Codes are single-use.",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Account activated", body = UserResponse),
        (status = 400, description = "Invalid or expired code", body = ErrorBody),
        (status = 404, description = "Unknown email", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn verify(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyRequest>,
) -> Result<Json<UserResponse>, AppError> {
    if !state.otp.consume(&payload.email, payload.code.trim()) {
        return Err(AppError::Validation("Invalid or expired verification code".into()));
    }

    let account = user::Entity::find()
        .filter(user::Column::Email.eq(&payload.email))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if account.is_active {
        return Ok(Json(account.into()));
    }

    let mut active: user::ActiveModel = account.into();
    active.is_active = Set(true);
    let account = active.update(&state.db).await?;

    info!(user_id = account.id, "account verified");
    Ok(Json(account.into()))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    operation_id = "auth_login",
    summary = "Sign in",
    description = "Exchanges email and password for a bearer token. Unverified accounts are refused.",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Email not verified", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    validate_login_request(&payload)?;

    let account = user::Entity::find()
        .filter(user::Column::Email.eq(payload.email.trim()))
        .one(&state.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !password::verify_password(&payload.password, &account.password) {
        return Err(AppError::InvalidCredentials);
    }
    if !account.is_active {
        return Err(AppError::AccountNotVerified);
    }

    let token = jwt::sign(
        account.id,
        &account.email,
        &account.name,
        account.is_admin,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_days,
    )
    .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))?;

    info!(user_id = account.id, "user signed in");
    Ok(Json(LoginResponse {
        token,
        name: account.name,
        email: account.email,
        is_admin: account.is_admin,
    }))
}

#[utoipa::path(
    post,
    path = "/forgot-password",
    tag = "Auth",
    operation_id = "auth_forgot_password",
    summary = "Request a password reset code",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset code sent", body = MessageResponse),
        (status = 404, description = "Unknown email", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    validate_email(&payload.email)?;

    let account = user::Entity::find()
        .filter(user::Column::Email.eq(payload.email.trim()))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let code = state.otp.issue(&account.email);
    if let Err(err) = state
        .mailer
        .send_password_reset_code(&account.email, &code)
        .await
    {
        warn!(user_id = account.id, "reset mail not sent: {err}");
    }

    Ok(Json(MessageResponse {
        message: "Password reset code sent".into(),
    }))
}

#[utoipa::path(
    post,
    path = "/reset-password",
    tag = "Auth",
    operation_id = "auth_reset_password",
    summary = "Reset the password with an emailed code",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid code or weak password", body = ErrorBody),
        (status = 404, description = "Unknown email", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn reset_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    validate_password(&payload.new_password)?;

    if !state.otp.consume(&payload.email, payload.code.trim()) {
        return Err(AppError::Validation("Invalid or expired reset code".into()));
    }

    let account = user::Entity::find()
        .filter(user::Column::Email.eq(payload.email.trim()))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let hashed = password::hash_password(&payload.new_password)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;

    let user_id = account.id;
    let mut updated: user::ActiveModel = account.into();
    updated.password = Set(hashed);
    updated.update(&state.db).await?;

    info!(user_id, "password reset");
    Ok(Json(MessageResponse {
        message: "Password updated".into(),
    }))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Auth",
    operation_id = "auth_me",
    summary = "Current account",
    responses(
        (status = 200, description = "The caller's account", body = UserResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn me(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, AppError> {
    let account = auth_user.fetch_account(&state.db).await?;
    Ok(Json(account.into()))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Users",
    operation_id = "users_list",
    summary = "List all accounts",
    description = "Admin only.",
    responses(
        (status = 200, description = "All accounts", body = UserListResponse),
        (status = 403, description = "Not an admin", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn list_users(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserListResponse>, AppError> {
    auth_user.require_admin()?;

    let accounts = user::Entity::find()
        .order_by_asc(user::Column::Id)
        .all(&state.db)
        .await?;
    let total = accounts.len() as u64;
    Ok(Json(UserListResponse {
        users: accounts.into_iter().map(UserResponse::from).collect(),
        total,
    }))
}
