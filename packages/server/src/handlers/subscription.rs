use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr,
};
use tracing::{info, instrument};

use crate::{
    entity::plan,
    error::{AppError, ErrorBody},
    extractors::{AppJson, AuthUser},
    models::subscription::{
        CreatePlanRequest, PlanResponse, SubscriptionDetailResponse, SubscriptionResponse,
        UpgradeRequest, validate_create_plan_request,
    },
    services::subscriptions,
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/plans",
    tag = "Subscriptions",
    operation_id = "subscriptions_list_plans",
    summary = "List available plans",
    responses(
        (status = 200, description = "Active plans ordered by storage limit", body = [PlanResponse]),
    ),
)]
#[instrument(skip(state))]
pub async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<PlanResponse>>, AppError> {
    let plans = plan::Entity::find()
        .filter(plan::Column::IsActive.eq(true))
        .order_by_asc(plan::Column::StorageLimitMb)
        .all(&state.db)
        .await?;
    Ok(Json(plans.into_iter().map(PlanResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/plans",
    tag = "Subscriptions",
    operation_id = "subscriptions_create_plan",
    summary = "Create a plan",
    description = "Admin only.",
    request_body = CreatePlanRequest,
    responses(
        (status = 201, description = "Plan created", body = PlanResponse),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 409, description = "Plan name already exists", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id, plan = %payload.name))]
pub async fn create_plan(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreatePlanRequest>,
) -> Result<(StatusCode, Json<PlanResponse>), AppError> {
    auth_user.require_admin()?;
    validate_create_plan_request(&payload)?;

    let row = plan::ActiveModel {
        name: Set(payload.name.trim().to_owned()),
        tier: Set(payload.tier),
        storage_limit_mb: Set(payload.storage_limit_mb),
        price_monthly: Set(payload.price_monthly),
        price_yearly: Set(payload.price_yearly),
        payment_link_monthly: Set(payload.payment_link_monthly),
        payment_link_yearly: Set(payload.payment_link_yearly),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let created = match row.insert(&state.db).await {
        Ok(created) => created,
        Err(err) => {
            if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
                return Err(AppError::Conflict("A plan with this name already exists".into()));
            }
            return Err(err.into());
        }
    };

    info!(plan_id = created.id, "plan created");
    Ok((StatusCode::CREATED, Json(created.into())))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Subscriptions",
    operation_id = "subscriptions_me",
    summary = "Current subscription",
    responses(
        (status = 200, description = "The caller's active subscription", body = SubscriptionDetailResponse),
        (status = 404, description = "No active subscription", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn my_subscription(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<SubscriptionDetailResponse>, AppError> {
    let Some(sub) = subscriptions::active_subscription(&state.db, auth_user.user_id).await? else {
        return Err(AppError::NotFound("No active subscription".into()));
    };

    let plan = plan::Entity::find_by_id(sub.plan_id)
        .one(&state.db)
        .await?;
    let (plan_name, storage_limit_mb) = match plan {
        Some(plan) => (plan.name, plan.storage_limit_mb),
        None => ("unknown".to_owned(), 0),
    };

    Ok(Json(SubscriptionDetailResponse {
        id: sub.id,
        plan_id: sub.plan_id,
        plan_name,
        storage_limit_mb,
        status: sub.status,
        start_date: sub.start_date,
        end_date: sub.end_date,
        is_yearly: sub.is_yearly,
    }))
}

#[utoipa::path(
    post,
    path = "/upgrade",
    tag = "Subscriptions",
    operation_id = "subscriptions_upgrade",
    summary = "Switch to another plan",
    description = "Replaces the current subscription immediately. Billing confirmation happens \
                   separately through the payment endpoints.",
    request_body = UpgradeRequest,
    responses(
        (status = 200, description = "Subscription switched", body = SubscriptionResponse),
        (status = 404, description = "No such plan", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id, plan_id = payload.plan_id))]
pub async fn upgrade(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<UpgradeRequest>,
) -> Result<Json<SubscriptionResponse>, AppError> {
    let plan = plan::Entity::find_by_id(payload.plan_id)
        .filter(plan::Column::IsActive.eq(true))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Plan not found".into()))?;

    let sub =
        subscriptions::activate(&state.db, auth_user.user_id, &plan, payload.is_yearly, None)
            .await?;
    Ok(Json(sub.into()))
}

#[utoipa::path(
    post,
    path = "/cancel",
    tag = "Subscriptions",
    operation_id = "subscriptions_cancel",
    summary = "Cancel the active subscription",
    description = "The account falls back to its default quota for future uploads; stored files \
                   are untouched.",
    responses(
        (status = 200, description = "Subscription cancelled", body = SubscriptionResponse),
        (status = 404, description = "No active subscription", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn cancel(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<SubscriptionResponse>, AppError> {
    let sub = subscriptions::cancel(&state.db, auth_user.user_id).await?;
    Ok(Json(sub.into()))
}
