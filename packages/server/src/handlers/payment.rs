use axum::{
    Json,
    extract::{Path, Query, State},
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tracing::{info, instrument, warn};

use crate::{
    entity::{plan, subscription},
    error::{AppError, ErrorBody},
    extractors::{AppJson, AuthUser},
    models::subscription::{
        ConfirmPaymentRequest, ConfirmPaymentResponse, PaymentLinkParams, PaymentLinkResponse,
        SubscriptionStatusResponse, validate_confirm_payment_request,
    },
    services::subscriptions,
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/link/{plan_id}",
    tag = "Payments",
    operation_id = "payments_link",
    summary = "Checkout link for a plan",
    description = "Returns the externally hosted checkout link for the monthly or yearly \
                   billing period.",
    params(
        ("plan_id" = i32, Path, description = "Plan to pay for"),
        PaymentLinkParams,
    ),
    responses(
        (status = 200, description = "Checkout link", body = PaymentLinkResponse),
        (status = 400, description = "No link configured for this plan", body = ErrorBody),
        (status = 404, description = "No such plan", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user, params), fields(plan_id = plan_id))]
pub async fn payment_link(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(plan_id): Path<i32>,
    Query(params): Query<PaymentLinkParams>,
) -> Result<Json<PaymentLinkResponse>, AppError> {
    let plan = plan::Entity::find_by_id(plan_id)
        .filter(plan::Column::IsActive.eq(true))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Plan not found".into()))?;

    let (link, price, period) = if params.is_yearly {
        (plan.payment_link_yearly.clone(), plan.price_yearly, "yearly")
    } else {
        (plan.payment_link_monthly.clone(), plan.price_monthly, "monthly")
    };
    let Some(payment_link) = link else {
        return Err(AppError::Validation(format!(
            "No {period} payment link configured for plan '{}'",
            plan.name
        )));
    };

    Ok(Json(PaymentLinkResponse {
        plan_id: plan.id,
        plan_name: plan.name,
        price,
        period,
        storage_limit_mb: plan.storage_limit_mb,
        payment_link,
    }))
}

#[utoipa::path(
    post,
    path = "/confirm",
    tag = "Payments",
    operation_id = "payments_confirm",
    summary = "Confirm a completed payment",
    description = "Records the external transaction and activates the paid plan. Each \
                   transaction id is accepted once; replays conflict.",
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Subscription activated", body = ConfirmPaymentResponse),
        (status = 404, description = "No such plan", body = ErrorBody),
        (status = 409, description = "Transaction already recorded", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id, plan_id = payload.plan_id))]
pub async fn confirm_payment(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<ConfirmPaymentRequest>,
) -> Result<Json<ConfirmPaymentResponse>, AppError> {
    validate_confirm_payment_request(&payload)?;
    let transaction_id = payload.transaction_id.trim().to_owned();

    let plan = plan::Entity::find_by_id(payload.plan_id)
        .filter(plan::Column::IsActive.eq(true))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Plan not found".into()))?;

    // Fast-path replay check; the unique column on transaction_id closes
    // the race between two concurrent confirmations.
    let replay = subscription::Entity::find()
        .filter(subscription::Column::TransactionId.eq(&transaction_id))
        .one(&state.db)
        .await?;
    if replay.is_some() {
        return Err(AppError::Conflict(
            "This payment transaction has already been recorded".into(),
        ));
    }

    let sub = subscriptions::activate(
        &state.db,
        auth_user.user_id,
        &plan,
        payload.is_yearly,
        Some(transaction_id),
    )
    .await?;

    if let Err(err) = state
        .mailer
        .send_subscription_confirmation(&auth_user.email, &plan.name, sub.end_date)
        .await
    {
        warn!(user_id = auth_user.user_id, "confirmation mail not sent: {err}");
    }

    info!(user_id = auth_user.user_id, plan = %plan.name, "payment confirmed");
    Ok(Json(ConfirmPaymentResponse {
        message: format!("Subscribed to {}", plan.name),
        subscription: sub.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/status",
    tag = "Payments",
    operation_id = "payments_status",
    summary = "Subscription status",
    description = "What the caller is currently subscribed to, if anything. Reading the status \
                   also settles lazy expiry of lapsed subscriptions.",
    responses(
        (status = 200, description = "Current status", body = SubscriptionStatusResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn payment_status(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<SubscriptionStatusResponse>, AppError> {
    let account = auth_user.fetch_account(&state.db).await?;

    let Some(sub) = subscriptions::active_subscription(&state.db, account.id).await? else {
        return Ok(Json(SubscriptionStatusResponse {
            has_active_subscription: false,
            status: "none".into(),
            plan_name: None,
            storage_limit_mb: account.storage_quota_mb,
            end_date: None,
            is_yearly: None,
        }));
    };

    let plan = plan::Entity::find_by_id(sub.plan_id).one(&state.db).await?;
    let (plan_name, storage_limit_mb) = match plan {
        Some(plan) => (Some(plan.name), plan.storage_limit_mb),
        None => (None, account.storage_quota_mb),
    };

    Ok(Json(SubscriptionStatusResponse {
        has_active_subscription: true,
        status: "active".into(),
        plan_name,
        storage_limit_mb,
        end_date: sub.end_date,
        is_yearly: Some(sub.is_yearly),
    }))
}
