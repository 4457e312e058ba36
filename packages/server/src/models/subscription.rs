use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::entity::plan::{self, PlanTier};
use crate::entity::subscription::{self, SubscriptionStatus};
use crate::error::AppError;

#[derive(Debug, Serialize, ToSchema)]
pub struct PlanResponse {
    pub id: i32,
    pub name: String,
    pub tier: PlanTier,
    pub storage_limit_mb: i32,
    pub price_monthly: f64,
    pub price_yearly: f64,
    pub payment_link_monthly: Option<String>,
    pub payment_link_yearly: Option<String>,
    pub is_active: bool,
}

impl From<plan::Model> for PlanResponse {
    fn from(plan: plan::Model) -> Self {
        PlanResponse {
            id: plan.id,
            name: plan.name,
            tier: plan.tier,
            storage_limit_mb: plan.storage_limit_mb,
            price_monthly: plan.price_monthly,
            price_yearly: plan.price_yearly,
            payment_link_monthly: plan.payment_link_monthly,
            payment_link_yearly: plan.payment_link_yearly,
            is_active: plan.is_active,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePlanRequest {
    pub name: String,
    pub tier: PlanTier,
    pub storage_limit_mb: i32,
    pub price_monthly: f64,
    pub price_yearly: f64,
    pub payment_link_monthly: Option<String>,
    pub payment_link_yearly: Option<String>,
}

pub fn validate_create_plan_request(req: &CreatePlanRequest) -> Result<(), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Plan name cannot be empty".into()));
    }
    if req.name.len() > 64 {
        return Err(AppError::Validation("Plan name is too long".into()));
    }
    if req.storage_limit_mb <= 0 {
        return Err(AppError::Validation(
            "Storage limit must be greater than zero".into(),
        ));
    }
    if req.price_monthly < 0.0 || req.price_yearly < 0.0 {
        return Err(AppError::Validation("Prices cannot be negative".into()));
    }
    Ok(())
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionResponse {
    pub id: i32,
    pub plan_id: i32,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_yearly: bool,
    pub created_at: DateTime<Utc>,
}

impl From<subscription::Model> for SubscriptionResponse {
    fn from(sub: subscription::Model) -> Self {
        SubscriptionResponse {
            id: sub.id,
            plan_id: sub.plan_id,
            status: sub.status,
            start_date: sub.start_date,
            end_date: sub.end_date,
            is_yearly: sub.is_yearly,
            created_at: sub.created_at,
        }
    }
}

/// Subscription plus the plan columns clients render next to it.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionDetailResponse {
    pub id: i32,
    pub plan_id: i32,
    pub plan_name: String,
    pub storage_limit_mb: i32,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_yearly: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpgradeRequest {
    pub plan_id: i32,
    #[serde(default)]
    pub is_yearly: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PaymentLinkParams {
    #[serde(default)]
    pub is_yearly: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentLinkResponse {
    pub plan_id: i32,
    pub plan_name: String,
    pub price: f64,
    pub period: &'static str,
    pub storage_limit_mb: i32,
    pub payment_link: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmPaymentRequest {
    pub plan_id: i32,
    #[serde(default)]
    pub is_yearly: bool,
    pub transaction_id: String,
}

pub fn validate_confirm_payment_request(req: &ConfirmPaymentRequest) -> Result<(), AppError> {
    let tx = req.transaction_id.trim();
    if tx.is_empty() {
        return Err(AppError::Validation("Transaction id cannot be empty".into()));
    }
    if tx.len() > 128 {
        return Err(AppError::Validation("Transaction id is too long".into()));
    }
    Ok(())
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfirmPaymentResponse {
    pub message: String,
    pub subscription: SubscriptionResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionStatusResponse {
    pub has_active_subscription: bool,
    /// `active` or `none`.
    pub status: String,
    pub plan_name: Option<String>,
    pub storage_limit_mb: i32,
    pub end_date: Option<DateTime<Utc>>,
    pub is_yearly: Option<bool>,
}
