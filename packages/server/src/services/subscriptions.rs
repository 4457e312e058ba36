use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, SqlErr, TransactionTrait,
};
use tracing::{info, warn};

use crate::entity::plan::{self, PlanTier};
use crate::entity::subscription::{self, SubscriptionStatus};
use crate::error::AppError;

/// Returns the caller's live subscription, if any.
///
/// Expiry is lazy: a row still marked active whose `end_date` has passed
/// is flipped to expired here, on read. The flip is opportunistic; if the
/// write-back fails the row is still reported as expired and the next
/// read tries again.
pub async fn active_subscription(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<Option<subscription::Model>, DbErr> {
    let Some(sub) = subscription::Entity::find()
        .filter(subscription::Column::UserId.eq(user_id))
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Active))
        .order_by_desc(subscription::Column::CreatedAt)
        .one(db)
        .await?
    else {
        return Ok(None);
    };

    match sub.end_date {
        Some(end) if end < Utc::now() => {
            info!(user_id, subscription_id = sub.id, "subscription lapsed, marking expired");
            let mut lapsed: subscription::ActiveModel = sub.into();
            lapsed.status = Set(SubscriptionStatus::Expired);
            lapsed.updated_at = Set(Utc::now());
            if let Err(err) = lapsed.update(db).await {
                warn!(user_id, "failed to persist subscription expiry: {err}");
            }
            Ok(None)
        }
        _ => Ok(Some(sub)),
    }
}

/// Activates `plan` for a user, superseding whatever was active before.
/// Previous active rows are closed out as cancelled and the new row is
/// inserted in the same transaction. `transaction_id` is the external
/// payment reference; its unique column makes replayed confirmations
/// collide, which surfaces as a conflict.
pub async fn activate(
    db: &DatabaseConnection,
    user_id: i32,
    plan: &plan::Model,
    is_yearly: bool,
    transaction_id: Option<String>,
) -> Result<subscription::Model, AppError> {
    let now = Utc::now();
    let end_date = match plan.tier {
        PlanTier::Free => None,
        _ => Some(now + Duration::days(if is_yearly { 365 } else { 30 })),
    };

    let txn = db.begin().await?;

    subscription::Entity::update_many()
        .set(subscription::ActiveModel {
            status: Set(SubscriptionStatus::Cancelled),
            end_date: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(subscription::Column::UserId.eq(user_id))
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Active))
        .exec(&txn)
        .await?;

    let fresh = subscription::ActiveModel {
        user_id: Set(user_id),
        plan_id: Set(plan.id),
        status: Set(SubscriptionStatus::Active),
        start_date: Set(now),
        end_date: Set(end_date),
        is_yearly: Set(is_yearly),
        transaction_id: Set(transaction_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let sub = match fresh.insert(&txn).await {
        Ok(sub) => sub,
        Err(err) => {
            if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
                return Err(AppError::Conflict(
                    "This payment transaction has already been recorded".into(),
                ));
            }
            return Err(err.into());
        }
    };

    txn.commit().await?;
    info!(user_id, plan = %plan.name, is_yearly, "subscription activated");
    Ok(sub)
}

/// Cancels the active subscription in place; the account falls back to
/// its default quota from the next admission check onward.
pub async fn cancel(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<subscription::Model, AppError> {
    let Some(sub) = active_subscription(db, user_id).await? else {
        return Err(AppError::NotFound("No active subscription".into()));
    };

    let now = Utc::now();
    let mut cancelled: subscription::ActiveModel = sub.into();
    cancelled.status = Set(SubscriptionStatus::Cancelled);
    cancelled.end_date = Set(Some(now));
    cancelled.updated_at = Set(now);
    let updated = cancelled.update(db).await?;
    info!(user_id, subscription_id = updated.id, "subscription cancelled");
    Ok(updated)
}
