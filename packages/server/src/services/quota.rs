use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use tracing::warn;

use crate::entity::{plan, user};
use crate::services::{subscriptions, usage};

/// Outcome of an admission check, kept around for error reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaDecision {
    pub admitted: bool,
    pub used_mb: f64,
    pub ceiling_mb: f64,
    pub requested_mb: f64,
}

/// An upload is admitted while current usage plus the candidate still
/// fits the ceiling. Exact fit passes.
pub fn admit(used_mb: f64, ceiling_mb: f64, requested_mb: f64) -> bool {
    used_mb + requested_mb <= ceiling_mb
}

/// Resolves the ceiling that applies to `owner` right now: the storage
/// limit of the active subscription's plan, or the account's own quota
/// when there is no active subscription. A subscription pointing at a
/// deleted plan also falls back to the account quota instead of failing.
pub async fn effective_ceiling_mb(
    db: &DatabaseConnection,
    owner: &user::Model,
) -> Result<f64, DbErr> {
    if let Some(sub) = subscriptions::active_subscription(db, owner.id).await? {
        match plan::Entity::find_by_id(sub.plan_id).one(db).await? {
            Some(plan) => return Ok(plan.storage_limit_mb as f64),
            None => {
                warn!(
                    user_id = owner.id,
                    plan_id = sub.plan_id,
                    "active subscription references a missing plan, using account quota"
                );
            }
        }
    }
    Ok(owner.storage_quota_mb as f64)
}

/// Admission check for a candidate upload of `candidate_bytes`. Reads the
/// ledger as-is; it does not recompute first, so a stale ledger decides
/// until the next catalog change refreshes it.
pub async fn check(
    db: &DatabaseConnection,
    owner: &user::Model,
    candidate_bytes: i64,
) -> Result<QuotaDecision, DbErr> {
    let used_mb = usage::current_used_mb(db, owner.id).await?;
    let ceiling_mb = effective_ceiling_mb(db, owner).await?;
    let requested_mb = candidate_bytes as f64 / usage::BYTES_PER_MB;
    Ok(QuotaDecision {
        admitted: admit(used_mb, ceiling_mb, requested_mb),
        used_mb,
        ceiling_mb,
        requested_mb,
    })
}
