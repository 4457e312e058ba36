use chrono::Utc;
use sea_orm::sea_query::{Index, IndexCreateStatement, OnConflict};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Set};
use tracing::{info, warn};

use crate::entity::{
    directory, file,
    plan::{self, PlanTier},
    subscription,
};

/// (name, tier, storage limit MB, monthly price, yearly price)
const DEFAULT_PLANS: &[(&str, PlanTier, i32, f64, f64)] = &[
    ("Free", PlanTier::Free, 300, 0.0, 0.0),
    ("Basic", PlanTier::Basic, 5 * 1024, 1.99, 19.99),
    ("Premium", PlanTier::Premium, 50 * 1024, 4.99, 49.99),
    ("Enterprise", PlanTier::Enterprise, 500 * 1024, 14.99, 149.99),
];

/// Inserts the stock plans, skipping any that already exist. Safe to run
/// on every boot.
pub async fn seed_default_plans(db: &DatabaseConnection) -> Result<(), DbErr> {
    let mut created: u64 = 0;
    for (name, tier, storage_limit_mb, monthly, yearly) in DEFAULT_PLANS {
        let row = plan::ActiveModel {
            name: Set((*name).to_owned()),
            tier: Set(*tier),
            storage_limit_mb: Set(*storage_limit_mb),
            price_monthly: Set(*monthly),
            price_yearly: Set(*yearly),
            payment_link_monthly: Set(None),
            payment_link_yearly: Set(None),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        match plan::Entity::insert(row)
            .on_conflict(
                OnConflict::column(plan::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await
        {
            Ok(n) => created += n,
            Err(DbErr::RecordNotInserted) => {}
            Err(err) => return Err(err),
        }
    }
    if created > 0 {
        info!(created, "seeded default plans");
    }
    Ok(())
}

/// Creates the composite and lookup indexes the inline entity attributes
/// cannot express. Failures are logged rather than fatal; without the
/// unique index the directory-name race loses its database backstop.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let statements: Vec<(&str, IndexCreateStatement)> = vec![
        (
            "idx_directory_owner_dir_name",
            Index::create()
                .if_not_exists()
                .name("idx_directory_owner_dir_name")
                .table(directory::Entity)
                .col(directory::Column::OwnerId)
                .col(directory::Column::DirName)
                .unique()
                .to_owned(),
        ),
        (
            "idx_file_owner_created",
            Index::create()
                .if_not_exists()
                .name("idx_file_owner_created")
                .table(file::Entity)
                .col(file::Column::OwnerId)
                .col(file::Column::CreatedAt)
                .to_owned(),
        ),
        (
            "idx_file_directory_name",
            Index::create()
                .if_not_exists()
                .name("idx_file_directory_name")
                .table(file::Entity)
                .col(file::Column::DirectoryId)
                .col(file::Column::FileName)
                .to_owned(),
        ),
        (
            "idx_file_blob_key",
            Index::create()
                .if_not_exists()
                .name("idx_file_blob_key")
                .table(file::Entity)
                .col(file::Column::BlobKey)
                .to_owned(),
        ),
        (
            "idx_subscription_user_status",
            Index::create()
                .if_not_exists()
                .name("idx_subscription_user_status")
                .table(subscription::Entity)
                .col(subscription::Column::UserId)
                .col(subscription::Column::Status)
                .to_owned(),
        ),
    ];

    for (name, stmt) in &statements {
        if let Err(err) = db.execute(stmt).await {
            warn!(index = name, "could not ensure index: {err}");
        }
    }
    Ok(())
}
