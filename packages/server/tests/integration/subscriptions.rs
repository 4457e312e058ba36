use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;

use server::entity::subscription::{self, SubscriptionStatus};

use crate::common::{TestApp, routes};

async fn plan_id_by_name(app: &TestApp, name: &str) -> i64 {
    let res = app.get_without_token(routes::PLANS).await;
    res.body
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["name"] == name)
        .unwrap_or_else(|| panic!("plan {name} not seeded"))["id"]
        .as_i64()
        .unwrap()
}

mod plans {
    use super::*;

    #[tokio::test]
    async fn catalog_is_public_and_ordered_by_size() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(routes::PLANS).await;
        assert_eq!(res.status, 200, "{}", res.text);

        let names: Vec<&str> = res
            .body
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["Free", "Basic", "Premium", "Enterprise"]);

        let free = &res.body[0];
        assert_eq!(free["tier"], "free");
        assert_eq!(free["storage_limit_mb"], 300);
        assert_eq!(free["price_monthly"], 0.0);
    }

    #[tokio::test]
    async fn creating_plans_is_admin_only() {
        let app = TestApp::spawn().await;
        let token = app.create_user("Ada", "ada@example.com").await;

        let res = app
            .post_with_token(
                routes::PLANS,
                &token,
                &json!({
                    "name": "Custom",
                    "tier": "premium",
                    "storage_limit_mb": 1024,
                    "price_monthly": 9.99,
                    "price_yearly": 99.99,
                }),
            )
            .await;
        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn admin_creates_plans_and_duplicates_conflict() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin("Root", "root@example.com").await;

        let body = json!({
            "name": "Custom",
            "tier": "premium",
            "storage_limit_mb": 1024,
            "price_monthly": 9.99,
            "price_yearly": 99.99,
        });
        let res = app.post_with_token(routes::PLANS, &admin, &body).await;
        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["name"], "Custom");

        let res = app.post_with_token(routes::PLANS, &admin, &body).await;
        assert_eq!(res.status, 409);

        let res = app
            .post_with_token(
                routes::PLANS,
                &admin,
                &json!({
                    "name": "Broken",
                    "tier": "basic",
                    "storage_limit_mb": 0,
                    "price_monthly": 1.0,
                    "price_yearly": 10.0,
                }),
            )
            .await;
        assert_eq!(res.status, 400);
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn registration_starts_on_the_free_plan() {
        let app = TestApp::spawn().await;
        let token = app.create_user("Ada", "ada@example.com").await;

        let res = app.get_with_token(routes::PAYMENT_STATUS, &token).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["has_active_subscription"], true);
        assert_eq!(res.body["plan_name"], "Free");
        assert_eq!(res.body["storage_limit_mb"], 300);
        assert!(res.body["end_date"].is_null(), "free tier never expires");

        let res = app.get_with_token(routes::MY_SUBSCRIPTION, &token).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["plan_name"], "Free");
        assert_eq!(res.body["status"], "active");
    }

    #[tokio::test]
    async fn upgrade_supersedes_the_previous_subscription() {
        let app = TestApp::spawn().await;
        let token = app.create_user("Ada", "ada@example.com").await;
        let basic = plan_id_by_name(&app, "Basic").await;

        let res = app
            .post_with_token(routes::UPGRADE, &token, &json!({ "plan_id": basic }))
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["status"], "active");
        assert!(!res.body["end_date"].is_null(), "paid plans carry a term");

        let res = app.get_with_token(routes::MY_SUBSCRIPTION, &token).await;
        assert_eq!(res.body["plan_name"], "Basic");

        // Exactly one active row; the free one is cancelled, not deleted.
        let user = app.find_user("ada@example.com").await;
        let subs = subscription::Entity::find()
            .filter(subscription::Column::UserId.eq(user.id))
            .all(&app.db)
            .await
            .unwrap();
        assert_eq!(subs.len(), 2);
        let active: Vec<_> = subs
            .iter()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .collect();
        assert_eq!(active.len(), 1);
        assert!(
            subs.iter()
                .any(|s| s.status == SubscriptionStatus::Cancelled && s.end_date.is_some())
        );
    }

    #[tokio::test]
    async fn yearly_billing_runs_a_year() {
        let app = TestApp::spawn().await;
        let token = app.create_user("Ada", "ada@example.com").await;
        let basic = plan_id_by_name(&app, "Basic").await;

        let res = app
            .post_with_token(
                routes::UPGRADE,
                &token,
                &json!({ "plan_id": basic, "is_yearly": true }),
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["is_yearly"], true);

        let start: chrono::DateTime<Utc> =
            res.body["start_date"].as_str().unwrap().parse().unwrap();
        let end: chrono::DateTime<Utc> = res.body["end_date"].as_str().unwrap().parse().unwrap();
        assert_eq!((end - start).num_days(), 365);
    }

    #[tokio::test]
    async fn upgrading_to_an_unknown_plan_is_404() {
        let app = TestApp::spawn().await;
        let token = app.create_user("Ada", "ada@example.com").await;

        let res = app
            .post_with_token(routes::UPGRADE, &token, &json!({ "plan_id": 9999 }))
            .await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn cancel_ends_the_subscription_once() {
        let app = TestApp::spawn().await;
        let token = app.create_user("Ada", "ada@example.com").await;

        let res = app.post_with_token(routes::CANCEL, &token, &json!({})).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["status"], "cancelled");
        assert!(!res.body["end_date"].is_null());

        let res = app.get_with_token(routes::MY_SUBSCRIPTION, &token).await;
        assert_eq!(res.status, 404);

        let res = app.post_with_token(routes::CANCEL, &token, &json!({})).await;
        assert_eq!(res.status, 404);

        // Status falls back to the account quota.
        let res = app.get_with_token(routes::PAYMENT_STATUS, &token).await;
        assert_eq!(res.body["has_active_subscription"], false);
        assert_eq!(res.body["status"], "none");
        assert_eq!(res.body["storage_limit_mb"], 300);
    }
}

mod payment {
    use super::*;

    #[tokio::test]
    async fn seeded_plans_have_no_checkout_links() {
        let app = TestApp::spawn().await;
        let token = app.create_user("Ada", "ada@example.com").await;
        let basic = plan_id_by_name(&app, "Basic").await;

        let res = app
            .get_with_token(&routes::payment_link(basic, false), &token)
            .await;
        assert_eq!(res.status, 400, "{}", res.text);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn links_come_back_per_billing_period() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin("Root", "root@example.com").await;

        let res = app
            .post_with_token(
                routes::PLANS,
                &admin,
                &json!({
                    "name": "Custom",
                    "tier": "premium",
                    "storage_limit_mb": 1024,
                    "price_monthly": 9.99,
                    "price_yearly": 99.99,
                    "payment_link_monthly": "https://pay.example.com/custom-m",
                    "payment_link_yearly": "https://pay.example.com/custom-y",
                }),
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
        let plan_id = res.body["id"].as_i64().unwrap();

        let res = app
            .get_with_token(&routes::payment_link(plan_id, false), &admin)
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["period"], "monthly");
        assert_eq!(res.body["price"], 9.99);
        assert_eq!(res.body["payment_link"], "https://pay.example.com/custom-m");

        let res = app
            .get_with_token(&routes::payment_link(plan_id, true), &admin)
            .await;
        assert_eq!(res.body["period"], "yearly");
        assert_eq!(res.body["payment_link"], "https://pay.example.com/custom-y");
    }

    #[tokio::test]
    async fn confirm_activates_the_plan_and_sends_mail() {
        let app = TestApp::spawn().await;
        let token = app.create_user("Ada", "ada@example.com").await;
        let premium = plan_id_by_name(&app, "Premium").await;

        let res = app
            .post_with_token(
                routes::CONFIRM_PAYMENT,
                &token,
                &json!({ "plan_id": premium, "transaction_id": "tx-1001" }),
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["message"], "Subscribed to Premium");
        assert_eq!(res.body["subscription"]["status"], "active");

        let res = app.get_with_token(routes::MY_SUBSCRIPTION, &token).await;
        assert_eq!(res.body["plan_name"], "Premium");

        assert_eq!(app.mailer.count_for("ada@example.com", "confirmation"), 1);
    }

    #[tokio::test]
    async fn a_transaction_id_is_spent_once() {
        let app = TestApp::spawn().await;
        let ada = app.create_user("Ada", "ada@example.com").await;
        let bob = app.create_user("Bob", "bob@example.com").await;
        let premium = plan_id_by_name(&app, "Premium").await;

        let body = json!({ "plan_id": premium, "transaction_id": "tx-1001" });
        let res = app.post_with_token(routes::CONFIRM_PAYMENT, &ada, &body).await;
        assert_eq!(res.status, 200);

        // Replays conflict, including from a different account.
        let res = app.post_with_token(routes::CONFIRM_PAYMENT, &ada, &body).await;
        assert_eq!(res.status, 409, "{}", res.text);
        let res = app.post_with_token(routes::CONFIRM_PAYMENT, &bob, &body).await;
        assert_eq!(res.status, 409, "{}", res.text);
    }

    #[tokio::test]
    async fn confirm_validates_its_input() {
        let app = TestApp::spawn().await;
        let token = app.create_user("Ada", "ada@example.com").await;
        let premium = plan_id_by_name(&app, "Premium").await;

        let res = app
            .post_with_token(
                routes::CONFIRM_PAYMENT,
                &token,
                &json!({ "plan_id": premium, "transaction_id": "   " }),
            )
            .await;
        assert_eq!(res.status, 400);

        let res = app
            .post_with_token(
                routes::CONFIRM_PAYMENT,
                &token,
                &json!({ "plan_id": 9999, "transaction_id": "tx-1" }),
            )
            .await;
        assert_eq!(res.status, 404);
    }
}

mod expiry {
    use super::*;

    #[tokio::test]
    async fn lapsed_subscriptions_expire_on_read() {
        let app = TestApp::spawn().await;
        let token = app.create_user("Ada", "ada@example.com").await;
        let basic = plan_id_by_name(&app, "Basic").await;

        let res = app
            .post_with_token(routes::UPGRADE, &token, &json!({ "plan_id": basic }))
            .await;
        assert_eq!(res.status, 200);
        let sub_id = res.body["id"].as_i64().unwrap() as i32;

        // Backdate the term so the subscription has lapsed.
        let lapsed = subscription::ActiveModel {
            id: Set(sub_id),
            end_date: Set(Some(Utc::now() - Duration::days(1))),
            ..Default::default()
        };
        lapsed.update(&app.db).await.unwrap();

        let res = app.get_with_token(routes::PAYMENT_STATUS, &token).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["has_active_subscription"], false);
        assert_eq!(res.body["status"], "none");

        // The read settled the row.
        let row = subscription::Entity::find_by_id(sub_id)
            .one(&app.db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn open_ended_subscriptions_never_lapse() {
        let app = TestApp::spawn().await;
        let token = app.create_user("Ada", "ada@example.com").await;

        // The free subscription has no end date; repeated reads keep it
        // active.
        for _ in 0..2 {
            let res = app.get_with_token(routes::PAYMENT_STATUS, &token).await;
            assert_eq!(res.body["has_active_subscription"], true);
            assert_eq!(res.body["plan_name"], "Free");
        }
    }
}
