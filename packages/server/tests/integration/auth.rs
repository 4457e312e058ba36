use serde_json::json;

use crate::common::{TEST_PASSWORD, TestApp, routes};

mod register {
    use super::*;

    #[tokio::test]
    async fn creates_inactive_account_and_sends_code() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(
                routes::REGISTER,
                &json!({ "name": "Ada", "email": "ada@example.com", "password": TEST_PASSWORD }),
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["email"], "ada@example.com");
        assert_eq!(res.body["message"], "Verification code sent");
        assert_eq!(app.mailer.count_for("ada@example.com", "verification"), 1);

        let account = app.find_user("ada@example.com").await;
        assert!(!account.is_active);
        assert!(!account.is_admin);
        assert_eq!(account.storage_quota_mb, 300);
    }

    #[tokio::test]
    async fn rejects_duplicate_email() {
        let app = TestApp::spawn().await;
        app.register_and_verify("Ada", "ada@example.com").await;

        let res = app
            .post_without_token(
                routes::REGISTER,
                &json!({ "name": "Imposter", "email": "ada@example.com", "password": TEST_PASSWORD }),
            )
            .await;

        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "EMAIL_TAKEN");
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(
                routes::REGISTER,
                &json!({ "name": "Ada", "email": "not-an-email", "password": TEST_PASSWORD }),
            )
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");

        let res = app
            .post_without_token(
                routes::REGISTER,
                &json!({ "name": "Ada", "email": "ada@example.com", "password": "short" }),
            )
            .await;
        assert_eq!(res.status, 400);

        let res = app
            .post_without_token(
                routes::REGISTER,
                &json!({ "name": "  ", "email": "ada@example.com", "password": TEST_PASSWORD }),
            )
            .await;
        assert_eq!(res.status, 400);
    }
}

mod verify {
    use super::*;

    #[tokio::test]
    async fn activates_the_account() {
        let app = TestApp::spawn().await;
        app.post_without_token(
            routes::REGISTER,
            &json!({ "name": "Ada", "email": "ada@example.com", "password": TEST_PASSWORD }),
        )
        .await;

        let code = app.mailer.last_code_for("ada@example.com").unwrap();
        let res = app
            .post_without_token(
                routes::VERIFY,
                &json!({ "email": "ada@example.com", "code": code }),
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["is_active"], true);
    }

    #[tokio::test]
    async fn rejects_wrong_code_and_codes_are_single_use() {
        let app = TestApp::spawn().await;
        app.post_without_token(
            routes::REGISTER,
            &json!({ "name": "Ada", "email": "ada@example.com", "password": TEST_PASSWORD }),
        )
        .await;

        let res = app
            .post_without_token(
                routes::VERIFY,
                &json!({ "email": "ada@example.com", "code": "000000" }),
            )
            .await;
        assert_eq!(res.status, 400);

        let code = app.mailer.last_code_for("ada@example.com").unwrap();
        let res = app
            .post_without_token(
                routes::VERIFY,
                &json!({ "email": "ada@example.com", "code": code.clone() }),
            )
            .await;
        assert_eq!(res.status, 200);

        // Replaying the consumed code fails even though the account is
        // already active.
        let res = app
            .post_without_token(
                routes::VERIFY,
                &json!({ "email": "ada@example.com", "code": code }),
            )
            .await;
        assert_eq!(res.status, 400);
    }
}

mod login {
    use super::*;

    #[tokio::test]
    async fn refuses_unverified_accounts() {
        let app = TestApp::spawn().await;
        app.post_without_token(
            routes::REGISTER,
            &json!({ "name": "Ada", "email": "ada@example.com", "password": TEST_PASSWORD }),
        )
        .await;

        let res = app
            .post_without_token(
                routes::LOGIN,
                &json!({ "email": "ada@example.com", "password": TEST_PASSWORD }),
            )
            .await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "ACCOUNT_NOT_VERIFIED");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_read_the_same() {
        let app = TestApp::spawn().await;
        app.register_and_verify("Ada", "ada@example.com").await;

        let wrong = app
            .post_without_token(
                routes::LOGIN,
                &json!({ "email": "ada@example.com", "password": "not-the-password" }),
            )
            .await;
        let unknown = app
            .post_without_token(
                routes::LOGIN,
                &json!({ "email": "ghost@example.com", "password": TEST_PASSWORD }),
            )
            .await;

        assert_eq!(wrong.status, 401);
        assert_eq!(unknown.status, 401);
        assert_eq!(wrong.body["code"], unknown.body["code"]);
    }

    #[tokio::test]
    async fn token_works_against_me() {
        let app = TestApp::spawn().await;
        let token = app.create_user("Ada", "ada@example.com").await;

        let res = app.get_with_token(routes::ME, &token).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["email"], "ada@example.com");
        assert_eq!(res.body["name"], "Ada");
        assert_eq!(res.body["storage_quota_mb"], 300);
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_and_garbage_tokens() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(routes::ME).await;
        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");

        let res = app.get_with_token(routes::ME, "garbage-token").await;
        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }
}

mod password_reset {
    use super::*;

    #[tokio::test]
    async fn full_reset_flow_changes_the_password() {
        let app = TestApp::spawn().await;
        app.register_and_verify("Ada", "ada@example.com").await;

        let res = app
            .post_without_token(
                routes::FORGOT_PASSWORD,
                &json!({ "email": "ada@example.com" }),
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);

        let code = app.mailer.last_code_for("ada@example.com").unwrap();
        let res = app
            .post_without_token(
                routes::RESET_PASSWORD,
                &json!({
                    "email": "ada@example.com",
                    "code": code,
                    "new_password": "a-brand-new-password"
                }),
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);

        // Old password no longer works, the new one does.
        let res = app
            .post_without_token(
                routes::LOGIN,
                &json!({ "email": "ada@example.com", "password": TEST_PASSWORD }),
            )
            .await;
        assert_eq!(res.status, 401);

        let res = app
            .post_without_token(
                routes::LOGIN,
                &json!({ "email": "ada@example.com", "password": "a-brand-new-password" }),
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
    }

    #[tokio::test]
    async fn reset_rejects_bad_code_or_unknown_email() {
        let app = TestApp::spawn().await;
        app.register_and_verify("Ada", "ada@example.com").await;

        let res = app
            .post_without_token(
                routes::RESET_PASSWORD,
                &json!({
                    "email": "ada@example.com",
                    "code": "000000",
                    "new_password": "whatever-else-long"
                }),
            )
            .await;
        assert_eq!(res.status, 400);

        let res = app
            .post_without_token(
                routes::FORGOT_PASSWORD,
                &json!({ "email": "ghost@example.com" }),
            )
            .await;
        assert_eq!(res.status, 404);
    }
}

mod user_listing {
    use super::*;

    #[tokio::test]
    async fn admins_only() {
        let app = TestApp::spawn().await;
        let token = app.create_user("Ada", "ada@example.com").await;

        let res = app.get_with_token(routes::USERS, &token).await;
        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");

        let admin = app.create_admin("Root", "root@example.com").await;
        let res = app.get_with_token(routes::USERS, &admin).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["total"], 2);
        let users = res.body["users"].as_array().unwrap();
        assert_eq!(users.len(), 2);
    }
}
