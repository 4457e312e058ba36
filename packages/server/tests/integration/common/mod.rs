use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    QueryFilter, Set,
};
use serde_json::{Value, json};

use common::storage::filesystem::FsBlobStore;
use server::config::{
    AppConfig, AuthConfig, CorsConfig, DatabaseConfig, OtpConfig, QuotaConfig, ServerConfig,
    StorageConfig,
};
use server::entity::{storage_usage, user};
use server::mailer::{Mailer, MailerError};
use server::services::usage;
use server::state::AppState;
use server::utils::otp::OtpStore;

pub const TEST_PASSWORD: &str = "correct-horse-battery";
pub const MAX_UPLOAD_BYTES: u64 = 32 * 1024 * 1024;

/// Captures outbound mail so tests can read verification and reset codes
/// instead of scraping logs.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

#[derive(Clone)]
pub struct SentMail {
    pub to: String,
    pub kind: &'static str,
    pub code: Option<String>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), MailerError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_owned(),
            kind: "verification",
            code: Some(code.to_owned()),
        });
        Ok(())
    }

    async fn send_password_reset_code(&self, to: &str, code: &str) -> Result<(), MailerError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_owned(),
            kind: "reset",
            code: Some(code.to_owned()),
        });
        Ok(())
    }

    async fn send_subscription_confirmation(
        &self,
        to: &str,
        _plan_name: &str,
        _end_date: Option<DateTime<Utc>>,
    ) -> Result<(), MailerError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_owned(),
            kind: "confirmation",
            code: None,
        });
        Ok(())
    }
}

impl RecordingMailer {
    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|mail| mail.to == email)
            .and_then(|mail| mail.code.clone())
    }

    pub fn count_for(&self, email: &str, kind: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|mail| mail.to == email && mail.kind == kind)
            .count()
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
    pub mailer: Arc<RecordingMailer>,
    _blob_dir: tempfile::TempDir,
}

pub struct TestResponse {
    pub status: u16,
    pub text: String,
    pub body: Value,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        TestResponse { status, text, body }
    }
}

impl TestApp {
    /// Boots the whole app against an in-memory sqlite database and a
    /// temp-dir blob store, on a random port. The pool is pinned to one
    /// connection since every new sqlite `:memory:` connection would be
    /// an empty database.
    pub async fn spawn() -> Self {
        let mut opts = ConnectOptions::new("sqlite::memory:".to_owned());
        opts.max_connections(1).min_connections(1);
        let db = Database::connect(opts).await.expect("connect sqlite");
        server::database::sync_schema(&db).await.expect("sync schema");
        server::seed::seed_default_plans(&db).await.expect("seed plans");
        server::seed::ensure_indexes(&db).await.expect("ensure indexes");

        let blob_dir = tempfile::tempdir().expect("blob temp dir");
        let blob_root = blob_dir.path().join("blobs");
        let store = FsBlobStore::new(blob_root.clone(), MAX_UPLOAD_BYTES)
            .await
            .expect("blob store");

        let mailer = Arc::new(RecordingMailer::default());

        let config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_owned(),
                port: 0,
                cors: CorsConfig {
                    allow_origins: vec![],
                    max_age: 3600,
                },
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_owned(),
            },
            auth: AuthConfig {
                jwt_secret: "integration-test-secret".to_owned(),
                token_ttl_days: 7,
            },
            storage: StorageConfig {
                root_dir: blob_root,
                max_upload_size: MAX_UPLOAD_BYTES,
            },
            quota: QuotaConfig {
                default_user_quota_mb: 300,
            },
            otp: OtpConfig { ttl_secs: 600 },
        };

        let state = AppState {
            db: db.clone(),
            blob_store: Arc::new(store),
            mailer: mailer.clone(),
            otp: Arc::new(OtpStore::new(Duration::from_secs(600))),
            config,
        };

        let app = server::build_router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        TestApp {
            addr,
            client: Client::new(),
            db,
            mailer,
            _blob_dir: blob_dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub async fn post_without_token(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("request");
        TestResponse::from_response(res).await
    }

    pub async fn post_with_token(&self, path: &str, token: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("request");
        TestResponse::from_response(res).await
    }

    pub async fn get_without_token(&self, path: &str) -> TestResponse {
        let res = self.client.get(self.url(path)).send().await.expect("request");
        TestResponse::from_response(res).await
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("request");
        TestResponse::from_response(res).await
    }

    /// Raw response for tests that need headers or binary bodies.
    pub async fn get_response(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("request")
    }

    pub async fn patch_with_token(&self, path: &str, token: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .patch(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("request");
        TestResponse::from_response(res).await
    }

    pub async fn delete_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("request");
        TestResponse::from_response(res).await
    }

    /// Multipart upload of `bytes` as the `file` field. `query` is either
    /// empty or a full query string starting with `?`.
    pub async fn upload(
        &self,
        token: &str,
        directory: &str,
        query: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> TestResponse {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_owned());
        let form = reqwest::multipart::Form::new().part("file", part);
        let res = self
            .client
            .post(self.url(&format!("{}{query}", routes::upload(directory))))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .expect("request");
        TestResponse::from_response(res).await
    }

    pub async fn register_and_verify(&self, name: &str, email: &str) {
        let res = self
            .post_without_token(
                routes::REGISTER,
                &json!({ "name": name, "email": email, "password": TEST_PASSWORD }),
            )
            .await;
        assert_eq!(res.status, 201, "register failed: {}", res.text);

        let code = self
            .mailer
            .last_code_for(email)
            .expect("verification code recorded");
        let res = self
            .post_without_token(routes::VERIFY, &json!({ "email": email, "code": code }))
            .await;
        assert_eq!(res.status, 200, "verify failed: {}", res.text);
    }

    pub async fn login(&self, email: &str) -> String {
        let res = self
            .post_without_token(
                routes::LOGIN,
                &json!({ "email": email, "password": TEST_PASSWORD }),
            )
            .await;
        assert_eq!(res.status, 200, "login failed: {}", res.text);
        res.body["token"].as_str().expect("token in response").to_owned()
    }

    /// Registers, verifies and signs in; returns the bearer token.
    pub async fn create_user(&self, name: &str, email: &str) -> String {
        self.register_and_verify(name, email).await;
        self.login(email).await
    }

    /// Same, but flips the admin flag before sign-in so the token carries
    /// the admin claim.
    pub async fn create_admin(&self, name: &str, email: &str) -> String {
        self.register_and_verify(name, email).await;
        let account = self.find_user(email).await;
        let mut admin: user::ActiveModel = account.into();
        admin.is_admin = Set(true);
        admin.update(&self.db).await.expect("promote to admin");
        self.login(email).await
    }

    pub async fn find_user(&self, email: &str) -> user::Model {
        user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await
            .expect("user query")
            .expect("user exists")
    }

    /// Overwrites the usage ledger for one account, bypassing recompute.
    pub async fn set_ledger_mb(&self, email: &str, used_mb: f64) {
        let account = self.find_user(email).await;
        let row = usage::get_or_init(&self.db, account.id)
            .await
            .expect("ledger row");
        let mut ledger: storage_usage::ActiveModel = row.into();
        ledger.used_storage_mb = Set(used_mb);
        ledger.update(&self.db).await.expect("ledger update");
    }
}

pub mod routes {
    pub const REGISTER: &str = "/api/v1/auth/register";
    pub const VERIFY: &str = "/api/v1/auth/verify";
    pub const LOGIN: &str = "/api/v1/auth/login";
    pub const ME: &str = "/api/v1/auth/me";
    pub const FORGOT_PASSWORD: &str = "/api/v1/auth/forgot-password";
    pub const RESET_PASSWORD: &str = "/api/v1/auth/reset-password";
    pub const USERS: &str = "/api/v1/users";
    pub const DIRECTORIES: &str = "/api/v1/files/directories";
    pub const LIST_FILES: &str = "/api/v1/files/list";
    pub const USAGE: &str = "/api/v1/files/usage";
    pub const PLANS: &str = "/api/v1/subscriptions/plans";
    pub const MY_SUBSCRIPTION: &str = "/api/v1/subscriptions/me";
    pub const UPGRADE: &str = "/api/v1/subscriptions/upgrade";
    pub const CANCEL: &str = "/api/v1/subscriptions/cancel";
    pub const CONFIRM_PAYMENT: &str = "/api/v1/payments/confirm";
    pub const PAYMENT_STATUS: &str = "/api/v1/payments/status";

    pub fn directory(name: &str) -> String {
        format!("{DIRECTORIES}/{name}")
    }

    pub fn upload(directory: &str) -> String {
        format!("/api/v1/files/upload/{directory}")
    }

    pub fn download(directory: &str, file: &str) -> String {
        format!("/api/v1/files/download/{directory}/{file}")
    }

    pub fn file(directory: &str, file: &str) -> String {
        format!("/api/v1/files/{directory}/{file}")
    }

    pub fn payment_link(plan_id: i64, yearly: bool) -> String {
        format!("/api/v1/payments/link/{plan_id}?is_yearly={yearly}")
    }
}
