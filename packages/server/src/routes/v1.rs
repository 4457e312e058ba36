use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{config::AppConfig, handlers, state::AppState};

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/users", user_routes())
        .nest("/files", file_routes(config))
        .nest("/subscriptions", subscription_routes())
        .nest("/payments", payment_routes())
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::register))
        .routes(routes!(handlers::auth::verify))
        .routes(routes!(handlers::auth::login))
        .routes(routes!(handlers::auth::forgot_password))
        .routes(routes!(handlers::auth::reset_password))
        .routes(routes!(handlers::auth::me))
}

fn user_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::auth::list_users))
}

fn file_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    // The body cap only applies to the upload route; everything else
    // keeps axum's default.
    let upload = OpenApiRouter::new()
        .routes(routes!(handlers::storage::upload_file))
        .layer(handlers::storage::upload_body_limit(config));

    OpenApiRouter::new()
        .routes(routes!(
            handlers::storage::create_directory,
            handlers::storage::list_directories
        ))
        .routes(routes!(handlers::storage::rename_directory))
        .routes(routes!(handlers::storage::list_files))
        .routes(routes!(handlers::storage::get_usage))
        .routes(routes!(handlers::storage::download_file))
        .routes(routes!(handlers::storage::delete_file))
        .merge(upload)
}

fn subscription_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::subscription::list_plans,
            handlers::subscription::create_plan
        ))
        .routes(routes!(handlers::subscription::my_subscription))
        .routes(routes!(handlers::subscription::upgrade))
        .routes(routes!(handlers::subscription::cancel))
}

fn payment_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::payment::payment_link))
        .routes(routes!(handlers::payment::confirm_payment))
        .routes(routes!(handlers::payment::payment_status))
}
