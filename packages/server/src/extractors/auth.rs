use axum::{extract::FromRequestParts, http::request::Parts};
use sea_orm::{DatabaseConnection, EntityTrait};

use crate::{entity::user, error::AppError, state::AppState, utils::jwt};

/// Identity extracted from the `Authorization: Bearer` header. The fields
/// come from the token claims, so a rename or admin flip only shows up
/// once the user signs in again.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }

    /// Loads the caller's full account row. Fails as `TokenInvalid` when
    /// the account behind a still-valid token no longer exists.
    pub async fn fetch_account(&self, db: &DatabaseConnection) -> Result<user::Model, AppError> {
        user::Entity::find_by_id(self.user_id)
            .one(db)
            .await?
            .ok_or(AppError::TokenInvalid)
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::TokenMissing)?;

        let token = header.strip_prefix("Bearer ").ok_or(AppError::TokenInvalid)?;
        let claims =
            jwt::verify(token, &state.config.auth.jwt_secret).map_err(|_| AppError::TokenInvalid)?;

        Ok(AuthUser {
            user_id: claims.uid,
            email: claims.sub,
            name: claims.name,
            is_admin: claims.is_admin,
        })
    }
}
