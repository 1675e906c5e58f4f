//! Refresh endpoint: exchange a live refresh token for a new access token
//! and a rotated refresh token.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;

use super::directory::lookup_user_by_id;
use super::errors::AuthError;
use super::refresh_tokens::{lookup_refresh_token, rotate_refresh_token, verify_expiration};
use super::state::AuthState;
use super::types::{RefreshRequest, RefreshResponse};
use super::utils::{hash_refresh_token, unix_now};

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = RefreshResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Token not found or expired", body = super::errors::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let request: RefreshRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    // Only the hash is stored; never compare raw tokens against the database.
    let token_hash = hash_refresh_token(&request.refresh_token);
    let record = match lookup_refresh_token(&pool, &token_hash).await {
        Ok(Some(record)) => record,
        Ok(None) => return AuthError::TokenNotFound.into_response(),
        Err(err) => return AuthError::Internal(err).into_response(),
    };

    // Expired rows are removed here, at presentation time.
    let record = match verify_expiration(&pool, record, unix_now()).await {
        Ok(record) => record,
        Err(err) => return err.into_response(),
    };

    // Claims come from the directory, not the old token, so a role change
    // takes effect on the next refresh.
    let user = match lookup_user_by_id(&pool, record.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return AuthError::TokenNotFound.into_response(),
        Err(err) => return AuthError::Internal(err).into_response(),
    };

    // Only local logins mint refresh tokens, so the account has an email;
    // an empty claim is still safer than a panic if that ever changes.
    let email = user.email.as_deref().unwrap_or_default();
    let access_token = match auth_state.issue_access_token(user.id, email, user.role, unix_now()) {
        Ok(token) => token,
        Err(err) => {
            return AuthError::Internal(anyhow::anyhow!("failed to sign access token: {err}"))
                .into_response();
        }
    };

    // Rotation re-checks that the presented row is still there; a concurrent
    // refresh that won the race surfaces as TokenNotFound here.
    let ttl_seconds = auth_state.config().refresh_token_ttl_seconds();
    let refresh_token =
        match rotate_refresh_token(&pool, record.id, record.user_id, ttl_seconds).await {
            Ok(token) => token,
            Err(err) => return err.into_response(),
        };

    (
        StatusCode::OK,
        Json(RefreshResponse {
            access_token,
            refresh_token,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::state::tests::test_state;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn refresh_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = refresh(Extension(pool), Extension(Arc::new(test_state()?)), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
