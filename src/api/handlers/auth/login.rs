//! Password login endpoint.

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use sqlx::PgPool;
use std::sync::Arc;

use super::directory::lookup_user_by_email;
use super::errors::AuthError;
use super::password::verify_password;
use super::refresh_tokens::create_refresh_token;
use super::state::AuthState;
use super::types::{LoginRequest, LoginResponse};
use super::utils::{normalize_email, unix_now};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid credentials", body = super::errors::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email_normalized = normalize_email(&request.email);

    let user = match lookup_user_by_email(&pool, &email_normalized).await {
        Ok(Some(user)) => user,
        // Unknown account and bad password are indistinguishable to the caller.
        Ok(None) => return AuthError::InvalidCredentials.into_response(),
        Err(err) => return AuthError::Internal(err).into_response(),
    };

    // A NULL hash means the account authenticates externally; local login is
    // disabled for it and fails the same way as a wrong password.
    if !verify_password(user.password_hash.as_deref(), &request.password) {
        return AuthError::InvalidCredentials.into_response();
    }

    // The lookup matched on the normalized email, so it is the stored value.
    let access_token =
        match auth_state.issue_access_token(user.id, &email_normalized, user.role, unix_now()) {
            Ok(token) => token,
            Err(err) => {
                return AuthError::Internal(anyhow::anyhow!("failed to sign access token: {err}"))
                    .into_response();
            }
        };

    let ttl_seconds = auth_state.config().refresh_token_ttl_seconds();
    let refresh_token = match create_refresh_token(&pool, user.id, ttl_seconds).await {
        Ok(token) => token,
        Err(err) => return AuthError::Internal(err).into_response(),
    };

    (
        StatusCode::OK,
        Json(LoginResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            user_id: user.id.to_string(),
            email: email_normalized,
            full_name: user.full_name,
            roles: vec![user.role.as_str().to_string()],
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
    async fn login_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = login(Extension(pool), Extension(Arc::new(test_state()?)), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
