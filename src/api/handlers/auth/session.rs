//! Logout endpoint.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use super::principal::require_principal;
use super::refresh_tokens::delete_refresh_tokens_for_user;
use super::state::AuthState;
use crate::api::handlers::IdentityVerifier;

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "All refresh tokens revoked"),
        (status = 403, description = "Missing or unusable credentials", body = super::errors::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    verifier: Extension<Arc<IdentityVerifier>>,
) -> impl IntoResponse {
    // Revocation keys off the authenticated caller's real user id, so every
    // one of their refresh tokens goes, not just the presenting device's.
    let principal = match require_principal(&headers, &pool, &auth_state, &verifier).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match delete_refresh_tokens_for_user(&pool, principal.user_id).await {
        Ok(revoked) => {
            info!(user_id = %principal.user_id, revoked, "logout revoked refresh tokens");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => super::errors::AuthError::Internal(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::state::tests::test_state;
    use crate::token::test_jwks;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn logout_without_credentials_is_forbidden() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let verifier = Arc::new(IdentityVerifier::new(
            test_jwks("p1")?,
            "https://id.provider.test".to_string(),
        ));
        let response = logout(
            HeaderMap::new(),
            Extension(pool),
            Extension(Arc::new(test_state()?)),
            Extension(verifier),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }
}
