//! Role-gated user management endpoints.
//!
//! Flow overview:
//! 1) Resolve the caller via the bearer token (local or external).
//! 2) Enforce the role requirement; every denial is a uniform 403.
//! 3) Perform the read or allow-listed mutation on the target user.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::IdentityVerifier;
use super::auth::AuthState;
use super::auth::directory;
use super::auth::errors::AuthError;
use super::auth::principal::{Role, require_principal, require_role};

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    /// Null for external accounts whose provider never sent an email.
    pub email: Option<String>,
    pub full_name: String,
    pub role: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserRoleResponse {
    pub id: String,
    pub role: String,
}

fn summary(record: directory::UserRecord) -> UserSummary {
    UserSummary {
        id: record.id.to_string(),
        email: record.email,
        full_name: record.full_name,
        role: record.role.as_str().to_string(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/users",
    responses(
        (status = 200, description = "List users (admin-only).", body = [UserSummary]),
        (status = 403, description = "Forbidden.", body = super::auth::errors::ErrorBody),
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    verifier: Extension<Arc<IdentityVerifier>>,
) -> impl IntoResponse {
    let principal = match require_principal(&headers, &pool, &auth_state, &verifier).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_role(&principal, Role::Admin) {
        return err.into_response();
    }

    match directory::fetch_user_records(&pool).await {
        Ok(records) => {
            let list: Vec<UserSummary> = records.into_iter().map(summary).collect();
            (StatusCode::OK, Json(list)).into_response()
        }
        Err(err) => AuthError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User detail.", body = UserSummary),
        (status = 400, description = "Invalid user id."),
        (status = 403, description = "Forbidden.", body = super::auth::errors::ErrorBody),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
pub async fn get_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    verifier: Extension<Arc<IdentityVerifier>>,
) -> impl IntoResponse {
    // Any authenticated principal may read a profile.
    if let Err(err) = require_principal(&headers, &pool, &auth_state, &verifier).await {
        return err.into_response();
    }

    let user_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match directory::lookup_user_by_id(&pool, user_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(summary(record))).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => AuthError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}/role",
    request_body = UserRoleRequest,
    responses(
        (status = 200, description = "Role updated (admin-only).", body = UserRoleResponse),
        (status = 400, description = "Invalid user id or role."),
        (status = 403, description = "Forbidden.", body = super::auth::errors::ErrorBody),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
pub async fn set_user_role(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    verifier: Extension<Arc<IdentityVerifier>>,
    payload: Option<Json<UserRoleRequest>>,
) -> impl IntoResponse {
    let principal = match require_principal(&headers, &pool, &auth_state, &verifier).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_role(&principal, Role::Admin) {
        return err.into_response();
    }

    let request: UserRoleRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let user_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    // Unknown role names are rejected, not defaulted.
    let role = match Role::parse(&request.role) {
        Some(role) => role,
        None => return (StatusCode::BAD_REQUEST, "Invalid role".to_string()).into_response(),
    };

    match directory::assign_user_role(&pool, user_id, role).await {
        Ok(true) => (
            StatusCode::OK,
            Json(UserRoleResponse {
                id: user_id.to_string(),
                role: role.as_str().to_string(),
            }),
        )
            .into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => AuthError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    responses(
        (status = 204, description = "User deleted (admin-only)."),
        (status = 400, description = "Invalid user id."),
        (status = 403, description = "Forbidden.", body = super::auth::errors::ErrorBody),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
pub async fn delete_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    verifier: Extension<Arc<IdentityVerifier>>,
) -> impl IntoResponse {
    let principal = match require_principal(&headers, &pool, &auth_state, &verifier).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_role(&principal, Role::Admin) {
        return err.into_response();
    }

    let user_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match directory::delete_user_record(&pool, user_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => AuthError::Internal(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::state::tests::test_state;
    use crate::token::test_jwks;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    fn test_verifier() -> Result<Arc<IdentityVerifier>> {
        Ok(Arc::new(IdentityVerifier::new(
            test_jwks("p1")?,
            "https://id.provider.test".to_string(),
        )))
    }

    #[tokio::test]
    async fn list_users_without_credentials_is_forbidden() -> Result<()> {
        let response = list_users(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(Arc::new(test_state()?)),
            Extension(test_verifier()?),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn delete_user_without_credentials_is_forbidden() -> Result<()> {
        let response = delete_user(
            Path("not-a-uuid".to_string()),
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(Arc::new(test_state()?)),
            Extension(test_verifier()?),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }
}
