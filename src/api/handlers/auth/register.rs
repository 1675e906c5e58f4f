//! Local registration endpoint.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use anyhow::anyhow;
use sqlx::PgPool;

use super::directory::{SignupOutcome, insert_local_user};
use super::errors::AuthError;
use super::password::hash_password;
use super::principal::Role;
use super::types::{RegisterRequest, RegisterResponse};
use super::utils::{normalize_email, valid_email, valid_password};

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 409, description = "Email already in use", body = super::errors::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email_normalized = normalize_email(&request.email);
    if !valid_email(&email_normalized) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    if !valid_password(&request.password) {
        return (StatusCode::BAD_REQUEST, "Invalid password".to_string()).into_response();
    }

    let full_name = request.full_name.trim().to_string();
    if full_name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Invalid full name".to_string()).into_response();
    }

    // Unknown role names are rejected outright, never defaulted.
    let role = match request.role.as_deref() {
        None => Role::Member,
        Some(value) => match Role::parse(value) {
            Some(role) => role,
            None => {
                return (StatusCode::BAD_REQUEST, "Invalid role".to_string()).into_response();
            }
        },
    };

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            return AuthError::Internal(anyhow!("failed to hash password: {err}"))
                .into_response();
        }
    };

    match insert_local_user(&pool, &email_normalized, &full_name, role, &password_hash).await {
        Ok(SignupOutcome::Created(_)) => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                message: "User registered".to_string(),
            }),
        )
            .into_response(),
        Ok(SignupOutcome::Conflict) => AuthError::DuplicateIdentity.into_response(),
        Err(err) => AuthError::Internal(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    fn request(email: &str, password: &str, role: Option<&str>) -> Option<Json<RegisterRequest>> {
        Some(Json(RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            full_name: "Alice".to_string(),
            role: role.map(str::to_string),
        }))
    }

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[tokio::test]
    async fn register_missing_payload() -> Result<()> {
        let response = register(Extension(lazy_pool()?), None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_invalid_email() -> Result<()> {
        let response = register(Extension(lazy_pool()?), request("nope", "pw123456", None))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_short_password() -> Result<()> {
        let response = register(
            Extension(lazy_pool()?),
            request("a@example.com", "short", None),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_unknown_role() -> Result<()> {
        let response = register(
            Extension(lazy_pool()?),
            request("a@example.com", "pw123456", Some("owner")),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_blank_full_name() -> Result<()> {
        let response = register(
            Extension(lazy_pool()?),
            Some(Json(RegisterRequest {
                email: "a@example.com".to_string(),
                password: "pw123456".to_string(),
                full_name: "   ".to_string(),
                role: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
