//! Client-facing error taxonomy for the auth subsystem.
//!
//! Every failure that crosses the HTTP boundary maps to one of these
//! variants; storage error text and stack detail stay inside the service.
//! Unclassified failures become a generic 500 (fail closed).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

/// Uniform error body: kind + message, nothing else.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad email/password, unknown account, or local login disabled.
    /// One message for all three so nothing is enumerable.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Email collides with an existing principal.
    #[error("email already in use")]
    DuplicateIdentity,
    /// Refresh token unknown to the store.
    #[error("refresh token not found")]
    TokenNotFound,
    /// Refresh token past its expiry; the record has been removed.
    #[error("refresh token expired")]
    TokenExpired,
    /// External identity token failed verification; fatal to the request.
    #[error("invalid identity token")]
    InvalidExternalToken,
    /// Identity provider verification material could not be fetched;
    /// the client may retry.
    #[error("identity provider unavailable")]
    VerificationUnavailable,
    /// Role check failed. Uniform across causes to avoid leaking existence.
    #[error("forbidden")]
    Forbidden,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    const fn status_and_body(&self) -> (StatusCode, ErrorBody) {
        match self {
            Self::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "invalid_credentials",
                    message: "Invalid credentials",
                },
            ),
            Self::DuplicateIdentity => (
                StatusCode::CONFLICT,
                ErrorBody {
                    error: "duplicate_identity",
                    message: "Email is already in use",
                },
            ),
            Self::TokenNotFound => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "token_not_found",
                    message: "Refresh token not found, please sign in again",
                },
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "token_expired",
                    message: "Refresh token expired, please sign in again",
                },
            ),
            Self::InvalidExternalToken => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "invalid_identity_token",
                    message: "Identity token rejected",
                },
            ),
            Self::VerificationUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    error: "verification_unavailable",
                    message: "Identity provider unavailable, retry later",
                },
            ),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    error: "forbidden",
                    message: "Forbidden",
                },
            ),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "internal",
                    message: "Internal error",
                },
            ),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            error!("Internal auth failure: {err:#}");
        }
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}
