//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    /// Optional role name; defaults to member when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub user_id: String,
    pub email: String,
    pub full_name: String,
    pub roles: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn register_request_role_is_optional() -> Result<()> {
        let decoded: RegisterRequest = serde_json::from_str(
            r#"{"email":"a@example.com","password":"pw123456","full_name":"A"}"#,
        )?;
        assert_eq!(decoded.role, None);

        let decoded: RegisterRequest = serde_json::from_str(
            r#"{"email":"a@example.com","password":"pw123456","full_name":"A","role":"admin"}"#,
        )?;
        assert_eq!(decoded.role.as_deref(), Some("admin"));
        Ok(())
    }

    #[test]
    fn login_response_round_trips() -> Result<()> {
        let response = LoginResponse {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            token_type: "Bearer".to_string(),
            user_id: "00000000-0000-0000-0000-000000000000".to_string(),
            email: "a@example.com".to_string(),
            full_name: "A".to_string(),
            roles: vec!["member".to_string()],
        };
        let value = serde_json::to_value(&response)?;
        let token_type = value
            .get("token_type")
            .and_then(serde_json::Value::as_str)
            .context("missing token_type")?;
        assert_eq!(token_type, "Bearer");
        let decoded: LoginResponse = serde_json::from_value(value)?;
        assert_eq!(decoded.roles, vec!["member".to_string()]);
        Ok(())
    }
}
