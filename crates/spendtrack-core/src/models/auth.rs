//! Request and response bodies for the `/api/auth/` endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Login body. The server accepts either a username or an email.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LoginRequest {
    Username { username: String, password: String },
    Email { email: String, password: String },
}

impl LoginRequest {
    pub fn username(username: impl Into<String>, password: impl Into<String>) -> Self {
        LoginRequest::Username {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn email(email: impl Into<String>, password: impl Into<String>) -> Self {
        LoginRequest::Email {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Pick the variant from what the user typed.
    pub fn from_identifier(identifier: &str, password: impl Into<String>) -> Self {
        if identifier.contains('@') {
            Self::email(identifier, password)
        } else {
            Self::username(identifier, password)
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            LoginRequest::Username { username, .. } => username,
            LoginRequest::Email { email, .. } => email,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
}

/// The signed-in user. Fields beyond `username` are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub currency: String,
    pub income_period: String,
    pub income_amount: String,
}

impl SignupRequest {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            first_name: String::new(),
            last_name: String::new(),
            currency: "USD".to_string(),
            income_period: "monthly".to_string(),
            income_amount: "0".to_string(),
        }
    }
}
