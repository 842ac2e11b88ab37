//! API client for communicating with the Stock Image service.
//!
//! This module provides the `ApiClient` struct for the account
//! endpoints (register, login, request-reset, reset-password) and the
//! contributor roster fetch.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::models::User;

use super::ApiError;

/// HTTP request timeout in seconds.
/// 30s allows for slow responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Successful register/login payload: a token plus the identity fields.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
}

impl AuthResponse {
    /// Split the payload into the token and the identity record.
    pub fn into_parts(self) -> (String, User) {
        (
            self.token,
            User {
                id: self.id,
                name: self.name,
                email: self.email,
            },
        )
    }
}

/// API client for the Stock Image service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client against the given base URL
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: None,
        })
    }

    /// Set the bearer token for subsequent requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Drop the bearer token (after logout)
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Bearer token headers when a session token is present. Applied to
    /// every request regardless of endpoint.
    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .await
            .with_context(|| format!("Failed to send GET request to {}", url))?;

        let response = Self::check_response(response).await?;

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send POST request to {}", url))?;

        let response = Self::check_response(response).await?;

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    /// POST where success is the status code alone; any payload is dropped.
    async fn post_unit<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send POST request to {}", url))?;

        Self::check_response(response).await?;
        Ok(())
    }

    // ===== Account Endpoints =====

    /// Create an account and sign in with it
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthResponse> {
        debug!(email, "Registering account");
        self.post(
            "/register",
            &json!({ "name": name, "email": email, "password": password }),
        )
        .await
    }

    /// Exchange credentials for a session token and identity
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        debug!(email, "Logging in");
        self.post("/login", &json!({ "email": email, "password": password }))
            .await
    }

    /// Ask the server to send a reset passcode to an address
    pub async fn request_reset(&self, email: &str) -> Result<()> {
        debug!(email, "Requesting password reset");
        self.post_unit("/request-reset", &json!({ "email": email }))
            .await
    }

    /// Redeem a passcode for a new password
    pub async fn reset_password(&self, email: &str, otp: &str, new_password: &str) -> Result<()> {
        debug!(email, "Submitting password reset");
        self.post_unit(
            "/reset-password",
            &json!({ "email": email, "otp": otp, "newPassword": new_password }),
        )
        .await
    }

    // ===== Roster =====

    /// Fetch the contributor roster for the dashboard
    pub async fn fetch_users(&self) -> Result<Vec<User>> {
        self.get("/users").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auth_response() {
        let json = r#"{"token": "jwt-abc", "_id": "66b1f0c2a4", "name": "Ada Lovelace", "email": "ada@example.com"}"#;
        let auth: AuthResponse =
            serde_json::from_str(json).expect("Failed to parse auth test JSON");

        let (token, user) = auth.into_parts();
        assert_eq!(token, "jwt-abc");
        assert_eq!(user.id, "66b1f0c2a4");
        assert_eq!(user.name, "Ada Lovelace");
        assert_eq!(user.email, "ada@example.com");
    }

    #[test]
    fn test_parse_users_response() {
        let json = r#"[
            {"_id": "1", "name": "Ada", "email": "ada@example.com"},
            {"_id": "2", "name": "Grace", "email": "grace@example.com"}
        ]"#;
        let users: Vec<User> =
            serde_json::from_str(json).expect("Failed to parse users test JSON");
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].name, "Grace");
    }

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("http://localhost:5000/").unwrap();
        assert_eq!(client.url("/users"), "http://localhost:5000/users");

        let client = ApiClient::new("http://localhost:5000").unwrap();
        assert_eq!(client.url("/login"), "http://localhost:5000/login");
    }
}
