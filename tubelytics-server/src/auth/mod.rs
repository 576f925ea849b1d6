// Copyright 2025 The Tubelytics Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Caller authentication and the admin gate
//!
//! [`auth_middleware`] resolves an [`AuthContext`] with the configured
//! [`Authenticator`] and stores it in the request extensions. [`admin_guard`]
//! then lets a request through only when [`AdminPolicy`] accepts that context.

use axum::{
    extract::Request as AxumRequest,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use url::form_urlencoded;

use crate::api::ErrorCode;

// Type alias for the request type we use
type Request = AxumRequest;

pub const ADMIN_ROLE: &str = "admin";

/// Authentication context attached to each authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Stable caller id (JWT `sub`, API key owner, or "anonymous")
    pub subject: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Authentication error
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication credentials")]
    MissingCredentials,

    #[error("Invalid authentication credentials")]
    InvalidCredentials,

    #[error("JWT token validation failed: {0}")]
    JwtValidation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "AUTH_MISSING",
            AuthError::InvalidCredentials => "AUTH_INVALID",
            AuthError::JwtValidation(_) => "AUTH_TOKEN_INVALID",
            AuthError::Forbidden(_) => "FORBIDDEN",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingCredentials
            | AuthError::InvalidCredentials
            | AuthError::JwtValidation(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
        };

        let code = self.code();
        let mut response = (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response();
        response.extensions_mut().insert(ErrorCode(code));
        response
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

/// Authenticator trait for pluggable auth strategies
pub trait Authenticator: Send + Sync {
    /// Authenticate request by examining headers (synchronous)
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError>;
}

/// Static API keys
pub struct ApiKeyAuth {
    /// API key -> (email, role)
    keys: std::collections::HashMap<String, (String, Option<String>)>,
}

impl ApiKeyAuth {
    /// Entries are `key:email` or `key:email:role`; malformed entries are
    /// skipped with a warning.
    pub fn new(api_keys: Vec<String>) -> Self {
        let mut keys = std::collections::HashMap::new();

        for key_config in api_keys {
            let mut parts = key_config.splitn(3, ':');
            let key = parts.next().unwrap_or_default().trim();
            let email = parts.next().unwrap_or_default().trim();
            let role = parts
                .next()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from);

            if key.is_empty() || email.is_empty() {
                tracing::warn!("Skipping malformed API key entry (expected key:email[:role])");
                continue;
            }
            keys.insert(key.to_string(), (email.to_string(), role));
        }

        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Authenticator for ApiKeyAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let api_key = headers
            .get("X-API-Key")
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::MissingCredentials)?;

        let (email, role) = self.keys.get(api_key).ok_or(AuthError::InvalidCredentials)?;

        Ok(AuthContext {
            subject: email.clone(),
            email: Some(email.clone()),
            role: role.clone(),
        })
    }
}

/// Bearer token (JWT) authenticator
pub struct BearerTokenAuth {
    jwt_secret: Vec<u8>,
}

impl BearerTokenAuth {
    pub fn new(jwt_secret: String) -> Self {
        Self {
            jwt_secret: jwt_secret.into_bytes(),
        }
    }
}

impl Authenticator for BearerTokenAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let auth_header = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::MissingCredentials)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MissingCredentials)?;

        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(&self.jwt_secret),
            &jsonwebtoken::Validation::default(),
        )
        .map_err(|e| AuthError::JwtValidation(e.to_string()))?;

        let claims = token_data.claims;
        Ok(AuthContext {
            subject: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// Multi-strategy authenticator (tries multiple auth methods)
pub struct MultiAuth {
    strategies: Vec<Arc<dyn Authenticator>>,
}

impl MultiAuth {
    pub fn new(strategies: Vec<Arc<dyn Authenticator>>) -> Self {
        Self { strategies }
    }
}

impl Authenticator for MultiAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        for strategy in &self.strategies {
            if let Ok(ctx) = strategy.authenticate(headers) {
                return Ok(ctx);
            }
        }
        Err(AuthError::InvalidCredentials)
    }
}

/// Development authenticator: every request is an anonymous admin
#[derive(Default)]
pub struct NoAuth;

impl NoAuth {
    pub fn new() -> Self {
        Self
    }
}

impl Authenticator for NoAuth {
    fn authenticate(&self, _headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        Ok(AuthContext {
            subject: "anonymous".to_string(),
            email: None,
            role: Some(ADMIN_ROLE.to_string()),
        })
    }
}

/// Who may call the admin endpoints
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    /// Lowercased allowlist
    emails: HashSet<String>,
}

impl AdminPolicy {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// Role `admin`, or an email on the allowlist
    pub fn is_admin(&self, ctx: &AuthContext) -> bool {
        let by_role = ctx
            .role
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case(ADMIN_ROLE));
        let by_email = ctx
            .email
            .as_deref()
            .is_some_and(|e| self.emails.contains(&e.trim().to_lowercase()));
        by_role || by_email
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    auth: Extension<Arc<dyn Authenticator>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    match auth.authenticate(req.headers()) {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            Ok(next.run(req).await)
        }
        Err(primary_err) => {
            if let Some(api_key) = extract_api_key_from_query(req.uri()) {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&api_key) {
                    headers.insert("X-API-Key", value);
                    if let Ok(ctx) = auth.authenticate(&headers) {
                        req.extensions_mut().insert(ctx);
                        return Ok(next.run(req).await);
                    }
                }
            }

            tracing::debug!(error = %primary_err, path = %req.uri().path(), "authentication failed");
            Err(primary_err)
        }
    }
}

/// Admin gate; must run inside [`auth_middleware`]
pub async fn admin_guard(
    policy: Extension<Arc<AdminPolicy>>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let ctx = req
        .extensions()
        .get::<AuthContext>()
        .ok_or(AuthError::MissingCredentials)?;

    if !policy.is_admin(ctx) {
        tracing::warn!(subject = %ctx.subject, "non-admin caller rejected");
        return Err(AuthError::Forbidden("admin access required".to_string()));
    }

    Ok(next.run(req).await)
}

fn extract_api_key_from_query(uri: &axum::http::Uri) -> Option<String> {
    let query = uri.query()?;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        let key = key.to_ascii_lowercase();
        if key == "api_key" || key == "x-api-key" {
            return Some(value.into_owned());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_headers(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key", key.parse().unwrap());
        headers
    }

    fn token(secret: &str, claims: &Claims) -> String {
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            claims,
            &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn expiry() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    #[test]
    fn test_api_key_auth() {
        let auth = ApiKeyAuth::new(vec![
            "k1:ops@example.com:admin".to_string(),
            "k2:viewer@example.com".to_string(),
            "broken".to_string(),
        ]);
        assert_eq!(auth.len(), 2);

        let ctx = auth.authenticate(&key_headers("k1")).unwrap();
        assert_eq!(ctx.email.as_deref(), Some("ops@example.com"));
        assert_eq!(ctx.role.as_deref(), Some("admin"));

        let ctx = auth.authenticate(&key_headers("k2")).unwrap();
        assert_eq!(ctx.role, None);

        assert!(matches!(
            auth.authenticate(&key_headers("nope")),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate(&HeaderMap::new()),
            Err(AuthError::MissingCredentials)
        ));
    }

    #[test]
    fn test_bearer_token_auth() {
        let auth = BearerTokenAuth::new("secret".to_string());
        let claims = Claims {
            sub: "user-1".to_string(),
            email: Some("a@example.com".to_string()),
            role: Some("admin".to_string()),
            exp: expiry(),
        };

        let mut headers = HeaderMap::new();
        let value = format!("Bearer {}", token("secret", &claims));
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        let ctx = auth.authenticate(&headers).unwrap();
        assert_eq!(ctx.subject, "user-1");
        assert_eq!(ctx.email.as_deref(), Some("a@example.com"));

        let value = format!("Bearer {}", token("other", &claims));
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        assert!(matches!(
            auth.authenticate(&headers),
            Err(AuthError::JwtValidation(_))
        ));
    }

    #[test]
    fn test_multi_auth_falls_through() {
        let auth = MultiAuth::new(vec![
            Arc::new(BearerTokenAuth::new("secret".to_string())),
            Arc::new(ApiKeyAuth::new(vec!["k1:ops@example.com".to_string()])),
        ]);
        assert!(auth.authenticate(&key_headers("k1")).is_ok());
        assert!(auth.authenticate(&HeaderMap::new()).is_err());
    }

    #[test]
    fn test_no_auth_is_admin() {
        let ctx = NoAuth::new().authenticate(&HeaderMap::new()).unwrap();
        assert!(AdminPolicy::default().is_admin(&ctx));
    }

    #[test]
    fn test_admin_policy() {
        let policy = AdminPolicy::new([" Ops@Example.com ", ""]);
        let ctx = |email: Option<&str>, role: Option<&str>| AuthContext {
            subject: "s".to_string(),
            email: email.map(String::from),
            role: role.map(String::from),
        };

        assert!(policy.is_admin(&ctx(Some("ops@example.COM"), None)));
        assert!(policy.is_admin(&ctx(None, Some("Admin"))));
        assert!(!policy.is_admin(&ctx(Some("someone@example.com"), Some("user"))));
        assert!(!policy.is_admin(&ctx(None, None)));
    }

    #[test]
    fn test_query_api_key() {
        let uri: axum::http::Uri = "/api/v1/admin/errors.csv?limit=5&api_key=k%3A1".parse().unwrap();
        assert_eq!(extract_api_key_from_query(&uri).as_deref(), Some("k:1"));

        let uri: axum::http::Uri = "/api/v1/admin/errors".parse().unwrap();
        assert_eq!(extract_api_key_from_query(&uri), None);
    }

    #[test]
    fn test_error_response_carries_code() {
        let response = AuthError::Forbidden("admin access required".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.extensions().get::<ErrorCode>(), Some(&ErrorCode("FORBIDDEN")));
    }
}
