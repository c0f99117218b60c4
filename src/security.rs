use crate::envelope::{self, ServiceError};
use axum::{
    body::Body,
    extract::State,
    http::{self, Request},
    middleware::Next,
    response::Response,
};
use std::{collections::HashMap, convert::Infallible, env, sync::Arc};
use tracing::{info, warn};

const DEFAULT_KEYS: &str =
    "viennehaha:seller:demo-key,minhtran:seller:pending-key,linhbuyer:buyer:buyer-key";

#[derive(Clone)]
pub struct AuthState {
    records: Arc<HashMap<String, UserRecord>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Buyer,
    Seller,
}

/// Identity established for the request, inserted as an extension.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub username: String,
    pub role: Role,
}

#[derive(Clone)]
struct UserRecord {
    username: String,
    role: Role,
}

impl AuthState {
    pub fn from_env() -> Self {
        let raw = env::var("MARKET_API_KEYS").unwrap_or_else(|_| DEFAULT_KEYS.to_string());
        Self::from_records(&raw)
    }

    /// Build from a `username:role:key,...` listing.
    pub fn from_records(raw: &str) -> Self {
        let mut records = HashMap::new();
        for token in raw.split(',') {
            let trimmed = token.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut parts = trimmed.splitn(3, ':');
            let username = parts.next().map(str::trim).filter(|s| !s.is_empty());
            let role = parts.next().and_then(parse_role);
            let key = parts.next().map(str::trim).filter(|s| !s.is_empty());
            match (username, role, key) {
                (Some(username), Some(role), Some(key)) => {
                    records.insert(
                        key.to_string(),
                        UserRecord {
                            username: username.to_string(),
                            role,
                        },
                    );
                }
                _ => warn!(
                    target = "market.api",
                    "ignored malformed MARKET_API_KEYS entry: {trimmed}"
                ),
            }
        }

        if records.is_empty() {
            warn!(
                target = "market.api",
                "MARKET_API_KEYS produced no keys; falling back to demo credentials"
            );
            return Self::from_records(DEFAULT_KEYS);
        }
        info!(
            target = "market.api",
            key_count = records.len(),
            "loaded API keys"
        );
        Self {
            records: Arc::new(records),
        }
    }

    fn authenticate(&self, presented: &str) -> Option<AuthContext> {
        self.records.get(presented).map(|record| AuthContext {
            username: record.username.clone(),
            role: record.role,
        })
    }
}

/// Reject requests whose caller identity cannot be established. Rejections
/// use the same envelope shape as every endpoint response.
pub async fn require_api_auth(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    let Some(presented) = extract_api_key(request.headers()) else {
        return Ok(envelope::unauthenticated(
            "Provide X-Market-Key or Bearer token",
        ));
    };
    let Some(context) = state.authenticate(&presented) else {
        return Ok(envelope::unauthenticated("API key not recognized"));
    };
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Seller-only endpoints reject other roles with a 403.
pub fn require_seller(context: &AuthContext) -> Result<(), ServiceError> {
    if context.role == Role::Seller {
        Ok(())
    } else {
        Err(ServiceError::forbidden("Seller role required"))
    }
}

fn extract_api_key(headers: &http::HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION)
        && let Ok(raw) = value.to_str()
        && raw.len() >= 7
        && raw[..6].eq_ignore_ascii_case("bearer")
    {
        return Some(raw[6..].trim().to_string());
    }
    headers
        .get("X-Market-Key")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_role(raw: &str) -> Option<Role> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "seller" => Some(Role::Seller),
        "buyer" => Some(Role::Buyer),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};
    use crate::envelope::FailureKind;

    #[test]
    fn bearer_token_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer demo-key"),
        );
        headers.insert("X-Market-Key", HeaderValue::from_static("other-key"));
        assert_eq!(extract_api_key(&headers).as_deref(), Some("demo-key"));
    }

    #[test]
    fn market_key_header_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Market-Key", HeaderValue::from_static(" demo-key "));
        assert_eq!(extract_api_key(&headers).as_deref(), Some("demo-key"));
    }

    #[test]
    fn missing_credentials_yield_none() {
        assert_eq!(extract_api_key(&HeaderMap::new()), None);
    }

    #[test]
    fn records_parse_roles_and_skip_malformed_entries() {
        let state = AuthState::from_records("alice:seller:key-a, broken,bob:buyer:key-b");
        let alice = state.authenticate("key-a").expect("alice");
        assert_eq!(alice.username, "alice");
        assert_eq!(alice.role, Role::Seller);
        let bob = state.authenticate("key-b").expect("bob");
        assert_eq!(bob.role, Role::Buyer);
        assert!(state.authenticate("broken").is_none());
    }

    #[test]
    fn empty_records_fall_back_to_demo_keys() {
        let state = AuthState::from_records("   ");
        assert!(state.authenticate("demo-key").is_some());
    }

    #[test]
    fn buyer_role_is_not_a_seller() {
        let context = AuthContext {
            username: "linhbuyer".to_string(),
            role: Role::Buyer,
        };
        let err = require_seller(&context).expect_err("should fail");
        assert_eq!(err.kind(), FailureKind::Forbidden);
        assert_eq!(err.detail(), "Seller role required");
    }
}
