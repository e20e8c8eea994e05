//! Pre-shared token authentication.
//!
//! Clients present `Authorization-Flame: Bearer <token>`. With no token
//! configured every caller is authenticated. Handlers receive a [`Caller`]
//! and decide for themselves: reads narrow to public rows, writes reject.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};

use super::api::{ApiError, SharedState};
use super::db::Visibility;

pub const AUTH_HEADER: &str = "authorization-flame";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub authenticated: bool,
}

impl Caller {
    pub fn visibility(&self) -> Visibility {
        if self.authenticated {
            Visibility::ALL
        } else {
            Visibility::PUBLIC
        }
    }

    pub fn require(&self) -> Result<(), ApiError> {
        if self.authenticated {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

/// Compare digests so the comparison does not depend on where the inputs differ.
fn token_matches(expected: &str, presented: &str) -> bool {
    Sha256::digest(expected.as_bytes()) == Sha256::digest(presented.as_bytes())
}

pub fn authenticate(headers: &HeaderMap, token: Option<&str>) -> Caller {
    let Some(expected) = token else {
        return Caller {
            authenticated: true,
        };
    };
    let presented = headers
        .get(AUTH_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);
    let authenticated = presented.is_some_and(|p| token_matches(expected, p));
    if presented.is_some() && !authenticated {
        tracing::warn!("rejected API token");
    }
    Caller { authenticated }
}

impl FromRequestParts<SharedState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        Ok(authenticate(&parts.headers, state.auth_token.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTH_HEADER, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn test_no_token_configured_admits_everyone() {
        assert!(authenticate(&HeaderMap::new(), None).authenticated);
    }

    #[test]
    fn test_bearer_token_must_match() {
        let token = Some("s3cret");
        assert!(authenticate(&headers("Bearer s3cret"), token).authenticated);
        assert!(!authenticate(&headers("Bearer nope"), token).authenticated);
        assert!(!authenticate(&headers("s3cret"), token).authenticated);
        assert!(!authenticate(&HeaderMap::new(), token).authenticated);
    }

    #[test]
    fn test_unauthenticated_caller_sees_public_only() {
        let caller = Caller {
            authenticated: false,
        };
        assert_eq!(caller.visibility(), Visibility::PUBLIC);
        assert!(matches!(caller.require(), Err(ApiError::Unauthorized)));
    }
}
