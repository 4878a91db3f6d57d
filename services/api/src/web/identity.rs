//! services/api/src/web/identity.rs
//!
//! Classifies each request as a registered user, a guest or nobody, and the
//! middleware that guards every session-scoped route with that classification.
//!
//! Precedence: an `Authorization` header wins and is never second-guessed (a bad
//! one fails the request even if a guest id is also present); then a well-formed
//! `guestId` cookie; then the `X-Guest-ID` header.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use study_assistant_core::domain::{GuestId, Owner};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;
use crate::web::token::TokenIssuer;

pub const GUEST_COOKIE: &str = "guestId";
pub const GUEST_HEADER: &str = "x-guest-id";

/// Who a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Authenticated { user_id: Uuid },
    Guest { guest_id: GuestId },
    Unauthenticated,
}

impl Identity {
    pub fn into_owner(self) -> Option<Owner> {
        match self {
            Identity::Authenticated { user_id } => Some(Owner::User(user_id)),
            Identity::Guest { guest_id } => Some(Owner::Guest(guest_id)),
            Identity::Unauthenticated => None,
        }
    }
}

/// Resolves the identity carried by `headers`. Any `Authorization` header is a
/// credential claim: if it is not a verifiable bearer token the request fails.
pub fn resolve_identity(headers: &HeaderMap, tokens: &TokenIssuer) -> Result<Identity, ApiError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let token = bearer_token(value.to_str().unwrap_or_default())
            .ok_or(ApiError::InvalidCredential)?;
        return match tokens.verify(token) {
            Ok(user_id) => Ok(Identity::Authenticated { user_id }),
            Err(e) => {
                debug!(error = %e, "Bearer token rejected");
                Err(ApiError::InvalidCredential)
            }
        };
    }

    let from_cookie = cookie_value(headers, GUEST_COOKIE).and_then(GuestId::parse);
    let guest = from_cookie.or_else(|| {
        headers
            .get(GUEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(GuestId::parse)
    });

    Ok(match guest {
        Some(guest_id) => Identity::Guest { guest_id },
        None => Identity::Unauthenticated,
    })
}

/// The token of a `Bearer` credential; the scheme is case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then_some(value.trim())
        })
        .filter(|v| !v.is_empty())
}

/// Middleware for the session-scoped routes. On success the resolved [`Owner`]
/// is inserted into the request extensions for the handlers to use.
pub async fn require_identity(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let owner = resolve_identity(req.headers(), &state.tokens)?
        .into_owner()
        .ok_or_else(|| {
            warn!(path = %req.uri().path(), "Request without identity rejected");
            ApiError::Unauthorized("Access denied".to_string())
        })?;

    req.extensions_mut().insert(owner);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Duration;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", Duration::minutes(5))
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn valid_bearer_token_authenticates_the_user() {
        let tokens = issuer();
        let user_id = Uuid::new_v4();
        let bearer = format!("Bearer {}", tokens.issue(user_id).unwrap());
        let identity = resolve_identity(&headers(&[("authorization", bearer.as_str())]), &tokens).unwrap();
        assert_eq!(identity, Identity::Authenticated { user_id });
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let tokens = issuer();
        let user_id = Uuid::new_v4();
        let bearer = format!("bearer {}", tokens.issue(user_id).unwrap());
        let identity = resolve_identity(&headers(&[("authorization", bearer.as_str())]), &tokens).unwrap();
        assert_eq!(identity, Identity::Authenticated { user_id });
    }

    #[test]
    fn bad_bearer_token_fails_even_with_a_guest_id() {
        let tokens = issuer();
        for credential in [
            "Bearer forged.token.value",
            "bearer forged.token.value",
            "BEARER forged.token.value",
            "Bearer ",
            "Bearer",
            "Token abc123",
            "Basic YWRhOnB3",
            "",
        ] {
            let result = resolve_identity(
                &headers(&[("authorization", credential), ("cookie", "guestId=abc123")]),
                &tokens,
            );
            assert!(
                matches!(result, Err(ApiError::InvalidCredential)),
                "{credential:?} fell through to {result:?}"
            );
        }
    }

    #[test]
    fn unusable_guest_cookie_falls_back_to_the_header() {
        let tokens = issuer();
        let identity = resolve_identity(
            &headers(&[("cookie", "guestId=not%20a%20token"), ("x-guest-id", "from-header")]),
            &tokens,
        )
        .unwrap();
        assert_eq!(
            identity,
            Identity::Guest {
                guest_id: GuestId::parse("from-header").unwrap()
            }
        );
    }

    #[test]
    fn guest_cookie_takes_precedence_over_header() {
        let tokens = issuer();
        let identity = resolve_identity(
            &headers(&[
                ("cookie", "theme=dark; guestId=from-cookie"),
                ("x-guest-id", "from-header"),
            ]),
            &tokens,
        )
        .unwrap();
        assert_eq!(
            identity,
            Identity::Guest {
                guest_id: GuestId::parse("from-cookie").unwrap()
            }
        );

        let identity = resolve_identity(&headers(&[("x-guest-id", "from-header")]), &tokens).unwrap();
        assert_eq!(
            identity,
            Identity::Guest {
                guest_id: GuestId::parse("from-header").unwrap()
            }
        );
    }

    #[test]
    fn no_credentials_is_unauthenticated() {
        let tokens = issuer();
        assert_eq!(
            resolve_identity(&HeaderMap::new(), &tokens).unwrap(),
            Identity::Unauthenticated
        );
        assert_eq!(
            resolve_identity(&headers(&[("cookie", "guestId=")]), &tokens).unwrap(),
            Identity::Unauthenticated
        );
        assert_eq!(Identity::Unauthenticated.into_owner(), None);
    }
}
