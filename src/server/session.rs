//! Session token extraction from requests.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};

use crate::chat::core::errors::ChatError;
use crate::chat::engine::core::RequestContext;
use crate::server::error::ApiError;
use crate::server::state::AppState;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "vocalis_session";

/// Authenticated caller, resolved from a bearer token or the session cookie.
#[derive(Clone, Debug)]
pub struct Session(pub RequestContext);

impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(ChatError::AuthenticationRequired)?;
        let ctx = state.accounts.authenticate(&token).await?;
        Ok(Self(ctx))
    }
}

/// Token from `Authorization: Bearer` or the session cookie.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value that stores a session token.
#[must_use]
pub fn session_cookie(token: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax"
    ))
    .ok()
}

/// `Set-Cookie` value that clears the session cookie.
#[must_use]
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("vocalis_session=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        headers.insert(COOKIE, HeaderValue::from_static("vocalis_session=other"));
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn cookie_is_parsed_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; vocalis_session=tok42; lang=en"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("tok42"));
    }

    #[test]
    fn missing_or_empty_tokens_are_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        headers.insert(COOKIE, HeaderValue::from_static("vocalis_session="));
        assert_eq!(session_token(&headers), None);
    }

    #[test]
    fn cookie_value_round_trips() {
        let cookie = session_cookie("deadbeef").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, cookie);
        // Attributes after the token are ignored by the parser.
        assert_eq!(session_token(&headers).as_deref(), Some("deadbeef"));
    }
}
