use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::{Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Header carrying the shared access key.
pub const ACCESS_KEY_HEADER: &str = "x-api-key";
/// Query parameter accepted in place of the header on socket handshakes,
/// where browser clients cannot set custom headers before the upgrade.
pub const ACCESS_KEY_QUERY: &str = "access_token";

const API_PREFIX: &str = "/api";
const HUB_PREFIX: &str = "/hubs";

/// Paths reachable without any credential (token issuance lives here).
const PUBLIC_PATHS: &[&str] = &["/api/auth/login", "/api/auth/register"];

/// Seconds of clock skew tolerated when validating bearer expiry.
const BEARER_LEEWAY_SECS: u64 = 60;

/// Bearer token claims. Issuer, audience and expiry are enforced by the
/// jsonwebtoken validation; the subject is opaque to this service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Option<String>,
    pub iss: String,
    pub aud: String,
    pub exp: u64,
}

/// Outcome of a single authenticator in the chain.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Allow,
    Deny(StatusCode, &'static str),
    Abstain,
}

/// Gate middleware. Runs before every handler; a denial is terminal for
/// the request or handshake.
pub async fn gate(
    State(config): State<Arc<Config>>,
    req: Request,
    next: Next,
) -> Response {
    match decide(&config, &req) {
        Verdict::Allow => next.run(req).await,
        Verdict::Deny(status, reason) => {
            tracing::warn!(path = %req.uri().path(), %status, reason, "gate denied request");
            (status, reason).into_response()
        }
        // The chain always terminates in allow or deny for known paths;
        // treat a full abstain as a credential failure.
        Verdict::Abstain => (StatusCode::UNAUTHORIZED, "unauthorized").into_response(),
    }
}

/// The ordered authenticator chain; the first non-abstain verdict wins.
fn decide(config: &Config, req: &Request) -> Verdict {
    let checks: &[fn(&Config, &Request) -> Verdict] = &[
        allow_preflight,
        allow_bearer,
        allow_public,
        allow_unprotected,
        require_key_configured,
        check_hub_key,
        check_api_key,
    ];

    for check in checks {
        match check(config, req) {
            Verdict::Abstain => continue,
            verdict => return verdict,
        }
    }
    Verdict::Abstain
}

fn allow_preflight(_config: &Config, req: &Request) -> Verdict {
    if req.method() == Method::OPTIONS {
        Verdict::Allow
    } else {
        Verdict::Abstain
    }
}

/// A valid bearer identity supersedes the shared-secret scheme entirely.
/// Anything short of a fully valid token abstains so the caller can still
/// present the shared key.
fn allow_bearer(config: &Config, req: &Request) -> Verdict {
    let Some(secret) = config.jwt_secret.as_deref() else {
        return Verdict::Abstain;
    };
    let Some(token) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return Verdict::Abstain;
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.jwt_issuer]);
    validation.set_audience(&[&config.jwt_audience]);
    validation.leeway = BEARER_LEEWAY_SECS;

    let key = DecodingKey::from_secret(secret.as_bytes());
    match jsonwebtoken::decode::<Claims>(token, &key, &validation) {
        Ok(_) => Verdict::Allow,
        Err(err) => {
            tracing::debug!(error = %err, "bearer token rejected, falling through");
            Verdict::Abstain
        }
    }
}

fn allow_public(_config: &Config, req: &Request) -> Verdict {
    if PUBLIC_PATHS.contains(&req.uri().path()) {
        Verdict::Allow
    } else {
        Verdict::Abstain
    }
}

fn allow_unprotected(_config: &Config, req: &Request) -> Verdict {
    let path = req.uri().path();
    if has_prefix(path, API_PREFIX) || has_prefix(path, HUB_PREFIX) {
        Verdict::Abstain
    } else {
        Verdict::Allow
    }
}

/// An unset server-side key is an operator error, not a caller error.
fn require_key_configured(config: &Config, _req: &Request) -> Verdict {
    if config.chat_access_key.is_none() {
        Verdict::Deny(
            StatusCode::INTERNAL_SERVER_ERROR,
            "chat access key is not configured on the server",
        )
    } else {
        Verdict::Abstain
    }
}

/// Socket handshakes accept the key from either the header or the query
/// string.
fn check_hub_key(config: &Config, req: &Request) -> Verdict {
    if !has_prefix(req.uri().path(), HUB_PREFIX) {
        return Verdict::Abstain;
    }
    let expected = config.chat_access_key.as_deref().unwrap_or_default();
    if header_key(req) == Some(expected) || query_key(req).as_deref() == Some(expected) {
        Verdict::Allow
    } else {
        Verdict::Deny(StatusCode::UNAUTHORIZED, "invalid or missing access key")
    }
}

/// Plain REST calls accept the header form only.
fn check_api_key(config: &Config, req: &Request) -> Verdict {
    if !has_prefix(req.uri().path(), API_PREFIX) {
        return Verdict::Abstain;
    }
    let expected = config.chat_access_key.as_deref().unwrap_or_default();
    if header_key(req) == Some(expected) {
        Verdict::Allow
    } else {
        Verdict::Deny(StatusCode::UNAUTHORIZED, "invalid or missing access key")
    }
}

fn has_prefix(path: &str, prefix: &str) -> bool {
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

fn header_key<'a>(req: &'a Request) -> Option<&'a str> {
    req.headers().get(ACCESS_KEY_HEADER)?.to_str().ok()
}

#[derive(Deserialize)]
struct KeyQuery {
    access_token: Option<String>,
}

fn query_key(req: &Request) -> Option<String> {
    Query::<KeyQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|q| q.0.access_token)
}
