//! Per-client rate limiting middleware.
//!
//! Sliding one-minute window keyed by the verified subject of the bearer
//! token. Callers without a valid token are keyed by peer address, so an
//! unverifiable `Authorization` header never buys a fresh bucket.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::auth::TokenSigner;

/// Tracked clients above which idle windows are dropped.
const PRUNE_THRESHOLD: usize = 1024;

/// Extract a rate-limit key from the request.
fn rate_key(req: &Request<axum::body::Body>, signer: &TokenSigner) -> String {
    let subject = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| signer.decode_token(token).ok())
        .map(|claims| claims.sub);
    if let Some(subject) = subject {
        return format!("sub:{subject}");
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Returns 429 with `Retry-After` when the client is over its limit.
/// Accesses `ApiContext` from request extensions.
pub async fn limit(req: Request<axum::body::Body>, next: Next) -> Response {
    match limit_inner(req, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn limit_inner(req: Request<axum::body::Body>, next: Next) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let key = rate_key(&req, &ctx.signer);

    // MutexGuard is !Send, must drop before .await
    {
        let mut limiter = ctx
            .rate_limiter
            .lock()
            .map_err(|_| ApiError::Internal("rate limiter lock".into()))?;

        if limiter.tracked_clients() > PRUNE_THRESHOLD {
            limiter.prune();
        }
        limiter.check(&key).map_err(|retry_after| {
            tracing::warn!(client = %key, retry_after, "Rate limit exceeded");
            ApiError::RateLimited { retry_after }
        })?;
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn signer() -> TokenSigner {
        TokenSigner::new("rate-limit-test-secret-with-enough-length")
    }

    fn bearer(token: &str, peer: [u8; 4]) -> Request<Body> {
        let mut req = Request::builder()
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 5555))));
        req
    }

    #[test]
    fn distinct_subjects_get_distinct_buckets() {
        let signer = signer();
        let alice = signer.create_token("alice", 3600).unwrap();
        let bob = signer.create_token("bob", 3600).unwrap();

        let alice_key = rate_key(&bearer(&alice, [10, 0, 0, 1]), &signer);
        let bob_key = rate_key(&bearer(&bob, [10, 0, 0, 1]), &signer);
        assert_eq!(alice_key, "sub:alice");
        assert_eq!(bob_key, "sub:bob");
    }

    #[test]
    fn same_subject_shares_bucket_across_addresses() {
        let signer = signer();
        let token = signer.create_token("alice", 3600).unwrap();
        assert_eq!(
            rate_key(&bearer(&token, [10, 0, 0, 1]), &signer),
            rate_key(&bearer(&token, [10, 0, 0, 2]), &signer),
        );
    }

    #[test]
    fn unverifiable_bearer_falls_back_to_peer_address() {
        let signer = signer();
        let forged = TokenSigner::new("some-other-secret-entirely-unknown")
            .create_token("alice", 3600)
            .unwrap();

        assert_eq!(rate_key(&bearer("random-junk", [10, 0, 0, 7]), &signer), "ip:10.0.0.7");
        assert_eq!(rate_key(&bearer(&forged, [10, 0, 0, 7]), &signer), "ip:10.0.0.7");
    }

    #[test]
    fn key_falls_back_to_peer_address() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 5555))));
        assert_eq!(rate_key(&req, &signer()), "ip:10.0.0.7");
    }

    #[test]
    fn key_anonymous_without_connect_info() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(rate_key(&req, &signer()), "anonymous");
    }
}
