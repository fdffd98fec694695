//! Bearer token authentication middleware.
//!
//! When `AUTH_REQUIRED` is off every request passes. Otherwise the request
//! needs `Authorization: Bearer <jwt>`, or a `token` query parameter signed
//! for the resource named by the last path segment (download links).

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};

pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

fn query_token(req: &Request<axum::body::Body>) -> Option<&str> {
    req.uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|t| !t.is_empty())
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    if !ctx.settings.auth_required {
        return Ok(next.run(req).await);
    }

    let bearer = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let subject = match bearer {
        Some(token) => ctx.signer.decode_token(&token)?.sub,
        None => {
            let resource = req.uri().path().rsplit('/').next().unwrap_or_default();
            match query_token(&req) {
                Some(token) if ctx.signer.verify_signed_url_token(token, resource) => {
                    format!("resource:{resource}")
                }
                _ => return Err(ApiError::Unauthorized),
            }
        }
    };

    tracing::debug!(subject, "Request authenticated");
    req.extensions_mut().insert(AuthContext { subject });
    Ok(next.run(req).await)
}
