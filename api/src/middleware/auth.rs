use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::Response,
};
use common::auth::bearer_token;

use crate::state::AppState;

/// Authentication middleware that validates bearer JWTs
#[tracing::instrument(skip(state, req, next))]
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| {
            tracing::warn!("Missing or malformed authorization header");
            StatusCode::UNAUTHORIZED
        })?;

    let claims = state
        .jwt
        .decode_token(token)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    // Handlers read the claims back out of the extensions
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
