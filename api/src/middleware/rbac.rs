use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use common::models::{UserClaims, ROLE_ADMIN, ROLE_MEGAPHONE};

/// RBAC middleware that checks roles by path
#[tracing::instrument(skip(req, next))]
pub async fn rbac_middleware(req: Request, next: Next) -> Result<Response, StatusCode> {
    let claims = req
        .extensions()
        .get::<UserClaims>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let path = req.uri().path();
    if let Some(role) = required_role(req.method(), path) {
        if !claims.has_role(role) {
            tracing::warn!(
                person_id = claims.sub,
                callsign = %claims.callsign,
                required_role = role,
                "Caller lacks required role"
            );
            return Err(StatusCode::FORBIDDEN);
        }
    }

    if let Some(person_id) = person_path_id(path) {
        if person_id != claims.sub && !claims.has_role(ROLE_ADMIN) {
            tracing::warn!(
                person_id = claims.sub,
                target = person_id,
                "Caller may not manage another person's settings"
            );
            return Err(StatusCode::FORBIDDEN);
        }
    }

    tracing::info!(
        person_id = claims.sub,
        callsign = %claims.callsign,
        method = %req.method(),
        path = %path,
        "API operation"
    );

    Ok(next.run(req).await)
}

/// Role needed for a path. Emergency broadcasts need a second role, which
/// the broadcast service checks once it knows the type.
fn required_role(method: &Method, path: &str) -> Option<&'static str> {
    if path.starts_with("/api/broadcast") {
        // The attribute table is readable by anyone signed in
        if method == Method::GET && path == "/api/broadcast/types" {
            return None;
        }
        return Some(ROLE_MEGAPHONE);
    }
    None
}

/// Person id from `/api/person/:id/...`
fn person_path_id(path: &str) -> Option<i64> {
    path.strip_prefix("/api/person/")?
        .split('/')
        .next()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        routing::{get, post},
        Router,
    };
    use tower::ServiceExt;

    fn claims(person_id: i64, roles: &[&str]) -> UserClaims {
        UserClaims {
            sub: person_id,
            callsign: "Hubcap".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            exp: 0,
            iat: 0,
        }
    }

    fn router() -> Router {
        Router::new()
            .route("/api/broadcast/types", get(|| async { "types" }))
            .route("/api/broadcast/transmit", post(|| async { "sent" }))
            .route("/api/person/:id/sms", get(|| async { "numbers" }))
            .layer(axum::middleware::from_fn(rbac_middleware))
    }

    async fn call(claims: Option<UserClaims>, method: Method, uri: &str) -> StatusCode {
        let mut request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        if let Some(claims) = claims {
            request.extensions_mut().insert(claims);
        }
        router().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_transmit_requires_megaphone() {
        let volunteer = claims(7, &["timesheet_management"]);
        assert_eq!(
            call(Some(volunteer.clone()), Method::POST, "/api/broadcast/transmit").await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            call(Some(volunteer), Method::GET, "/api/broadcast/types").await,
            StatusCode::OK
        );
        assert_eq!(
            call(Some(claims(7, &[ROLE_MEGAPHONE])), Method::POST, "/api/broadcast/transmit").await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_missing_claims_unauthorized() {
        assert_eq!(
            call(None, Method::GET, "/api/broadcast/types").await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_person_routes_limited_to_self_or_admin() {
        assert_eq!(
            call(Some(claims(7, &[])), Method::GET, "/api/person/7/sms").await,
            StatusCode::OK
        );
        assert_eq!(
            call(Some(claims(7, &[ROLE_MEGAPHONE])), Method::GET, "/api/person/8/sms").await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            call(Some(claims(1, &[ROLE_ADMIN])), Method::GET, "/api/person/8/sms").await,
            StatusCode::OK
        );
    }

    #[test]
    fn test_required_role() {
        assert_eq!(
            required_role(&Method::POST, "/api/broadcast/transmit"),
            Some(ROLE_MEGAPHONE)
        );
        assert_eq!(required_role(&Method::GET, "/api/broadcast/12"), Some(ROLE_MEGAPHONE));
        assert_eq!(required_role(&Method::GET, "/api/broadcast/types"), None);
        assert_eq!(required_role(&Method::POST, "/api/timesheet/signin"), None);
    }

    #[test]
    fn test_person_path_id() {
        assert_eq!(person_path_id("/api/person/42/sms"), Some(42));
        assert_eq!(person_path_id("/api/person/42"), Some(42));
        assert_eq!(person_path_id("/api/person/abc/sms"), None);
        assert_eq!(person_path_id("/api/broadcast/42"), None);
    }
}
