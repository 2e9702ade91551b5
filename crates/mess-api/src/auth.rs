//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with role-based access control.
//!
//! ## Token Kinds
//!
//! ```text
//! Bearer {AUTH_TOKEN}        service token, treated as Admin
//! Bearer {session token}     minted by POST /v1/auth/login
//! ```
//!
//! When `AUTH_TOKEN` is unset, authentication is disabled: requests without
//! a recognised session run as Admin. This is a development mode only.
//!
//! ## CallerIdentity
//!
//! Every request that passes the middleware carries a [`CallerIdentity`] in
//! its extensions. Handlers extract it via the `FromRequestParts` impl.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use mess_core::{NumericId, PrincipalKind};
use mess_ledger::SessionStore;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── Role ────────────────────────────────────────────────────────────────────

/// Roles, ordered by privilege level: `Student < MessStaff < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    MessStaff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::MessStaff => "mess_staff",
            Self::Admin => "admin",
        }
    }
}

impl From<PrincipalKind> for Role {
    fn from(kind: PrincipalKind) -> Self {
        match kind {
            PrincipalKind::Student => Self::Student,
            PrincipalKind::MessStaff => Self::MessStaff,
            PrincipalKind::Admin => Self::Admin,
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    /// The logged-in principal. `None` for the service token and for
    /// auth-disabled mode.
    pub principal: Option<(PrincipalKind, NumericId)>,
    /// Session token the request was authenticated with, for logout.
    pub session_token: Option<String>,
}

impl CallerIdentity {
    /// Full-access identity used for the service token and auth-disabled mode.
    pub fn service() -> Self {
        Self {
            role: Role::Admin,
            principal: None,
            session_token: None,
        }
    }

    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    /// Whether the caller is the principal `(kind, id)`.
    pub fn is_principal(&self, kind: PrincipalKind, id: NumericId) -> bool {
        self.principal == Some((kind, id))
    }

    /// Whether the caller is the student `id`.
    pub fn is_student(&self, id: NumericId) -> bool {
        self.is_principal(PrincipalKind::Student, id)
    }

    /// Label recorded as `lastModifiedBy`.
    pub fn label(&self) -> String {
        match self.principal {
            Some((kind, id)) => format!("{kind}:{id}"),
            None => "service".to_string(),
        }
    }
}

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

/// Allow the student `id` themself, or anyone with at least `minimum`.
pub fn require_student_or(
    caller: &CallerIdentity,
    id: NumericId,
    minimum: Role,
) -> Result<(), AppError> {
    if caller.is_student(id) {
        return Ok(());
    }
    require_role(caller, minimum)
}

/// Allow the principal `(kind, id)` themself, or an admin.
pub fn require_self_or_admin(
    caller: &CallerIdentity,
    kind: PrincipalKind,
    id: NumericId,
) -> Result<(), AppError> {
    if caller.is_principal(kind, id) {
        return Ok(());
    }
    require_role(caller, Role::Admin)
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
    pub sessions: SessionStore,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer tokens.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Resolve a bearer token to an identity.
///
/// The service token is checked first, then live sessions. With auth
/// disabled, an unrecognised token falls back to the service identity.
pub fn resolve_bearer(provided: &str, config: &AuthConfig) -> Result<CallerIdentity, String> {
    if let Some(expected) = &config.token {
        if constant_time_token_eq(provided, expected) {
            return Ok(CallerIdentity::service());
        }
    }
    if let Some(session) = config.sessions.resolve(provided) {
        return Ok(CallerIdentity {
            role: Role::from(session.kind),
            principal: Some((session.kind, session.numeric_id)),
            session_token: Some(session.token),
        });
    }
    if config.token.is_none() {
        return Ok(CallerIdentity::service());
    }
    Err("invalid or expired bearer token".into())
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Extract and validate the Bearer token from the Authorization header and
/// inject the resulting [`CallerIdentity`].
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let Some(config) = request.extensions().get::<AuthConfig>().cloned() else {
        tracing::error!("auth middleware mounted without AuthConfig");
        return AppError::Internal("auth configuration missing".into()).into_response();
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let identity = match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(provided) => resolve_bearer(provided.trim(), &config),
            None if config.token.is_none() => Ok(CallerIdentity::service()),
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                return unauthorized_response("authorization header must use Bearer scheme");
            }
        },
        None if config.token.is_none() => Ok(CallerIdentity::service()),
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            return unauthorized_response("missing authorization header");
        }
    };

    match identity {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(msg) => {
            tracing::warn!(reason = %msg, "authentication failed");
            unauthorized_response(&msg)
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use chrono::Duration;
    use http_body_util::BodyExt;
    use mess_core::SystemClock;
    use tower::ServiceExt;

    fn sessions() -> SessionStore {
        SessionStore::new(Duration::hours(1), Arc::new(SystemClock))
    }

    async fn whoami(caller: CallerIdentity) -> String {
        format!("{}|{}", caller.role.as_str(), caller.label())
    }

    fn test_app(token: Option<&str>, sessions: SessionStore) -> Router {
        let config = AuthConfig {
            token: token.map(str::to_string),
            sessions,
        };
        Router::new()
            .route("/test", get(whoami))
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(config))
    }

    async fn call(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/test");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn role_ordering() {
        assert!(Role::Student < Role::MessStaff);
        assert!(Role::MessStaff < Role::Admin);
        let staff = CallerIdentity {
            role: Role::MessStaff,
            principal: None,
            session_token: None,
        };
        assert!(require_role(&staff, Role::Student).is_ok());
        assert!(matches!(
            require_role(&staff, Role::Admin),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn student_self_access() {
        let me = NumericId::new(101).unwrap();
        let other = NumericId::new(102).unwrap();
        let caller = CallerIdentity {
            role: Role::Student,
            principal: Some((PrincipalKind::Student, me)),
            session_token: None,
        };
        assert!(require_student_or(&caller, me, Role::MessStaff).is_ok());
        assert!(require_student_or(&caller, other, Role::MessStaff).is_err());
        assert!(require_self_or_admin(&caller, PrincipalKind::Student, me).is_ok());
        assert!(require_self_or_admin(&caller, PrincipalKind::MessStaff, me).is_err());
    }

    #[tokio::test]
    async fn service_token_is_admin() {
        let (status, body) =
            call(test_app(Some("secret"), sessions()), Some("Bearer secret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin|service");
    }

    #[tokio::test]
    async fn session_token_resolves_principal() {
        let store = sessions();
        let session = store.issue(PrincipalKind::Student, NumericId::new(101).unwrap());
        let header = format!("Bearer {}", session.token);
        let (status, body) = call(test_app(Some("secret"), store), Some(&header)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "student|student:101");
    }

    #[tokio::test]
    async fn missing_header_rejected() {
        let (status, body) = call(test_app(Some("secret"), sessions()), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let err: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(err["error"]["code"], "UNAUTHORIZED");
        assert!(err["error"]["message"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn wrong_token_rejected() {
        let (status, _) = call(test_app(Some("secret"), sessions()), Some("Bearer nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let (status, body) =
            call(test_app(Some("secret"), sessions()), Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn revoked_session_rejected() {
        let store = sessions();
        let session = store.issue(PrincipalKind::MessStaff, NumericId::new(7).unwrap());
        store.revoke(&session.token);
        let header = format!("Bearer {}", session.token);
        let (status, _) = call(test_app(Some("secret"), store), Some(&header)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_disabled_runs_as_admin_but_honours_sessions() {
        let store = sessions();
        let session = store.issue(PrincipalKind::MessStaff, NumericId::new(7).unwrap());
        let (status, body) = call(test_app(None, store.clone()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin|service");

        let header = format!("Bearer {}", session.token);
        let (_, body) = call(test_app(None, store), Some(&header)).await;
        assert_eq!(body, "mess_staff|mess_staff:7");
    }

    #[test]
    fn debug_redacts_token() {
        let config = AuthConfig {
            token: Some("super-secret".into()),
            sessions: sessions(),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
