use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use fixit_types::api::Claims;
use fixit_types::identity::canonical_id_str;
use fixit_types::models::Role;

use crate::auth::AppState;
use crate::error::ApiError;

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("administrator role required".into()))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("missing credentials".into()))
    }
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized("invalid or expired token".into()))
}

/// Validate the bearer token and attach the caller's [`Principal`].
///
/// The role comes from the active user record, not the token, so demotions
/// and suspensions take effect immediately.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

    let claims = decode_token(&state.jwt_secret, token)?;

    let Some(user) = state.db.get_user_by_id(&claims.sub)? else {
        if state.db.get_suspended_by_original_id(&claims.sub)?.is_some() {
            return Err(ApiError::Forbidden("account is suspended".into()));
        }
        return Err(ApiError::Unauthorized("unknown account".into()));
    };

    req.extensions_mut().insert(Principal {
        id: user.id,
        role: user.role,
    });
    Ok(next.run(req).await)
}

/// Canonical form of an id taken from a request path or body. Ids that
/// cannot be normalized can never match a stored record.
pub fn canonical_key(raw: &str, what: &str) -> Result<String, ApiError> {
    canonical_id_str(raw).ok_or_else(|| ApiError::not_found(what))
}
