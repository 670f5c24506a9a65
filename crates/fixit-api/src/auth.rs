use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use fixit_db::{Database, UserInsert};
use fixit_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use fixit_types::models::{Reputation, Role, User};

use crate::comments::CommentThread;
use crate::error::ApiError;
use crate::lifecycle::ReportLifecycle;
use crate::moderation::Moderation;
use crate::services::Services;
use crate::suspension::Suspensions;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub services: Services,
}

impl AppStateInner {
    pub fn lifecycle(&self) -> ReportLifecycle<'_> {
        ReportLifecycle::new(&self.db, &self.services)
    }

    pub fn moderation(&self) -> Moderation<'_> {
        Moderation::new(&self.db, &self.services)
    }

    pub fn comments(&self) -> CommentThread<'_> {
        CommentThread::new(&self.db)
    }

    pub fn suspensions(&self) -> Suspensions<'_> {
        Suspensions::new(&self.db, &self.services)
    }
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))
}

fn validate_credentials(username: &str, password: &str) -> Result<(), ApiError> {
    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::Validation(
            "username must be between 3 and 32 characters".into(),
        ));
    }
    if password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

/// A username is taken if either the active or the suspended store holds it.
fn username_taken(db: &Database, username: &str) -> Result<bool, ApiError> {
    Ok(db.get_user_by_username(username)?.is_some()
        || db.get_suspended_by_username(username)?.is_some())
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    validate_credentials(&username, &req.password)?;

    if username_taken(&state.db, &username)? {
        return Err(ApiError::Conflict("username is already taken".into()));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        username,
        password_hash: hash_password(&req.password)?,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        email: req.email.trim().to_string(),
        barangay: req.barangay.trim().to_string(),
        municipality: req.municipality.trim().to_string(),
        role: Role::Member,
        reputation: Reputation::default(),
        last_login: None,
        created_at: Utc::now(),
    };

    if state.db.try_insert_user(&user)? != UserInsert::Inserted {
        return Err(ApiError::Conflict("username is already taken".into()));
    }
    info!("Registered user {} ({})", user.username, user.id);

    let token = create_token(&state.jwt_secret, &user.id, &user.username, user.role)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim();
    let Some(user) = state.db.get_user_by_username(username)? else {
        if state.db.get_suspended_by_username(username)?.is_some() {
            return Err(ApiError::Forbidden("account is suspended".into()));
        }
        return Err(ApiError::Unauthorized("invalid username or password".into()));
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {}", e)))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized("invalid username or password".into()))?;

    state.db.update_last_login(&user.id, Utc::now())?;

    let token = create_token(&state.jwt_secret, &user.id, &user.username, user.role)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        role: user.role,
        token,
    }))
}

pub fn create_token(secret: &str, user_id: &str, username: &str, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        role,
        exp: (Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Create the bootstrap administrator unless the username already exists.
pub fn seed_admin(db: &Database, username: &str, password: &str) -> Result<bool, ApiError> {
    validate_credentials(username, password)?;
    if username_taken(db, username)? {
        return Ok(false);
    }

    let admin = User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        password_hash: hash_password(password)?,
        first_name: String::new(),
        last_name: String::new(),
        email: String::new(),
        barangay: String::new(),
        municipality: String::new(),
        role: Role::Admin,
        reputation: Reputation::default(),
        last_login: None,
        created_at: Utc::now(),
    };
    let created = db.try_insert_user(&admin)? == UserInsert::Inserted;
    if created {
        info!("Seeded administrator account '{}'", username);
    }
    Ok(created)
}
