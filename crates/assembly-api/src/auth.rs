use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use assembly_db::{Database, is_constraint_violation};
use assembly_types::api::{AuthResponse, Claims, DataResponse, LoginRequest, RegisterRequest};
use assembly_types::models::{Profile, Role};

use crate::blocking;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::validation;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub auth: AuthSettings,
}

pub struct AuthSettings {
    pub jwt_secret: String,
    /// Lowercased. Registering with one of these creates a verified admin.
    pub admin_emails: Vec<String>,
    pub token_ttl_days: i64,
}

impl AuthSettings {
    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|e| e.eq_ignore_ascii_case(email))
    }
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validation::email(&req.email)?;
    let name = validation::text("name", &req.name, 1, 64)?;
    if req.password.chars().count() < 8 {
        return Err(ApiError::validation("password must be at least 8 characters"));
    }

    let (role, verified) = if state.auth.is_admin_email(&email) {
        (Role::Admin, true)
    } else {
        (Role::Representative, false)
    };

    let profile = blocking(&state, move |state| {
        if state.db.get_profile_by_email(&email)?.is_some() {
            return Err(ApiError::conflict("email is already registered"));
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|_| ApiError::internal("failed to hash password"))?
            .to_string();

        state
            .db
            .create_profile(Uuid::new_v4(), &email, &name, &password_hash, role, verified)
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    ApiError::conflict("email is already registered")
                } else {
                    e.into()
                }
            })
    })
    .await?;

    let token = create_token(&state.auth, &profile)
        .map_err(|_| ApiError::internal("failed to issue token"))?;

    info!("Registered {} as {}", profile.email, profile.role);
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: AuthResponse { token, profile },
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();

    let profile = blocking(&state, move |state| {
        let row = state
            .db
            .get_profile_by_email(&email)?
            .ok_or_else(|| ApiError::unauthorized("invalid email or password"))?;

        // Verify password
        let parsed_hash = PasswordHash::new(&row.password_hash)
            .map_err(|_| ApiError::internal("stored password hash is malformed"))?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::unauthorized("invalid email or password"))?;

        state.db.touch_last_active(row.profile.id)?;
        Ok(row.profile)
    })
    .await?;

    let token = create_token(&state.auth, &profile)
        .map_err(|_| ApiError::internal("failed to issue token"))?;

    Ok(Json(DataResponse {
        data: AuthResponse { token, profile },
    }))
}

pub fn create_token(settings: &AuthSettings, profile: &Profile) -> anyhow::Result<String> {
    let claims = Claims {
        sub: profile.id,
        email: profile.email.clone(),
        role: profile.role,
        exp: (chrono::Utc::now() + chrono::Duration::days(settings.token_ttl_days)).timestamp()
            as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
    )?;

    Ok(token)
}
