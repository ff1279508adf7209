use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, Extension, Json};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};

use crate::entities::admin::{self, AdminRole};
use crate::entities::user;
use crate::error::{AppError, AppResult};
use crate::response::{created, ok, CreatedResponse, JsonResponse};
use crate::utils::jwt::{create_token, Claims, Principal};
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i32,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
}

impl From<user::Model> for UserInfo {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            email: u.email,
            full_name: u.full_name,
            phone: u.phone,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminInfo {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub role: AdminRole,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminAuthResponse {
    pub token: String,
    pub admin: AdminInfo,
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

fn verify_password(password: &str, hash: &str, failure: &str) -> AppResult<()> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Failed to parse password hash: {}", e)))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized(failure.to_string()))
}

/// Register a new customer account
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<CreatedResponse<AuthResponse>> {
    let email = payload.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if payload.full_name.trim().is_empty() {
        return Err(AppError::BadRequest("Full name is required".to_string()));
    }

    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(&state.db)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let new_user = user::ActiveModel {
        email: Set(email),
        password_hash: Set(hash_password(&payload.password)?),
        full_name: Set(payload.full_name.trim().to_string()),
        phone: Set(payload.phone),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    };

    let user = new_user.insert(&state.db).await?;

    let token = create_token(
        user.id,
        &user.email,
        Principal::Customer,
        None,
        &state.config.jwt_secret,
        state.config.jwt_expiration_hours,
    )?;

    tracing::info!(user_id = user.id, "Customer registered");

    Ok(created(
        "Registration successful",
        AuthResponse {
            token,
            user: user.into(),
        },
    ))
}

/// Login with email and password
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<JsonResponse<AuthResponse>> {
    let user = user::Entity::find()
        .filter(user::Column::Email.eq(payload.email.trim().to_lowercase()))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    verify_password(&payload.password, &user.password_hash, "Invalid email or password")?;

    let token = create_token(
        user.id,
        &user.email,
        Principal::Customer,
        None,
        &state.config.jwt_secret,
        state.config.jwt_expiration_hours,
    )?;

    Ok(ok(
        "Login successful",
        AuthResponse {
            token,
            user: user.into(),
        },
    ))
}

/// Login for staff accounts
pub async fn admin_login(
    State(state): State<AppState>,
    Json(payload): Json<AdminLoginRequest>,
) -> AppResult<JsonResponse<AdminAuthResponse>> {
    let account = admin::Entity::find()
        .filter(admin::Column::Username.eq(payload.username.trim()))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid username or password".to_string()))?;

    verify_password(&payload.password, &account.password_hash, "Invalid username or password")?;

    let token = create_token(
        account.id,
        &account.username,
        Principal::Admin,
        Some(account.role),
        &state.config.jwt_secret,
        state.config.jwt_expiration_hours,
    )?;

    tracing::info!(admin_id = account.id, "Admin logged in");

    Ok(ok(
        "Login successful",
        AdminAuthResponse {
            token,
            admin: AdminInfo {
                id: account.id,
                username: account.username,
                full_name: account.full_name,
                role: account.role,
            },
        },
    ))
}

/// Current customer's profile
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<JsonResponse<UserInfo>> {
    let user = user::Entity::find_by_id(claims.sub)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(ok("Profile retrieved", user.into()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<JsonResponse<UserInfo>> {
    let existing = user::Entity::find_by_id(claims.sub)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let mut active: user::ActiveModel = existing.into();
    if let Some(name) = payload.full_name {
        if name.trim().is_empty() {
            return Err(AppError::BadRequest("Full name cannot be empty".to_string()));
        }
        active.full_name = Set(name.trim().to_string());
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(Some(phone).filter(|p| !p.trim().is_empty()));
    }

    let updated = active.update(&state.db).await?;
    Ok(ok("Profile updated", updated.into()))
}
