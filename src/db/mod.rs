use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    QueryFilter, Set,
};

use crate::config::Config;
use crate::entities::admin::{self, AdminRole};
use crate::error::{AppError, AppResult};

pub async fn connect(config: &Config) -> AppResult<DatabaseConnection> {
    let mut options = ConnectOptions::new(config.database_url.clone());
    options.sqlx_logging(false);

    Database::connect(options)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to connect to database: {}", e)))
}

/// Create the super admin from configuration if no admin with that username exists.
pub async fn seed_admin(db: &DatabaseConnection, config: &Config) -> AppResult<()> {
    let existing = admin::Entity::find()
        .filter(admin::Column::Username.eq(&config.admin_username))
        .one(db)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(config.admin_password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash admin password: {}", e)))?
        .to_string();

    admin::ActiveModel {
        username: Set(config.admin_username.clone()),
        password_hash: Set(password_hash),
        full_name: Set("Administrator".to_string()),
        role: Set(AdminRole::SuperAdmin),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!(username = %config.admin_username, "Admin account created");
    Ok(())
}
