use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::entities::admin::AdminRole;
use crate::error::{AppError, AppResult};

/// Which account table the token subject refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Principal {
    Customer,
    Admin,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: i32,        // user or admin id
    pub name: String,    // email for customers, username for admins
    pub principal: Principal,
    pub admin_role: Option<AdminRole>,
    pub exp: i64,        // expiration timestamp
    pub iat: i64,        // issued at timestamp
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.principal == Principal::Admin
    }
}

pub fn create_token(
    sub: i32,
    name: &str,
    principal: Principal,
    admin_role: Option<AdminRole>,
    secret: &str,
    expiration_hours: i64,
) -> AppResult<String> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiration_hours);

    let claims = Claims {
        sub,
        name: name.to_string(),
        principal,
        admin_role,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
}

pub fn verify_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip_keeps_principal() {
        let token = create_token(7, "a@b.vn", Principal::Customer, None, "secret", 1).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.principal, Principal::Customer);
        assert!(!claims.is_admin());
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let token = create_token(1, "admin", Principal::Admin, Some(AdminRole::Staff), "a", 1).unwrap();
        assert!(matches!(verify_token(&token, "b"), Err(AppError::Unauthorized(_))));
    }
}
