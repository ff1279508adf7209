use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::entities::admin::AdminRole;
use crate::error::{AppError, AppResult};
use crate::utils::jwt::{verify_token, Claims, Principal};
use crate::AppState;

/// Extract and validate JWT token from Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let TypedHeader(auth) =
        auth.ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;
    let claims = verify_token(auth.token(), &state.config.jwt_secret)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

fn claims_of(request: &Request) -> AppResult<&Claims> {
    request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::Unauthorized("No authentication found".to_string()))
}

/// Require a staff account
pub async fn require_admin(request: Request, next: Next) -> AppResult<Response> {
    if claims_of(&request)?.principal != Principal::Admin {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }
    Ok(next.run(request).await)
}

/// Require a customer account
pub async fn require_customer(request: Request, next: Next) -> AppResult<Response> {
    if claims_of(&request)?.principal != Principal::Customer {
        return Err(AppError::Forbidden("Customer access required".to_string()));
    }
    Ok(next.run(request).await)
}

/// Destructive reference-data changes are reserved to super admins.
pub fn ensure_super_admin(claims: &Claims) -> AppResult<()> {
    match (claims.principal, claims.admin_role) {
        (Principal::Admin, Some(AdminRole::SuperAdmin)) => Ok(()),
        _ => Err(AppError::Forbidden("Super admin access required".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(principal: Principal, admin_role: Option<AdminRole>) -> Claims {
        Claims {
            sub: 1,
            name: "someone".to_string(),
            principal,
            admin_role,
            exp: 0,
            iat: 0,
        }
    }

    #[test]
    fn test_only_super_admin_passes() {
        assert!(ensure_super_admin(&claims(Principal::Admin, Some(AdminRole::SuperAdmin))).is_ok());
        assert!(ensure_super_admin(&claims(Principal::Admin, Some(AdminRole::Staff))).is_err());
        assert!(ensure_super_admin(&claims(Principal::Customer, None)).is_err());
    }
}
