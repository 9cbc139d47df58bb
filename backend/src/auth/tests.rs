use super::*;
use jsonwebtoken::{EncodingKey, Header, encode};
use std::env;

fn set_env_vars() {
    unsafe {
        env::set_var("PORT", "8080");
        env::set_var("DATABASE_URL", "postgres://localhost:5432/cinema");
        env::set_var("JWT_SECRET", "supersecretjwtsecretforunittesting123");
        env::set_var("JWT_REFRESH_SECRET", "refreshsecretforunittesting123");
        env::set_var("VNPAY_TMN_CODE", "CINEMA01");
        env::set_var("VNPAY_HASH_SECRET", "gatewaysecret");
        env::set_var("VNPAY_URL", "https://sandbox.gateway.example/vpcpay.html");
        env::set_var(
            "VNPAY_RETURN_URL",
            "http://localhost:8080/payments/vnpay-return",
        );
        env::set_var("FRONTEND_URL", "http://localhost:3000");
    }
}

fn token_for(claims: &AccessClaims, secret: &str) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[test]
fn test_validate_access_token_success() {
    set_env_vars();
    let my_claims = AccessClaims {
        sub: "123e4567-e89b-12d3-a456-426614174000".to_string(),
        role: "user".to_string(),
        email: Some("test@example.com".to_string()),
        exp: 9999999999, // far future
    };

    let token = token_for(&my_claims, "supersecretjwtsecretforunittesting123");

    let claims = validate_access_token(&token).expect("Valid token should pass");
    assert_eq!(claims.sub, my_claims.sub);
    assert_eq!(claims.role, "user");
    assert_eq!(claims.email, my_claims.email);
}

#[test]
fn test_validate_access_token_expired() {
    set_env_vars();
    let my_claims = AccessClaims {
        sub: "123e4567-e89b-12d3-a456-426614174000".to_string(),
        role: "user".to_string(),
        email: None,
        exp: 1, // past
    };

    let token = token_for(&my_claims, "supersecretjwtsecretforunittesting123");

    let result = validate_access_token(&token);
    assert!(result.is_err());
}

#[test]
fn test_validate_access_token_invalid_signature() {
    set_env_vars();
    let my_claims = AccessClaims {
        sub: "123e4567-e89b-12d3-a456-426614174000".to_string(),
        role: "admin".to_string(),
        email: None,
        exp: 9999999999,
    };

    let token = token_for(&my_claims, "wrongsecret");

    let result = validate_access_token(&token);
    assert!(result.is_err());
}

#[test]
fn test_role_helpers() {
    let user = AuthUser {
        user_id: Uuid::new_v4(),
        email: None,
        role: ROLE_USER.to_string(),
    };
    let staff = AuthUser {
        role: ROLE_STAFF.to_string(),
        ..user.clone()
    };
    let admin = AuthUser {
        role: ROLE_ADMIN.to_string(),
        ..user.clone()
    };

    assert!(!user.is_staff() && !user.is_admin());
    assert!(staff.is_staff() && !staff.is_admin());
    assert!(admin.is_staff() && admin.is_admin());
}
