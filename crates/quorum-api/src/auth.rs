use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use jsonwebtoken::{EncodingKey, Header, encode};

use quorum_types::api::{LoginRequest, LoginResponse};

use crate::middleware::Claims;
use crate::state::AppState;

const SESSION_HOURS: i64 = 8;

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if !verify_admin_password(&req.password, &state.admin_password) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let token = create_token(&state.jwt_secret).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(LoginResponse { token }))
}

/// Verifies the admin password. The configured value is either an Argon2
/// hash (recommended) or, for dev setups, the plaintext itself.
pub fn verify_admin_password(candidate: &str, configured: &str) -> bool {
    if configured.starts_with("$argon2") {
        let Ok(parsed) = PasswordHash::new(configured) else {
            return false;
        };
        Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok()
    } else {
        candidate == configured
    }
}

fn create_token(secret: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: "admin".to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(SESSION_HOURS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    #[test]
    fn plaintext_password_compares_directly() {
        assert!(verify_admin_password("hunter2", "hunter2"));
        assert!(!verify_admin_password("wrong", "hunter2"));
    }

    #[test]
    fn argon2_hash_is_verified_not_compared() {
        use argon2::PasswordHasher;
        use argon2::password_hash::{SaltString, rand_core::OsRng};

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(b"hunter2", &salt)
            .unwrap()
            .to_string();

        assert!(verify_admin_password("hunter2", &hash));
        assert!(!verify_admin_password("wrong", &hash));
        // a hash never matches itself as a password
        assert!(!verify_admin_password(&hash, &hash));
    }

    #[test]
    fn issued_token_round_trips() {
        let token = create_token("jwt-secret").unwrap();
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"jwt-secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.sub, "admin");
    }
}
