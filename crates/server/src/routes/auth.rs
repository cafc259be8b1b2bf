use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    config::Config,
    db::{
        models::{Role, User},
        queries,
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    AppState,
};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn create_token(user_id: &str, role: Role, config: &Config) -> Result<String> {
    let now = Utc::now();
    let expiration = now
        .checked_add_signed(Duration::days(config.jwt_expire_days))
        .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        iat: now.timestamp() as usize,
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        });
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(AppError::Validation("Please provide a valid email".to_string()));
    }
    Ok(email)
}

pub fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Please provide a name".to_string()));
    }
    if name.chars().count() > 50 {
        return Err(AppError::Validation(
            "Name cannot be more than 50 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let name = validate_name(&body.name)?;
    let email = normalize_email(&body.email)?;
    validate_password(&body.password)?;

    let role = body.role.unwrap_or(Role::Student);
    if role == Role::Admin {
        return Err(AppError::Forbidden(
            "Administrator accounts cannot be self-registered".to_string(),
        ));
    }

    if queries::find_user_by_email(&state.db.pool, &email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let password_hash = hash_password(&body.password)?;

    let user_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    // A concurrent registration with the same email trips the unique index
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user_id)
    .bind(&name)
    .bind(&email)
    .bind(&password_hash)
    .bind(role)
    .bind(&now)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(user_id = %user_id, role = role.as_str(), "user registered");

    let token = create_token(&user_id, role, &state.config)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            token,
            user: UserResponse {
                id: user_id,
                name,
                email,
                role,
            },
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let user = queries::find_user_by_email(&state.db.pool, &body.email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(&body.password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    let token = create_token(&user.id, user.role, &state.config)?;

    Ok(Json(AuthResponse {
        success: true,
        token,
        user: user.into(),
    }))
}

async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>> {
    let user = queries::find_user(&state.db.pool, &user.id).await?;
    Ok(Json(json!({ "success": true, "data": user })))
}

// Tokens are stateless; the client discards its copy
async fn logout() -> Json<Value> {
    Json(json!({ "success": true, "message": "Logged out successfully" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    #[test]
    fn token_carries_user_and_expiry() {
        let config = Config::default();
        let token = create_token("user-1", Role::Tutor, &config).unwrap();
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.sub, "user-1");
        assert_eq!(data.claims.role, Role::Tutor);
        let lifetime = data.claims.exp - data.claims.iat;
        assert_eq!(lifetime, 30 * 24 * 60 * 60);
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ada@Example.COM ").unwrap(), "ada@example.com");
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("a@b").is_err());
    }
}
