use axum::{extract::State, routing::put, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    db::{models::User, queries::{self, USER_COLUMNS}},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::auth::{
        hash_password, normalize_email, validate_name, validate_password, verify_password,
        UserResponse,
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", put(update_profile))
        .route("/password", put(update_password))
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<ProfileRequest>,
) -> Result<Json<Value>> {
    let mut user = queries::find_user(&state.db.pool, &auth.id).await?;

    if let Some(name) = body.name.as_deref().filter(|n| !n.trim().is_empty()) {
        user.name = validate_name(name)?;
    }
    if let Some(email) = body.email.as_deref().filter(|e| !e.trim().is_empty()) {
        let email = normalize_email(email)?;
        if email != user.email {
            let taken = queries::find_user_by_email(&state.db.pool, &email).await?;
            if taken.is_some() {
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
            user.email = email;
        }
    }
    if let Some(avatar) = body.avatar {
        user.avatar = Some(avatar.trim().to_string()).filter(|a| !a.is_empty());
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET name = ?, email = ?, avatar = ?, updated_at = ? WHERE id = ? RETURNING {USER_COLUMNS}"
    ))
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.avatar)
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Json(json!({ "success": true, "data": UserResponse::from(user) })))
}

async fn update_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<PasswordRequest>,
) -> Result<Json<Value>> {
    let user = queries::find_user(&state.db.pool, &auth.id).await?;

    if !verify_password(&body.current_password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }
    validate_password(&body.new_password)?;
    let password_hash = hash_password(&body.new_password)?;

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(Utc::now().to_rfc3339())
        .bind(&user.id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!(user_id = %user.id, "password changed");

    Ok(Json(json!({ "success": true, "message": "Password updated successfully" })))
}
