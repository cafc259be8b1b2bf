use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    db::{
        models::{Enrollment, PaymentStatus, Role, User},
        queries::{self, ENROLLMENT_COLUMNS, USER_COLUMNS},
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::auth::UserResponse,
    services::{access, enrollment, mailer},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pending-enrollments", get(pending_enrollments))
        .route("/approve-enrollment", post(approve_enrollment))
        .route("/reject-enrollment", post(reject_enrollment))
        .route("/users/:id/role", put(change_role))
}

#[derive(Debug, Deserialize)]
pub struct EnrollmentDecision {
    pub email: String,
    pub course_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PendingEnrollment {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub course_id: String,
    pub course_title: String,
    pub course_price: i64,
    pub payment_method: String,
    pub amount_paid: i64,
    pub confirmed_email: Option<String>,
    pub enrolled_at: String,
}

async fn pending_enrollments(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>> {
    access::require_role(&user, access::ADMINS)?;

    let pending = sqlx::query_as::<_, PendingEnrollment>(
        r#"
        SELECT e.id, e.student_id, u.name AS student_name, u.email AS student_email,
               e.course_id, c.title AS course_title, c.price AS course_price,
               e.payment_method, e.amount_paid, e.confirmed_email, e.enrolled_at
        FROM enrollments e
        JOIN users u ON e.student_id = u.id
        JOIN courses c ON e.course_id = c.id
        WHERE e.payment_status = ?
        ORDER BY e.enrolled_at ASC
        "#,
    )
    .bind(PaymentStatus::Pending)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "count": pending.len(),
        "data": pending,
    })))
}

async fn find_student(state: &AppState, email: &str) -> Result<User> {
    queries::find_user_by_email(&state.db.pool, email)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No user found with email: {}. Please ensure they signed up first.",
                email.trim()
            ))
        })
}

/// Marks the transfer as verified (or grants access outright when the student
/// never enrolled) and notifies the student. A failed notification is logged
/// and does not undo the approval.
async fn approve_enrollment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<EnrollmentDecision>,
) -> Result<Json<Value>> {
    access::require_role(&user, access::ADMINS)?;
    let pool = &state.db.pool;

    let student = find_student(&state, &body.email).await?;
    let course = queries::find_course(pool, &body.course_id).await?;

    let existing = queries::find_enrollment(pool, &student.id, &course.id)
        .await?
        .map(|e| e.payment_status);
    let plan = enrollment::plan_approve(&course, existing)?;
    let approved = enrollment::upsert(pool, &student.id, &course.id, &plan, None).await?;

    tracing::info!(
        enrollment_id = %approved.id,
        student_id = %student.id,
        course_id = %course.id,
        admin_id = %user.id,
        "enrollment approved"
    );

    let email = mailer::access_granted(
        &state.config,
        &student.email,
        &student.name,
        &course.id,
        &course.title,
    );
    if let Err(err) = state.mailer.send(email).await {
        tracing::warn!(error = %err, to = %student.email, "access notification failed");
    }

    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully activated {} for {}", course.title, student.email),
        "data": approved,
    })))
}

async fn reject_enrollment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<EnrollmentDecision>,
) -> Result<Json<Value>> {
    access::require_role(&user, access::ADMINS)?;
    let pool = &state.db.pool;

    let student = find_student(&state, &body.email).await?;
    let course = queries::find_course(pool, &body.course_id).await?;

    let existing = queries::find_enrollment(pool, &student.id, &course.id)
        .await?
        .map(|e| e.payment_status);
    enrollment::ensure_rejectable(existing)?;

    let rejected = sqlx::query_as::<_, Enrollment>(&format!(
        r#"
        UPDATE enrollments SET payment_status = ?, updated_at = ?
        WHERE student_id = ? AND course_id = ? AND payment_status = ?
        RETURNING {ENROLLMENT_COLUMNS}
        "#
    ))
    .bind(PaymentStatus::Failed)
    .bind(Utc::now().to_rfc3339())
    .bind(&student.id)
    .bind(&course.id)
    .bind(PaymentStatus::Pending)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Conflict("Only pending enrollments can be rejected".to_string()))?;

    tracing::info!(
        enrollment_id = %rejected.id,
        admin_id = %user.id,
        "enrollment rejected"
    );

    Ok(Json(json!({ "success": true, "data": rejected })))
}

async fn change_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<RoleRequest>,
) -> Result<Json<Value>> {
    access::require_role(&user, access::ADMINS)?;
    if id == user.id && body.role != Role::Admin {
        return Err(AppError::Validation(
            "Administrators cannot demote themselves".to_string(),
        ));
    }

    let target = queries::find_user(&state.db.pool, &id).await?;
    let updated = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET role = ?, updated_at = ? WHERE id = ? RETURNING {USER_COLUMNS}"
    ))
    .bind(body.role)
    .bind(Utc::now().to_rfc3339())
    .bind(&target.id)
    .fetch_one(&state.db.pool)
    .await?;

    tracing::info!(
        user_id = %updated.id,
        from = target.role.as_str(),
        to = updated.role.as_str(),
        "user role changed"
    );

    Ok(Json(json!({ "success": true, "data": UserResponse::from(updated) })))
}
