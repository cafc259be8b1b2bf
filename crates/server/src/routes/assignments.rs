use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    db::{
        models::{Assignment, Submission, SubmissionStatus},
        queries::{self, ASSIGNMENT_COLUMNS},
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::courses::{validate_timestamp, validate_title},
    services::{access, catalog},
    AppState,
};

const SUBMISSION_COLUMNS: &str = "id, assignment_id, student_id, content, file_url, status, grade, feedback, graded_at, created_at, updated_at";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/modules/:id", post(create_assignment))
        .route("/:id", get(get_assignment).delete(delete_assignment))
        .route("/:id/submit", post(submit_assignment))
        .route("/:id/my-submission", get(my_submission))
        .route("/:id/submissions", get(list_submissions))
        .route("/submissions/:id/grade", put(grade_submission))
}

#[derive(Debug, Deserialize)]
pub struct CreateAssignmentRequest {
    pub title: String,
    pub description: String,
    pub due_date: Option<String>,
    pub total_points: Option<i64>,
    pub attachment_url: Option<String>,
    pub is_premium: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub content: Option<String>,
    pub file_url: String,
}

#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub grade: i64,
    pub feedback: Option<String>,
    pub status: Option<SubmissionStatus>,
}

/// Submission row joined with the submitting student.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StudentSubmission {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub submission: Submission,
    pub student_name: String,
    pub student_email: String,
}

pub const DEFAULT_TOTAL_POINTS: i64 = 100;

/// Graded work must score inside `0..=total_points`.
pub fn validate_grade(grade: i64, total_points: i64) -> Result<i64> {
    if !(0..=total_points).contains(&grade) {
        return Err(AppError::Validation(format!(
            "Grade must be between 0 and {total_points}"
        )));
    }
    Ok(grade)
}

async fn create_assignment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<CreateAssignmentRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    access::require_role(&user, access::AUTHORS)?;
    let (module, course) = queries::module_with_course(&state.db.pool, &id).await?;
    access::ensure_manager(&user, &course, "modify this course")?;

    let title = validate_title(&body.title)?;
    let description = body.description.trim();
    if description.is_empty() {
        return Err(AppError::Validation("Please add a description".to_string()));
    }
    let total_points = body.total_points.unwrap_or(DEFAULT_TOTAL_POINTS);
    if total_points <= 0 {
        return Err(AppError::Validation(
            "Total points must be positive".to_string(),
        ));
    }
    let due_date = match body.due_date.as_deref() {
        Some(raw) => validate_timestamp(raw, "due_date")?,
        None => None,
    };
    let now = Utc::now().to_rfc3339();

    let assignment = sqlx::query_as::<_, Assignment>(&format!(
        r#"
        INSERT INTO assignments
            (id, module_id, title, description, due_date, total_points, attachment_url, is_premium, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {ASSIGNMENT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(&module.id)
    .bind(&title)
    .bind(description)
    .bind(&due_date)
    .bind(total_points)
    .bind(body.attachment_url.as_deref().map(str::trim).filter(|u| !u.is_empty()))
    .bind(body.is_premium.unwrap_or(true))
    .bind(&now)
    .bind(&now)
    .fetch_one(&state.db.pool)
    .await?;

    tracing::info!(assignment_id = %assignment.id, module_id = %module.id, "assignment created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": with_course(&assignment, &course.id),
        })),
    ))
}

/// Assignments are stored under their module; clients also get the course id.
fn with_course(assignment: &Assignment, course_id: &str) -> Value {
    let mut value = json!(assignment);
    value["course_id"] = json!(course_id);
    value
}

async fn get_assignment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let pool = &state.db.pool;
    let (assignment, course) = queries::assignment_with_course(pool, &id).await?;
    access::ensure_course_access(pool, &user, &course, !assignment.is_premium).await?;

    Ok(Json(json!({
        "success": true,
        "data": with_course(&assignment, &course.id),
    })))
}

async fn delete_assignment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    access::require_role(&user, access::AUTHORS)?;
    let (assignment, course) = queries::assignment_with_course(&state.db.pool, &id).await?;
    access::ensure_manager(&user, &course, "modify this course")?;

    let submissions = catalog::delete_assignment(&state.db.pool, &assignment.id).await?;
    tracing::info!(assignment_id = %assignment.id, submissions, "assignment deleted");

    Ok(Json(json!({ "success": true, "data": {} })))
}

async fn submit_assignment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let pool = &state.db.pool;
    let (assignment, course) = queries::assignment_with_course(pool, &id).await?;

    let enrolled = queries::find_enrollment(pool, &user.id, &course.id)
        .await?
        .is_some_and(|e| e.payment_status.grants_access());
    if !enrolled {
        return Err(AppError::Forbidden(
            "You must be enrolled to submit assignments.".to_string(),
        ));
    }

    let file_url = body.file_url.trim();
    if file_url.is_empty() {
        return Err(AppError::Validation(
            "Please attach your work".to_string(),
        ));
    }
    let now = Utc::now().to_rfc3339();

    let submission = sqlx::query_as::<_, Submission>(&format!(
        r#"
        INSERT INTO submissions (id, assignment_id, student_id, content, file_url, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {SUBMISSION_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(&assignment.id)
    .bind(&user.id)
    .bind(body.content.as_deref())
    .bind(file_url)
    .bind(SubmissionStatus::Submitted)
    .bind(&now)
    .bind(&now)
    .fetch_one(pool)
    .await
    .map_err(|err| match AppError::from(err) {
        AppError::Conflict(_) => {
            AppError::Conflict("You have already submitted this assignment.".to_string())
        }
        other => other,
    })?;

    tracing::info!(assignment_id = %assignment.id, student_id = %user.id, "assignment submitted");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": submission })),
    ))
}

async fn my_submission(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let submission = sqlx::query_as::<_, Submission>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE assignment_id = ? AND student_id = ?"
    ))
    .bind(&id)
    .bind(&user.id)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("No submission found".to_string()))?;

    Ok(Json(json!({ "success": true, "data": submission })))
}

async fn list_submissions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    access::require_role(&user, access::AUTHORS)?;
    let (assignment, course) = queries::assignment_with_course(&state.db.pool, &id).await?;
    access::ensure_manager(&user, &course, "view these submissions")?;

    let submissions = sqlx::query_as::<_, StudentSubmission>(
        r#"
        SELECT s.id, s.assignment_id, s.student_id, s.content, s.file_url, s.status, s.grade,
               s.feedback, s.graded_at, s.created_at, s.updated_at,
               u.name AS student_name, u.email AS student_email
        FROM submissions s
        JOIN users u ON s.student_id = u.id
        WHERE s.assignment_id = ?
        ORDER BY s.created_at ASC
        "#,
    )
    .bind(&assignment.id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "count": submissions.len(),
        "data": submissions,
    })))
}

async fn grade_submission(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<GradeRequest>,
) -> Result<Json<Value>> {
    access::require_role(&user, access::AUTHORS)?;
    let pool = &state.db.pool;

    let submission = sqlx::query_as::<_, Submission>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?"
    ))
    .bind(&id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

    let (assignment, course) =
        queries::assignment_with_course(pool, &submission.assignment_id).await?;
    access::ensure_manager(&user, &course, "grade this submission")?;

    let grade = validate_grade(body.grade, assignment.total_points)?;
    let status = match body.status.unwrap_or(SubmissionStatus::Graded) {
        SubmissionStatus::Submitted => {
            return Err(AppError::Validation(
                "A graded submission must be marked graded or returned".to_string(),
            ))
        }
        status => status,
    };
    let now = Utc::now().to_rfc3339();

    let submission = sqlx::query_as::<_, Submission>(&format!(
        r#"
        UPDATE submissions SET grade = ?, feedback = ?, status = ?, graded_at = ?, updated_at = ?
        WHERE id = ?
        RETURNING {SUBMISSION_COLUMNS}
        "#
    ))
    .bind(grade)
    .bind(body.feedback.as_deref())
    .bind(status)
    .bind(&now)
    .bind(&now)
    .bind(&submission.id)
    .fetch_one(pool)
    .await?;

    tracing::info!(submission_id = %submission.id, grade, "submission graded");

    Ok(Json(json!({ "success": true, "data": submission })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_bounded_by_total_points() {
        assert_eq!(validate_grade(0, 50).unwrap(), 0);
        assert_eq!(validate_grade(50, 50).unwrap(), 50);
        assert!(validate_grade(51, 50).is_err());
        assert!(validate_grade(-1, 50).is_err());
    }
}
