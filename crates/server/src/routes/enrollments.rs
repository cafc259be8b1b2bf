use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    db::{
        models::{Course, CourseLevel, Enrollment, LessonType},
        queries::{self, ENROLLMENT_COLUMNS},
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::auth::normalize_email,
    services::{
        certificate::{self, Certificate},
        coupons,
        enrollment::{self, Strategy},
        progress::{self, ProgressSummary},
        quiz,
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/my-courses", get(my_courses))
        .route("/redeem-code", post(redeem_code))
        .route("/:id/enroll", post(enroll))
        .route("/:id/progress", get(get_progress).put(update_progress))
        .route("/:id/quiz/:lesson_id", post(submit_quiz))
        .route("/:id/certificate", get(download_certificate))
}

#[derive(Debug, Default, Deserialize)]
pub struct EnrollRequest {
    pub payment_method: Option<String>,
    pub confirmed_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
    pub course_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub lesson_id: String,
}

#[derive(Debug, Deserialize)]
pub struct QuizRequest {
    pub answers: Vec<usize>,
}

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub success: bool,
    pub strategy: Strategy,
    pub data: Enrollment,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CourseSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub price: i64,
    pub level: CourseLevel,
    pub category: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardEntry {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub course: CourseSummary,
    pub progress: ProgressSummary,
}

#[derive(Debug, Serialize)]
pub struct QuizAttempt {
    #[serde(flatten)]
    pub result: quiz::QuizResult,
    pub best_score: i64,
    pub attempts: i64,
    pub progress: ProgressSummary,
}

async fn my_courses(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>> {
    let pool = &state.db.pool;

    let enrollments = sqlx::query_as::<_, Enrollment>(&format!(
        "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE student_id = ? ORDER BY enrolled_at DESC"
    ))
    .bind(&user.id)
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(enrollments.len());
    for enrollment in enrollments {
        let course = sqlx::query_as::<_, CourseSummary>(
            "SELECT id, title, description, thumbnail, price, level, category FROM courses WHERE id = ?",
        )
        .bind(&enrollment.course_id)
        .fetch_one(pool)
        .await?;
        let progress = progress::load(pool, &enrollment).await?;
        entries.push(DashboardEntry {
            enrollment,
            course,
            progress,
        });
    }

    Ok(Json(json!({
        "success": true,
        "count": entries.len(),
        "data": entries,
    })))
}

async fn enroll(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Option<Json<EnrollRequest>>,
) -> Result<(StatusCode, Json<EnrollResponse>)> {
    let Json(body) = body.unwrap_or_default();
    let pool = &state.db.pool;
    let course = queries::find_course(pool, &id).await?;

    let existing = queries::find_enrollment(pool, &user.id, &course.id)
        .await?
        .map(|e| e.payment_status);
    let plan = enrollment::plan_enroll(&course, existing, body.payment_method.as_deref())?;

    let confirmed_email = match body.confirmed_email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => normalize_email(email)?,
        _ => user.email.clone(),
    };

    let enrollment =
        enrollment::upsert(pool, &user.id, &course.id, &plan, Some(&confirmed_email)).await?;

    tracing::info!(
        enrollment_id = %enrollment.id,
        course_id = %course.id,
        status = ?enrollment.payment_status,
        "enrollment recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(EnrollResponse {
            success: true,
            strategy: enrollment.payment_status.into(),
            data: enrollment,
        }),
    ))
}

async fn redeem_code(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<RedeemRequest>,
) -> Result<Json<Value>> {
    let course = queries::find_course(&state.db.pool, &body.course_id).await?;
    let (_, enrollment) = coupons::redeem(&state.db.pool, &user.id, &course.id, &body.code).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Course Unlocked!",
        "data": enrollment,
    })))
}

/// The caller's enrollment in the course, which must grant access.
async fn active_enrollment(
    state: &AppState,
    user: &AuthUser,
    course: &Course,
) -> Result<Enrollment> {
    match queries::find_enrollment(&state.db.pool, &user.id, &course.id).await? {
        Some(e) if e.payment_status.grants_access() => Ok(e),
        Some(_) => Err(AppError::Forbidden(
            "Your enrollment is not active yet.".to_string(),
        )),
        None => Err(AppError::NotFound("Enrollment not found".to_string())),
    }
}

async fn get_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let course = queries::find_course(&state.db.pool, &id).await?;
    let enrollment = queries::find_enrollment(&state.db.pool, &user.id, &course.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Enrollment not found".to_string()))?;
    let summary = progress::load(&state.db.pool, &enrollment).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "enrollment_id": enrollment.id,
            "last_accessed_lesson_id": enrollment.last_accessed_lesson_id,
            "progress": summary,
        },
    })))
}

async fn update_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<ProgressRequest>,
) -> Result<Json<Value>> {
    let pool = &state.db.pool;
    let course = queries::find_course(pool, &id).await?;
    let enrollment = active_enrollment(&state, &user, &course).await?;

    let (lesson, _, lesson_course) = queries::lesson_with_course(pool, &body.lesson_id).await?;
    if lesson_course.id != course.id {
        return Err(AppError::NotFound("Lesson not found in this course".to_string()));
    }
    // Quiz lessons only count once the quiz is passed
    if lesson.lesson_type == LessonType::Quiz {
        return Err(AppError::Validation(
            "Quiz lessons are completed by passing the quiz".to_string(),
        ));
    }

    progress::mark_complete(pool, &enrollment.id, &lesson.id).await?;
    let summary = progress::load(pool, &enrollment).await?;

    Ok(Json(json!({ "success": true, "data": summary })))
}

async fn submit_quiz(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, lesson_id)): Path<(String, String)>,
    Json(body): Json<QuizRequest>,
) -> Result<Json<Value>> {
    let pool = &state.db.pool;
    let course = queries::find_course(pool, &id).await?;
    let enrollment = active_enrollment(&state, &user, &course).await?;

    let (lesson, _, lesson_course) = queries::lesson_with_course(pool, &lesson_id).await?;
    if lesson_course.id != course.id {
        return Err(AppError::NotFound("Lesson not found in this course".to_string()));
    }
    if lesson.lesson_type != LessonType::Quiz {
        return Err(AppError::Validation("This lesson is not a quiz".to_string()));
    }

    let result = quiz::grade(&lesson.questions, &body.answers, lesson.passing_score)?;

    let (best_score, attempts) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        INSERT INTO quiz_scores (enrollment_id, lesson_id, score, passed, attempts, last_attempt_at)
        VALUES (?, ?, ?, ?, 1, ?)
        ON CONFLICT (enrollment_id, lesson_id) DO UPDATE SET
            score = MAX(quiz_scores.score, excluded.score),
            passed = MAX(quiz_scores.passed, excluded.passed),
            attempts = quiz_scores.attempts + 1,
            last_attempt_at = excluded.last_attempt_at
        RETURNING score, attempts
        "#,
    )
    .bind(&enrollment.id)
    .bind(&lesson.id)
    .bind(result.score)
    .bind(result.passed)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(pool)
    .await?;

    if result.passed {
        progress::mark_complete(pool, &enrollment.id, &lesson.id).await?;
    }
    let summary = progress::load(pool, &enrollment).await?;

    tracing::info!(
        enrollment_id = %enrollment.id,
        lesson_id = %lesson.id,
        score = result.score,
        passed = result.passed,
        attempts,
        "quiz attempt recorded"
    );

    Ok(Json(json!({
        "success": true,
        "data": QuizAttempt {
            result,
            best_score,
            attempts,
            progress: summary,
        },
    })))
}

async fn download_certificate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Response> {
    let pool = &state.db.pool;
    let course = queries::find_course(pool, &id).await?;
    let enrollment = active_enrollment(&state, &user, &course).await?;

    let summary = progress::load(pool, &enrollment).await?;
    if !summary.is_completed {
        return Err(AppError::NotComplete);
    }

    let enrollment = record_issuance(&state, enrollment).await?;
    let issued_on = enrollment
        .certificate_issued_at
        .as_deref()
        .and_then(|at| DateTime::parse_from_rfc3339(at).ok())
        .map(|at| at.date_naive())
        .unwrap_or_else(|| Utc::now().date_naive());
    let certificate_id = enrollment.certificate_id.clone().unwrap_or_default();

    let student = queries::find_user(pool, &user.id).await?;
    let pdf = certificate::render(&Certificate {
        academy: &state.config.academy_name,
        student_name: &student.name,
        course_title: &course.title,
        certificate_id: &certificate_id,
        issued_on,
    });

    tracing::info!(enrollment_id = %enrollment.id, %certificate_id, "certificate downloaded");

    let disposition = format!(
        "attachment; filename=\"{}\"",
        certificate::filename(&course.title)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
        .into_response())
}

/// Stamps the certificate id and dates on first download; later downloads
/// reuse them.
async fn record_issuance(state: &AppState, enrollment: Enrollment) -> Result<Enrollment> {
    if enrollment.certificate_id.is_some() {
        return Ok(enrollment);
    }

    let now = Utc::now();
    let certificate_id = certificate::certificate_id(&enrollment.id, now.date_naive());
    let now = now.to_rfc3339();

    let updated = sqlx::query_as::<_, Enrollment>(&format!(
        r#"
        UPDATE enrollments SET
            certificate_id = COALESCE(certificate_id, ?),
            certificate_issued_at = COALESCE(certificate_issued_at, ?),
            completion_date = COALESCE(completion_date, ?),
            updated_at = ?
        WHERE id = ?
        RETURNING {ENROLLMENT_COLUMNS}
        "#
    ))
    .bind(&certificate_id)
    .bind(&now)
    .bind(&now)
    .bind(&now)
    .bind(&enrollment.id)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(updated)
}
