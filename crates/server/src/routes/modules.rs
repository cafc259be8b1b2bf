use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::types::Json as SqlJson;
use uuid::Uuid;

use crate::{
    db::{
        models::{Lesson, LessonType, Module, QuizQuestion},
        queries::{self, LESSON_COLUMNS, MODULE_COLUMNS},
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::{courses::validate_title, lessons::LessonView},
    services::{
        access::{self, Access},
        catalog, quiz,
    },
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id", put(update_module).delete(delete_module))
        .route("/:id/lessons", get(list_lessons).post(create_lesson))
}

#[derive(Debug, Deserialize)]
pub struct CreateModuleRequest {
    pub title: String,
    pub order_index: Option<i64>,
    #[serde(default)]
    pub is_free: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateModuleRequest {
    pub title: Option<String>,
    pub order_index: Option<i64>,
    pub is_free: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLessonRequest {
    pub title: String,
    #[serde(rename = "type", alias = "lesson_type")]
    pub lesson_type: Option<LessonType>,
    pub video_url: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
    pub passing_score: Option<i64>,
    #[serde(default)]
    pub is_free: bool,
    pub order_index: Option<i64>,
}

pub const DEFAULT_PASSING_SCORE: i64 = 70;

pub fn validate_passing_score(score: i64) -> Result<i64> {
    if !(0..=100).contains(&score) {
        return Err(AppError::Validation(
            "Passing score must be between 0 and 100".to_string(),
        ));
    }
    Ok(score)
}

pub fn validate_duration(duration: i64) -> Result<i64> {
    if duration < 0 {
        return Err(AppError::Validation("Duration cannot be negative".to_string()));
    }
    Ok(duration)
}

/// Quiz lessons carry questions; other lesson types never do.
pub fn checked_questions(
    lesson_type: LessonType,
    questions: Vec<QuizQuestion>,
) -> Result<Vec<QuizQuestion>> {
    match lesson_type {
        LessonType::Quiz => {
            quiz::validate_questions(&questions)?;
            Ok(questions)
        }
        _ => Ok(Vec::new()),
    }
}

pub async fn list_modules(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let course = queries::find_course(&state.db.pool, &id).await?;
    let modules = queries::modules_of_course(&state.db.pool, &course.id).await?;
    Ok(Json(json!({
        "success": true,
        "count": modules.len(),
        "data": modules,
    })))
}

pub async fn create_module(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<CreateModuleRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    access::require_role(&user, access::AUTHORS)?;
    let course = queries::find_course(&state.db.pool, &id).await?;
    access::ensure_manager(&user, &course, "add modules to this course")?;

    let title = validate_title(&body.title)?;
    let order_index = match body.order_index {
        Some(index) => index,
        None => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COALESCE(MAX(order_index) + 1, 0) FROM modules WHERE course_id = ?",
            )
            .bind(&course.id)
            .fetch_one(&state.db.pool)
            .await?
        }
    };
    let now = Utc::now().to_rfc3339();

    let module = sqlx::query_as::<_, Module>(&format!(
        r#"
        INSERT INTO modules (id, course_id, title, order_index, is_free, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING {MODULE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(&course.id)
    .bind(&title)
    .bind(order_index)
    .bind(body.is_free)
    .bind(&now)
    .bind(&now)
    .fetch_one(&state.db.pool)
    .await?;

    tracing::info!(module_id = %module.id, course_id = %course.id, "module created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": module })),
    ))
}

async fn update_module(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateModuleRequest>,
) -> Result<Json<Value>> {
    access::require_role(&user, access::AUTHORS)?;
    let (mut module, course) = queries::module_with_course(&state.db.pool, &id).await?;
    access::ensure_manager(&user, &course, "update this module")?;

    if let Some(title) = body.title.as_deref() {
        module.title = validate_title(title)?;
    }
    if let Some(index) = body.order_index {
        module.order_index = index;
    }
    if let Some(is_free) = body.is_free {
        module.is_free = is_free;
    }

    let module = sqlx::query_as::<_, Module>(&format!(
        "UPDATE modules SET title = ?, order_index = ?, is_free = ?, updated_at = ? WHERE id = ? RETURNING {MODULE_COLUMNS}"
    ))
    .bind(&module.title)
    .bind(module.order_index)
    .bind(module.is_free)
    .bind(Utc::now().to_rfc3339())
    .bind(&module.id)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Json(json!({ "success": true, "data": module })))
}

async fn delete_module(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    access::require_role(&user, access::AUTHORS)?;
    let (module, course) = queries::module_with_course(&state.db.pool, &id).await?;
    access::ensure_manager(&user, &course, "delete this module")?;

    let removed = catalog::delete_module(&state.db.pool, &module.id).await?;
    tracing::info!(
        module_id = %module.id,
        lessons = removed.lessons,
        assignments = removed.assignments,
        "module deleted"
    );

    Ok(Json(json!({ "success": true, "data": {} })))
}

/// Lessons of a module, in order. A caller without an active enrollment only
/// sees free-preview content.
async fn list_lessons(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let pool = &state.db.pool;
    let (module, course) = queries::module_with_course(pool, &id).await?;
    let lessons = queries::lessons_of_module(pool, &module.id).await?;

    let preview = module.is_free || lessons.iter().any(|l| l.is_free);
    let access = access::ensure_course_access(pool, &user, &course, preview).await?;

    let lessons: Vec<LessonView> = lessons
        .into_iter()
        .filter(|l| access != Access::Preview || module.is_free || l.is_free)
        .map(|l| LessonView::new(l, &course.id, access.can_manage()))
        .collect();

    Ok(Json(json!({
        "success": true,
        "count": lessons.len(),
        "data": lessons,
    })))
}

async fn create_lesson(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<CreateLessonRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    access::require_role(&user, access::AUTHORS)?;
    let (module, course) = queries::module_with_course(&state.db.pool, &id).await?;
    access::ensure_manager(&user, &course, "add lessons to this module")?;

    let title = validate_title(&body.title)?;
    let lesson_type = body.lesson_type.unwrap_or(LessonType::Video);
    let questions = checked_questions(lesson_type, body.questions)?;
    let passing_score =
        validate_passing_score(body.passing_score.unwrap_or(DEFAULT_PASSING_SCORE))?;
    let duration = validate_duration(body.duration)?;

    let order_index = match body.order_index {
        Some(index) => index,
        None => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COALESCE(MAX(order_index) + 1, 0) FROM lessons WHERE module_id = ?",
            )
            .bind(&module.id)
            .fetch_one(&state.db.pool)
            .await?
        }
    };
    let now = Utc::now().to_rfc3339();

    let lesson = sqlx::query_as::<_, Lesson>(&format!(
        r#"
        INSERT INTO lessons
            (id, module_id, title, lesson_type, video_url, content, duration, questions, passing_score, is_free, order_index, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {LESSON_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(&module.id)
    .bind(&title)
    .bind(lesson_type)
    .bind(body.video_url.as_deref().map(str::trim).filter(|u| !u.is_empty()))
    .bind(body.content.as_deref())
    .bind(duration)
    .bind(SqlJson(questions))
    .bind(passing_score)
    .bind(body.is_free)
    .bind(order_index)
    .bind(&now)
    .bind(&now)
    .fetch_one(&state.db.pool)
    .await?;

    tracing::info!(lesson_id = %lesson.id, module_id = %module.id, "lesson created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": LessonView::new(lesson, &course.id, true) })),
    ))
}
