use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::types::Json as SqlJson;

use crate::{
    db::{
        models::{Lesson, LessonType, QuizQuestion},
        queries::{self, LESSON_COLUMNS},
    },
    error::Result,
    middleware::auth::AuthUser,
    routes::{
        courses::validate_title,
        modules::{checked_questions, validate_duration, validate_passing_score},
    },
    services::{access, catalog},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/:id", get(get_lesson).put(update_lesson).delete(delete_lesson))
}

#[derive(Debug, Deserialize)]
pub struct UpdateLessonRequest {
    pub title: Option<String>,
    #[serde(rename = "type", alias = "lesson_type")]
    pub lesson_type: Option<LessonType>,
    pub video_url: Option<String>,
    pub content: Option<String>,
    pub duration: Option<i64>,
    pub questions: Option<Vec<QuizQuestion>>,
    pub passing_score: Option<i64>,
    pub is_free: Option<bool>,
    pub order_index: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub question_text: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<usize>,
}

/// A lesson as returned to clients. Quiz answers are only included for
/// people who manage the course.
#[derive(Debug, Serialize)]
pub struct LessonView {
    pub id: String,
    pub module_id: String,
    pub course_id: String,
    pub title: String,
    pub lesson_type: LessonType,
    pub video_url: Option<String>,
    pub content: Option<String>,
    pub duration: i64,
    pub questions: Vec<QuestionView>,
    pub passing_score: i64,
    pub is_free: bool,
    pub order_index: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl LessonView {
    pub fn new(lesson: Lesson, course_id: &str, reveal_answers: bool) -> Self {
        let questions = lesson
            .questions
            .0
            .into_iter()
            .map(|q| QuestionView {
                question_text: q.question_text,
                options: q.options,
                correct_answer: reveal_answers.then_some(q.correct_answer),
            })
            .collect();

        Self {
            id: lesson.id,
            module_id: lesson.module_id,
            course_id: course_id.to_string(),
            title: lesson.title,
            lesson_type: lesson.lesson_type,
            video_url: lesson.video_url,
            content: lesson.content,
            duration: lesson.duration,
            questions,
            passing_score: lesson.passing_score,
            is_free: lesson.is_free,
            order_index: lesson.order_index,
            created_at: lesson.created_at,
            updated_at: lesson.updated_at,
        }
    }
}

async fn get_lesson(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let pool = &state.db.pool;
    let (lesson, module, course) = queries::lesson_with_course(pool, &id).await?;

    let preview = lesson.is_free || module.is_free;
    let access = access::ensure_course_access(pool, &user, &course, preview).await?;

    Ok(Json(json!({
        "success": true,
        "data": LessonView::new(lesson, &course.id, access.can_manage()),
    })))
}

async fn update_lesson(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateLessonRequest>,
) -> Result<Json<Value>> {
    access::require_role(&user, access::AUTHORS)?;
    let (mut lesson, _, course) = queries::lesson_with_course(&state.db.pool, &id).await?;
    access::ensure_manager(&user, &course, "update this lesson")?;

    if let Some(title) = body.title.as_deref() {
        lesson.title = validate_title(title)?;
    }
    if let Some(lesson_type) = body.lesson_type {
        lesson.lesson_type = lesson_type;
    }
    if let Some(url) = body.video_url {
        lesson.video_url = Some(url.trim().to_string()).filter(|u| !u.is_empty());
    }
    if let Some(content) = body.content {
        lesson.content = Some(content);
    }
    if let Some(duration) = body.duration {
        lesson.duration = validate_duration(duration)?;
    }
    if let Some(score) = body.passing_score {
        lesson.passing_score = validate_passing_score(score)?;
    }
    if let Some(is_free) = body.is_free {
        lesson.is_free = is_free;
    }
    if let Some(index) = body.order_index {
        lesson.order_index = index;
    }

    // Re-check questions against the (possibly changed) type
    let questions = body.questions.unwrap_or(lesson.questions.0);
    let questions = checked_questions(lesson.lesson_type, questions)?;

    let lesson = sqlx::query_as::<_, Lesson>(&format!(
        r#"
        UPDATE lessons SET
            title = ?, lesson_type = ?, video_url = ?, content = ?, duration = ?, questions = ?,
            passing_score = ?, is_free = ?, order_index = ?, updated_at = ?
        WHERE id = ?
        RETURNING {LESSON_COLUMNS}
        "#
    ))
    .bind(&lesson.title)
    .bind(lesson.lesson_type)
    .bind(&lesson.video_url)
    .bind(&lesson.content)
    .bind(lesson.duration)
    .bind(SqlJson(questions))
    .bind(lesson.passing_score)
    .bind(lesson.is_free)
    .bind(lesson.order_index)
    .bind(Utc::now().to_rfc3339())
    .bind(&lesson.id)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "data": LessonView::new(lesson, &course.id, true),
    })))
}

async fn delete_lesson(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    access::require_role(&user, access::AUTHORS)?;
    let (lesson, _, course) = queries::lesson_with_course(&state.db.pool, &id).await?;
    access::ensure_manager(&user, &course, "delete this lesson")?;

    catalog::delete_lesson(&state.db.pool, &lesson.id).await?;
    tracing::info!(lesson_id = %lesson.id, course_id = %course.id, "lesson deleted");

    Ok(Json(json!({ "success": true, "data": {} })))
}
