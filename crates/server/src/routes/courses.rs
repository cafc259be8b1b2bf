use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::{
    db::{
        models::{Course, CourseLevel, LessonType, Module, CATEGORIES},
        queries::{self, COURSE_COLUMNS},
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::modules,
    services::{access, catalog},
    AppState,
};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_courses))
        .route("/:id", get(get_course))
        .route("/:id/modules", get(modules::list_modules))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_course))
        .route("/:id", axum::routing::put(update_course).delete(delete_course))
        .route("/:id/modules", post(modules::create_module))
}

#[derive(Debug, Deserialize)]
pub struct ListCoursesQuery {
    pub category: Option<String>,
    pub level: Option<CourseLevel>,
    pub keyword: Option<String>,
    pub published: Option<bool>,
    pub tutor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub price: i64,
    pub category: Option<String>,
    pub level: Option<CourseLevel>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub is_published: bool,
    pub live_session_url: Option<String>,
    pub next_session_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub category: Option<String>,
    pub level: Option<CourseLevel>,
    pub thumbnail: Option<String>,
    pub is_published: Option<bool>,
    pub live_session_url: Option<String>,
    /// An empty string clears the scheduled session.
    pub next_session_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CourseListResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<Course>,
}

#[derive(Debug, Serialize)]
pub struct CourseResponse {
    pub success: bool,
    pub data: Course,
}

#[derive(Debug, Serialize)]
pub struct LessonSummary {
    pub id: String,
    pub module_id: String,
    pub course_id: String,
    pub title: String,
    pub lesson_type: LessonType,
    pub duration: i64,
    pub is_free: bool,
    pub order_index: i64,
}

#[derive(Debug, Serialize)]
pub struct ModuleNode {
    #[serde(flatten)]
    pub module: Module,
    pub lessons: Vec<LessonSummary>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AssignmentSummary {
    pub id: String,
    pub module_id: String,
    pub title: String,
    pub due_date: Option<String>,
    pub total_points: i64,
    pub is_premium: bool,
}

#[derive(Debug, Serialize)]
pub struct CourseTree {
    #[serde(flatten)]
    pub course: Course,
    pub modules: Vec<ModuleNode>,
    pub assignments: Vec<AssignmentSummary>,
}

pub fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Please add a title".to_string()));
    }
    if title.chars().count() > 100 {
        return Err(AppError::Validation(
            "Title cannot be more than 100 characters".to_string(),
        ));
    }
    Ok(title.to_string())
}

fn validate_description(description: &str) -> Result<String> {
    let description = description.trim();
    if description.is_empty() {
        return Err(AppError::Validation("Please add a description".to_string()));
    }
    if description.chars().count() > 1000 {
        return Err(AppError::Validation(
            "Description cannot be more than 1000 characters".to_string(),
        ));
    }
    Ok(description.to_string())
}

fn validate_price(price: i64) -> Result<i64> {
    if price < 0 {
        return Err(AppError::Validation("Price cannot be negative".to_string()));
    }
    Ok(price)
}

fn validate_category(category: &str) -> Result<String> {
    CATEGORIES
        .iter()
        .find(|c| c.eq_ignore_ascii_case(category.trim()))
        .map(|c| c.to_string())
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Category must be one of: {}",
                CATEGORIES.join(", ")
            ))
        })
}

/// Accepts RFC 3339 timestamps; blank means "no date".
pub fn validate_timestamp(raw: &str, field: &str) -> Result<Option<String>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.with_timezone(&Utc).to_rfc3339()))
        .map_err(|_| AppError::Validation(format!("{field} must be an RFC 3339 timestamp")))
}

async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<ListCoursesQuery>,
) -> Result<Json<CourseListResponse>> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {COURSE_COLUMNS} FROM courses WHERE 1 = 1"));

    if let Some(category) = query.category.as_deref().filter(|c| !c.trim().is_empty()) {
        builder.push(" AND category = ");
        builder.push_bind(validate_category(category)?);
    }
    if let Some(level) = query.level {
        builder.push(" AND level = ");
        builder.push_bind(level);
    }
    if let Some(published) = query.published {
        builder.push(" AND is_published = ");
        builder.push_bind(published);
    }
    if let Some(tutor) = query.tutor {
        builder.push(" AND tutor_id = ");
        builder.push_bind(tutor);
    }
    if let Some(keyword) = query.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        let pattern = format!("%{}%", keyword.to_lowercase());
        builder.push(" AND (LOWER(title) LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR LOWER(description) LIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
    builder.push(" ORDER BY created_at DESC");

    let courses = builder
        .build_query_as::<Course>()
        .fetch_all(&state.db.pool)
        .await?;

    Ok(Json(CourseListResponse {
        success: true,
        count: courses.len(),
        data: courses,
    }))
}

async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let course = queries::find_course(&state.db.pool, &id).await?;
    let tree = load_tree(&state, course).await?;
    Ok(Json(json!({ "success": true, "data": tree })))
}

/// Course -> modules -> lessons, each level ordered by `order_index`.
pub async fn load_tree(state: &AppState, course: Course) -> Result<CourseTree> {
    let pool = &state.db.pool;
    let mut modules = Vec::new();

    for module in queries::modules_of_course(pool, &course.id).await? {
        let lessons = queries::lessons_of_module(pool, &module.id)
            .await?
            .into_iter()
            .map(|lesson| LessonSummary {
                id: lesson.id,
                module_id: lesson.module_id,
                course_id: module.course_id.clone(),
                title: lesson.title,
                lesson_type: lesson.lesson_type,
                duration: lesson.duration,
                is_free: lesson.is_free,
                order_index: lesson.order_index,
            })
            .collect();
        modules.push(ModuleNode { module, lessons });
    }

    let assignments = sqlx::query_as::<_, AssignmentSummary>(
        r#"
        SELECT a.id, a.module_id, a.title, a.due_date, a.total_points, a.is_premium
        FROM assignments a
        JOIN modules m ON a.module_id = m.id
        WHERE m.course_id = ?
        ORDER BY m.order_index ASC, a.created_at ASC
        "#,
    )
    .bind(&course.id)
    .fetch_all(pool)
    .await?;

    Ok(CourseTree {
        course,
        modules,
        assignments,
    })
}

async fn create_course(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateCourseRequest>,
) -> Result<(StatusCode, Json<CourseResponse>)> {
    access::require_role(&user, access::AUTHORS)?;

    let title = validate_title(&body.title)?;
    let description = validate_description(&body.description)?;
    let price = validate_price(body.price)?;
    let category = validate_category(body.category.as_deref().unwrap_or(CATEGORIES[0]))?;
    let next_session_date = match body.next_session_date.as_deref() {
        Some(raw) => validate_timestamp(raw, "next_session_date")?,
        None => None,
    };

    let course_id = Uuid::new_v4().to_string();
    let thumbnail = body
        .thumbnail
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("no-photo.jpg");
    let now = Utc::now().to_rfc3339();

    let course = sqlx::query_as::<_, Course>(&format!(
        r#"
        INSERT INTO courses
            (id, title, description, tutor_id, price, category, level, thumbnail, is_published, live_session_url, next_session_date, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {COURSE_COLUMNS}
        "#
    ))
    .bind(&course_id)
    .bind(&title)
    .bind(&description)
    .bind(&user.id)
    .bind(price)
    .bind(&category)
    .bind(body.level.unwrap_or(CourseLevel::Beginner))
    .bind(thumbnail)
    .bind(body.is_published)
    .bind(body.live_session_url.as_deref().map(str::trim).unwrap_or(""))
    .bind(&next_session_date)
    .bind(&now)
    .bind(&now)
    .fetch_one(&state.db.pool)
    .await?;

    tracing::info!(course_id = %course.id, tutor_id = %user.id, "course created");

    Ok((
        StatusCode::CREATED,
        Json(CourseResponse {
            success: true,
            data: course,
        }),
    ))
}

async fn update_course(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateCourseRequest>,
) -> Result<Json<CourseResponse>> {
    access::require_role(&user, access::AUTHORS)?;
    let mut course = queries::find_course(&state.db.pool, &id).await?;
    access::ensure_manager(&user, &course, "update this course")?;

    if let Some(title) = body.title.as_deref() {
        course.title = validate_title(title)?;
    }
    if let Some(description) = body.description.as_deref() {
        course.description = validate_description(description)?;
    }
    if let Some(price) = body.price {
        course.price = validate_price(price)?;
    }
    if let Some(category) = body.category.as_deref() {
        course.category = validate_category(category)?;
    }
    if let Some(level) = body.level {
        course.level = level;
    }
    if let Some(thumbnail) = body.thumbnail {
        course.thumbnail = thumbnail.trim().to_string();
    }
    if let Some(published) = body.is_published {
        course.is_published = published;
    }
    if let Some(url) = body.live_session_url {
        course.live_session_url = url.trim().to_string();
    }
    if let Some(raw) = body.next_session_date.as_deref() {
        course.next_session_date = validate_timestamp(raw, "next_session_date")?;
    }

    let course = sqlx::query_as::<_, Course>(&format!(
        r#"
        UPDATE courses SET
            title = ?, description = ?, price = ?, category = ?, level = ?, thumbnail = ?,
            is_published = ?, live_session_url = ?, next_session_date = ?, updated_at = ?
        WHERE id = ?
        RETURNING {COURSE_COLUMNS}
        "#
    ))
    .bind(&course.title)
    .bind(&course.description)
    .bind(course.price)
    .bind(&course.category)
    .bind(course.level)
    .bind(&course.thumbnail)
    .bind(course.is_published)
    .bind(&course.live_session_url)
    .bind(&course.next_session_date)
    .bind(Utc::now().to_rfc3339())
    .bind(&course.id)
    .fetch_one(&state.db.pool)
    .await?;

    Ok(Json(CourseResponse {
        success: true,
        data: course,
    }))
}

async fn delete_course(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    access::require_role(&user, access::AUTHORS)?;
    let course = queries::find_course(&state.db.pool, &id).await?;
    access::ensure_manager(&user, &course, "delete this course")?;

    let removed = catalog::delete_course(&state.db.pool, &course.id).await?;
    tracing::info!(
        course_id = %course.id,
        modules = removed.modules,
        lessons = removed.lessons,
        assignments = removed.assignments,
        enrollments = removed.enrollments,
        "course deleted"
    );

    Ok(Json(json!({ "success": true, "data": {} })))
}
