//! Lookups shared by several routers. Lessons and assignments reach their
//! course through the owning module; nothing below them stores a course id.

use sqlx::SqlitePool;

use super::models::{Assignment, Coupon, Course, Enrollment, Lesson, Module, User};
use crate::error::{AppError, Result};

pub const COURSE_COLUMNS: &str = "id, title, description, tutor_id, price, category, level, thumbnail, is_published, live_session_url, next_session_date, created_at, updated_at";
pub const MODULE_COLUMNS: &str = "id, course_id, title, order_index, is_free, created_at, updated_at";
pub const LESSON_COLUMNS: &str = "id, module_id, title, lesson_type, video_url, content, duration, questions, passing_score, is_free, order_index, created_at, updated_at";
pub const ASSIGNMENT_COLUMNS: &str = "id, module_id, title, description, due_date, total_points, attachment_url, is_premium, created_at, updated_at";
pub const ENROLLMENT_COLUMNS: &str = "id, student_id, course_id, payment_status, payment_method, payment_id, amount_paid, confirmed_email, last_accessed_lesson_id, last_accessed_at, certificate_id, certificate_issued_at, completion_date, enrolled_at, updated_at";
pub const COUPON_COLUMNS: &str = "id, code, course_id, is_used, used_by, used_at, created_at";
pub const USER_COLUMNS: &str = "id, name, email, password_hash, role, avatar, created_at, updated_at";

pub async fn find_user(pool: &SqlitePool, id: &str) -> Result<User> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn find_user_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
    ))
    .bind(email.trim().to_lowercase())
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn find_course(pool: &SqlitePool, id: &str) -> Result<Course> {
    sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Course not found".to_string()))
}

pub async fn find_module(pool: &SqlitePool, id: &str) -> Result<Module> {
    sqlx::query_as::<_, Module>(&format!("SELECT {MODULE_COLUMNS} FROM modules WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Module not found".to_string()))
}

pub async fn find_lesson(pool: &SqlitePool, id: &str) -> Result<Lesson> {
    sqlx::query_as::<_, Lesson>(&format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Lesson not found".to_string()))
}

pub async fn find_assignment(pool: &SqlitePool, id: &str) -> Result<Assignment> {
    sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Assignment not found".to_string()))
}

pub async fn find_coupon(pool: &SqlitePool, id: &str) -> Result<Coupon> {
    sqlx::query_as::<_, Coupon>(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Coupon not found".to_string()))
}

pub async fn find_enrollment(
    pool: &SqlitePool,
    student_id: &str,
    course_id: &str,
) -> Result<Option<Enrollment>> {
    let enrollment = sqlx::query_as::<_, Enrollment>(&format!(
        "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE student_id = ? AND course_id = ?"
    ))
    .bind(student_id)
    .bind(course_id)
    .fetch_optional(pool)
    .await?;
    Ok(enrollment)
}

/// Module together with the course that owns it.
pub async fn module_with_course(pool: &SqlitePool, module_id: &str) -> Result<(Module, Course)> {
    let module = find_module(pool, module_id).await?;
    let course = find_course(pool, &module.course_id).await?;
    Ok((module, course))
}

pub async fn lesson_with_course(
    pool: &SqlitePool,
    lesson_id: &str,
) -> Result<(Lesson, Module, Course)> {
    let lesson = find_lesson(pool, lesson_id).await?;
    let (module, course) = module_with_course(pool, &lesson.module_id).await?;
    Ok((lesson, module, course))
}

pub async fn assignment_with_course(
    pool: &SqlitePool,
    assignment_id: &str,
) -> Result<(Assignment, Course)> {
    let assignment = find_assignment(pool, assignment_id).await?;
    let (_, course) = module_with_course(pool, &assignment.module_id).await?;
    Ok((assignment, course))
}

pub async fn modules_of_course(pool: &SqlitePool, course_id: &str) -> Result<Vec<Module>> {
    let modules = sqlx::query_as::<_, Module>(&format!(
        "SELECT {MODULE_COLUMNS} FROM modules WHERE course_id = ? ORDER BY order_index ASC, created_at ASC"
    ))
    .bind(course_id)
    .fetch_all(pool)
    .await?;
    Ok(modules)
}

pub async fn lessons_of_module(pool: &SqlitePool, module_id: &str) -> Result<Vec<Lesson>> {
    let lessons = sqlx::query_as::<_, Lesson>(&format!(
        "SELECT {LESSON_COLUMNS} FROM lessons WHERE module_id = ? ORDER BY order_index ASC, created_at ASC"
    ))
    .bind(module_id)
    .fetch_all(pool)
    .await?;
    Ok(lessons)
}

/// Every lesson id in the course, across all of its modules.
pub async fn lesson_ids_of_course(pool: &SqlitePool, course_id: &str) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(
        r#"
        SELECT l.id FROM lessons l
        JOIN modules m ON l.module_id = m.id
        WHERE m.course_id = ?
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

pub async fn completed_lesson_ids(pool: &SqlitePool, enrollment_id: &str) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT lesson_id FROM completed_lessons WHERE enrollment_id = ? ORDER BY completed_at ASC",
    )
    .bind(enrollment_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}
