use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    db::{models::Enrollment, queries},
    error::Result,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSummary {
    pub completed_lessons: Vec<String>,
    pub completed: usize,
    pub total: usize,
    pub progress: u8,
    pub is_completed: bool,
}

/// Whole-number percentage, halves rounded up. A course without lessons is at 0.
pub fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    ((completed * 100 + total / 2) / total) as u8
}

/// Progress is always derived from the current curriculum: completions of
/// lessons that have since been deleted do not count.
pub fn summarize(course_lessons: &[String], completed: &[String]) -> ProgressSummary {
    let in_course: HashSet<&str> = course_lessons.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let completed_lessons: Vec<String> = completed
        .iter()
        .filter(|id| in_course.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect();

    let total = in_course.len();
    let done = completed_lessons.len();

    ProgressSummary {
        progress: percent(done, total),
        is_completed: total > 0 && done == total,
        completed: done,
        total,
        completed_lessons,
    }
}

pub async fn load(pool: &SqlitePool, enrollment: &Enrollment) -> Result<ProgressSummary> {
    let course_lessons = queries::lesson_ids_of_course(pool, &enrollment.course_id).await?;
    let completed = queries::completed_lesson_ids(pool, &enrollment.id).await?;
    Ok(summarize(&course_lessons, &completed))
}

/// Idempotent: completing a lesson twice leaves a single record.
pub async fn mark_complete(
    pool: &SqlitePool,
    enrollment_id: &str,
    lesson_id: &str,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT OR IGNORE INTO completed_lessons (enrollment_id, lesson_id, completed_at) VALUES (?, ?, ?)",
    )
    .bind(enrollment_id)
    .bind(lesson_id)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query(
        "UPDATE enrollments SET last_accessed_lesson_id = ?, last_accessed_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(lesson_id)
    .bind(&now)
    .bind(&now)
    .bind(enrollment_id)
    .execute(pool)
    .await?;

    Ok(())
}
