//! Curriculum deletion. Children go first, then the parent, all inside one
//! transaction so a failure leaves the tree intact.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::Result;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Removed {
    pub modules: u64,
    pub lessons: u64,
    pub assignments: u64,
    pub submissions: u64,
    pub enrollments: u64,
    pub coupons: u64,
}

pub async fn delete_course(pool: &SqlitePool, course_id: &str) -> Result<Removed> {
    let mut tx = pool.begin().await?;
    let mut removed = Removed::default();

    let module_ids = sqlx::query_scalar::<_, String>("SELECT id FROM modules WHERE course_id = ?")
        .bind(course_id)
        .fetch_all(&mut *tx)
        .await?;
    for module_id in &module_ids {
        let r = remove_module(&mut tx, module_id).await?;
        removed.lessons += r.lessons;
        removed.assignments += r.assignments;
        removed.submissions += r.submissions;
        removed.modules += r.modules;
    }

    // Enrollment children first: progress rows reference the enrollment
    for table in ["completed_lessons", "quiz_scores"] {
        sqlx::query(&format!(
            "DELETE FROM {table} WHERE enrollment_id IN (SELECT id FROM enrollments WHERE course_id = ?)"
        ))
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    }
    removed.enrollments = sqlx::query("DELETE FROM enrollments WHERE course_id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    removed.coupons = sqlx::query("DELETE FROM coupons WHERE course_id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(removed)
}

pub async fn delete_module(pool: &SqlitePool, module_id: &str) -> Result<Removed> {
    let mut tx = pool.begin().await?;
    let removed = remove_module(&mut tx, module_id).await?;
    tx.commit().await?;
    Ok(removed)
}

pub async fn delete_lesson(pool: &SqlitePool, lesson_id: &str) -> Result<()> {
    let mut tx = pool.begin().await?;
    remove_lesson_progress(&mut tx, "lesson_id = ?", lesson_id).await?;
    sqlx::query("DELETE FROM lessons WHERE id = ?")
        .bind(lesson_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn delete_assignment(pool: &SqlitePool, assignment_id: &str) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let submissions = sqlx::query("DELETE FROM submissions WHERE assignment_id = ?")
        .bind(assignment_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM assignments WHERE id = ?")
        .bind(assignment_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(submissions)
}

async fn remove_module(conn: &mut SqliteConnection, module_id: &str) -> Result<Removed> {
    let submissions = sqlx::query(
        "DELETE FROM submissions WHERE assignment_id IN (SELECT id FROM assignments WHERE module_id = ?)",
    )
    .bind(module_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let assignments = sqlx::query("DELETE FROM assignments WHERE module_id = ?")
        .bind(module_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    remove_lesson_progress(
        conn,
        "lesson_id IN (SELECT id FROM lessons WHERE module_id = ?)",
        module_id,
    )
    .await?;

    let lessons = sqlx::query("DELETE FROM lessons WHERE module_id = ?")
        .bind(module_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    let modules = sqlx::query("DELETE FROM modules WHERE id = ?")
        .bind(module_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok(Removed {
        modules,
        lessons,
        assignments,
        submissions,
        ..Removed::default()
    })
}

async fn remove_lesson_progress(
    conn: &mut SqliteConnection,
    predicate: &str,
    bind: &str,
) -> Result<()> {
    for table in ["completed_lessons", "quiz_scores"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE {predicate}"))
            .bind(bind)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
