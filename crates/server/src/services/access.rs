//! Authorization decisions.
//!
//! Routes gate on two things: a static role allow-list, and a decision about
//! the caller's relationship to the course that (transitively) owns the
//! resource. Both are plain functions so handlers read as a sequence of checks.

use sqlx::SqlitePool;

use crate::{
    db::{
        models::{Course, Enrollment, PaymentStatus, Role},
        queries,
    },
    error::{AppError, Result},
    middleware::auth::AuthUser,
};

pub const AUTHORS: &[Role] = &[Role::Tutor, Role::Admin];
pub const ADMINS: &[Role] = &[Role::Admin];

/// How a caller relates to a course's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Admin,
    Owner,
    Enrolled,
    /// Not enrolled, but the content is marked as a free preview.
    Preview,
    Denied(Denial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    NotEnrolled,
    PaymentPending,
    PaymentFailed,
}

impl Access {
    pub fn is_granted(&self) -> bool {
        !matches!(self, Access::Denied(_))
    }

    pub fn can_manage(&self) -> bool {
        matches!(self, Access::Admin | Access::Owner)
    }
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        let message = match denial {
            Denial::NotEnrolled => "Access denied. You must be enrolled to view this content.",
            Denial::PaymentPending => "Access denied. Your payment is awaiting verification.",
            Denial::PaymentFailed => "Access denied. Your payment could not be verified.",
        };
        AppError::Forbidden(message.to_string())
    }
}

pub fn decide(
    user: &AuthUser,
    course: &Course,
    enrollment: Option<&Enrollment>,
    preview: bool,
) -> Access {
    if user.is_admin() {
        return Access::Admin;
    }
    if course.tutor_id == user.id {
        return Access::Owner;
    }

    let status = enrollment
        .filter(|e| e.student_id == user.id && e.course_id == course.id)
        .map(|e| e.payment_status);

    match status {
        Some(status) if status.grants_access() => Access::Enrolled,
        _ if preview => Access::Preview,
        Some(PaymentStatus::Pending) => Access::Denied(Denial::PaymentPending),
        Some(PaymentStatus::Failed) => Access::Denied(Denial::PaymentFailed),
        _ => Access::Denied(Denial::NotEnrolled),
    }
}

pub fn require_role(user: &AuthUser, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "User role '{}' is not authorized to access this route",
            user.role.as_str()
        )))
    }
}

pub fn can_manage(user: &AuthUser, course: &Course) -> bool {
    user.is_admin() || course.tutor_id == user.id
}

/// Owner-or-admin check on the course that owns the resource being changed.
pub fn ensure_manager(user: &AuthUser, course: &Course, action: &str) -> Result<()> {
    if can_manage(user, course) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "User not authorized to {action}"
        )))
    }
}

/// Loads the caller's enrollment and resolves their access to the course.
pub async fn course_access(
    pool: &SqlitePool,
    user: &AuthUser,
    course: &Course,
    preview: bool,
) -> Result<Access> {
    if can_manage(user, course) {
        return Ok(decide(user, course, None, preview));
    }
    let enrollment = queries::find_enrollment(pool, &user.id, &course.id).await?;
    Ok(decide(user, course, enrollment.as_ref(), preview))
}

pub async fn ensure_course_access(
    pool: &SqlitePool,
    user: &AuthUser,
    course: &Course,
    preview: bool,
) -> Result<Access> {
    match course_access(pool, user, course, preview).await? {
        Access::Denied(denial) => Err(denial.into()),
        granted => Ok(granted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::CourseLevel;

    fn user(id: &str, role: Role) -> AuthUser {
        AuthUser {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            name: id.to_string(),
            role,
        }
    }

    fn course(tutor: &str) -> Course {
        Course {
            id: "course-1".into(),
            title: "SPSS for Data Analysis".into(),
            description: "Statistics".into(),
            tutor_id: tutor.into(),
            price: 20000,
            category: "Statistical Analysis".into(),
            level: CourseLevel::Beginner,
            thumbnail: "no-photo.jpg".into(),
            is_published: true,
            live_session_url: String::new(),
            next_session_date: None,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    fn enrollment(student: &str, status: PaymentStatus) -> Enrollment {
        Enrollment {
            id: "enr-1".into(),
            student_id: student.into(),
            course_id: "course-1".into(),
            payment_status: status,
            payment_method: "manual_transfer".into(),
            payment_id: None,
            amount_paid: 0,
            confirmed_email: None,
            last_accessed_lesson_id: None,
            last_accessed_at: None,
            certificate_id: None,
            certificate_issued_at: None,
            completion_date: None,
            enrolled_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn admin_always_passes() {
        let admin = user("root", Role::Admin);
        let access = decide(&admin, &course("tutor"), None, false);
        assert_eq!(access, Access::Admin);
        assert!(access.can_manage());
    }

    #[test]
    fn owner_manages_own_course_only() {
        let tutor = user("tutor", Role::Tutor);
        assert_eq!(decide(&tutor, &course("tutor"), None, false), Access::Owner);
        assert_eq!(
            decide(&tutor, &course("someone-else"), None, false),
            Access::Denied(Denial::NotEnrolled)
        );
    }

    #[test]
    fn paid_enrollment_grants_access() {
        let student = user("alice", Role::Student);
        let paid = enrollment("alice", PaymentStatus::Paid);
        let access = decide(&student, &course("tutor"), Some(&paid), false);
        assert_eq!(access, Access::Enrolled);
        assert!(!access.can_manage());
    }

    #[test]
    fn pending_enrollment_is_denied_unless_preview() {
        let student = user("alice", Role::Student);
        let pending = enrollment("alice", PaymentStatus::Pending);
        assert_eq!(
            decide(&student, &course("tutor"), Some(&pending), false),
            Access::Denied(Denial::PaymentPending)
        );
        assert_eq!(
            decide(&student, &course("tutor"), Some(&pending), true),
            Access::Preview
        );
    }

    #[test]
    fn foreign_enrollment_is_ignored() {
        let student = user("bob", Role::Student);
        let other = enrollment("alice", PaymentStatus::Paid);
        assert_eq!(
            decide(&student, &course("tutor"), Some(&other), false),
            Access::Denied(Denial::NotEnrolled)
        );
    }

    #[test]
    fn role_gate_is_absolute() {
        let student = user("tutor", Role::Student);
        assert!(require_role(&student, AUTHORS).is_err());
        assert!(require_role(&user("t", Role::Tutor), AUTHORS).is_ok());
        assert!(require_role(&user("t", Role::Tutor), ADMINS).is_err());
    }
}
