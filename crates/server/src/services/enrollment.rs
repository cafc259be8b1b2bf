//! Payment-state transitions for enrollments.
//!
//! `none -> pending -> paid`, `none -> paid` for free courses and coupons, and
//! `pending -> failed` when an administrator rejects a transfer. An enrollment
//! that already grants access is never rewritten.

use chrono::Utc;
use serde::Serialize;
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

use crate::{
    db::{
        models::{Course, Enrollment, PaymentStatus},
        queries::ENROLLMENT_COLUMNS,
    },
    error::{AppError, Result},
};

pub const DEFAULT_PAYMENT_METHOD: &str = "manual_transfer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    InstantAccess,
    PaymentRequired,
}

impl From<PaymentStatus> for Strategy {
    fn from(status: PaymentStatus) -> Self {
        if status.grants_access() {
            Strategy::InstantAccess
        } else {
            Strategy::PaymentRequired
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub status: PaymentStatus,
    pub amount_paid: i64,
    pub payment_method: String,
    pub payment_id: Option<String>,
}

/// Student-initiated enrollment.
pub fn plan_enroll(
    course: &Course,
    existing: Option<PaymentStatus>,
    payment_method: Option<&str>,
) -> Result<Plan> {
    match existing {
        Some(status) if status.grants_access() => return Err(AppError::AlreadyEnrolled),
        Some(PaymentStatus::Failed) => {
            return Err(AppError::Conflict(
                "Your previous payment was rejected. Please contact an administrator.".to_string(),
            ))
        }
        _ => {}
    }

    if course.is_free() {
        return Ok(Plan {
            status: PaymentStatus::Paid,
            amount_paid: 0,
            payment_method: "none".to_string(),
            payment_id: None,
        });
    }

    let method = payment_method
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_PAYMENT_METHOD);
    if method.len() > 50 {
        return Err(AppError::Validation("Payment method is too long".to_string()));
    }

    Ok(Plan {
        status: PaymentStatus::Pending,
        amount_paid: course.price,
        payment_method: method.to_string(),
        payment_id: None,
    })
}

/// Coupon redemption always lands in `paid`, unless access is already granted.
pub fn plan_redeem(existing: Option<PaymentStatus>, code: &str) -> Result<Plan> {
    if existing.is_some_and(|s| s.grants_access()) {
        return Err(AppError::AlreadyEnrolled);
    }
    Ok(Plan {
        status: PaymentStatus::Paid,
        amount_paid: 0,
        payment_method: "access_code".to_string(),
        payment_id: Some(format!("CODE-{code}")),
    })
}

/// Administrator confirming a manual transfer.
pub fn plan_approve(course: &Course, existing: Option<PaymentStatus>) -> Result<Plan> {
    let payment_method = match existing {
        Some(status) if status.grants_access() => return Err(AppError::AlreadyEnrolled),
        Some(_) => "manual_transfer_verified",
        None => "manual_transfer_admin_force",
    };
    Ok(Plan {
        status: PaymentStatus::Paid,
        amount_paid: course.price,
        payment_method: payment_method.to_string(),
        payment_id: None,
    })
}

pub fn ensure_rejectable(existing: Option<PaymentStatus>) -> Result<()> {
    match existing {
        Some(PaymentStatus::Pending) => Ok(()),
        None => Err(AppError::NotFound("Enrollment not found".to_string())),
        Some(_) => Err(AppError::Conflict(
            "Only pending enrollments can be rejected".to_string(),
        )),
    }
}

/// Inserts or updates the single enrollment row for (student, course).
///
/// The update half refuses to touch an enrollment that already grants access,
/// so a racing request cannot downgrade it; that case surfaces as
/// `AlreadyEnrolled`.
pub async fn upsert<'e, E>(
    executor: E,
    student_id: &str,
    course_id: &str,
    plan: &Plan,
    confirmed_email: Option<&str>,
) -> Result<Enrollment>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now().to_rfc3339();

    let enrollment = sqlx::query_as::<_, Enrollment>(&format!(
        r#"
        INSERT INTO enrollments
            (id, student_id, course_id, payment_status, payment_method, payment_id, amount_paid, confirmed_email, enrolled_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (student_id, course_id) DO UPDATE SET
            payment_status = excluded.payment_status,
            payment_method = excluded.payment_method,
            payment_id = COALESCE(excluded.payment_id, enrollments.payment_id),
            amount_paid = excluded.amount_paid,
            confirmed_email = COALESCE(excluded.confirmed_email, enrollments.confirmed_email),
            updated_at = excluded.updated_at
        WHERE enrollments.payment_status NOT IN ('paid', 'free')
        RETURNING {ENROLLMENT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(student_id)
    .bind(course_id)
    .bind(plan.status)
    .bind(&plan.payment_method)
    .bind(&plan.payment_id)
    .bind(plan.amount_paid)
    .bind(confirmed_email)
    .bind(&now)
    .bind(&now)
    .fetch_optional(executor)
    .await?
    .ok_or(AppError::AlreadyEnrolled)?;

    Ok(enrollment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::CourseLevel;

    fn course(price: i64) -> Course {
        Course {
            id: "c1".into(),
            title: "Python for Data Analysis".into(),
            description: "Pandas".into(),
            tutor_id: "t1".into(),
            price,
            category: "Data Science".into(),
            level: CourseLevel::Beginner,
            thumbnail: "no-photo.jpg".into(),
            is_published: true,
            live_session_url: String::new(),
            next_session_date: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn free_course_is_paid_with_zero_amount() {
        let plan = plan_enroll(&course(0), None, Some("card")).unwrap();
        assert_eq!(plan.status, PaymentStatus::Paid);
        assert_eq!(plan.amount_paid, 0);
        assert_eq!(Strategy::from(plan.status), Strategy::InstantAccess);
    }

    #[test]
    fn paid_course_goes_pending_at_full_price() {
        let plan = plan_enroll(&course(30000), None, None).unwrap();
        assert_eq!(plan.status, PaymentStatus::Pending);
        assert_eq!(plan.amount_paid, 30000);
        assert_eq!(plan.payment_method, DEFAULT_PAYMENT_METHOD);
        assert_eq!(Strategy::from(plan.status), Strategy::PaymentRequired);
    }

    #[test]
    fn pending_enrollment_can_be_resubmitted() {
        let plan = plan_enroll(&course(30000), Some(PaymentStatus::Pending), Some("bank")).unwrap();
        assert_eq!(plan.status, PaymentStatus::Pending);
        assert_eq!(plan.payment_method, "bank");
    }

    #[test]
    fn active_enrollment_rejects_every_entry_path() {
        for status in [PaymentStatus::Paid, PaymentStatus::Free] {
            assert!(matches!(
                plan_enroll(&course(0), Some(status), None),
                Err(AppError::AlreadyEnrolled)
            ));
            assert!(matches!(
                plan_redeem(Some(status), "TIO-AAAA-BBBB"),
                Err(AppError::AlreadyEnrolled)
            ));
            assert!(matches!(
                plan_approve(&course(100), Some(status)),
                Err(AppError::AlreadyEnrolled)
            ));
        }
    }

    #[test]
    fn failed_enrollment_is_terminal_for_students() {
        assert!(matches!(
            plan_enroll(&course(100), Some(PaymentStatus::Failed), None),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn redeem_records_the_code() {
        let plan = plan_redeem(Some(PaymentStatus::Pending), "TIO-1A2B-3C4D").unwrap();
        assert_eq!(plan.status, PaymentStatus::Paid);
        assert_eq!(plan.payment_id.as_deref(), Some("CODE-TIO-1A2B-3C4D"));
    }

    #[test]
    fn only_pending_can_be_rejected() {
        assert!(ensure_rejectable(Some(PaymentStatus::Pending)).is_ok());
        assert!(ensure_rejectable(Some(PaymentStatus::Paid)).is_err());
        assert!(matches!(ensure_rejectable(None), Err(AppError::NotFound(_))));
    }
}
