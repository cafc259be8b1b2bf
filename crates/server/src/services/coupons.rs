//! Single-use access codes of the form `PREFIX-XXXX-YYYY`.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::{
        models::{Coupon, Enrollment, PaymentStatus},
        queries::COUPON_COLUMNS,
    },
    error::{AppError, Result},
    services::enrollment,
};

pub const DEFAULT_PREFIX: &str = "TIO";
pub const MAX_BATCH: u32 = 500;
const MAX_ATTEMPTS: usize = 5;

pub fn normalize_prefix(prefix: Option<&str>) -> Result<String> {
    let prefix = prefix
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PREFIX)
        .to_ascii_uppercase();

    if prefix.len() > 12 || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::Validation(
            "Prefix must be 1-12 letters or digits".to_string(),
        ));
    }
    Ok(prefix)
}

/// Codes are stored uppercase; redemption input is matched the same way.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

pub fn generate_code<R: RngCore>(rng: &mut R, prefix: &str) -> String {
    let mut bytes = [0u8; 4];
    rng.fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
    format!("{prefix}-{}-{}", &hex[..4], &hex[4..])
}

/// Generates `count` codes for a course. Collisions with existing codes are
/// rejected by the unique index and retried with a fresh code.
pub async fn generate_batch(
    pool: &SqlitePool,
    course_id: &str,
    count: u32,
    prefix: &str,
) -> Result<Vec<Coupon>> {
    if count == 0 || count > MAX_BATCH {
        return Err(AppError::Validation(format!(
            "Count must be between 1 and {MAX_BATCH}"
        )));
    }

    let mut tx = pool.begin().await?;
    let mut coupons = Vec::with_capacity(count as usize);
    let now = Utc::now().to_rfc3339();

    for _ in 0..count {
        let mut attempt = 0;
        let coupon = loop {
            attempt += 1;
            let code = generate_code(&mut OsRng, prefix);
            let inserted = sqlx::query_as::<_, Coupon>(&format!(
                "INSERT INTO coupons (id, code, course_id, is_used, created_at) VALUES (?, ?, ?, 0, ?) RETURNING {COUPON_COLUMNS}"
            ))
            .bind(Uuid::new_v4().to_string())
            .bind(&code)
            .bind(course_id)
            .bind(&now)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::from);

            match inserted {
                Ok(coupon) => break coupon,
                Err(AppError::Conflict(_)) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(%code, attempt, "coupon code collision, regenerating");
                }
                Err(err) => return Err(err),
            }
        };
        coupons.push(coupon);
    }

    tx.commit().await?;
    Ok(coupons)
}

/// Burns the coupon and activates the caller's enrollment in one transaction.
/// Any rejection leaves both the coupon and the enrollment untouched.
///
/// The claim is the first statement so the transaction takes the write lock
/// up front; concurrent redeemers queue on the busy timeout and then find the
/// coupon already used.
pub async fn redeem(
    pool: &SqlitePool,
    student_id: &str,
    course_id: &str,
    code: &str,
) -> Result<(Coupon, Enrollment)> {
    let code = normalize_code(code);
    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;

    let coupon = sqlx::query_as::<_, Coupon>(&format!(
        "UPDATE coupons SET is_used = 1, used_by = ?, used_at = ? \
         WHERE code = ? AND course_id = ? AND is_used = 0 RETURNING {COUPON_COLUMNS}"
    ))
    .bind(student_id)
    .bind(&now)
    .bind(&code)
    .bind(course_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::InvalidCoupon)?;

    // Dropping the transaction on an early return puts the coupon back
    let existing = sqlx::query_scalar::<_, PaymentStatus>(
        "SELECT payment_status FROM enrollments WHERE student_id = ? AND course_id = ?",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_optional(&mut *tx)
    .await?;
    let plan = enrollment::plan_redeem(existing, &coupon.code)?;

    let enrollment = enrollment::upsert(&mut *tx, student_id, course_id, &plan, None).await?;

    tx.commit().await?;

    tracing::info!(
        coupon = %coupon.code,
        student_id,
        course_id,
        "coupon redeemed"
    );
    Ok((coupon, enrollment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_has_prefix_and_two_hex_groups() {
        let code = generate_code(&mut OsRng, "TIO");
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TIO");
        for group in &parts[1..] {
            assert_eq!(group.len(), 4);
            assert!(group
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        }
    }

    #[test]
    fn codes_differ_between_draws() {
        let a = generate_code(&mut OsRng, "X");
        let b = generate_code(&mut OsRng, "X");
        // 32 bits of entropy; a repeat here means the RNG is broken
        assert_ne!(a, b);
    }

    #[test]
    fn prefix_defaults_and_uppercases() {
        assert_eq!(normalize_prefix(None).unwrap(), "TIO");
        assert_eq!(normalize_prefix(Some("  uni ")).unwrap(), "UNI");
        assert!(normalize_prefix(Some("BAD-PREFIX")).is_err());
    }

    #[test]
    fn redemption_input_is_normalized() {
        assert_eq!(normalize_code(" tio-ab12-cd34 "), "TIO-AB12-CD34");
    }
}
