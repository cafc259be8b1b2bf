use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    db::{
        models::Coupon,
        queries::{self, COUPON_COLUMNS},
    },
    error::Result,
    middleware::auth::AuthUser,
    services::{access, coupons},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_coupons))
        .route("/generate", post(generate_coupons))
        .route("/:id", delete(delete_coupon))
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub course_id: String,
    #[serde(default = "default_count")]
    pub count: u32,
    pub prefix: Option<String>,
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct ListCouponsQuery {
    pub course_id: Option<String>,
    pub is_used: Option<bool>,
}

async fn generate_coupons(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    access::require_role(&user, access::ADMINS)?;
    let course = queries::find_course(&state.db.pool, &body.course_id).await?;
    let prefix = coupons::normalize_prefix(body.prefix.as_deref())?;

    let generated = coupons::generate_batch(&state.db.pool, &course.id, body.count, &prefix).await?;
    tracing::info!(course_id = %course.id, count = generated.len(), %prefix, "coupons generated");

    let codes: Vec<&str> = generated.iter().map(|c| c.code.as_str()).collect();
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "count": generated.len(),
            "codes": codes,
            "data": generated,
        })),
    ))
}

async fn list_coupons(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListCouponsQuery>,
) -> Result<Json<Value>> {
    access::require_role(&user, access::ADMINS)?;

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE 1 = 1"));
    if let Some(course_id) = query.course_id {
        builder.push(" AND course_id = ");
        builder.push_bind(course_id);
    }
    if let Some(is_used) = query.is_used {
        builder.push(" AND is_used = ");
        builder.push_bind(is_used);
    }
    builder.push(" ORDER BY created_at DESC, code ASC");

    let coupons = builder
        .build_query_as::<Coupon>()
        .fetch_all(&state.db.pool)
        .await?;

    Ok(Json(json!({
        "success": true,
        "count": coupons.len(),
        "data": coupons,
    })))
}

async fn delete_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    access::require_role(&user, access::ADMINS)?;
    let coupon = queries::find_coupon(&state.db.pool, &id).await?;

    sqlx::query("DELETE FROM coupons WHERE id = ?")
        .bind(&coupon.id)
        .execute(&state.db.pool)
        .await?;
    tracing::info!(coupon_id = %coupon.id, code = %coupon.code, "coupon deleted");

    Ok(Json(json!({ "success": true, "data": {} })))
}
