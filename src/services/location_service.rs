use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::locations::{CreateLocationRequest, LocationList},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Location,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
};

pub async fn list_locations(
    pool: &DbPool,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<LocationList>> {
    let (page, limit, offset) = pagination.normalize();
    let items = sqlx::query_as::<_, Location>(
        "SELECT * FROM locations WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM locations WHERE user_id = $1")
        .bind(user.user_id)
        .fetch_one(pool)
        .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("OK", LocationList { items }, Some(meta)))
}

pub async fn create_location(
    pool: &DbPool,
    user: &AuthUser,
    payload: CreateLocationRequest,
) -> AppResult<ApiResponse<Location>> {
    if payload.name.trim().is_empty() || payload.address.trim().is_empty() {
        return Err(AppError::BadRequest(
            "name and address must not be empty".into(),
        ));
    }

    let location: Location = sqlx::query_as(
        "INSERT INTO locations (id, user_id, name, address) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(payload.name)
    .bind(payload.address)
    .fetch_one(pool)
    .await?;

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "location_create",
        Some("locations"),
        Some(serde_json::json!({ "location_id": location.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Location created",
        location,
        Some(Meta::empty()),
    ))
}

pub async fn delete_location(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    // Orders keep pointing at their delivery location; refuse instead of
    // breaking that reference.
    let referenced: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE location_id = $1")
        .bind(id)
        .fetch_one(pool)
        .await?;
    if referenced.0 > 0 {
        return Err(AppError::BadRequest(
            "location is used by existing orders".into(),
        ));
    }

    let result = sqlx::query("DELETE FROM locations WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user.user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        pool,
        Some(user.user_id),
        "location_delete",
        Some("locations"),
        Some(serde_json::json!({ "location_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
