use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{OrderDetail, OrderLineDto, OrderList, OrderLineRequest, PlaceOrderRequest},
    entity::{
        order_products::{ActiveModel as OrderProductActive, Column as OrderProductCol, Entity as OrderProducts},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{ActiveModel as ProductActive, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Order,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// Lines destined for one vendor, in the order they were first seen while
/// scanning the cart.
struct VendorGroup {
    vendor_id: Uuid,
    lines: Vec<GroupedLine>,
}

struct GroupedLine {
    product_id: Uuid,
    price: i64,
    quantity: i32,
}

/// Fan a cart into one aggregate order plus one order per distinct vendor,
/// decrementing stock along the way. Everything runs in a single transaction;
/// any failure rolls the whole placement back and surfaces as the one generic
/// business error.
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    validate_placement(state, user, &payload).await?;

    let txn = state.orm.begin().await?;
    let order_id = match run_placement(&txn, user, &payload).await {
        Ok(id) => {
            txn.commit().await?;
            id
        }
        Err(err) => {
            txn.rollback().await?;
            tracing::warn!(
                error = %err,
                user_id = %user.user_id,
                "order placement rolled back"
            );
            return Err(AppError::OrderRejected);
        }
    };

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_place",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::message_only("order added successfully"))
}

/// Request-shape and foreign-key checks, done before the transactional core
/// runs. Collects every field failure into one errors map.
async fn validate_placement(
    state: &AppState,
    user: &AuthUser,
    payload: &PlaceOrderRequest,
) -> AppResult<()> {
    let verified: Option<(bool,)> = sqlx::query_as("SELECT verified FROM users WHERE id = $1")
        .bind(user.user_id)
        .fetch_optional(&state.pool)
        .await?;
    if !matches!(verified, Some((true,))) {
        return Err(AppError::Forbidden);
    }

    let mut errors = serde_json::Map::new();

    if payload.total_cost < 0 {
        errors.insert(
            "total_cost".into(),
            serde_json::json!("must be greater than or equal to 0"),
        );
    }

    let location: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM locations WHERE id = $1 AND user_id = $2")
            .bind(payload.location_id)
            .bind(user.user_id)
            .fetch_optional(&state.pool)
            .await?;
    if location.is_none() {
        errors.insert("location_id".into(), serde_json::json!("location not found"));
    }

    if payload.products.is_empty() {
        errors.insert(
            "products".into(),
            serde_json::json!("at least one product is required"),
        );
    }

    for (index, line) in payload.products.iter().enumerate() {
        if line.quantity < 1 {
            errors.insert(
                format!("products.{index}.quantity"),
                serde_json::json!("must be at least 1"),
            );
        }
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1")
            .bind(line.product_id)
            .fetch_optional(&state.pool)
            .await?;
        if exists.is_none() {
            errors.insert(
                format!("products.{index}.product_id"),
                serde_json::json!("product not found"),
            );
        }
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(serde_json::Value::Object(errors)));
    }

    Ok(())
}

async fn run_placement(
    txn: &DatabaseTransaction,
    user: &AuthUser,
    payload: &PlaceOrderRequest,
) -> AppResult<Uuid> {
    // The aggregate order keeps the caller's claimed total verbatim; vendor
    // totals below are recomputed from authoritative prices.
    let aggregate = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        vendor_id: Set(None),
        location_id: Set(payload.location_id),
        parent_order_id: Set(None),
        status: Set("pending".into()),
        total_cost: Set(payload.total_cost),
        item_count: Set(payload.products.len() as i32),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await?;

    let mut groups: Vec<VendorGroup> = Vec::new();

    for line in &payload.products {
        let product = Products::find_by_id(line.product_id)
            .lock(LockType::Update)
            .one(txn)
            .await?;
        let product = match product {
            Some(p) => p,
            None => return Err(AppError::NotFound),
        };

        if product.stock < line.quantity {
            return Err(AppError::BadRequest(format!(
                "insufficient stock for product {}",
                product.id
            )));
        }

        let vendor_id = product.vendor_id;
        let price = product.price;
        let stock = product.stock;
        let times_ordered = product.times_ordered;

        let mut active: ProductActive = product.into();
        active.stock = Set(stock - line.quantity);
        // counts orders, not units
        active.times_ordered = Set(times_ordered + 1);
        active.update(txn).await?;

        push_line(&mut groups, vendor_id, line, price);

        attach_line(txn, aggregate.id, line.product_id, line.quantity).await?;
    }

    for group in &groups {
        let vendor_order = OrderActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.user_id),
            vendor_id: Set(Some(group.vendor_id)),
            location_id: Set(payload.location_id),
            parent_order_id: Set(Some(aggregate.id)),
            status: Set("pending".into()),
            total_cost: Set(0),
            item_count: Set(group.lines.len() as i32),
            created_at: NotSet,
            updated_at: NotSet,
        }
        .insert(txn)
        .await?;

        let mut total: i64 = 0;
        for line in &group.lines {
            total += line.price * i64::from(line.quantity);
            attach_line(txn, vendor_order.id, line.product_id, line.quantity).await?;
        }

        let mut active: OrderActive = vendor_order.into();
        active.total_cost = Set(total);
        active.updated_at = Set(Utc::now().into());
        active.update(txn).await?;
    }

    Ok(aggregate.id)
}

fn push_line(groups: &mut Vec<VendorGroup>, vendor_id: Uuid, line: &OrderLineRequest, price: i64) {
    let grouped = GroupedLine {
        product_id: line.product_id,
        price,
        quantity: line.quantity,
    };
    match groups.iter_mut().find(|g| g.vendor_id == vendor_id) {
        Some(group) => group.lines.push(grouped),
        None => groups.push(VendorGroup {
            vendor_id,
            lines: vec![grouped],
        }),
    }
}

async fn attach_line(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> AppResult<()> {
    OrderProductActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        product_id: Set(product_id),
        quantity: Set(quantity),
        created_at: NotSet,
    }
    .insert(txn)
    .await?;
    Ok(())
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all()
        .add(OrderCol::UserId.eq(user.user_id))
        .add(OrderCol::VendorId.is_null());
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let lines = OrderProducts::find()
        .filter(OrderProductCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|line| OrderLineDto {
            product_id: line.product_id,
            quantity: line.quantity,
        })
        .collect();

    let sub_orders = Orders::find()
        .filter(OrderCol::ParentOrderId.eq(order.id))
        .order_by_asc(OrderCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderDetail {
            order: order_from_entity(order),
            lines,
            sub_orders,
        },
        Some(Meta::empty()),
    ))
}

/// Deleting reports HTTP 200 whether or not a row was removed; only the
/// message differs. Vendor sub-orders and line rows go away through the
/// storage cascade, stock is not restored.
pub async fn delete_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM orders WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user.user_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Ok(ApiResponse::message_only("failed to delete order"));
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_delete",
        Some("orders"),
        Some(serde_json::json!({ "order_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::message_only("order deleted successfully"))
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        vendor_id: model.vendor_id,
        location_id: model.location_id,
        parent_order_id: model.parent_order_id,
        status: model.status,
        total_cost: model.total_cost,
        item_count: model.item_count,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}
