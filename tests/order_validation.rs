use axum_marketplace_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::orders::{OrderLineRequest, PlaceOrderRequest},
    entity::{
        locations::ActiveModel as LocationActive, products::ActiveModel as ProductActive,
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::AuthUser,
    services::order_service,
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

// Requests that fail validation or the verified-account check never reach
// the transactional core, so no row or counter moves.
#[tokio::test]
async fn place_order_rejects_bad_requests_before_touching_storage() -> anyhow::Result<()> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let user_id = create_user(&state, "user", "buyer2@example.com", true).await?;
    let unverified_id = create_user(&state, "user", "newcomer@example.com", false).await?;
    let vendor_id = create_user(&state, "vendor", "vendor-c@example.com", true).await?;
    let location_id = create_location(&state, user_id, "Office").await?;
    let product_id = create_product(&state, vendor_id, "Widget", 100, 20).await?;

    let buyer = AuthUser {
        user_id,
        role: "user".into(),
    };

    // Unverified accounts cannot order at all.
    let err = order_service::place_order(
        &state,
        &AuthUser {
            user_id: unverified_id,
            role: "user".into(),
        },
        PlaceOrderRequest {
            total_cost: 100,
            location_id,
            products: vec![OrderLineRequest {
                product_id,
                quantity: 1,
            }],
        },
    )
    .await
    .expect_err("unverified account");
    assert!(matches!(err, AppError::Forbidden));

    // Empty cart, foreign location, unknown product and non-positive
    // quantity all end up in the validation errors map.
    let err = order_service::place_order(
        &state,
        &buyer,
        PlaceOrderRequest {
            total_cost: 0,
            location_id: Uuid::new_v4(),
            products: vec![],
        },
    )
    .await
    .expect_err("invalid request");
    let errors = match err {
        AppError::Validation(errors) => errors,
        other => panic!("expected validation error, got {other:?}"),
    };
    assert!(errors.get("location_id").is_some());
    assert!(errors.get("products").is_some());

    let err = order_service::place_order(
        &state,
        &buyer,
        PlaceOrderRequest {
            total_cost: 0,
            location_id,
            products: vec![
                OrderLineRequest {
                    product_id: Uuid::new_v4(),
                    quantity: 1,
                },
                OrderLineRequest {
                    product_id,
                    quantity: 0,
                },
            ],
        },
    )
    .await
    .expect_err("invalid lines");
    let errors = match err {
        AppError::Validation(errors) => errors,
        other => panic!("expected validation error, got {other:?}"),
    };
    assert!(errors.get("products.0.product_id").is_some());
    assert!(errors.get("products.1.quantity").is_some());

    // Nothing was written along the way.
    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(total.0, 0);
    let counters: (i32, i32) =
        sqlx::query_as("SELECT stock, times_ordered FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_one(&state.pool)
            .await?;
    assert_eq!(counters, (20, 0));

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_products, orders, cart_items, locations, audit_logs, products, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState { pool, orm })
}

async fn create_user(
    state: &AppState,
    role: &str,
    email: &str,
    verified: bool,
) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        phone: Set(None),
        role: Set(role.into()),
        verified: Set(verified),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn create_location(state: &AppState, user_id: Uuid, name: &str) -> anyhow::Result<Uuid> {
    let location = LocationActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        name: Set(name.into()),
        address: Set("1 Main Street".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(location.id)
}

async fn create_product(
    state: &AppState,
    vendor_id: Uuid,
    name: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        vendor_id: Set(vendor_id),
        name: Set(name.into()),
        description: Set(None),
        price: Set(price),
        stock: Set(stock),
        times_ordered: Set(0),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(product.id)
}
