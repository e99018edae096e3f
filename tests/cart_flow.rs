use axum_marketplace_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::cart::AddToCartRequest,
    dto::locations::CreateLocationRequest,
    entity::{products::ActiveModel as ProductActive, users::ActiveModel as UserActive},
    error::AppError,
    middleware::auth::AuthUser,
    routes::params::Pagination,
    services::{cart_service, location_service},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

// Cart upserts are bounded by stock; locations are plain per-user CRUD.
#[tokio::test]
async fn cart_and_location_flow() -> anyhow::Result<()> {
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

    let user_id = create_user(&state, "user", "shopper@example.com").await?;
    let vendor_id = create_user(&state, "vendor", "vendor-d@example.com").await?;
    let product_id = create_product(&state, vendor_id, "Widget", 100, 5).await?;

    let shopper = AuthUser {
        user_id,
        role: "user".into(),
    };

    // Requests outside the quantity bounds never reach the table.
    let err = cart_service::add_to_cart(
        &state.pool,
        &shopper,
        AddToCartRequest {
            product_id,
            quantity: 0,
        },
    )
    .await
    .expect_err("zero quantity");
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = cart_service::add_to_cart(
        &state.pool,
        &shopper,
        AddToCartRequest {
            product_id,
            quantity: 6,
        },
    )
    .await
    .expect_err("more than stock");
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = cart_service::add_to_cart(
        &state.pool,
        &shopper,
        AddToCartRequest {
            product_id: Uuid::new_v4(),
            quantity: 1,
        },
    )
    .await
    .expect_err("unknown product");
    assert!(matches!(err, AppError::BadRequest(_)));

    // Adding twice keeps one line and replaces the quantity.
    cart_service::add_to_cart(
        &state.pool,
        &shopper,
        AddToCartRequest {
            product_id,
            quantity: 2,
        },
    )
    .await?;
    let updated = cart_service::add_to_cart(
        &state.pool,
        &shopper,
        AddToCartRequest {
            product_id,
            quantity: 4,
        },
    )
    .await?;
    assert_eq!(updated.data.unwrap().quantity, 4);

    let listed = cart_service::list_cart(
        &state.pool,
        &shopper,
        Pagination {
            page: Some(1),
            per_page: Some(20),
        },
    )
    .await?;
    let items = listed.data.unwrap().items;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 4);
    assert_eq!(items[0].product.id, product_id);

    cart_service::remove_from_cart(&state.pool, &shopper, product_id).await?;
    let err = cart_service::remove_from_cart(&state.pool, &shopper, product_id)
        .await
        .expect_err("already removed");
    assert!(matches!(err, AppError::NotFound));

    // Locations.
    let created = location_service::create_location(
        &state.pool,
        &shopper,
        CreateLocationRequest {
            name: "Home".into(),
            address: "1 Main Street".into(),
        },
    )
    .await?;
    let location = created.data.unwrap();

    let err = location_service::create_location(
        &state.pool,
        &shopper,
        CreateLocationRequest {
            name: "  ".into(),
            address: "nowhere".into(),
        },
    )
    .await
    .expect_err("blank name");
    assert!(matches!(err, AppError::BadRequest(_)));

    let listed = location_service::list_locations(
        &state.pool,
        &shopper,
        Pagination {
            page: Some(1),
            per_page: Some(20),
        },
    )
    .await?;
    assert_eq!(listed.data.unwrap().items.len(), 1);

    location_service::delete_location(&state.pool, &shopper, location.id).await?;
    let err = location_service::delete_location(&state.pool, &shopper, location.id)
        .await
        .expect_err("already deleted");
    assert!(matches!(err, AppError::NotFound));

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

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        phone: Set(None),
        role: Set(role.into()),
        verified: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
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
