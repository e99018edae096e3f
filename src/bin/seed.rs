use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum_marketplace_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let vendor_id = ensure_user(&pool, "vendor@example.com", "vendor123", "vendor").await?;
    let second_vendor_id =
        ensure_user(&pool, "vendor2@example.com", "vendor123", "vendor").await?;
    let user_id = ensure_user(&pool, "user@example.com", "user123", "user").await?;

    ensure_location(&pool, user_id, "Home", "1 Main Street").await?;
    seed_products(&pool, vendor_id, second_vendor_id).await?;

    println!("Seed completed. Vendor ID: {vendor_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    // Seeded accounts are pre-verified so they can place orders right away.
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role, verified)
        VALUES ($1, $2, $3, $4, TRUE)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    // If user already exists, fetch id
    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn ensure_location(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    name: &str,
    address: &str,
) -> anyhow::Result<()> {
    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM locations WHERE user_id = $1 AND name = $2")
            .bind(user_id)
            .bind(name)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Ok(());
    }

    sqlx::query("INSERT INTO locations (id, user_id, name, address) VALUES ($1, $2, $3, $4)")
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(name)
        .bind(address)
        .execute(pool)
        .await?;

    println!("Seeded location {name}");
    Ok(())
}

async fn seed_products(
    pool: &sqlx::PgPool,
    vendor_id: Uuid,
    second_vendor_id: Uuid,
) -> anyhow::Result<()> {
    let products = vec![
        (vendor_id, "Axum Hoodie", "Warm hoodie for Rustaceans", 550000, 50),
        (vendor_id, "Ferris Mug", "Coffee tastes better with Ferris", 120000, 100),
        (second_vendor_id, "Rust Sticker Pack", "Decorate your laptop", 50000, 200),
        (second_vendor_id, "E-book: Async Rust", "Learn async Rust patterns", 250000, 75),
    ];

    for (vendor, name, desc, price, stock) in products {
        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM products WHERE vendor_id = $1 AND name = $2")
                .bind(vendor)
                .bind(name)
                .fetch_optional(pool)
                .await?;
        if existing.is_some() {
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO products (id, vendor_id, name, description, price, stock)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(vendor)
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
