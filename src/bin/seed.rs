use anyhow::Context;
use storefront_api::{
    db::{DbPool, create_pool, run_migrations},
    models::{ProductCategory, Role},
    services::auth_service::hash_password,
};
use uuid::Uuid;

struct SeedProduct {
    name: &'static str,
    description: &'static str,
    price: i64,
    discounted_price: Option<i64>,
    category: ProductCategory,
    sku: &'static str,
    quantity: i32,
}

const PRODUCTS: &[SeedProduct] = &[
    SeedProduct {
        name: "Wireless Headphones",
        description: "Over-ear noise cancelling headphones",
        price: 10_000,
        discounted_price: Some(8_000),
        category: ProductCategory::Electronics,
        sku: "ELEC-HEAD-001",
        quantity: 25,
    },
    SeedProduct {
        name: "Cotton T-Shirt",
        description: "Plain crew neck, 100% cotton",
        price: 1_999,
        discounted_price: None,
        category: ProductCategory::Clothing,
        sku: "CLTH-TEE-001",
        quantity: 200,
    },
    SeedProduct {
        name: "The Rust Programming Language",
        description: "Paperback edition",
        price: 3_999,
        discounted_price: Some(3_499),
        category: ProductCategory::Books,
        sku: "BOOK-RUST-001",
        quantity: 40,
    },
    SeedProduct {
        name: "Ceramic Mug",
        description: "350ml stoneware mug",
        price: 1_200,
        discounted_price: None,
        category: ProductCategory::Home,
        sku: "HOME-MUG-001",
        quantity: 3,
    },
    SeedProduct {
        name: "Yoga Mat",
        description: "6mm non-slip mat",
        price: 2_500,
        discounted_price: None,
        category: ProductCategory::Sports,
        sku: "SPRT-YOGA-001",
        quantity: 60,
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;

    let pool = create_pool(&database_url).await?;
    run_migrations(&pool).await?;

    let admin_id = ensure_user(&pool, "Admin", "admin@example.com", "admin123", Role::Admin).await?;
    let user_id = ensure_user(&pool, "Jane Doe", "user@example.com", "user123", Role::User).await?;
    seed_products(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &DbPool,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password)?;

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role.as_str())
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={})", role.as_str());
    Ok(user_id)
}

async fn seed_products(pool: &DbPool) -> anyhow::Result<()> {
    for product in PRODUCTS {
        sqlx::query(
            r#"
            INSERT INTO products
                (id, name, description, price, discounted_price, category, sku, inventory_quantity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (sku) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(product.name)
        .bind(product.description)
        .bind(product.price)
        .bind(product.discounted_price)
        .bind(product.category.as_str())
        .bind(product.sku)
        .bind(product.quantity)
        .execute(pool)
        .await?;
    }

    println!("Seeded {} products", PRODUCTS.len());
    Ok(())
}
