//! Idempotent development seed: an admin, a shopper and a small catalog.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use sparklenest_api::{
    config::AppConfig,
    db::{OrmConn, create_orm_conn, pool_of, run_migrations},
    entity::{password_history, products, users},
    password::hash_password,
};

struct SeedUser<'a> {
    first_name: &'a str,
    last_name: &'a str,
    user_name: &'a str,
    email: &'a str,
    phone: &'a str,
    password: &'a str,
    role: &'a str,
}

const CATALOG: [(&str, &str, Option<&str>, &str, i64, i32); 6] = [
    (
        "Rose Gold Hoop Earrings",
        "Jewelry",
        Some("Rose Gold"),
        "Lightweight hoops with a brushed finish.",
        250_000,
        25,
    ),
    (
        "Sterling Silver Pendant",
        "Jewelry",
        Some("Silver"),
        "Teardrop pendant on an 18 inch chain.",
        180_000,
        40,
    ),
    (
        "Pearl Stud Set",
        "Jewelry",
        Some("Pearl"),
        "Freshwater pearl studs, pair of three sizes.",
        320_000,
        15,
    ),
    (
        "Velvet Matte Lipstick",
        "Cosmetics",
        None,
        "Long wear matte lipstick in ruby red.",
        95_000,
        120,
    ),
    (
        "Hydrating Face Serum",
        "Skincare",
        None,
        "Hyaluronic serum for daily use.",
        140_000,
        60,
    ),
    (
        "Shimmer Eyeshadow Palette",
        "Cosmetics",
        None,
        "Twelve shade palette with warm metallics.",
        210_000,
        35,
    ),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&pool_of(&orm)).await?;

    let admin_id = ensure_user(
        &orm,
        SeedUser {
            first_name: "Store",
            last_name: "Admin",
            user_name: "admin",
            email: "admin@sparklenest.com",
            phone: "9800000000",
            password: "Admin@12345",
            role: "admin",
        },
    )
    .await?;
    let user_id = ensure_user(
        &orm,
        SeedUser {
            first_name: "Sita",
            last_name: "Sharma",
            user_name: "sita",
            email: "user@sparklenest.com",
            phone: "9811111111",
            password: "User@12345",
            role: "user",
        },
    )
    .await?;
    let created = seed_products(&orm).await?;

    tracing::info!(%admin_id, %user_id, products_created = created, "seed completed");
    Ok(())
}

async fn ensure_user(orm: &OrmConn, seed: SeedUser<'_>) -> anyhow::Result<Uuid> {
    if let Some(existing) = users::Entity::find()
        .filter(users::Column::Email.eq(seed.email))
        .one(orm)
        .await?
    {
        tracing::info!(email = seed.email, "user already present");
        return Ok(existing.id);
    }

    let password_hash = hash_password(seed.password).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let now = Utc::now().fixed_offset();
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        first_name: Set(seed.first_name.into()),
        last_name: Set(seed.last_name.into()),
        user_name: Set(seed.user_name.into()),
        email: Set(seed.email.into()),
        phone: Set(seed.phone.into()),
        password_hash: Set(password_hash.clone()),
        role: Set(seed.role.into()),
        profile_picture: Set(None),
        is_verified: Set(true),
        otp_hash: Set(None),
        otp_purpose: Set(None),
        otp_expires_at: Set(None),
        otp_attempts: Set(0),
        failed_login_attempts: Set(0),
        locked_until: Set(None),
        password_changed_at: Set(now),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(orm)
    .await?;

    password_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
        password_hash: Set(password_hash),
        created_at: Set(now),
    }
    .insert(orm)
    .await?;

    tracing::info!(email = seed.email, role = seed.role, "user created");
    Ok(user.id)
}

async fn seed_products(orm: &OrmConn) -> anyhow::Result<usize> {
    let mut created = 0;
    for (name, category, material, description, price, quantity) in CATALOG {
        let exists = products::Entity::find()
            .filter(products::Column::Name.eq(name))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }

        let now = Utc::now().fixed_offset();
        products::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.into()),
            price: Set(price),
            category: Set(category.into()),
            material: Set(material.map(str::to_string)),
            description: Set(description.into()),
            image: Set("placeholder.png".into()),
            quantity: Set(quantity),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(orm)
        .await?;
        created += 1;
    }
    Ok(created)
}
