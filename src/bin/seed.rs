use restaurant_ordering_api::{
    config::AppConfig,
    db::create_pool,
    policy::Role,
    services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let staff = [
        ("admin@example.com", "admin123", "Restaurant Admin", Role::Admin),
        ("manager@example.com", "manager123", "Floor Manager", Role::Manager),
        ("staff@example.com", "staff123", "Kitchen Staff", Role::Staff),
        ("customer@example.com", "customer123", "Sample Customer", Role::Customer),
    ];
    for (email, password, name, role) in staff {
        let id = ensure_user(&pool, email, password, name, role).await?;
        println!("{:<8} {email} ({id})", role.as_str());
    }

    let momos = ensure_category(&pool, "Momos", "Steamed and fried dumplings", 1).await?;
    let noodles = ensure_category(&pool, "Noodles", "Thukpa and chow mein", 2).await?;
    let drinks = ensure_category(&pool, "Drinks", "Tea and lassi", 3).await?;

    let items = [
        (momos, "Chicken Momo", "Ten steamed chicken dumplings", 1250, 2, false, false, &["chicken", "onion", "ginger"][..]),
        (momos, "Veg Momo", "Ten steamed cabbage and paneer dumplings", 1100, 1, true, false, &["cabbage", "paneer"][..]),
        (momos, "Jhol Momo", "Chicken momos in sesame tomato broth", 1400, 3, false, false, &["chicken", "sesame", "tomato"][..]),
        (noodles, "Thukpa", "Hearty noodle soup with vegetables", 1300, 2, true, true, &["noodles", "carrot", "spinach"][..]),
        (noodles, "Chow Mein", "Wok-fried noodles", 1150, 1, true, true, &["noodles", "cabbage", "soy"][..]),
        (drinks, "Masala Chai", "Spiced milk tea", 450, 0, true, false, &["tea", "milk", "cardamom"][..]),
        (drinks, "Mango Lassi", "Yogurt and mango", 550, 0, true, false, &["yogurt", "mango"][..]),
    ];
    for (category_id, name, desc, price, spice, vegetarian, vegan, ingredients) in items {
        sqlx::query(
            r#"
            INSERT INTO menu_items
                (id, category_id, name, description, price, spice_level, is_vegetarian, is_vegan, ingredients)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(category_id)
        .bind(name)
        .bind(desc)
        .bind(price as i64)
        .bind(spice)
        .bind(vegetarian)
        .bind(vegan)
        .bind(sqlx::types::Json(ingredients))
        .execute(&pool)
        .await?;
    }

    println!("Seed completed");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    full_name: &str,
    role: Role,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, full_name, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(full_name)
    .bind(role.as_str())
    .fetch_one(pool)
    .await?;

    Ok(id)
}

async fn ensure_category(
    pool: &sqlx::PgPool,
    name: &str,
    description: &str,
    display_order: i32,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name, description, display_order)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (name) DO UPDATE SET description = EXCLUDED.description
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(description)
    .bind(display_order)
    .fetch_one(pool)
    .await?;

    Ok(id)
}
