use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::auth::role::Role;
use crate::validation;

/// Seed the admin user on first run. Admins cannot self-register through the
/// API; the only way in is the configured bootstrap address.
#[tracing::instrument(skip(pool, admin_address), err)]
pub async fn run(
    pool: &SqlitePool,
    admin_address: Option<&str>,
    admin_name: &str,
) -> anyhow::Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if count > 0 {
        tracing::info!("bootstrap skipped — users already exist");
        return Ok(());
    }

    let Some(address) = admin_address else {
        tracing::warn!("no admin address configured — skipping admin bootstrap");
        return Ok(());
    };
    validation::check_public_address(address)
        .map_err(|e| anyhow::anyhow!("invalid admin address: {e}"))?;

    let admin_id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, role, public_address, name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
    )
    .bind(admin_id)
    .bind(Role::Admin)
    .bind(address.to_lowercase())
    .bind(admin_name)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::info!(user_id = %admin_id, "admin user created");
    Ok(())
}
