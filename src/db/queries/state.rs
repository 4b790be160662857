use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use crate::bot::error::Error;
use crate::db::store::StateBackend;

pub async fn get(pool: &PgPool, guild_id: i64, key: &str) -> Result<Option<Value>, sqlx::Error> {
    let row: Option<(Value,)> = sqlx::query_as(
        "SELECT value FROM moderation_state WHERE guild_id = $1 AND key = $2"
    )
    .bind(guild_id)
    .bind(key)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.0))
}

/// Upsert a value, bumping its version
pub async fn set(pool: &PgPool, guild_id: i64, key: &str, value: &Value) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO moderation_state (guild_id, key, value)
        VALUES ($1, $2, $3)
        ON CONFLICT (guild_id, key)
        DO UPDATE SET value = EXCLUDED.value,
                      version = moderation_state.version + 1,
                      updated_at = NOW()
        RETURNING version
        "#
    )
    .bind(guild_id)
    .bind(key)
    .bind(value)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

pub async fn guilds_with(pool: &PgPool, key: &str) -> Result<Vec<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT guild_id FROM moderation_state WHERE key = $1 ORDER BY guild_id"
    )
    .bind(key)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Postgres-backed moderation state
#[derive(Debug, Clone)]
pub struct PgStateBackend {
    pool: PgPool,
}

impl PgStateBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateBackend for PgStateBackend {
    async fn get(&self, guild_id: u64, key: &str) -> Result<Option<Value>, Error> {
        Ok(get(&self.pool, guild_id as i64, key).await?)
    }

    async fn set(&self, guild_id: u64, key: &str, value: Value) -> Result<(), Error> {
        set(&self.pool, guild_id as i64, key, &value).await?;
        Ok(())
    }

    async fn guilds_with(&self, key: &str) -> Result<Vec<u64>, Error> {
        let guilds = guilds_with(&self.pool, key).await?;
        Ok(guilds.into_iter().map(|g| g as u64).collect())
    }
}
