//! Credential lookups. Values are stored as given; encryption at rest is
//! the database's concern.

use chrono::Utc;
use sqlx::PgPool;

use crate::models::CredentialRow;
use crate::DbError;

/// Fetch credential `id` if it belongs to `owner_id`.
pub async fn get_credential(
    pool: &PgPool,
    id: &str,
    owner_id: &str,
) -> Result<Option<CredentialRow>, DbError> {
    let row = sqlx::query_as::<_, CredentialRow>(
        r#"
        SELECT id, owner_id, name, type, value, created_at
        FROM credentials
        WHERE id = $1 AND owner_id = $2
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Insert a credential, or replace the value of an existing one.
pub async fn upsert_credential(
    pool: &PgPool,
    id: &str,
    owner_id: &str,
    name: &str,
    credential_type: &str,
    value: &str,
) -> Result<CredentialRow, DbError> {
    let row = sqlx::query_as::<_, CredentialRow>(
        r#"
        INSERT INTO credentials (id, owner_id, name, type, value, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name, type = EXCLUDED.type, value = EXCLUDED.value
        WHERE credentials.owner_id = EXCLUDED.owner_id
        RETURNING id, owner_id, name, type, value, created_at
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(name)
    .bind(credential_type)
    .bind(value)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?
    // The id exists but belongs to someone else.
    .ok_or(DbError::NotFound)?;

    Ok(row)
}
