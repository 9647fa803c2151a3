//! Runtime SQL queries over the key/value table

use hearth_errors::Error;
use sqlx::{query, Row, Sqlite, Transaction};

/// Read the raw value stored under `key`
pub async fn get_value(tx: &mut Transaction<'_, Sqlite>, key: &str) -> Result<Option<String>, Error> {
    let row = query("SELECT value FROM kv_store WHERE key = ?1")
        .bind(key)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(row.map(|r| r.get("value")))
}

/// Insert or replace the value stored under `key`
pub async fn set_value(
    tx: &mut Transaction<'_, Sqlite>,
    key: &str,
    value: &str,
) -> Result<(), Error> {
    let now = chrono::Utc::now().timestamp();

    query("INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)")
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Delete `key`; returns whether a row was removed
pub async fn delete_value(tx: &mut Transaction<'_, Sqlite>, key: &str) -> Result<bool, Error> {
    let result = query("DELETE FROM kv_store WHERE key = ?1")
        .bind(key)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Keys starting with `prefix`, sorted
pub async fn keys_with_prefix(
    tx: &mut Transaction<'_, Sqlite>,
    prefix: &str,
) -> Result<Vec<String>, Error> {
    let rows = query("SELECT key FROM kv_store WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
        .bind(prefix)
        .fetch_all(&mut **tx)
        .await?;

    Ok(rows.into_iter().map(|r| r.get("key")).collect())
}
