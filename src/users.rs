//! Zotero account records.
//!
//! One row per Zotero user id; linking the same account again refreshes its
//! credentials instead of creating a duplicate.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::models::ZoteroUser;
use crate::zotero::AccessInfo;

/// Insert or refresh the record for `info.userid`.
pub async fn upsert_zotero_user(pool: &SqlitePool, info: &AccessInfo) -> Result<ZoteroUser> {
    let now = Utc::now().timestamp();
    let new_id = uuid::Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO zotero_users (id, username, zotero_userid, oauth_token, api_key, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(zotero_userid) DO UPDATE SET
            username = excluded.username,
            oauth_token = excluded.oauth_token,
            api_key = excluded.api_key,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&new_id)
    .bind(&info.username)
    .bind(&info.userid)
    .bind(&info.token)
    .bind(&info.api_key)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    get_zotero_user(pool, &info.userid)
        .await?
        .ok_or_else(|| anyhow::anyhow!("zotero user not found after upsert: {}", info.userid))
}

pub async fn get_zotero_user(pool: &SqlitePool, zotero_userid: &str) -> Result<Option<ZoteroUser>> {
    let row = sqlx::query(
        "SELECT id, username, zotero_userid, oauth_token, api_key, created_at, updated_at FROM zotero_users WHERE zotero_userid = ?",
    )
    .bind(zotero_userid)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| ZoteroUser {
        id: row.get("id"),
        username: row.get("username"),
        zotero_userid: row.get("zotero_userid"),
        oauth_token: row.get("oauth_token"),
        api_key: row.get("api_key"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }))
}

/// All linked accounts, most recently updated first.
pub async fn list_zotero_users(pool: &SqlitePool) -> Result<Vec<ZoteroUser>> {
    let rows = sqlx::query(
        "SELECT id, username, zotero_userid, oauth_token, api_key, created_at, updated_at FROM zotero_users ORDER BY updated_at DESC, username ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ZoteroUser {
            id: row.get("id"),
            username: row.get("username"),
            zotero_userid: row.get("zotero_userid"),
            oauth_token: row.get("oauth_token"),
            api_key: row.get("api_key"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
        .collect())
}
