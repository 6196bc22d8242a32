//! Warm-start cache: a best-effort local mirror used to avoid a blank
//! screen before the live backend delivers its first snapshot. The
//! backend is always authoritative and overwrites these rows.

use std::path::PathBuf;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

use crate::avatar::avatar_color;
use crate::error::AppResult;
use crate::friends::domain::FriendEntry;

#[derive(Debug, sqlx::FromRow)]
struct FriendRow {
    request_id: String,
    friend_uid: String,
    display_name: String,
    avatar_url: Option<String>,
    background_color: String,
}

#[derive(Clone)]
pub struct WarmCache {
    pool: SqlitePool,
}

impl WarmCache {
    pub async fn new(db_path: PathBuf) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                crate::error::AppError::storage("Failed to create cache directory")
                    .with_details(e.to_string())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let cache = Self { pool };
        cache.init_schema().await?;
        Ok(cache)
    }

    async fn init_schema(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS friend_cache (
                owner_uid TEXT NOT NULL,
                friend_uid TEXT NOT NULL,
                request_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                avatar_url TEXT,
                background_color TEXT NOT NULL,
                cached_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (owner_uid, friend_uid)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recent_partner (
                owner_uid TEXT PRIMARY KEY,
                partner_uid TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS avatar_colors (
                uid TEXT PRIMARY KEY,
                color TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Overwrite the mirrored friend list for one owner.
    pub async fn replace_friends(&self, owner_uid: &str, entries: &[FriendEntry]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM friend_cache WHERE owner_uid = ?")
            .bind(owner_uid)
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO friend_cache (
                    owner_uid, friend_uid, request_id, display_name, avatar_url, background_color
                )
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(owner_uid)
            .bind(&entry.uid)
            .bind(&entry.request_id)
            .bind(&entry.display_name)
            .bind(&entry.avatar_url)
            .bind(&entry.background_color)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn cached_friends(&self, owner_uid: &str) -> AppResult<Vec<FriendEntry>> {
        let rows = sqlx::query_as::<_, FriendRow>(
            r#"
            SELECT request_id, friend_uid, display_name, avatar_url, background_color
            FROM friend_cache
            WHERE owner_uid = ?
            ORDER BY display_name COLLATE NOCASE ASC
            "#,
        )
        .bind(owner_uid)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| FriendEntry {
                request_id: row.request_id,
                uid: row.friend_uid,
                display_name: row.display_name,
                avatar_url: row.avatar_url,
                background_color: row.background_color,
            })
            .collect())
    }

    /// Evict one mirrored friendship; also forgets the recent partner
    /// when it pointed at the removed friend.
    pub async fn remove_friend(&self, owner_uid: &str, friend_uid: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM friend_cache WHERE owner_uid = ? AND friend_uid = ?")
            .bind(owner_uid)
            .bind(friend_uid)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM recent_partner WHERE owner_uid = ? AND partner_uid = ?")
            .bind(owner_uid)
            .bind(friend_uid)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn set_recent_partner(&self, owner_uid: &str, partner_uid: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recent_partner (owner_uid, partner_uid)
            VALUES (?, ?)
            ON CONFLICT(owner_uid) DO UPDATE SET partner_uid = excluded.partner_uid
            "#,
        )
        .bind(owner_uid)
        .bind(partner_uid)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn recent_partner(&self, owner_uid: &str) -> AppResult<Option<String>> {
        let partner = sqlx::query_scalar::<_, String>(
            "SELECT partner_uid FROM recent_partner WHERE owner_uid = ?",
        )
        .bind(owner_uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(partner)
    }

    /// Stable background color for a uid; assigned on first use.
    pub async fn color_for(&self, uid: &str) -> AppResult<String> {
        let existing =
            sqlx::query_scalar::<_, String>("SELECT color FROM avatar_colors WHERE uid = ?")
                .bind(uid)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(color) = existing {
            return Ok(color);
        }

        let color = avatar_color(uid);
        sqlx::query(
            r#"
            INSERT INTO avatar_colors (uid, color)
            VALUES (?, ?)
            ON CONFLICT(uid) DO NOTHING
            "#,
        )
        .bind(uid)
        .bind(&color)
        .execute(&self.pool)
        .await?;

        Ok(color)
    }

    /// Sign-out invalidation: drop everything keyed by the owner.
    /// Per-uid color assignments stay; they are not owner state.
    pub async fn clear_owner(&self, owner_uid: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM friend_cache WHERE owner_uid = ?")
            .bind(owner_uid)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM recent_partner WHERE owner_uid = ?")
            .bind(owner_uid)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
