//! DB Connector: the relational side of ride and group images.
//!
//! The pipeline needs four things from the database: which marker keys a city
//! should have, a group's display name, a denormalised write-back of a group's
//! marker key and public id, and persisting a ride's image URL.
//! [`GroupCatalog`] is that seam; [`SqliteCatalog`] implements it over a
//! `sqlx` SQLite pool and creates its tables on connect.

use crate::layout::EntityKind;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("{table} with id {id} not found")]
    NotFound { table: &'static str, id: String },
}

/// A row of `ride_groups`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Group {
    pub id: i64,
    /// Short group code, e.g. `BLUE`.
    pub code: String,
    pub name: String,
    pub city: String,
    pub is_active: bool,
    /// Marker key joining the group to its spritesheet entry.
    pub marker: Option<String>,
    pub public_id: Option<String>,
}

#[async_trait]
pub trait GroupCatalog: Send + Sync {
    /// Non-empty marker keys of active groups in `city`.
    async fn active_marker_keys(&self, city: &str) -> Result<Vec<String>, CatalogError>;

    async fn group_by_code(&self, code: &str) -> Result<Option<Group>, CatalogError>;

    /// Write `public_id` and `marker` onto the group with `code`.
    async fn set_marker_and_public_id(
        &self,
        code: &str,
        public_id: &str,
        marker: &str,
    ) -> Result<(), CatalogError>;

    /// Set `image_url` on a ride (by id) or group (by code).
    ///
    /// Zero rows affected is [`CatalogError::NotFound`].
    async fn update_image_url(
        &self,
        kind: EntityKind,
        entity_id: &str,
        url: &str,
    ) -> Result<(), CatalogError>;
}

/// SQLite-backed [`GroupCatalog`].
pub struct SqliteCatalog {
    pool: Pool<Sqlite>,
}

impl SqliteCatalog {
    /// Connect to `url` (e.g. `sqlite://ride-assets.db?mode=rwc` or
    /// `sqlite::memory:`) and create missing tables.
    pub async fn connect(url: &str) -> Result<Self, CatalogError> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // One connection keeps `sqlite::memory:` a single database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let catalog = Self { pool };
        catalog.migrate().await?;
        Ok(catalog)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn migrate(&self) -> Result<(), CatalogError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS ride_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                city TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                marker TEXT,
                public_id TEXT,
                image_url TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rides (
                id TEXT PRIMARY KEY,
                city TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                image_url TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_ride_groups_city ON ride_groups(city)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a group row. Used to seed fixtures and by operators.
    pub async fn insert_group(
        &self,
        code: &str,
        name: &str,
        city: &str,
        is_active: bool,
        marker: Option<&str>,
    ) -> Result<i64, CatalogError> {
        let result = sqlx::query(
            "INSERT INTO ride_groups (code, name, city, is_active, marker) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(code)
        .bind(name)
        .bind(city)
        .bind(is_active)
        .bind(marker)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Insert a ride row with no image.
    pub async fn insert_ride(&self, id: &str, city: &str, title: &str) -> Result<(), CatalogError> {
        sqlx::query("INSERT INTO rides (id, city, title) VALUES (?, ?, ?)")
            .bind(id)
            .bind(city)
            .bind(title)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Current `image_url` of a ride or group.
    pub async fn image_url(
        &self,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Option<String>, CatalogError> {
        let sql = match kind {
            EntityKind::Ride => "SELECT image_url FROM rides WHERE id = ?",
            EntityKind::Group => "SELECT image_url FROM ride_groups WHERE code = ?",
        };
        let url: Option<Option<String>> = sqlx::query_scalar(sql)
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(url.flatten())
    }
}

#[async_trait]
impl GroupCatalog for SqliteCatalog {
    async fn active_marker_keys(&self, city: &str) -> Result<Vec<String>, CatalogError> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT marker FROM ride_groups
             WHERE city = ? AND is_active = 1 AND marker IS NOT NULL AND marker != ''
             ORDER BY marker",
        )
        .bind(city)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn group_by_code(&self, code: &str) -> Result<Option<Group>, CatalogError> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT id, code, name, city, is_active, marker, public_id
             FROM ride_groups WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn set_marker_and_public_id(
        &self,
        code: &str,
        public_id: &str,
        marker: &str,
    ) -> Result<(), CatalogError> {
        let result = sqlx::query("UPDATE ride_groups SET public_id = ?, marker = ? WHERE code = ?")
            .bind(public_id)
            .bind(marker)
            .bind(code)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound {
                table: "ride_groups",
                id: code.to_string(),
            });
        }
        Ok(())
    }

    async fn update_image_url(
        &self,
        kind: EntityKind,
        entity_id: &str,
        url: &str,
    ) -> Result<(), CatalogError> {
        let (table, sql) = match kind {
            EntityKind::Ride => ("rides", "UPDATE rides SET image_url = ? WHERE id = ?"),
            EntityKind::Group => (
                "ride_groups",
                "UPDATE ride_groups SET image_url = ? WHERE code = ?",
            ),
        };
        let result = sqlx::query(sql)
            .bind(url)
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound {
                table,
                id: entity_id.to_string(),
            });
        }
        Ok(())
    }
}
