//! Cache databases and their record tables.
//!
//! Every table has the same shape, `(id TEXT PRIMARY KEY, record TEXT NOT NULL)`,
//! where `record` is the JSON document with its `id` field stamped in.

use crate::db::{self, quote_ident, validate_name, StoreLocation};
use crate::error::{CacheError, Result};
use serde_json::Value;
use sqlx::{Pool, Sqlite};
use tracing::{debug, instrument};

/// Schema version written to `PRAGMA user_version` on provisioning.
pub const SCHEMA_VERSION: i64 = 1;

/// One logical cache database (one SQLite store).
#[derive(Clone)]
pub struct CacheDatabase {
    name: String,
    pool: Pool<Sqlite>,
    tables: Vec<String>,
}

impl CacheDatabase {
    /// Open or create the store `name` and make sure every table in `tables`
    /// exists. Existing tables and their records are left untouched.
    ///
    /// # Errors
    ///
    /// `CacheError::Provision` when the store cannot be created or extended.
    #[instrument(skip(location, tables), fields(tables = tables.len()))]
    pub async fn open(location: &StoreLocation, name: &str, tables: &[String]) -> Result<Self> {
        let pool = db::connect(location, name).await?;
        let mut database = Self {
            name: name.to_string(),
            pool,
            tables: Vec::new(),
        };
        database.provision(tables).await?;
        Ok(database)
    }

    /// Create the missing tables of `tables` in one transaction.
    pub async fn provision(&mut self, tables: &[String]) -> Result<()> {
        for table in tables {
            validate_name(table)?;
        }

        let provision_error = |e: sqlx::Error| CacheError::Provision {
            database: self.name.clone(),
            message: e.to_string(),
        };

        let mut tx = self.pool.begin().await.map_err(provision_error)?;
        for table in tables {
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY NOT NULL, record TEXT NOT NULL)",
                quote_ident(table)
            );
            sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(provision_error)?;
        }

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&mut *tx)
            .await
            .map_err(provision_error)?;
        if version < SCHEMA_VERSION {
            sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
                .execute(&mut *tx)
                .await
                .map_err(provision_error)?;
        }
        tx.commit().await.map_err(provision_error)?;

        for table in tables {
            if !self.tables.contains(table) {
                self.tables.push(table.clone());
            }
        }
        debug!(database = %self.name, tables = ?self.tables, "Provisioned tables");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tables this handle has provisioned, in request order.
    pub fn provisioned_tables(&self) -> &[String] {
        &self.tables
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t == table)
    }

    /// Tables actually present in the store, sorted.
    pub async fn table_names(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    pub async fn schema_version(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Handle to `table`, or `None` if it was never provisioned here.
    pub fn table(&self, table: &str) -> Option<CacheTable> {
        self.has_table(table).then(|| CacheTable {
            database: self.name.clone(),
            name: table.to_string(),
            pool: self.pool.clone(),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl std::fmt::Debug for CacheDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheDatabase")
            .field("name", &self.name)
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

/// JSON records keyed by id within one table.
#[derive(Clone)]
pub struct CacheTable {
    database: String,
    name: String,
    pool: Pool<Sqlite>,
}

impl CacheTable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Every record, ordered by id.
    pub async fn read_all(&self) -> Result<Vec<Value>> {
        let sql = format!("SELECT record FROM {} ORDER BY id", quote_ident(&self.name));
        let mut tx = self.pool.begin().await?;
        let rows: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&mut *tx).await?;
        tx.commit().await?;

        rows.iter()
            .map(|raw| serde_json::from_str(raw).map_err(CacheError::from))
            .collect()
    }

    pub async fn read(&self, id: &str) -> Result<Option<Value>> {
        let sql = format!("SELECT record FROM {} WHERE id = ?", quote_ident(&self.name));
        let mut tx = self.pool.begin().await?;
        let row: Option<String> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        row.map(|raw| serde_json::from_str(&raw).map_err(CacheError::from))
            .transpose()
    }

    /// Insert or replace the record under `id`. The stored record carries
    /// `"id": id` and is returned as written.
    ///
    /// # Errors
    ///
    /// `CacheError::InvalidRecord` when `record` is not a JSON object.
    #[instrument(skip(self, record), fields(table = %self.name))]
    pub async fn write(&self, id: &str, record: Value) -> Result<Value> {
        let mut record = match record {
            Value::Object(map) => map,
            other => {
                return Err(CacheError::InvalidRecord {
                    id: id.to_string(),
                    message: format!("expected an object, got {}", json_kind(&other)),
                })
            }
        };
        record.insert("id".to_string(), Value::String(id.to_string()));
        let record = Value::Object(record);
        let raw = serde_json::to_string(&record)?;

        let sql = format!(
            "INSERT INTO {} (id, record) VALUES (?, ?) ON CONFLICT(id) DO UPDATE SET record = excluded.record",
            quote_ident(&self.name)
        );
        let mut tx = self.pool.begin().await?;
        sqlx::query(&sql).bind(id).bind(&raw).execute(&mut *tx).await?;
        tx.commit().await?;

        debug!(id, bytes = raw.len(), "Record written");
        Ok(record)
    }

    /// Remove the record under `id` and return the id. Deleting a missing
    /// record is not an error.
    pub async fn delete(&self, id: &str) -> Result<String> {
        let sql = format!("DELETE FROM {} WHERE id = ?", quote_ident(&self.name));
        let mut tx = self.pool.begin().await?;
        sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(id.to_string())
    }

    pub async fn count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&self.name));
        Ok(sqlx::query_scalar(&sql).fetch_one(&self.pool).await?)
    }
}

impl std::fmt::Debug for CacheTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheTable")
            .field("database", &self.database)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
