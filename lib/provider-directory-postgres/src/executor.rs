//! PostgreSQL implementation of RecordStore.

const DEFAULT_MAX_CONNECTIONS: u32 = 16;

/// Table created by the bundled migration.
pub const DEFAULT_TABLE: &str = "providers";

/// Migrations embedded at compile time.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

use async_trait::async_trait;
use provider_directory::{
    ConnectionConfig, Item, KEY_ATTRIBUTE, Order, Page, RecordStore, SORT_ATTRIBUTE, ScanQuery,
    StorageError, StoreConnection, Value, check_identifier,
};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::{Arguments, Row};
use std::ops::Deref;
use tracing::debug;

use crate::row::row_to_item;

/// Wrapper around sqlx::PgPool.
#[derive(Clone, Debug)]
pub struct PgPool(sqlx::PgPool);

impl PgPool {
    /// Create a new PgPool from an sqlx PgPool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self(pool)
    }

    /// Connect to a PostgreSQL database.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(url)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self(pool))
    }

    /// Get the inner sqlx::PgPool.
    pub fn inner(&self) -> &sqlx::PgPool {
        &self.0
    }
}

impl Deref for PgPool {
    type Target = sqlx::PgPool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Provider records in a PostgreSQL table keyed by `(key, ttl)`.
#[derive(Clone, Debug)]
pub struct PgRecordStore {
    pool: PgPool,
    table: String,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Use a pre-provisioned table instead of the default one.
    pub fn with_table(mut self, table: impl Into<String>) -> Result<Self, StorageError> {
        let table = table.into();
        check_identifier(&table)?;
        self.table = table;
        Ok(self)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Delete every record whose expiry is at or before `now` (unix seconds).
    pub async fn purge_expired(&self, now: i64) -> Result<u64, StorageError> {
        let sql = build_purge_sql(&self.table);
        let result = sqlx::query(&sql)
            .bind(now)
            .execute(self.pool.inner())
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        debug!(table = %self.table, removed = result.rows_affected(), "purged expired providers");
        Ok(result.rows_affected())
    }
}

/// Build an upsert for the composite key plus the given attribute columns.
///
/// A second write to the same `(key, ttl)` overwrites the attributes.
fn build_put_sql(table: &str, attributes: &[&str]) -> Result<String, StorageError> {
    check_identifier(table)?;
    for attribute in attributes {
        check_identifier(attribute)?;
        if *attribute == KEY_ATTRIBUTE || *attribute == SORT_ATTRIBUTE {
            return Err(StorageError::InvalidQuery(format!(
                "attribute {} is part of the composite key",
                attribute
            )));
        }
    }

    let mut columns = vec![KEY_ATTRIBUTE, SORT_ATTRIBUTE];
    columns.extend_from_slice(attributes);
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();

    let on_conflict = if attributes.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let updates: Vec<String> = attributes
            .iter()
            .map(|a| format!("{} = EXCLUDED.{}", a, a))
            .collect();
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}, {}) {}",
        table,
        columns.join(", "),
        placeholders.join(", "),
        KEY_ATTRIBUTE,
        SORT_ATTRIBUTE,
        on_conflict
    ))
}

/// Build a keyset-paginated range query over one partition.
///
/// Returns the SQL and the sort-key values to bind after the partition.
fn build_page_sql(table: &str, query: &ScanQuery) -> Result<(String, Vec<i64>), StorageError> {
    check_identifier(table)?;

    let mut clauses = vec![format!("{} = $1", KEY_ATTRIBUTE)];
    let mut bounds = Vec::new();

    if let Some(floor) = query.sort_floor {
        bounds.push(floor);
        clauses.push(format!("{} > ${}", SORT_ATTRIBUTE, bounds.len() + 1));
    }

    if let Some(start) = query.exclusive_start {
        bounds.push(start);
        let op = match query.order {
            Order::Asc => ">",
            Order::Desc => "<",
        };
        clauses.push(format!("{} {} ${}", SORT_ATTRIBUTE, op, bounds.len() + 1));
    }

    let dir = match query.order {
        Order::Asc => "ASC",
        Order::Desc => "DESC",
    };

    let mut sql = format!(
        "SELECT * FROM {} WHERE {} ORDER BY {} {}",
        table,
        clauses.join(" AND "),
        SORT_ATTRIBUTE,
        dir
    );

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    Ok((sql, bounds))
}

fn build_purge_sql(table: &str) -> String {
    format!("DELETE FROM {} WHERE {} <= $1", table, SORT_ATTRIBUTE)
}

/// Bind a Value to PgArguments.
fn bind_value(args: &mut PgArguments, value: &Value) -> Result<(), StorageError> {
    match value {
        Value::Bytes(b) => args.add(b.clone()),
        Value::Number(n) => args.add(*n),
        Value::String(s) => args.add(s.clone()),
        Value::Bool(b) => args.add(*b),
        Value::Null => args.add(None::<Vec<u8>>),
    }
    .map_err(|e| StorageError::Backend(e.to_string()))
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn put(
        &self,
        partition: &[u8],
        sort: i64,
        attributes: Item,
    ) -> Result<(), StorageError> {
        let names: Vec<&str> = attributes.iter().map(|(name, _)| name.as_str()).collect();
        let sql = build_put_sql(&self.table, &names)?;

        let mut args = PgArguments::default();
        bind_value(&mut args, &Value::Bytes(partition.to_vec()))?;
        bind_value(&mut args, &Value::Number(sort))?;
        for (_, value) in attributes.iter() {
            bind_value(&mut args, value)?;
        }

        sqlx::query_with(&sql, args)
            .execute(self.pool.inner())
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn query_page(&self, query: &ScanQuery) -> Result<Page, StorageError> {
        query.validate()?;
        let (sql, bounds) = build_page_sql(&self.table, query)?;

        let mut args = PgArguments::default();
        bind_value(&mut args, &Value::Bytes(query.partition.clone()))?;
        for bound in bounds {
            bind_value(&mut args, &Value::Number(bound))?;
        }

        let rows = sqlx::query_with(&sql, args)
            .fetch_all(self.pool.inner())
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let last_evaluated = match (query.limit, rows.last()) {
            (Some(limit), Some(last)) if rows.len() == limit as usize => Some(
                last.try_get::<i64, _>(SORT_ATTRIBUTE)
                    .map_err(|e| StorageError::Backend(e.to_string()))?,
            ),
            _ => None,
        };

        let items = rows.iter().map(row_to_item).collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            last_evaluated,
        })
    }
}

#[async_trait]
impl StoreConnection for PgRecordStore {
    async fn connect(config: impl Into<ConnectionConfig> + Send) -> Result<Self, StorageError> {
        let config = config.into();
        let pool = PgPool::connect(config.url()).await?;
        Ok(Self::new(pool))
    }

    /// Run the bundled migrations. They only create the default table, so a
    /// store configured with another table must have it provisioned already.
    async fn initialize(&self) -> Result<(), StorageError> {
        if self.table != DEFAULT_TABLE {
            return Err(StorageError::InvalidQuery(format!(
                "migrations only provision {}, not {}",
                DEFAULT_TABLE, self.table
            )));
        }

        MIGRATOR
            .run(self.pool.inner())
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_sql_upserts_attributes() {
        let sql = build_put_sql("providers", &["prov"]).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO providers (key, ttl, prov) VALUES ($1, $2, $3) \
             ON CONFLICT (key, ttl) DO UPDATE SET prov = EXCLUDED.prov"
        );
    }

    #[test]
    fn test_put_sql_without_attributes() {
        let sql = build_put_sql("providers", &[]).unwrap();
        assert!(sql.ends_with("ON CONFLICT (key, ttl) DO NOTHING"));
    }

    #[test]
    fn test_put_sql_rejects_injected_names() {
        assert!(build_put_sql("providers; DROP TABLE x", &["prov"]).is_err());
        assert!(build_put_sql("providers", &["prov = 1 --"]).is_err());
        assert!(build_put_sql("1providers", &["prov"]).is_err());
        assert!(build_put_sql("providers", &["ttl"]).is_err());
    }

    #[test]
    fn test_first_descending_page() {
        let query = ScanQuery::new(b"foo".to_vec()).order(Order::Desc).limit(100);
        let (sql, bounds) = build_page_sql("providers", &query).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM providers WHERE key = $1 ORDER BY ttl DESC LIMIT 100"
        );
        assert!(bounds.is_empty());
    }

    #[test]
    fn test_continuation_page_with_floor() {
        let query = ScanQuery::new(b"foo".to_vec())
            .order(Order::Desc)
            .limit(10)
            .sort_floor(1_000)
            .exclusive_start(2_000);
        let (sql, bounds) = build_page_sql("providers", &query).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM providers WHERE key = $1 AND ttl > $2 AND ttl < $3 \
             ORDER BY ttl DESC LIMIT 10"
        );
        assert_eq!(bounds, vec![1_000, 2_000]);
    }

    #[test]
    fn test_ascending_continuation() {
        let query = ScanQuery::new(b"foo".to_vec()).exclusive_start(5);
        let (sql, bounds) = build_page_sql("providers", &query).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM providers WHERE key = $1 AND ttl > $2 ORDER BY ttl ASC"
        );
        assert_eq!(bounds, vec![5]);
    }

    #[tokio::test]
    async fn test_with_table_validates() {
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/providers").unwrap();
        let store = PgRecordStore::new(PgPool::new(pool));
        assert_eq!(store.table(), DEFAULT_TABLE);
        assert!(store.clone().with_table("dht_providers").is_ok());
        assert!(store.with_table("dht-providers").is_err());
    }

    #[tokio::test]
    async fn test_initialize_refuses_unprovisioned_table() {
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/providers").unwrap();
        let store = PgRecordStore::new(PgPool::new(pool))
            .with_table("dht_providers")
            .unwrap();
        assert!(matches!(
            store.initialize().await,
            Err(StorageError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_bundled_migrations_are_embedded() {
        assert!(MIGRATOR.iter().any(|m| m.version == 20250101000000));
    }

    #[test]
    fn test_purge_sql() {
        assert_eq!(
            build_purge_sql("providers"),
            "DELETE FROM providers WHERE ttl <= $1"
        );
    }
}
