//! SurrealDB implementation of RecordStore.
//!
//! SurrealDB has no composite primary key, so each record's id is the array
//! `[hex(key), ttl]` and writes are `UPSERT`s on that id. Range reads filter
//! on the indexed `key` and `ttl` fields.

use std::collections::BTreeSet;
use std::ops::Deref;

use async_trait::async_trait;
use provider_directory::{
    ConnectionConfig, Item, KEY_ATTRIBUTE, Order, PROVIDER_ATTRIBUTE, Page, RecordStore,
    SORT_ATTRIBUTE, ScanQuery, StorageError, StoreConnection, Value, check_identifier,
};
use serde_json::{Map, Value as JsonValue};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::debug;

/// Table defined by `initialize`.
pub const DEFAULT_TABLE: &str = "providers";

const DEFAULT_NAMESPACE: &str = "dht";
const DEFAULT_DATABASE: &str = "providers";

/// Wrapper around SurrealDB client to enable trait implementations.
#[derive(Clone)]
pub struct SurrealPool(Surreal<Client>);

impl SurrealPool {
    /// Create a new SurrealPool wrapper.
    pub fn new(db: Surreal<Client>) -> Self {
        Self(db)
    }

    /// Get the inner Surreal client.
    pub fn inner(&self) -> &Surreal<Client> {
        &self.0
    }
}

impl Deref for SurrealPool {
    type Target = Surreal<Client>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Provider records in a SurrealDB table.
///
/// Byte-valued attributes are stored as hex strings. Only attributes listed
/// as byte attributes (the content key and provider by default) are decoded
/// back into bytes on read.
#[derive(Clone)]
pub struct SurrealRecordStore {
    db: SurrealPool,
    table: String,
    byte_attributes: BTreeSet<String>,
}

impl SurrealRecordStore {
    pub fn new(db: SurrealPool) -> Self {
        Self {
            db,
            table: DEFAULT_TABLE.to_string(),
            byte_attributes: [KEY_ATTRIBUTE, PROVIDER_ATTRIBUTE]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Result<Self, StorageError> {
        let table = table.into();
        check_identifier(&table)?;
        self.table = table;
        Ok(self)
    }

    /// Declare an additional attribute as byte-valued.
    pub fn with_byte_attribute(mut self, name: impl Into<String>) -> Self {
        self.byte_attributes.insert(name.into());
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Delete every record whose expiry is at or before `now` (unix seconds).
    pub async fn purge_expired(&self, now: i64) -> Result<u64, StorageError> {
        let sql = build_purge_sql(&self.table);
        let removed: Option<u64> = self
            .db
            .query(sql)
            .bind(("now", now))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .take(2)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let removed = removed.unwrap_or(0);

        debug!(table = %self.table, removed, "purged expired providers");
        Ok(removed)
    }

    /// Encode an item for storage.
    fn encode_item(&self, item: &Item) -> Result<JsonValue, StorageError> {
        let mut obj = Map::new();
        for (name, value) in item.iter() {
            let json = match value {
                Value::Bytes(b) if self.byte_attributes.contains(name) => {
                    JsonValue::String(hex::encode(b))
                }
                Value::Bytes(_) => {
                    return Err(StorageError::InvalidQuery(format!(
                        "attribute {} is not declared as bytes",
                        name
                    )));
                }
                Value::Number(n) => JsonValue::from(*n),
                Value::String(s) => JsonValue::String(s.clone()),
                Value::Bool(b) => JsonValue::Bool(*b),
                Value::Null => JsonValue::Null,
            };
            obj.insert(name.clone(), json);
        }
        Ok(JsonValue::Object(obj))
    }

    /// Decode a stored row, omitting null fields. Floats and nested values
    /// have no attribute representation and fail the row.
    fn decode_row(&self, row: JsonValue) -> Result<Item, StorageError> {
        let JsonValue::Object(obj) = row else {
            return Err(StorageError::Backend(format!(
                "expected an object row, got {}",
                row
            )));
        };

        let mut item = Item::new();
        for (name, json) in obj {
            let value = match json {
                JsonValue::Null => continue,
                JsonValue::Bool(b) => Value::Bool(b),
                JsonValue::Number(n) => match n.as_i64() {
                    Some(i) => Value::Number(i),
                    None => {
                        return Err(StorageError::Backend(format!(
                            "attribute {} holds non-integer number {}",
                            name, n
                        )));
                    }
                },
                JsonValue::String(s) if self.byte_attributes.contains(&name) => {
                    match hex::decode(&s) {
                        Ok(bytes) => Value::Bytes(bytes),
                        // Left as a string so the caller sees the mismatch
                        Err(_) => Value::String(s),
                    }
                }
                JsonValue::String(s) => Value::String(s),
                nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => {
                    return Err(StorageError::Backend(format!(
                        "attribute {} holds unsupported nested value {}",
                        name, nested
                    )));
                }
            };
            item.insert(name, value);
        }
        Ok(item)
    }
}

/// Build a range query over one partition for SurrealQL.
///
/// Binds `$key`, plus `$floor` and `$start` when present.
fn build_page_sql(table: &str, query: &ScanQuery) -> String {
    let mut clauses = vec![format!("{} = $key", KEY_ATTRIBUTE)];

    if query.sort_floor.is_some() {
        clauses.push(format!("{} > $floor", SORT_ATTRIBUTE));
    }

    if query.exclusive_start.is_some() {
        let op = match query.order {
            Order::Asc => ">",
            Order::Desc => "<",
        };
        clauses.push(format!("{} {} $start", SORT_ATTRIBUTE, op));
    }

    let dir = match query.order {
        Order::Asc => "ASC",
        Order::Desc => "DESC",
    };

    let mut sql = format!(
        "SELECT * OMIT id FROM {} WHERE {} ORDER BY {} {}",
        table,
        clauses.join(" AND "),
        SORT_ATTRIBUTE,
        dir
    );

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    sql
}

/// Count then delete expired rows. The count is the third statement's result.
fn build_purge_sql(table: &str) -> String {
    format!(
        "LET $expired = (SELECT VALUE {ttl} FROM {table} WHERE {ttl} <= $now); \
         DELETE FROM {table} WHERE {ttl} <= $now; \
         RETURN count($expired);",
        table = table,
        ttl = SORT_ATTRIBUTE
    )
}

fn build_define_sql(table: &str) -> String {
    format!(
        "DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS; \
         DEFINE INDEX IF NOT EXISTS {table}_key_ttl ON TABLE {table} FIELDS {key}, {ttl};",
        table = table,
        key = KEY_ATTRIBUTE,
        ttl = SORT_ATTRIBUTE
    )
}

#[async_trait]
impl RecordStore for SurrealRecordStore {
    async fn put(
        &self,
        partition: &[u8],
        sort: i64,
        attributes: Item,
    ) -> Result<(), StorageError> {
        let item = attributes
            .with(KEY_ATTRIBUTE, partition)
            .with(SORT_ATTRIBUTE, sort);
        let content = self.encode_item(&item)?;
        let id = JsonValue::Array(vec![
            JsonValue::String(hex::encode(partition)),
            JsonValue::from(sort),
        ]);

        self.db
            .query("UPSERT type::thing($tb, $id) CONTENT $item")
            .bind(("tb", self.table.clone()))
            .bind(("id", id))
            .bind(("item", content))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .check()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn query_page(&self, query: &ScanQuery) -> Result<Page, StorageError> {
        query.validate()?;
        let sql = build_page_sql(&self.table, query);

        let mut q = self
            .db
            .query(sql)
            .bind(("key", hex::encode(&query.partition)));
        if let Some(floor) = query.sort_floor {
            q = q.bind(("floor", floor));
        }
        if let Some(start) = query.exclusive_start {
            q = q.bind(("start", start));
        }

        let rows: Vec<JsonValue> = q
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let full = query.limit.is_some_and(|limit| rows.len() == limit as usize);
        let last_evaluated = match rows.last() {
            Some(last) if full => Some(
                last.get(SORT_ATTRIBUTE)
                    .and_then(JsonValue::as_i64)
                    .ok_or_else(|| {
                        StorageError::Backend(format!("row without a numeric {}", SORT_ATTRIBUTE))
                    })?,
            ),
            _ => None,
        };

        let items = rows
            .into_iter()
            .map(|row| self.decode_row(row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            last_evaluated,
        })
    }
}

#[async_trait]
impl StoreConnection for SurrealRecordStore {
    async fn connect(config: impl Into<ConnectionConfig> + Send) -> Result<Self, StorageError> {
        let config = config.into();

        let db = Surreal::new::<Ws>(config.url())
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        match &config {
            ConnectionConfig::Url(_) => {
                db.use_ns(DEFAULT_NAMESPACE)
                    .use_db(DEFAULT_DATABASE)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }
            ConnectionConfig::Credentials {
                namespace,
                database,
                username,
                password,
                ..
            } => {
                db.signin(Root { username, password })
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                db.use_ns(namespace)
                    .use_db(database)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }
        }

        Ok(Self::new(SurrealPool::new(db)))
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        self.db
            .query(build_define_sql(&self.table))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .check()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SurrealRecordStore {
        SurrealRecordStore::new(SurrealPool::new(Surreal::init()))
    }

    #[test]
    fn test_first_descending_page() {
        let query = ScanQuery::new(b"foo".to_vec()).order(Order::Desc).limit(100);
        assert_eq!(
            build_page_sql("providers", &query),
            "SELECT * OMIT id FROM providers WHERE key = $key ORDER BY ttl DESC LIMIT 100"
        );
    }

    #[test]
    fn test_continuation_page_with_floor() {
        let query = ScanQuery::new(b"foo".to_vec())
            .order(Order::Desc)
            .limit(1)
            .sort_floor(10)
            .exclusive_start(20);
        assert_eq!(
            build_page_sql("providers", &query),
            "SELECT * OMIT id FROM providers WHERE key = $key AND ttl > $floor \
             AND ttl < $start ORDER BY ttl DESC LIMIT 1"
        );
    }

    #[test]
    fn test_purge_sql() {
        let sql = build_purge_sql("providers");
        assert!(sql.contains("DELETE FROM providers WHERE ttl <= $now;"));
        assert!(sql.ends_with("RETURN count($expired);"));
    }

    #[test]
    fn test_define_sql() {
        let sql = build_define_sql("providers");
        assert!(sql.contains("DEFINE TABLE IF NOT EXISTS providers SCHEMALESS;"));
        assert!(sql.contains("ON TABLE providers FIELDS key, ttl;"));
    }

    #[test]
    fn test_encode_hexes_byte_attributes() {
        let item = Item::new()
            .with(PROVIDER_ATTRIBUTE, b"peerid".as_slice())
            .with(SORT_ATTRIBUTE, 42i64);
        let json = store().encode_item(&item).unwrap();
        assert_eq!(json, json!({"prov": "706565726964", "ttl": 42}));
    }

    #[test]
    fn test_encode_rejects_undeclared_bytes() {
        let item = Item::new().with("blob", b"x".as_slice());
        assert!(matches!(
            store().encode_item(&item),
            Err(StorageError::InvalidQuery(_))
        ));
        let item = Item::new().with("blob", b"x".as_slice());
        assert!(store().with_byte_attribute("blob").encode_item(&item).is_ok());
    }

    #[test]
    fn test_decode_restores_bytes() {
        let item = store()
            .decode_row(json!({"key": "666f6f", "ttl": 7, "prov": "706565726964", "note": null}))
            .unwrap();
        assert_eq!(item.get(KEY_ATTRIBUTE), Some(&Value::Bytes(b"foo".to_vec())));
        assert_eq!(item.get(SORT_ATTRIBUTE), Some(&Value::Number(7)));
        assert_eq!(
            item.get(PROVIDER_ATTRIBUTE),
            Some(&Value::Bytes(b"peerid".to_vec()))
        );
        assert!(item.get("note").is_none());
    }

    #[test]
    fn test_decode_keeps_mistyped_provider_visible() {
        let item = store()
            .decode_row(json!({"ttl": 7, "prov": 12}))
            .unwrap();
        assert_eq!(item.get(PROVIDER_ATTRIBUTE), Some(&Value::Number(12)));

        let item = store()
            .decode_row(json!({"ttl": 7, "prov": "not hex"}))
            .unwrap();
        assert_eq!(
            item.get(PROVIDER_ATTRIBUTE),
            Some(&Value::String("not hex".to_string()))
        );
    }

    #[test]
    fn test_decode_rejects_unrepresentable_attributes() {
        for row in [
            json!({"ttl": 7, "prov": 1.5}),
            json!({"ttl": 7, "prov": ["70"]}),
            json!({"ttl": 7, "prov": {"id": "70"}}),
            json!({"ttl": u64::MAX, "prov": "70"}),
        ] {
            assert!(matches!(
                store().decode_row(row),
                Err(StorageError::Backend(_))
            ));
        }
    }

    #[test]
    fn test_decode_rejects_non_object_rows() {
        assert!(store().decode_row(json!([1, 2])).is_err());
    }

    #[test]
    fn test_with_table_validates() {
        assert!(store().with_table("dht_providers").is_ok());
        assert!(store().with_table("providers; REMOVE TABLE x").is_err());
    }
}
