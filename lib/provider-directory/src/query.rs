//! Backend-agnostic record access for the provider directory.
//!
//! Stores hold items addressed by a composite key: a byte-string partition and
//! an integer sort key. Reads are range queries over a single partition,
//! returned page by page in sort-key order.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::StorageError;

/// An attribute value as it comes back from a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    Number(i64),
    String(String),
    Bool(bool),
    Null,
}

impl Value {
    /// Name of the encoded type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bytes(_) => "bytes",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Null => "null",
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A stored item: attribute name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item(BTreeMap<String, Value>);

impl Item {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add an attribute (builder style).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for Item {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// A range query over one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanQuery {
    /// The partition to scan.
    pub partition: Vec<u8>,
    /// Sort-key order of the returned items.
    pub order: Order,
    /// Maximum number of items per page.
    pub limit: Option<u32>,
    /// Resume after this sort key (exclusive), as returned in `Page::last_evaluated`.
    pub exclusive_start: Option<i64>,
    /// Only return items whose sort key is strictly greater than this.
    pub sort_floor: Option<i64>,
}

impl ScanQuery {
    /// Create an ascending, unbounded query over `partition`.
    pub fn new(partition: impl Into<Vec<u8>>) -> Self {
        Self {
            partition: partition.into(),
            order: Order::Asc,
            limit: None,
            exclusive_start: None,
            sort_floor: None,
        }
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Set the page size.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn exclusive_start(mut self, sort: i64) -> Self {
        self.exclusive_start = Some(sort);
        self
    }

    pub fn sort_floor(mut self, floor: i64) -> Self {
        self.sort_floor = Some(floor);
        self
    }

    /// Whether `sort` falls inside this query's range, ignoring the partition.
    pub fn admits(&self, sort: i64) -> bool {
        if self.sort_floor.is_some_and(|floor| sort <= floor) {
            return false;
        }
        match (self.exclusive_start, self.order) {
            (Some(start), Order::Desc) => sort < start,
            (Some(start), Order::Asc) => sort > start,
            (None, _) => true,
        }
    }

    /// Reject queries no backend can serve.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.limit == Some(0) {
            return Err(StorageError::InvalidQuery(
                "page limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Accept only plain identifiers (`[A-Za-z_][A-Za-z0-9_]*`) for table and
/// attribute names that backends interpolate into query text.
pub fn check_identifier(name: &str) -> Result<(), StorageError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidQuery(format!(
            "invalid identifier: {:?}",
            name
        )))
    }
}

/// One page of a range query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<Item>,
    /// Sort key of the last item when the page was cut short by the limit.
    /// `None` means the range is exhausted.
    pub last_evaluated: Option<i64>,
}

/// Composite-key record storage.
///
/// Implemented by the in-memory store and by database-specific backends.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Write an item under `(partition, sort)`, replacing any item already there.
    async fn put(
        &self,
        partition: &[u8],
        sort: i64,
        attributes: Item,
    ) -> Result<(), StorageError>;

    /// Fetch a single page of a range query.
    async fn query_page(&self, query: &ScanQuery) -> Result<Page, StorageError>;

    /// Page through `partition` in descending sort-key order.
    fn scan_descending(&self, partition: &[u8], page_size: u32) -> Paginator<'_, Self>
    where
        Self: Sized,
    {
        Paginator::new(
            self,
            ScanQuery::new(partition)
                .order(Order::Desc)
                .limit(page_size),
        )
    }
}

/// Drives a `ScanQuery` across pages until the store reports no more.
pub struct Paginator<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    query: ScanQuery,
    started: bool,
}

impl<'a, S: RecordStore + ?Sized> Paginator<'a, S> {
    pub fn new(store: &'a S, query: ScanQuery) -> Self {
        Self {
            store,
            query,
            started: false,
        }
    }

    pub fn has_more_pages(&self) -> bool {
        !self.started || self.query.exclusive_start.is_some()
    }

    /// Fetch the next page. Returns an empty page once exhausted.
    pub async fn next_page(&mut self) -> Result<Vec<Item>, StorageError> {
        if !self.has_more_pages() {
            return Ok(Vec::new());
        }

        let page = self.store.query_page(&self.query).await?;
        self.started = true;
        self.query.exclusive_start = page.last_evaluated;
        Ok(page.items)
    }
}
