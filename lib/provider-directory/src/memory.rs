//! In-memory `RecordStore` with an ordered `(partition, sort)` index.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{Item, Order, Page, RecordStore, ScanQuery, StorageError};

/// Composite-key store backed by a `BTreeMap`.
///
/// Writes to an existing `(partition, sort)` replace the stored item. Pages
/// report `last_evaluated` whenever they are filled to the limit, so a
/// paginated read may finish with one empty page.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    items: Arc<RwLock<BTreeMap<(Vec<u8>, i64), Item>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of items across all partitions.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Fetch the item stored under an exact composite key.
    pub fn get(&self, partition: &[u8], sort: i64) -> Option<Item> {
        self.items.read().get(&(partition.to_vec(), sort)).cloned()
    }

    /// Every `(sort, item)` in `partition`, ascending.
    pub fn partition(&self, partition: &[u8]) -> Vec<(i64, Item)> {
        let items = self.items.read();
        items
            .range(partition_range(partition))
            .map(|((_, sort), item)| (*sort, item.clone()))
            .collect()
    }

    /// Store an item as-is, bypassing the attribute set `put` writes.
    ///
    /// Used to seed records written by other schemas.
    pub fn insert_raw(&self, partition: &[u8], sort: i64, item: Item) {
        self.items.write().insert((partition.to_vec(), sort), item);
    }

    /// Remove every item whose sort key is at or before `now` (unix seconds).
    pub fn purge_expired(&self, now: i64) -> usize {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|(_, sort), _| *sort > now);
        before - items.len()
    }
}

fn partition_range(partition: &[u8]) -> (Bound<(Vec<u8>, i64)>, Bound<(Vec<u8>, i64)>) {
    (
        Bound::Included((partition.to_vec(), i64::MIN)),
        Bound::Included((partition.to_vec(), i64::MAX)),
    )
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn put(
        &self,
        partition: &[u8],
        sort: i64,
        attributes: Item,
    ) -> Result<(), StorageError> {
        let item = attributes
            .with(crate::KEY_ATTRIBUTE, partition)
            .with(crate::SORT_ATTRIBUTE, sort);
        self.items.write().insert((partition.to_vec(), sort), item);
        Ok(())
    }

    async fn query_page(&self, query: &ScanQuery) -> Result<Page, StorageError> {
        query.validate()?;

        let items = self.items.read();
        let range = items
            .range(partition_range(&query.partition))
            .filter(|((_, sort), _)| query.admits(*sort));

        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let selected: Vec<(i64, Item)> = match query.order {
            Order::Asc => range
                .take(limit)
                .map(|((_, sort), item)| (*sort, item.clone()))
                .collect(),
            Order::Desc => range
                .rev()
                .take(limit)
                .map(|((_, sort), item)| (*sort, item.clone()))
                .collect(),
        };

        let last_evaluated = if selected.len() == limit {
            selected.last().map(|(sort, _)| *sort)
        } else {
            None
        };

        Ok(Page {
            items: selected.into_iter().map(|(_, item)| item).collect(),
            last_evaluated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PROVIDER_ATTRIBUTE, SORT_ATTRIBUTE, Value};

    fn attrs(provider: &str) -> Item {
        Item::new().with(PROVIDER_ATTRIBUTE, provider.as_bytes())
    }

    fn sorts(page: &Page) -> Vec<i64> {
        page.items
            .iter()
            .filter_map(|item| item.get(SORT_ATTRIBUTE).and_then(Value::as_number))
            .collect()
    }

    #[tokio::test]
    async fn test_put_replaces_on_same_composite_key() {
        let store = MemoryRecordStore::new();
        store.put(b"foo", 10, attrs("a")).await.unwrap();
        store.put(b"foo", 10, attrs("b")).await.unwrap();

        assert_eq!(store.len(), 1);
        let item = store.get(b"foo", 10).unwrap();
        assert_eq!(
            item.get(PROVIDER_ATTRIBUTE),
            Some(&Value::Bytes(b"b".to_vec()))
        );
    }

    #[tokio::test]
    async fn test_descending_pages() {
        let store = MemoryRecordStore::new();
        for sort in [3, 1, 2] {
            store.put(b"foo", sort, attrs("p")).await.unwrap();
        }
        store.put(b"bar", 9, attrs("p")).await.unwrap();

        let query = ScanQuery::new(b"foo".to_vec()).order(Order::Desc).limit(2);
        let first = store.query_page(&query).await.unwrap();
        assert_eq!(sorts(&first), vec![3, 2]);
        assert_eq!(first.last_evaluated, Some(2));

        let second = store
            .query_page(&query.clone().exclusive_start(2))
            .await
            .unwrap();
        assert_eq!(sorts(&second), vec![1]);
        assert_eq!(second.last_evaluated, None);
    }

    #[tokio::test]
    async fn test_full_page_reports_cursor_even_at_end() {
        let store = MemoryRecordStore::new();
        store.put(b"foo", 1, attrs("p")).await.unwrap();

        let query = ScanQuery::new(b"foo".to_vec()).order(Order::Desc).limit(1);
        let first = store.query_page(&query).await.unwrap();
        assert_eq!(first.last_evaluated, Some(1));

        let second = store
            .query_page(&query.exclusive_start(1))
            .await
            .unwrap();
        assert!(second.items.is_empty());
        assert_eq!(second.last_evaluated, None);
    }

    #[tokio::test]
    async fn test_ascending_with_floor() {
        let store = MemoryRecordStore::new();
        for sort in 1..=5 {
            store.put(b"foo", sort, attrs("p")).await.unwrap();
        }

        let query = ScanQuery::new(b"foo".to_vec()).sort_floor(3);
        let page = store.query_page(&query).await.unwrap();
        assert_eq!(sorts(&page), vec![4, 5]);
    }

    #[tokio::test]
    async fn test_paginator_walks_every_page() {
        let store = MemoryRecordStore::new();
        for sort in 1..=5 {
            store.put(b"foo", sort, attrs("p")).await.unwrap();
        }

        let mut paginator = store.scan_descending(b"foo", 2);
        let mut seen = Vec::new();
        let mut pages = 0;
        while paginator.has_more_pages() {
            let items = paginator.next_page().await.unwrap();
            pages += 1;
            seen.extend(
                items
                    .iter()
                    .filter_map(|item| item.get(SORT_ATTRIBUTE).and_then(Value::as_number)),
            );
        }

        assert_eq!(seen, vec![5, 4, 3, 2, 1]);
        assert_eq!(pages, 3);
    }

    #[test]
    fn test_purge_expired() {
        let store = MemoryRecordStore::new();
        store.insert_raw(b"foo", 10, attrs("a"));
        store.insert_raw(b"foo", 20, attrs("b"));
        store.insert_raw(b"bar", 5, attrs("c"));

        assert_eq!(store.purge_expired(10), 2);
        assert_eq!(store.partition(b"foo").len(), 1);
        assert!(store.partition(b"bar").is_empty());
    }
}
