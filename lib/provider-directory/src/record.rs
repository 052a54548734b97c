//! The persisted provider announcement and its attribute encoding.
//!
//! A record is keyed by `(key, ttl)`: the content key is the partition and the
//! expiry timestamp is the sort key, so a descending scan returns the
//! announcements that expire last (the most recent ones) first. The provider
//! is an ordinary attribute, never part of the key.

use crate::{Item, MalformedRecord, PeerId, Value};

/// Partition attribute: the content key.
pub const KEY_ATTRIBUTE: &str = "key";

/// Sort attribute: expiry as unix seconds.
pub const SORT_ATTRIBUTE: &str = "ttl";

/// Provider peer id attribute.
pub const PROVIDER_ATTRIBUTE: &str = "prov";

/// One provider announcement for one content key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRecord {
    pub key: Vec<u8>,
    pub provider: PeerId,
    /// Unix seconds after which the announcement is stale.
    pub expires_at: i64,
}

impl ProviderRecord {
    pub fn new(key: impl Into<Vec<u8>>, provider: PeerId, expires_at: i64) -> Self {
        Self {
            key: key.into(),
            provider,
            expires_at,
        }
    }

    /// Non-key attributes written alongside the composite key.
    pub fn attributes(&self) -> Item {
        Item::new().with(PROVIDER_ATTRIBUTE, self.provider.as_bytes())
    }

    /// The full item as a backend would return it.
    pub fn to_item(&self) -> Item {
        self.attributes()
            .with(KEY_ATTRIBUTE, self.key.clone())
            .with(SORT_ATTRIBUTE, self.expires_at)
    }

    /// Extract the provider id from a scanned item.
    ///
    /// Only the provider attribute is required; the read path never needs the
    /// key or expiry back from the store.
    pub fn provider_from_item(item: &Item) -> Result<PeerId, MalformedRecord> {
        match item.get(PROVIDER_ATTRIBUTE) {
            None => Err(MalformedRecord::MissingAttribute {
                attribute: PROVIDER_ATTRIBUTE,
            }),
            Some(Value::Bytes(bytes)) => Ok(PeerId::from_bytes(bytes.clone())),
            Some(other) => Err(MalformedRecord::TypeMismatch {
                attribute: PROVIDER_ATTRIBUTE,
                expected: "bytes",
                found: other.type_name(),
            }),
        }
    }

    /// Decode a complete record from an item that carries all three attributes.
    pub fn from_item(item: &Item) -> Result<Self, MalformedRecord> {
        let provider = Self::provider_from_item(item)?;

        let key = match item.get(KEY_ATTRIBUTE) {
            None => {
                return Err(MalformedRecord::MissingAttribute {
                    attribute: KEY_ATTRIBUTE,
                });
            }
            Some(value) => value.as_bytes().ok_or(MalformedRecord::TypeMismatch {
                attribute: KEY_ATTRIBUTE,
                expected: "bytes",
                found: value.type_name(),
            })?,
        };

        let expires_at = match item.get(SORT_ATTRIBUTE) {
            None => {
                return Err(MalformedRecord::MissingAttribute {
                    attribute: SORT_ATTRIBUTE,
                });
            }
            Some(value) => value.as_number().ok_or(MalformedRecord::TypeMismatch {
                attribute: SORT_ATTRIBUTE,
                expected: "number",
                found: value.type_name(),
            })?,
        };

        Ok(Self {
            key: key.to_vec(),
            provider,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_carries_all_attributes() {
        let record = ProviderRecord::new(b"foo".to_vec(), PeerId::from("peerid"), 1_700_000_010);
        let item = record.to_item();

        assert_eq!(item.len(), 3);
        assert_eq!(
            item.get(PROVIDER_ATTRIBUTE),
            Some(&Value::Bytes(b"peerid".to_vec()))
        );
        assert_eq!(item.get(SORT_ATTRIBUTE), Some(&Value::Number(1_700_000_010)));
        assert_eq!(ProviderRecord::from_item(&item).unwrap(), record);
    }

    #[test]
    fn test_attributes_exclude_key_components() {
        let record = ProviderRecord::new(b"foo".to_vec(), PeerId::from("peerid"), 5);
        let attributes = record.attributes();
        assert_eq!(attributes.len(), 1);
        assert!(attributes.get(KEY_ATTRIBUTE).is_none());
    }

    #[test]
    fn test_missing_provider() {
        let item = Item::new().with(KEY_ATTRIBUTE, b"foo".as_slice());
        assert_eq!(
            ProviderRecord::provider_from_item(&item),
            Err(MalformedRecord::MissingAttribute {
                attribute: PROVIDER_ATTRIBUTE
            })
        );
    }

    #[test]
    fn test_mistyped_provider() {
        let item = Item::new().with(PROVIDER_ATTRIBUTE, "peerid");
        assert_eq!(
            ProviderRecord::provider_from_item(&item),
            Err(MalformedRecord::TypeMismatch {
                attribute: PROVIDER_ATTRIBUTE,
                expected: "bytes",
                found: "string",
            })
        );
    }

    #[test]
    fn test_mistyped_sort_key() {
        let item = Item::new()
            .with(PROVIDER_ATTRIBUTE, b"p".as_slice())
            .with(KEY_ATTRIBUTE, b"foo".as_slice())
            .with(SORT_ATTRIBUTE, "soon");
        assert!(matches!(
            ProviderRecord::from_item(&item),
            Err(MalformedRecord::TypeMismatch {
                attribute: SORT_ATTRIBUTE,
                ..
            })
        ));
    }
}
