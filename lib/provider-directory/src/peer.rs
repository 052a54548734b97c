//! Peer identities and their advertised addresses.

use std::fmt;

pub use multiaddr::Multiaddr;

/// Opaque peer identity.
///
/// Stored verbatim as the provider attribute of a record; the directory never
/// interprets its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, String> {
        let bytes = hex::decode(hex_str).map_err(|e| format!("Invalid hex: {e}"))?;
        if bytes.is_empty() {
            return Err("PeerId must not be empty".to_string());
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for PeerId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// A peer together with the addresses it can be reached on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrInfo {
    pub id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

impl AddrInfo {
    pub fn new(id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { id, addrs }
    }

    /// A peer with no known addresses.
    pub fn unknown(id: PeerId) -> Self {
        Self {
            id,
            addrs: Vec::new(),
        }
    }
}

impl fmt::Display for AddrInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addrs: Vec<String> = self.addrs.iter().map(|a| a.to_string()).collect();
        write!(f, "{{{}: [{}]}}", self.id, addrs.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_hex_roundtrip() {
        let id = PeerId::from("peerid");
        let parsed = PeerId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.as_bytes(), b"peerid");
    }

    #[test]
    fn test_peer_id_from_hex_rejects_garbage() {
        assert!(PeerId::from_hex("zz").is_err());
        assert!(PeerId::from_hex("").is_err());
    }

    #[test]
    fn test_addr_info_display() {
        let addr: Multiaddr = "/ip4/1.1.1.1".parse().unwrap();
        let info = AddrInfo::new(PeerId::from("p"), vec![addr]);
        assert_eq!(info.to_string(), "{70: [/ip4/1.1.1.1]}");
    }
}
