//! Typed identifiers
//!
//! Requests, workers and strategies are stored arena-style in vectors owned by
//! the dashboard; their ids are plain indices wrapped for type safety.
//! Packet ids use the format `{6-char-hex}-packet`, e.g. `9f03a1-packet`.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! index_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            pub fn new(index: usize) -> Self {
                Self(index as u32)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

index_id!(
    /// Serial number of a request within its packet (submission order)
    RequestId,
    "req-"
);
index_id!(
    /// Registration slot of a worker within a dashboard
    WorkerId,
    "w-"
);
index_id!(
    /// Registration slot of a strategy within a dashboard
    StrategyId,
    "s-"
);

/// Identifier of one packet, used to correlate log lines
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketId(String);

impl PacketId {
    /// Generate a fresh packet id
    pub fn generate() -> Self {
        // The leading hex of a v7 uuid is a coarse timestamp; take random bits
        let uuid = uuid::Uuid::now_v7().simple().to_string();
        Self(format!("{}-packet", &uuid[uuid.len() - 6..]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip_and_display() {
        let id = RequestId::new(3);
        assert_eq!(id.index(), 3);
        assert_eq!(id.to_string(), "req-3");
        assert_eq!(WorkerId::new(0).to_string(), "w-0");
        assert!(StrategyId::new(1) < StrategyId::new(2));
    }

    #[test]
    fn test_packet_id_format() {
        let id = PacketId::generate();
        assert!(id.as_str().ends_with("-packet"));
        assert_eq!(id.as_str().len(), "9f03a1-packet".len());
        assert_ne!(PacketId::generate(), PacketId::generate());
    }
}
