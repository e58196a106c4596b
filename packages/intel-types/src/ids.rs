use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(EntityId);
uuid_id!(IntelId);
uuid_id!(RelationshipId);
uuid_id!(LinkId);
uuid_id!(TaskId);
uuid_id!(AgentRunId);

/// Page ids are content-addressed over the normalized URL (UUID5) rather
/// than time-ordered, so the same URL always yields the same id (spec §3,
/// §6's "derive one via UUID5 over a URL-namespace" guidance generalized
/// from vector-point ids to page ids).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub Uuid);

/// Fixed namespace UUID for deriving page ids from normalized URLs.
/// Generated once; stable across process restarts so ids are reproducible.
const PAGE_NAMESPACE: Uuid = Uuid::from_bytes([
    0x8f, 0x3a, 0x2b, 0x1c, 0x4d, 0x5e, 0x46, 0x7f, 0x98, 0x01, 0x2c, 0x3d, 0x4e, 0x5f, 0x60, 0x71,
]);

impl PageId {
    pub fn from_normalized_url(normalized_url: &str) -> Self {
        Self(Uuid::new_v5(&PAGE_NAMESPACE, normalized_url.as_bytes()))
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
