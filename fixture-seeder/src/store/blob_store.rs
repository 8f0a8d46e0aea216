use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::SampleFile;
use crate::error::StoreResult;
use crate::node::{NodeEndpoint, Role};
use crate::store::ObjectId;

/// Lifecycle tag written once at creation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStatus {
    Active,
    Inactive,
}

impl ObjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectStatus::Active => "active",
            ObjectStatus::Inactive => "inactive",
        }
    }
}

impl Display for ObjectStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ObjectStatus::Active),
            "inactive" => Ok(ObjectStatus::Inactive),
            other => Err(format!("unknown status `{}`", other)),
        }
    }
}

/// Metadata attached to an object together with its content.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectTags {
    pub status: ObjectStatus,
    pub location: Role,
}

impl ObjectTags {
    pub fn active_on(location: Role) -> Self {
        Self { status: ObjectStatus::Active, location }
    }
}

/// A stored object as the node reports it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    #[serde(with = "hex_object_id")]
    pub object_id: ObjectId,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: ObjectStatus,
    pub location: Role,
    pub length: u64,
    /// Hex SHA-256 of the payload, when the writer recorded one.
    pub sha256: Option<String>,
}

/// Opens connections to a node's blob store.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: BlobConnection;

    async fn connect(&self, endpoint: &NodeEndpoint) -> StoreResult<Self::Connection>;
}

/// One open connection to one node. Not shared between concurrent writers.
#[async_trait]
pub trait BlobConnection: Send + Sync {
    fn endpoint(&self) -> &NodeEndpoint;

    /// Streams `file` into the chunked store with `tags` attached. The object
    /// is readable only once content and tags are both in place.
    async fn put(&self, file: &SampleFile, tags: &ObjectTags) -> StoreResult<StoredObject>;

    async fn get(&self, id: &ObjectId) -> StoreResult<Vec<u8>>;

    /// Every object on the node, in upload order.
    async fn list(&self) -> StoreResult<Vec<StoredObject>>;

    async fn close(self) -> StoreResult<()>;
}

// A helper function to compute a SHA-256 hash of the data.
pub fn compute_digest(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    result.iter().map(|byte| format!("{:02x}", byte)).collect()
}

pub(crate) mod hex_object_id {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::store::ObjectId;

    pub fn serialize<S: Serializer>(id: &ObjectId, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_hex())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ObjectId, D::Error> {
        let hex = String::deserialize(deserializer)?;
        ObjectId::parse_str(&hex).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        use crate::store::ObjectId;

        pub fn serialize<S: Serializer>(id: &Option<ObjectId>, serializer: S) -> Result<S::Ok, S::Error> {
            match id {
                Some(id) => serializer.serialize_some(&id.to_hex()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<ObjectId>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|hex| ObjectId::parse_str(&hex).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
