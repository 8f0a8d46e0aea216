pub mod blob_store;
pub mod gridfs;
pub mod memory;

pub use blob_store::{compute_digest, BlobConnection, Connector, ObjectStatus, ObjectTags, StoredObject};
pub use gridfs::{GridFsConnection, GridFsConnector, StoreSettings};
pub use memory::{MemoryConnection, MemoryConnector};

pub type ObjectId = bson::oid::ObjectId;
