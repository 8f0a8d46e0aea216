use serde::Serialize;

use crate::error::StoreResult;
use crate::node::Role;
use crate::store::{compute_digest, BlobConnection, ObjectStatus, StoredObject};

/// What a node actually holds, checked against the tags it should carry.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeAudit {
    pub role: Role,
    pub objects: usize,
    /// Tagged with a location other than this node's role.
    pub misplaced: Vec<StoredObject>,
    pub inactive: Vec<StoredObject>,
    /// Content no longer matches the recorded length or digest.
    pub corrupted: Vec<StoredObject>,
    /// Objects with no digest recorded; content could not be checked.
    pub unverified: usize,
}

impl NodeAudit {
    pub fn is_clean(&self) -> bool {
        self.misplaced.is_empty() && self.inactive.is_empty() && self.corrupted.is_empty()
    }
}

/// Reads back every object on the connection's node and checks it.
pub async fn audit<B: BlobConnection>(conn: &B) -> StoreResult<NodeAudit> {
    let role = conn.endpoint().role;
    let objects = conn.list().await?;

    let mut audit = NodeAudit {
        role,
        objects: objects.len(),
        misplaced: Vec::new(),
        inactive: Vec::new(),
        corrupted: Vec::new(),
        unverified: 0,
    };

    for object in objects {
        if object.location != role {
            tracing::warn!(%role, object_id = %object.object_id, location = %object.location, "misplaced object");
            audit.misplaced.push(object.clone());
        }
        if object.status != ObjectStatus::Active {
            audit.inactive.push(object.clone());
        }

        let Some(expected) = object.sha256.as_deref() else {
            audit.unverified += 1;
            continue;
        };
        let payload = conn.get(&object.object_id).await?;
        if payload.len() as u64 != object.length || compute_digest(&payload) != expected {
            tracing::warn!(%role, object_id = %object.object_id, filename = %object.filename, "content does not match digest");
            audit.corrupted.push(object);
        }
    }

    tracing::info!(
        %role,
        objects = audit.objects,
        misplaced = audit.misplaced.len(),
        inactive = audit.inactive.len(),
        corrupted = audit.corrupted.len(),
        "audit finished"
    );
    Ok(audit)
}
