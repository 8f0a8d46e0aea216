use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::content::SampleFile;
use crate::error::{StoreError, StoreResult};
use crate::node::NodeEndpoint;
use crate::store::blob_store::{compute_digest, BlobConnection, Connector, ObjectTags, StoredObject};
use crate::store::ObjectId;

const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;

/// In-process stand-in for a set of nodes, keyed by port.
///
/// Payloads are split into chunks and the file record is published only after
/// every chunk is written, the same visibility rule GridFS follows. Faults can
/// be injected per port.
#[derive(Clone)]
pub struct MemoryConnector {
    cluster: Arc<Mutex<Cluster>>,
    chunk_size: usize,
}

#[derive(Default)]
struct Cluster {
    nodes: HashMap<u16, Arc<MemoryNode>>,
    refused: HashSet<u16>,
    failing_writes: HashMap<u16, HashSet<String>>,
    disconnect_after: HashMap<u16, usize>,
    failing_verifies: HashMap<u16, HashSet<String>>,
    put_delays: HashMap<u16, Duration>,
}

#[derive(Default)]
struct MemoryNode {
    files: RwLock<Vec<StoredObject>>,
    chunks: RwLock<HashMap<ObjectId, Vec<Vec<u8>>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            cluster: Arc::new(Mutex::new(Cluster::default())),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Connections to `port` fail with `ConnectionRefused`.
    pub fn refuse(&self, port: u16) {
        self.lock().refused.insert(port);
    }

    /// Puts of `filename` on `port` fail with `WriteFailed` and store nothing.
    pub fn fail_write(&self, port: u16, filename: impl Into<String>) {
        self.lock().failing_writes.entry(port).or_default().insert(filename.into());
    }

    /// The connection to `port` drops after `puts` successful puts.
    pub fn disconnect_after(&self, port: u16, puts: usize) {
        self.lock().disconnect_after.insert(port, puts);
    }

    /// Puts of `filename` on `port` publish the object, then fail with
    /// `Unverified` as if reading it back had failed.
    pub fn fail_verify(&self, port: u16, filename: impl Into<String>) {
        self.lock().failing_verifies.entry(port).or_default().insert(filename.into());
    }

    /// Every put on `port` waits `delay` before writing anything.
    pub fn delay_puts(&self, port: u16, delay: Duration) {
        self.lock().put_delays.insert(port, delay);
    }

    /// Everything published on `port`, in upload order.
    pub async fn objects(&self, port: u16) -> Vec<StoredObject> {
        let node = self.lock().nodes.get(&port).cloned();
        match node {
            Some(node) => node.files.read().await.clone(),
            None => Vec::new(),
        }
    }

    /// Number of chunk sets held on `port`, published or not.
    pub async fn chunk_sets(&self, port: u16) -> usize {
        let node = self.lock().nodes.get(&port).cloned();
        match node {
            Some(node) => node.chunks.read().await.len(),
            None => 0,
        }
    }

    /// Flips the first byte of an object's content without touching its tags.
    pub async fn corrupt(&self, port: u16, id: &ObjectId) {
        let node = self.lock().nodes.get(&port).cloned();
        if let Some(node) = node {
            if let Some(first) = node.chunks.write().await.get_mut(id).and_then(|c| c.first_mut()) {
                if let Some(byte) = first.first_mut() {
                    *byte ^= 0xff;
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Cluster> {
        self.cluster.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self, endpoint: &NodeEndpoint) -> StoreResult<MemoryConnection> {
        let mut cluster = self.lock();
        if cluster.refused.contains(&endpoint.port) {
            return Err(StoreError::ConnectionRefused {
                endpoint: endpoint.address(),
                reason: "connection refused".to_string(),
            });
        }
        let node = cluster.nodes.entry(endpoint.port).or_default().clone();
        Ok(MemoryConnection {
            endpoint: endpoint.clone(),
            node,
            chunk_size: self.chunk_size,
            failing_writes: cluster.failing_writes.get(&endpoint.port).cloned().unwrap_or_default(),
            disconnect_after: cluster.disconnect_after.get(&endpoint.port).copied(),
            failing_verifies: cluster.failing_verifies.get(&endpoint.port).cloned().unwrap_or_default(),
            put_delay: cluster.put_delays.get(&endpoint.port).copied(),
            puts: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }
}

pub struct MemoryConnection {
    endpoint: NodeEndpoint,
    node: Arc<MemoryNode>,
    chunk_size: usize,
    failing_writes: HashSet<String>,
    disconnect_after: Option<usize>,
    failing_verifies: HashSet<String>,
    put_delay: Option<Duration>,
    puts: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Disconnected { reason: "connection closed".to_string() });
        }
        Ok(())
    }
}

#[async_trait]
impl BlobConnection for MemoryConnection {
    fn endpoint(&self) -> &NodeEndpoint {
        &self.endpoint
    }

    async fn put(&self, file: &SampleFile, tags: &ObjectTags) -> StoreResult<StoredObject> {
        self.check_open()?;
        if let Some(limit) = self.disconnect_after {
            if self.puts.load(Ordering::SeqCst) >= limit {
                self.closed.store(true, Ordering::SeqCst);
                return Err(StoreError::Disconnected { reason: "connection reset by peer".to_string() });
            }
        }

        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }

        let id = ObjectId::new();
        let chunks: Vec<Vec<u8>> = file.payload.chunks(self.chunk_size).map(<[u8]>::to_vec).collect();

        if self.failing_writes.contains(&file.name) {
            // an aborted upload leaves no chunks behind
            return Err(StoreError::WriteFailed {
                reason: format!("injected write failure for {}", file.name),
            });
        }

        self.node.chunks.write().await.insert(id, chunks);
        let stored = StoredObject {
            object_id: id,
            filename: file.name.clone(),
            uploaded_at: Utc::now(),
            status: tags.status,
            location: tags.location,
            length: file.payload.len() as u64,
            sha256: Some(compute_digest(&file.payload)),
        };
        self.node.files.write().await.push(stored.clone());
        self.puts.fetch_add(1, Ordering::SeqCst);

        if self.failing_verifies.contains(&file.name) {
            return Err(StoreError::Unverified {
                id: id.to_hex(),
                reason: format!("injected verification failure for {}", file.name),
            });
        }
        Ok(stored)
    }

    async fn get(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        self.check_open()?;
        let published = self.node.files.read().await.iter().any(|f| f.object_id == *id);
        if !published {
            return Err(StoreError::NotFound { id: id.to_hex() });
        }
        let chunks = self.node.chunks.read().await;
        let parts = chunks.get(id).ok_or_else(|| StoreError::NotFound { id: id.to_hex() })?;
        Ok(parts.concat())
    }

    async fn list(&self) -> StoreResult<Vec<StoredObject>> {
        self.check_open()?;
        Ok(self.node.files.read().await.clone())
    }

    async fn close(self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
