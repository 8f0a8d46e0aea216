//! GridFS-backed blob store client.
//!
//! GridFS writes the `files` document only when an upload stream is closed, so
//! a reader never sees content without its metadata. Ids are generated on the
//! client before the upload starts.

use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures_util::io::{AsyncReadExt, AsyncWriteExt};
use futures_util::TryStreamExt;
use mongodb::error::{Error as MongoError, ErrorKind, GridFsErrorKind};
use mongodb::gridfs::{FilesCollectionDocument, GridFsBucket, GridFsUploadStream};
use mongodb::options::GridFsBucketOptions;
use mongodb::Client;

use crate::content::SampleFile;
use crate::error::{StoreError, StoreResult};
use crate::node::NodeEndpoint;
use crate::store::blob_store::{compute_digest, BlobConnection, Connector, ObjectTags, StoredObject};
use crate::store::ObjectId;

pub const DEFAULT_DATABASE: &str = "dfs";
pub const DEFAULT_BUCKET: &str = "fs";
pub const DEFAULT_CHUNK_SIZE_BYTES: u32 = 255 * 1024;

const META_STATUS: &str = "status";
const META_LOCATION: &str = "location";
const META_SHA256: &str = "sha256";

/// Which database and bucket fixtures live in, and how to reach them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub database: String,
    pub bucket: String,
    pub chunk_size_bytes: u32,
    pub connect_timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            connect_timeout: Duration::from_secs(3),
        }
    }
}

impl StoreSettings {
    pub fn uri(&self, endpoint: &NodeEndpoint) -> String {
        let ms = self.connect_timeout.as_millis();
        format!(
            "mongodb://{}/?directConnection=true&serverSelectionTimeoutMS={}&connectTimeoutMS={}",
            endpoint.address(),
            ms,
            ms
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct GridFsConnector {
    settings: StoreSettings,
}

impl GridFsConnector {
    pub fn new(settings: StoreSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for GridFsConnector {
    type Connection = GridFsConnection;

    async fn connect(&self, endpoint: &NodeEndpoint) -> StoreResult<GridFsConnection> {
        let refused = |e: MongoError| StoreError::ConnectionRefused {
            endpoint: endpoint.address(),
            reason: e.to_string(),
        };

        tracing::debug!(role = %endpoint.role, address = %endpoint.address(), "connecting to node");
        let client = Client::with_uri_str(self.settings.uri(endpoint)).await.map_err(refused)?;

        let database = client.database(&self.settings.database);
        database.run_command(doc! { "ping": 1 }).await.map_err(refused)?;

        let options = GridFsBucketOptions::builder()
            .bucket_name(self.settings.bucket.clone())
            .chunk_size_bytes(self.settings.chunk_size_bytes)
            .build();
        let bucket = database.gridfs_bucket(options);

        tracing::info!(
            role = %endpoint.role,
            database = %self.settings.database,
            bucket = %self.settings.bucket,
            "connected to node"
        );
        Ok(GridFsConnection {
            endpoint: endpoint.clone(),
            client,
            bucket,
        })
    }
}

pub struct GridFsConnection {
    endpoint: NodeEndpoint,
    client: Client,
    bucket: GridFsBucket,
}

impl GridFsConnection {
    async fn files_document(&self, id: &ObjectId) -> StoreResult<Option<FilesCollectionDocument>> {
        let mut cursor = self
            .bucket
            .find(doc! { "_id": *id })
            .await
            .map_err(|e| classify(e, ReadOrWrite::Read))?;
        cursor.try_next().await.map_err(|e| classify(e, ReadOrWrite::Read))
    }

    async fn abort(&self, mut stream: GridFsUploadStream, filename: &str) {
        if let Err(e) = stream.abort().await {
            tracing::warn!(role = %self.endpoint.role, filename, "failed to abort upload: {}", e);
        }
    }
}

#[async_trait]
impl BlobConnection for GridFsConnection {
    fn endpoint(&self) -> &NodeEndpoint {
        &self.endpoint
    }

    async fn put(&self, file: &SampleFile, tags: &ObjectTags) -> StoreResult<StoredObject> {
        let id = ObjectId::new();
        let metadata = metadata_document(tags, &compute_digest(&file.payload));

        let mut stream = self
            .bucket
            .open_upload_stream(&file.name)
            .id(Bson::ObjectId(id))
            .metadata(metadata)
            .await
            .map_err(|e| classify(e, ReadOrWrite::Write))?;

        if let Err(e) = stream.write_all(&file.payload).await {
            self.abort(stream, &file.name).await;
            return Err(classify_io(e, ReadOrWrite::Write));
        }
        if let Err(e) = stream.close().await {
            self.abort(stream, &file.name).await;
            return Err(classify_io(e, ReadOrWrite::Write));
        }

        // the files document is now visible, so a failure from here on must
        // either remove the object or report its id
        let files_doc = match self.files_document(&id).await {
            Ok(files_doc) => files_doc,
            Err(e) => {
                return Err(StoreError::Unverified {
                    id: id.to_hex(),
                    reason: e.to_string(),
                })
            }
        };
        match verify_upload(id, file.payload.len() as u64, files_doc) {
            Ok(stored) => Ok(stored),
            Err(reason) => match self.bucket.delete(Bson::ObjectId(id)).await {
                Ok(()) => {
                    tracing::warn!(role = %self.endpoint.role, filename = %file.name, %reason, "removed incomplete upload");
                    Err(StoreError::WriteFailed { reason })
                }
                Err(e) if matches!(e.kind.as_ref(), ErrorKind::GridFs(GridFsErrorKind::FileNotFound { .. })) => {
                    Err(StoreError::WriteFailed { reason })
                }
                Err(e) => Err(StoreError::Unverified {
                    id: id.to_hex(),
                    reason: format!("{}; removing it failed: {}", reason, e),
                }),
            },
        }
    }

    async fn get(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        let mut stream = self
            .bucket
            .open_download_stream(Bson::ObjectId(*id))
            .await
            .map_err(|e| match e.kind.as_ref() {
                ErrorKind::GridFs(GridFsErrorKind::FileNotFound { .. }) => StoreError::NotFound { id: id.to_hex() },
                _ => classify(e, ReadOrWrite::Read),
            })?;

        let mut data = Vec::new();
        stream
            .read_to_end(&mut data)
            .await
            .map_err(|e| classify_io(e, ReadOrWrite::Read))?;
        Ok(data)
    }

    async fn list(&self) -> StoreResult<Vec<StoredObject>> {
        let files: Vec<FilesCollectionDocument> = self
            .bucket
            .find(doc! {})
            .await
            .map_err(|e| classify(e, ReadOrWrite::Read))?
            .try_collect()
            .await
            .map_err(|e| classify(e, ReadOrWrite::Read))?;

        let mut objects = files.into_iter().map(stored_object).collect::<StoreResult<Vec<_>>>()?;
        // client-generated ids increase in submission order
        objects.sort_by_key(|o| o.object_id);
        Ok(objects)
    }

    async fn close(self) -> StoreResult<()> {
        let GridFsConnection { endpoint, client, bucket } = self;
        tracing::debug!(role = %endpoint.role, "closing connection");
        drop(bucket);
        client.shutdown().await;
        Ok(())
    }
}

fn metadata_document(tags: &ObjectTags, sha256: &str) -> Document {
    doc! {
        META_STATUS: tags.status.as_str(),
        META_LOCATION: tags.location.as_str(),
        META_SHA256: sha256,
    }
}

/// Checks the files document written for `id` describes the whole payload.
fn verify_upload(id: ObjectId, expected_len: u64, files_doc: Option<FilesCollectionDocument>) -> Result<StoredObject, String> {
    let files_doc = files_doc.ok_or_else(|| format!("object {} missing after upload", id))?;
    let stored = stored_object(files_doc).map_err(|e| e.to_string())?;
    if stored.length != expected_len {
        return Err(format!(
            "object {} has length {}, expected {}",
            id, stored.length, expected_len
        ));
    }
    Ok(stored)
}

fn stored_object(files_doc: FilesCollectionDocument) -> StoreResult<StoredObject> {
    let object_id = files_doc.id.as_object_id().ok_or_else(|| StoreError::ReadFailed {
        reason: format!("object id {} is not an ObjectId", files_doc.id),
    })?;
    let untagged = |what: &str| StoreError::ReadFailed {
        reason: format!("object {} has no valid `{}` tag", object_id, what),
    };

    let metadata = files_doc.metadata.unwrap_or_default();
    let status = metadata
        .get_str(META_STATUS)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| untagged(META_STATUS))?;
    let location = metadata
        .get_str(META_LOCATION)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| untagged(META_LOCATION))?;

    Ok(StoredObject {
        object_id,
        filename: files_doc.filename.unwrap_or_default(),
        uploaded_at: files_doc.upload_date.to_chrono(),
        status,
        location,
        length: files_doc.length,
        sha256: metadata.get_str(META_SHA256).ok().map(str::to_string),
    })
}

#[derive(Clone, Copy)]
enum ReadOrWrite {
    Read,
    Write,
}

fn classify(err: MongoError, op: ReadOrWrite) -> StoreError {
    let reason = err.to_string();
    match err.kind.as_ref() {
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. } => {
            StoreError::Disconnected { reason }
        }
        _ => match op {
            ReadOrWrite::Read => StoreError::ReadFailed { reason },
            ReadOrWrite::Write => StoreError::WriteFailed { reason },
        },
    }
}

fn classify_io(err: std::io::Error, op: ReadOrWrite) -> StoreError {
    use std::io::ErrorKind as IoKind;

    if let Some(inner) = err.get_ref().and_then(|e| e.downcast_ref::<MongoError>()) {
        return classify(inner.clone(), op);
    }
    let reason = err.to_string();
    match err.kind() {
        IoKind::BrokenPipe
        | IoKind::ConnectionReset
        | IoKind::ConnectionAborted
        | IoKind::NotConnected
        | IoKind::UnexpectedEof => StoreError::Disconnected { reason },
        _ => match op {
            ReadOrWrite::Read => StoreError::ReadFailed { reason },
            ReadOrWrite::Write => StoreError::WriteFailed { reason },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Role;
    use crate::store::ObjectStatus;

    fn files_doc(metadata: Option<Document>) -> FilesCollectionDocument {
        files_doc_with(ObjectId::new(), 1024, metadata)
    }

    fn files_doc_with(id: ObjectId, length: i64, metadata: Option<Document>) -> FilesCollectionDocument {
        bson::from_document(doc! {
            "_id": id,
            "length": length,
            "chunkSize": 261120_i32,
            "uploadDate": bson::DateTime::now(),
            "filename": "qwertyui.txt",
            "metadata": metadata.map(Bson::Document).unwrap_or(Bson::Null),
        })
        .unwrap()
    }

    #[test]
    fn test_uri_is_direct_with_timeouts() {
        let settings = StoreSettings::default();
        let uri = settings.uri(&NodeEndpoint::new(Role::Secondary, "127.0.0.1", 27018));
        assert_eq!(
            uri,
            "mongodb://127.0.0.1:27018/?directConnection=true&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000"
        );
    }

    #[test]
    fn test_files_document_to_stored_object() {
        let tags = ObjectTags::active_on(Role::Secondary);
        let stored = stored_object(files_doc(Some(metadata_document(&tags, "cafe")))).unwrap();

        assert_eq!(stored.filename, "qwertyui.txt");
        assert_eq!(stored.length, 1024);
        assert_eq!(stored.status, ObjectStatus::Active);
        assert_eq!(stored.location, Role::Secondary);
        assert_eq!(stored.sha256.as_deref(), Some("cafe"));
    }

    #[test]
    fn test_untagged_files_document_is_rejected() {
        let err = stored_object(files_doc(None)).unwrap_err();
        assert!(matches!(err, StoreError::ReadFailed { .. }));

        let err = stored_object(files_doc(Some(doc! { "status": "active", "location": "tertiary" }))).unwrap_err();
        assert!(matches!(err, StoreError::ReadFailed { .. }));
    }

    #[test]
    fn test_verify_upload_accepts_complete_object() {
        let id = ObjectId::new();
        let tags = ObjectTags::active_on(Role::Primary);
        let doc = files_doc_with(id, 1024, Some(metadata_document(&tags, "cafe")));

        let stored = verify_upload(id, 1024, Some(doc)).unwrap();
        assert_eq!(stored.object_id, id);
        assert_eq!(stored.length, 1024);
    }

    #[test]
    fn test_verify_upload_rejects_short_or_missing_object() {
        let id = ObjectId::new();
        let tags = ObjectTags::active_on(Role::Primary);
        let short = files_doc_with(id, 1000, Some(metadata_document(&tags, "cafe")));

        let reason = verify_upload(id, 1024, Some(short)).unwrap_err();
        assert!(reason.contains("length 1000"), "{reason}");
        assert!(verify_upload(id, 1024, None).unwrap_err().contains("missing"));
        assert!(verify_upload(id, 1024, Some(files_doc_with(id, 1024, None))).is_err());
    }
}
