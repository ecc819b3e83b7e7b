//! Remote object tree
//!
//! Lazily enumerates bucket → folder → file levels from the object endpoint
//! and serves file payloads through the `Blob` cache, keyed by etag.

use crate::encoding::prefix_query;
use crate::error::{Result, TreeError};
use crate::types::{
    base_name, BucketKey, Container, File, Folder, Listing, ObjectListResponse, ParentKey,
    RemoteNode, UploadFile, UploadReceipt,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bridge_traits::http::{HttpMethod, HttpRequest, MultipartPart};
use bytes::Bytes;
use core_cache::{CacheRegistry, CacheTable};
use core_net::RestClient;
use core_runtime::{SessionConfig, BLOB_DATABASE, BLOB_TABLE};
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Object tree client
///
/// Listings are never cached; only file payloads are, in `Blob.index`
/// as `{ "id": <etag>, "blob": <base64> }`.
///
/// # Example
///
/// ```ignore
/// let tree = ObjectTree::new(rest, cache, config.object_url(), 4);
/// let listing = tree.list_bucket(&bucket.key()).await?;
/// for file in &listing.files {
///     let bytes = tree.load(file).await?;
/// }
/// ```
#[derive(Clone)]
pub struct ObjectTree {
    rest: RestClient,
    cache: Arc<CacheRegistry>,
    object_url: String,
    upload_concurrency: usize,
}

impl ObjectTree {
    pub fn new(
        rest: RestClient,
        cache: Arc<CacheRegistry>,
        object_url: impl Into<String>,
        upload_concurrency: usize,
    ) -> Self {
        Self {
            rest,
            cache,
            object_url: object_url.into(),
            upload_concurrency: upload_concurrency.max(1),
        }
    }

    pub fn from_config(rest: RestClient, cache: Arc<CacheRegistry>, config: &SessionConfig) -> Self {
        Self::new(rest, cache, config.object_url(), config.upload_concurrency)
    }

    fn objects_url(&self, bucket: &BucketKey) -> String {
        format!("{}/buckets/{}/objects", self.object_url, bucket.external_id)
    }

    /// Top level of a bucket.
    pub async fn list_bucket(&self, bucket: &BucketKey) -> Result<Listing> {
        self.list_prefix(bucket, None, ParentKey::Bucket).await
    }

    /// Direct children of a folder.
    pub async fn list_folder(&self, folder: &Folder) -> Result<Listing> {
        self.list_prefix(
            &folder.bucket,
            Some(&folder.name),
            ParentKey::Folder(folder.name.clone()),
        )
        .await
    }

    pub async fn list(&self, container: &Container) -> Result<Listing> {
        match container {
            Container::Bucket(bucket) => self.list_bucket(bucket).await,
            Container::Folder(folder) => self.list_folder(folder).await,
        }
    }

    /// Re-list the node's own prefix.
    pub async fn stat(&self, node: &RemoteNode) -> Result<Listing> {
        match node {
            RemoteNode::Bucket(bucket) => self.list_bucket(&bucket.key()).await,
            RemoteNode::Folder(folder) => self.list_folder(folder).await,
            RemoteNode::File(file) => {
                self.list_prefix(&file.bucket, Some(&file.name), file.parent.clone())
                    .await
            }
        }
    }

    #[instrument(skip(self, parent), fields(bucket = %bucket.external_id))]
    async fn list_prefix(
        &self,
        bucket: &BucketKey,
        prefix: Option<&str>,
        parent: ParentKey,
    ) -> Result<Listing> {
        let url = match prefix {
            Some(prefix) => format!("{}?prefix={}", self.objects_url(bucket), prefix_query(prefix)),
            None => self.objects_url(bucket),
        };

        let response = self.rest.get(&url).await?;
        let response: ObjectListResponse = if response.is_null() {
            ObjectListResponse::default()
        } else {
            serde_json::from_value(response).map_err(|e| TreeError::Decode(e.to_string()))?
        };

        let mut listing = Listing::default();
        for entry in response.objects {
            match entry.etag {
                Some(etag) if !etag.is_empty() => listing.files.push(File {
                    name: entry.name,
                    bucket: bucket.clone(),
                    parent: parent.clone(),
                    etag,
                    size: entry.size.unwrap_or(0),
                    last_modified: entry.last_modified,
                }),
                _ => listing.folders.push(Folder {
                    name: entry.name,
                    bucket: bucket.clone(),
                    parent: parent.clone(),
                    last_modified: entry.last_modified,
                }),
            }
        }

        debug!(
            folders = listing.folders.len(),
            files = listing.files.len(),
            "Listed objects"
        );
        Ok(listing)
    }

    /// Local folder value; the remote folder appears with its first upload.
    pub fn create_folder(&self, container: &Container, name: &str) -> Result<Folder> {
        let name = name.trim_matches('/');
        if name.is_empty() {
            return Err(TreeError::InvalidInput("folder name is required".to_string()));
        }

        Ok(Folder {
            name: format!("{}{}/", container.prefix(), name),
            bucket: container.bucket().clone(),
            parent: container.as_parent(),
            last_modified: None,
        })
    }

    /// Upload every file under `container`. At most `upload_concurrency`
    /// requests are in flight; results follow input order.
    #[instrument(skip(self, container, files), fields(bucket = %container.bucket().external_id, files = files.len()))]
    pub async fn upload(
        &self,
        container: &Container,
        files: Vec<UploadFile>,
    ) -> Vec<Result<UploadReceipt>> {
        let results: Vec<Result<UploadReceipt>> = stream::iter(
            files
                .into_iter()
                .map(|file| self.upload_one(container, file)),
        )
        .buffered(self.upload_concurrency)
        .collect()
        .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(uploaded = results.len() - failed, failed, "Upload batch finished");
        results
    }

    async fn upload_one(&self, container: &Container, file: UploadFile) -> Result<UploadReceipt> {
        let path = format!("{}{}", container.prefix(), file.name);
        let size = file.data.len() as u64;
        let url = format!(
            "{}/upload?prefix={}",
            self.objects_url(container.bucket()),
            prefix_query(&path)
        );

        let mut part = MultipartPart::file(size.to_string(), base_name(&file.name), file.data);
        if let Some(mime) = file.content_type {
            part = part.content_type(mime);
        }

        let response = self
            .rest
            .send(HttpRequest::new(HttpMethod::Post, url).multipart(vec![part]))
            .await
            .map_err(|e| {
                warn!(path = %path, error = %e, "Upload failed");
                TreeError::from(e)
            })?;

        Ok(UploadReceipt {
            path,
            size,
            status: response.status,
        })
    }

    /// Remove the folder and everything under it.
    #[instrument(skip(self, folder), fields(folder = %folder.name))]
    pub async fn delete_folder(&self, folder: &Folder) -> Result<()> {
        let url = format!(
            "{}?prefix={}&recursive=true",
            self.objects_url(&folder.bucket),
            prefix_query(&folder.name)
        );
        self.rest.send(HttpRequest::new(HttpMethod::Delete, url)).await?;
        Ok(())
    }

    async fn blob_index(&self) -> Option<CacheTable> {
        self.cache.table(BLOB_DATABASE, BLOB_TABLE).await
    }

    /// File payload, from the blob cache when its etag is known.
    ///
    /// A cache that is unavailable or fails to read or write only costs a
    /// download; it never fails the load.
    #[instrument(skip(self, file), fields(file = %file.name, etag = %file.etag))]
    pub async fn load(&self, file: &File) -> Result<Bytes> {
        let index = self.blob_index().await;

        if let Some(index) = &index {
            match index.read(&file.etag).await {
                Ok(Some(record)) => match record
                    .get("blob")
                    .and_then(|blob| blob.as_str())
                    .map(|blob| STANDARD.decode(blob))
                {
                    Some(Ok(bytes)) => {
                        debug!("Blob cache hit");
                        return Ok(Bytes::from(bytes));
                    }
                    _ => warn!("Ignoring unreadable blob cache record"),
                },
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Blob cache read failed"),
            }
        }

        let bytes = self.download(file).await?;

        if let Some(index) = &index {
            let record = json!({ "blob": STANDARD.encode(&bytes) });
            if let Err(e) = index.write(&file.etag, record).await {
                warn!(error = %e, "Blob cache write failed");
            }
        }
        Ok(bytes)
    }

    async fn download(&self, file: &File) -> Result<Bytes> {
        let url = format!(
            "{}/download?prefix={}",
            self.objects_url(&file.bucket),
            prefix_query(&file.name)
        );
        let response = self.rest.send(HttpRequest::new(HttpMethod::Get, url)).await?;
        debug!(bytes = response.body.len(), "Downloaded object");
        Ok(response.body)
    }

    /// Remove the cached payload and the remote object. Both sides are
    /// attempted even if the first fails.
    #[instrument(skip(self, file), fields(file = %file.name))]
    pub async fn delete_file(&self, file: &File) -> Result<()> {
        let cache = match self.blob_index().await {
            Some(index) => index.delete(&file.etag).await.err().map(|e| e.to_string()),
            None => None,
        };

        let url = format!(
            "{}?prefix={}",
            self.objects_url(&file.bucket),
            prefix_query(&file.name)
        );
        let remote = self
            .rest
            .send(HttpRequest::new(HttpMethod::Delete, url))
            .await
            .err()
            .map(|e| e.to_string());

        if cache.is_some() || remote.is_some() {
            warn!(cache = ?cache, remote = ?remote, "Delete left cache and remote out of step");
            return Err(TreeError::Inconsistent {
                name: file.name.clone(),
                cache,
                remote,
            });
        }
        Ok(())
    }

    /// Load through the cache and write the payload to `dir/<base name>`.
    pub async fn save_file(&self, file: &File, dir: &Path) -> Result<PathBuf> {
        let name = file.base_name();
        if name.is_empty() {
            return Err(TreeError::InvalidInput(format!(
                "'{}' has no file name",
                file.name
            )));
        }

        let bytes = self.load(file).await?;
        let target = dir.join(name);
        tokio::fs::write(&target, &bytes).await?;
        info!(path = %target.display(), bytes = bytes.len(), "Saved file");
        Ok(target)
    }

    /// Container holding `node`, rebuilt from relation keys without a
    /// request. A bucket has none.
    pub fn parent_of(&self, node: &RemoteNode) -> Option<Container> {
        let (bucket, parent) = match node {
            RemoteNode::Bucket(_) => return None,
            RemoteNode::Folder(folder) => (&folder.bucket, &folder.parent),
            RemoteNode::File(file) => (&file.bucket, &file.parent),
        };

        Some(match parent {
            ParentKey::Bucket => Container::Bucket(bucket.clone()),
            ParentKey::Folder(prefix) => Container::Folder(Folder {
                name: prefix.clone(),
                bucket: bucket.clone(),
                parent: ParentKey::of(prefix),
                last_modified: None,
            }),
        })
    }
}

impl std::fmt::Debug for ObjectTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectTree")
            .field("object_url", &self.object_url)
            .field("upload_concurrency", &self.upload_concurrency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BucketKind;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpBody, HttpClient, HttpResponse};
    use core_auth::{CredentialStore, Credentials};
    use core_cache::{CacheIndex, StoreLocation};
    use core_runtime::{EventBus, StabilityPolicy};
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    const OBJECTS: &str = "https://h/minio/api/v1/buckets/grp-photos/objects";

    fn bucket() -> BucketKey {
        BucketKey {
            id: "b-1".to_string(),
            kind: BucketKind::Group,
            external_id: "grp-photos".to_string(),
        }
    }

    fn file(name: &str, etag: &str) -> File {
        File {
            name: name.to_string(),
            bucket: bucket(),
            parent: ParentKey::of(name),
            etag: etag.to_string(),
            size: 5,
            last_modified: None,
        }
    }

    async fn tree(http: MockHttp) -> ObjectTree {
        let credentials = CredentialStore::new();
        credentials
            .replace(Credentials::new("tok".to_string(), None, None, 600))
            .await;
        let rest = RestClient::new(Arc::new(http), credentials, Duration::from_secs(30));
        let cache = CacheRegistry::new(
            StoreLocation::Memory,
            CacheIndex::default(),
            StabilityPolicy::default(),
            EventBus::default(),
        );
        ObjectTree::new(rest, Arc::new(cache), "https://h/minio/api/v1", 2)
    }

    #[tokio::test]
    async fn test_listing_classifies_by_etag() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| req.method == HttpMethod::Get && req.url == OBJECTS)
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    r#"{"objects":[
                        {"name":"docs/","last_modified":""},
                        {"name":"a.txt","etag":"e1","size":5,"last_modified":"2024-01-01T00:00:00Z"}
                    ]}"#,
                ))
            });

        let listing = tree(http).await.list_bucket(&bucket()).await.unwrap();

        assert_eq!(listing.folders.len(), 1);
        assert_eq!(listing.folders[0].name, "docs/");
        assert_eq!(listing.folders[0].parent, ParentKey::Bucket);
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].etag, "e1");
        assert_eq!(listing.files[0].size, 5);
    }

    #[tokio::test]
    async fn test_list_folder_sends_prefix() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| req.url == format!("{}?prefix=ZG9jcy8%3D", OBJECTS))
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, r#"{"objects":null}"#)));

        let tree = tree(http).await;
        let folder = tree
            .create_folder(&Container::Bucket(bucket()), "docs")
            .unwrap();
        assert_eq!(folder.name, "docs/");

        let listing = tree.list_folder(&folder).await.unwrap();
        assert!(listing.is_empty());
    }

    #[tokio::test]
    async fn test_create_folder_nests_and_validates() {
        let tree = tree(MockHttp::new()).await;
        let docs = tree
            .create_folder(&Container::Bucket(bucket()), "docs")
            .unwrap();
        let img = tree
            .create_folder(&Container::Folder(docs.clone()), "img")
            .unwrap();

        assert_eq!(img.name, "docs/img/");
        assert_eq!(img.parent, ParentKey::Folder("docs/".to_string()));
        assert!(matches!(
            tree.create_folder(&Container::Folder(docs), "/"),
            Err(TreeError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_load_fetches_each_etag_once() {
        let downloads = Arc::new(AtomicUsize::new(0));
        let counter = downloads.clone();

        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| req.url.contains("/objects/download?prefix="))
            .returning(move |req| {
                counter.fetch_add(1, Ordering::SeqCst);
                let body = if req.url.ends_with(&prefix_query("a.txt")) {
                    "hello"
                } else {
                    "other"
                };
                Ok(HttpResponse::new(200, body))
            });

        let tree = tree(http).await;
        let a = file("a.txt", "etag-a");

        assert_eq!(tree.load(&a).await.unwrap(), Bytes::from("hello"));
        assert_eq!(tree.load(&a).await.unwrap(), Bytes::from("hello"));
        assert_eq!(downloads.load(Ordering::SeqCst), 1);

        let b = file("b.txt", "etag-b");
        assert_eq!(tree.load(&b).await.unwrap(), Bytes::from("other"));
        assert_eq!(downloads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_load_failure_is_not_cached() {
        let mut http = MockHttp::new();
        let mut seq = mockall::Sequence::new();
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(503, "")));
        http.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(200, "late")));

        let tree = tree(http).await;
        let a = file("a.txt", "etag-a");

        assert_eq!(tree.load(&a).await.unwrap_err().status(), Some(503));
        assert_eq!(tree.load(&a).await.unwrap(), Bytes::from("late"));
    }

    #[tokio::test]
    async fn test_upload_builds_multipart_per_file() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| {
                let part_ok = match &req.body {
                    Some(HttpBody::Multipart(parts)) => {
                        parts.len() == 1
                            && parts[0].name == parts[0].data.len().to_string()
                            && parts[0].file_name.as_deref() == Some("a.txt")
                    }
                    _ => false,
                };
                part_ok
                    && req.method == HttpMethod::Post
                    && req.url == format!("{}/upload?prefix={}", OBJECTS, prefix_query("docs/a.txt"))
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, "")));
        http.expect_execute()
            .withf(|req| req.url.ends_with(&prefix_query("docs/b.txt")))
            .times(1)
            .returning(|_| Ok(HttpResponse::new(413, "too large")));
        http.expect_execute()
            .withf(|req| req.url.ends_with(&prefix_query("docs/c.txt")))
            .times(1)
            .returning(|_| Ok(HttpResponse::new(201, "")));

        let tree = tree(http).await;
        let docs = tree
            .create_folder(&Container::Bucket(bucket()), "docs")
            .unwrap();
        let results = tree
            .upload(
                &Container::Folder(docs),
                vec![
                    UploadFile::new("a.txt", "aaaaa"),
                    UploadFile::new("b.txt", "bb"),
                    UploadFile::new("c.txt", "c"),
                ],
            )
            .await;

        assert_eq!(results.len(), 3);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.path, "docs/a.txt");
        assert_eq!(first.size, 5);
        assert_eq!(results[1].as_ref().unwrap_err().status(), Some(413));
        assert_eq!(results[2].as_ref().unwrap().status, 201);
    }

    #[tokio::test]
    async fn test_bucket_upload_uses_file_name() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| req.url == format!("{}/upload?prefix={}", OBJECTS, prefix_query("a.txt")))
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, "")));

        let results = tree(http)
            .await
            .upload(&Container::Bucket(bucket()), vec![UploadFile::new("a.txt", "x")])
            .await;
        assert!(results[0].is_ok());
    }

    #[tokio::test]
    async fn test_delete_folder_is_recursive() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| {
                req.method == HttpMethod::Delete
                    && req.url == format!("{}?prefix={}&recursive=true", OBJECTS, prefix_query("docs/"))
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, "")));

        let tree = tree(http).await;
        let docs = tree
            .create_folder(&Container::Bucket(bucket()), "docs")
            .unwrap();
        tree.delete_folder(&docs).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_file_clears_cache_entry() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| req.method == HttpMethod::Get)
            .times(2)
            .returning(|_| Ok(HttpResponse::new(200, "hello")));
        http.expect_execute()
            .withf(|req| req.method == HttpMethod::Delete)
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, "")));

        let tree = tree(http).await;
        let a = file("a.txt", "etag-a");
        tree.load(&a).await.unwrap();
        tree.delete_file(&a).await.unwrap();

        // The cached payload is gone, so this downloads again.
        tree.load(&a).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_file_reports_remote_side() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(HttpResponse::new(500, "boom")));

        let tree = tree(http).await;
        let err = tree.delete_file(&file("a.txt", "etag-a")).await.unwrap_err();
        match err {
            TreeError::Inconsistent { cache, remote, .. } => {
                assert!(cache.is_none());
                assert!(remote.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_parent_of_uses_relation_keys() {
        let tree = tree(MockHttp::new()).await;

        let nested = RemoteNode::File(file("docs/img/cat.png", "e"));
        match tree.parent_of(&nested) {
            Some(Container::Folder(folder)) => {
                assert_eq!(folder.name, "docs/img/");
                assert_eq!(folder.parent, ParentKey::Folder("docs/".to_string()));
            }
            other => panic!("unexpected parent: {other:?}"),
        }

        let top = RemoteNode::File(file("cat.png", "e"));
        assert_eq!(tree.parent_of(&top), Some(Container::Bucket(bucket())));
    }

    #[tokio::test]
    async fn test_save_file_writes_base_name() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, "hello")));

        let dir = std::env::temp_dir().join(format!("object-tree-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let tree = tree(http).await;
        let path = tree
            .save_file(&file("docs/a.txt", "etag-a"), &dir)
            .await
            .unwrap();

        assert_eq!(path, dir.join("a.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_stat_relists_file_prefix() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|req| req.url == format!("{}?prefix={}", OBJECTS, prefix_query("docs/a.txt")))
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    r#"{"objects":[{"name":"docs/a.txt","etag":"e2","size":9}]}"#,
                ))
            });

        let listing = tree(http)
            .await
            .stat(&RemoteNode::File(file("docs/a.txt", "e1")))
            .await
            .unwrap();
        assert_eq!(listing.files[0].etag, "e2");
        assert_eq!(listing.files[0].parent, ParentKey::Folder("docs/".to_string()));
    }
}
