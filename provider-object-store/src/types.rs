//! Object store resource types
//!
//! Buckets come from the data service; folders and files are rebuilt from
//! each object listing and are never cached as values.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bucket flavour, carried on the wire as the `sref` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BucketKind {
    #[serde(rename = "data.GroupBucket")]
    Group,
    #[serde(rename = "data.UserBucket")]
    User,
}

impl BucketKind {
    pub fn sref(&self) -> &'static str {
        match self {
            BucketKind::Group => "data.GroupBucket",
            BucketKind::User => "data.UserBucket",
        }
    }

    /// Path segment of the data service collection.
    pub fn collection(&self) -> &'static str {
        match self {
            BucketKind::Group => "groupbucket",
            BucketKind::User => "userbucket",
        }
    }
}

/// Data service bucket resource.
///
/// Fields the runtime does not interpret are kept in `extra` so an update
/// sends the resource back whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub id: String,
    #[serde(rename = "sref")]
    pub kind: BucketKind,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub quota: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Bucket {
    pub fn key(&self) -> BucketKey {
        BucketKey {
            id: self.id.clone(),
            kind: self.kind,
            external_id: self.external_id.clone(),
        }
    }
}

/// Non-owning reference to a bucket, enough to scope object requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub id: String,
    pub kind: BucketKind,
    /// Object store bucket name
    pub external_id: String,
}

/// Where a folder or file sits: directly in the bucket or under a folder prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentKey {
    Bucket,
    /// Full folder path, ending in `/`
    Folder(String),
}

impl ParentKey {
    /// Parent of the object at `name`, derived from the path alone.
    pub fn of(name: &str) -> Self {
        let trimmed = name.strip_suffix('/').unwrap_or(name);
        match trimmed.rfind('/') {
            Some(pos) => ParentKey::Folder(trimmed[..=pos].to_string()),
            None => ParentKey::Bucket,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    /// Full path, ending in `/`
    pub name: String,
    pub bucket: BucketKey,
    pub parent: ParentKey,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// Full object path
    pub name: String,
    pub bucket: BucketKey,
    pub parent: ParentKey,
    /// Content identity; also the blob cache key
    pub etag: String,
    pub size: u64,
    pub last_modified: Option<String>,
}

impl File {
    /// Last path segment.
    pub fn base_name(&self) -> &str {
        base_name(&self.name)
    }
}

pub(crate) fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteNode {
    Bucket(Bucket),
    Folder(Folder),
    File(File),
}

impl RemoteNode {
    pub fn bucket_key(&self) -> BucketKey {
        match self {
            RemoteNode::Bucket(bucket) => bucket.key(),
            RemoteNode::Folder(folder) => folder.bucket.clone(),
            RemoteNode::File(file) => file.bucket.clone(),
        }
    }

    /// Object path of the node; empty for a bucket.
    pub fn path(&self) -> &str {
        match self {
            RemoteNode::Bucket(_) => "",
            RemoteNode::Folder(folder) => &folder.name,
            RemoteNode::File(file) => &file.name,
        }
    }
}

/// Something that holds objects: a bucket root or a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Container {
    Bucket(BucketKey),
    Folder(Folder),
}

impl Container {
    pub fn bucket(&self) -> &BucketKey {
        match self {
            Container::Bucket(key) => key,
            Container::Folder(folder) => &folder.bucket,
        }
    }

    /// Path prefix of the container; empty for a bucket root.
    pub fn prefix(&self) -> &str {
        match self {
            Container::Bucket(_) => "",
            Container::Folder(folder) => &folder.name,
        }
    }

    /// Parent key for objects listed directly inside this container.
    pub fn as_parent(&self) -> ParentKey {
        match self {
            Container::Bucket(_) => ParentKey::Bucket,
            Container::Folder(folder) => ParentKey::Folder(folder.name.clone()),
        }
    }
}

impl From<&Bucket> for Container {
    fn from(bucket: &Bucket) -> Self {
        Container::Bucket(bucket.key())
    }
}

impl From<Folder> for Container {
    fn from(folder: Folder) -> Self {
        Container::Folder(folder)
    }
}

/// One level of the tree, classified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub folders: Vec<Folder>,
    pub files: Vec<File>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.files.is_empty()
    }
}

/// Local payload for an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// File name, appended to the target's prefix
    pub name: String,
    pub data: Bytes,
    pub content_type: Option<String>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            content_type: None,
        }
    }

    pub fn content_type(mut self, mime: impl Into<String>) -> Self {
        self.content_type = Some(mime.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Object path the file was stored under
    pub path: String,
    pub size: u64,
    pub status: u16,
}

/// Service account credential pair for direct object store access.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub policy: String,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default, alias = "accountStatus")]
    pub status: String,
    #[serde(default)]
    pub access_key: String,
    /// Only set on the value returned by creation
    #[serde(default, skip_serializing)]
    pub secret_key: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl std::fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessKey")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("policy", &self.policy)
            .field("expiry", &self.expiry)
            .field("status", &self.status)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Object listing response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ObjectListResponse {
    #[serde(default, deserialize_with = "null_as_empty_vec")]
    pub objects: Vec<ObjectEntry>,
}

fn null_as_empty_vec<'de, D>(deserializer: D) -> std::result::Result<Vec<ObjectEntry>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<ObjectEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
pub(crate) struct ObjectEntry {
    pub name: String,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub last_modified: Option<String>,
}
