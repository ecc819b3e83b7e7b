//! # Object Store Provider
//!
//! Remote object tree over the deployment's object storage console API.
//!
//! ## Overview
//!
//! This module provides:
//! - Bucket → folder → file enumeration, one level per request
//! - Batched multipart uploads with bounded parallelism
//! - Etag-keyed payload caching in the local `Blob` database
//! - Group and user bucket management on the data service
//! - Service account access keys
//! - The login hook that opens the object store cookie session

pub mod access_keys;
pub mod buckets;
pub mod encoding;
pub mod error;
pub mod login;
pub mod tree;
pub mod types;

pub use access_keys::AccessKeyClient;
pub use buckets::BucketClient;
pub use encoding::{decode_prefix, encode_prefix, random_string};
pub use error::{Result, TreeError};
pub use login::ObjectStoreLogin;
pub use tree::ObjectTree;
pub use types::{
    AccessKey, Bucket, BucketKey, BucketKind, Container, File, Folder, Listing, ParentKey,
    RemoteNode, UploadFile, UploadReceipt,
};
