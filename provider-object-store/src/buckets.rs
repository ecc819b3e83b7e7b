//! Bucket resources on the data service.
//!
//! Listings come from the read-side API (`uerp`); creation and mutation go
//! through the data module with `$publish` so the object store bucket is
//! provisioned alongside the record.

use crate::error::{Result, TreeError};
use crate::types::{Bucket, BucketKind};
use bridge_traits::http::HttpMethod;
use core_net::RestClient;
use core_runtime::SessionConfig;
use serde_json::{json, Value};
use tracing::{info, instrument};

/// Page size used for user bucket listings
const USER_BUCKET_PAGE: u32 = 20;

#[derive(Clone)]
pub struct BucketClient {
    rest: RestClient,
    uerp_url: String,
    data_url: String,
}

impl BucketClient {
    pub fn new(rest: RestClient, uerp_url: impl Into<String>, data_url: impl Into<String>) -> Self {
        Self {
            rest,
            uerp_url: uerp_url.into(),
            data_url: data_url.into(),
        }
    }

    pub fn from_config(rest: RestClient, config: &SessionConfig) -> Self {
        Self::new(rest, config.uerp_url(), config.data_module_url())
    }

    fn resource_url(&self, bucket: &Bucket) -> String {
        format!(
            "{}/data/{}/{}",
            self.data_url,
            bucket.kind.collection(),
            bucket.id
        )
    }

    pub async fn list_group_buckets(&self) -> Result<Vec<Bucket>> {
        let url = format!("{}/data/groupbucket", self.uerp_url);
        Ok(self.rest.get_json(&url).await?)
    }

    pub async fn list_user_buckets(&self) -> Result<Vec<Bucket>> {
        let url = format!("{}/data/userbucket?$size={}", self.uerp_url, USER_BUCKET_PAGE);
        Ok(self.rest.get_json(&url).await?)
    }

    #[instrument(skip(self))]
    pub async fn create_group_bucket(
        &self,
        group_code: &str,
        display_name: &str,
        quota: Option<i64>,
    ) -> Result<Bucket> {
        if group_code.is_empty() {
            return Err(TreeError::InvalidInput("group code is required".to_string()));
        }
        let url = format!(
            "{}/data/groupbucket?$publish&$group={}",
            self.data_url,
            urlencoding::encode(group_code)
        );
        self.create(BucketKind::Group, &url, display_name, quota).await
    }

    #[instrument(skip(self))]
    pub async fn create_user_bucket(&self, display_name: &str, quota: Option<i64>) -> Result<Bucket> {
        let url = format!("{}/data/userbucket?$publish", self.data_url);
        self.create(BucketKind::User, &url, display_name, quota).await
    }

    async fn create(
        &self,
        kind: BucketKind,
        url: &str,
        display_name: &str,
        quota: Option<i64>,
    ) -> Result<Bucket> {
        let body = json!({
            "displayName": display_name,
            "quota": quota.unwrap_or(0),
        });
        let response = self.rest.post(url, &body).await?;
        let bucket = into_bucket(response, kind)?;
        info!(id = %bucket.id, external_id = %bucket.external_id, "Bucket created");
        Ok(bucket)
    }

    /// Fresh copy of the bucket resource.
    pub async fn reload_bucket(&self, bucket: &Bucket) -> Result<Bucket> {
        let response = self.rest.get(&self.resource_url(bucket)).await?;
        into_bucket(response, bucket.kind)
    }

    /// Send the whole resource back; returns what the server stored.
    #[instrument(skip(self, bucket), fields(id = %bucket.id))]
    pub async fn update_bucket(&self, bucket: &Bucket) -> Result<Bucket> {
        let url = format!("{}?$publish", self.resource_url(bucket));
        let response = self.rest.request(HttpMethod::Put, &url, Some(bucket)).await?;
        into_bucket(response, bucket.kind)
    }

    #[instrument(skip(self, bucket), fields(id = %bucket.id))]
    pub async fn delete_bucket(&self, bucket: &Bucket) -> Result<Value> {
        let url = format!("{}?$publish", self.resource_url(bucket));
        Ok(self.rest.delete(&url).await?)
    }
}

impl std::fmt::Debug for BucketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketClient")
            .field("uerp_url", &self.uerp_url)
            .field("data_url", &self.data_url)
            .finish_non_exhaustive()
    }
}

/// Decode a single bucket, filling in `sref` when the service omits it.
fn into_bucket(mut value: Value, kind: BucketKind) -> Result<Bucket> {
    if let Value::Object(map) = &mut value {
        map.entry("sref")
            .or_insert_with(|| Value::String(kind.sref().to_string()));
    }
    serde_json::from_value(value).map_err(|e| TreeError::Decode(format!("bucket: {}", e)))
}
