//! Object store service accounts (access key / secret key pairs).

use crate::encoding::{encode_prefix, random_string};
use crate::error::{Result, TreeError};
use crate::types::AccessKey;
use core_net::RestClient;
use core_runtime::SessionConfig;
use serde_json::Value;
use tracing::{info, instrument};

const ACCESS_KEY_LEN: usize = 20;
const SECRET_KEY_LEN: usize = 40;
const DEFAULT_STATUS: &str = "on";

#[derive(Clone)]
pub struct AccessKeyClient {
    rest: RestClient,
    object_url: String,
}

impl AccessKeyClient {
    pub fn new(rest: RestClient, object_url: impl Into<String>) -> Self {
        Self {
            rest,
            object_url: object_url.into(),
        }
    }

    pub fn from_config(rest: RestClient, config: &SessionConfig) -> Self {
        Self::new(rest, config.object_url())
    }

    fn key_url(&self, key: &AccessKey) -> String {
        format!(
            "{}/service-accounts/{}",
            self.object_url,
            urlencoding::encode(&encode_prefix(&key.access_key))
        )
    }

    pub async fn list_access_keys(&self) -> Result<Vec<AccessKey>> {
        let url = format!("{}/service-accounts", self.object_url);
        let response = self.rest.get(&url).await?;
        if response.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(response).map_err(|e| TreeError::Decode(format!("access keys: {}", e)))
    }

    /// Generate and register a new key pair.
    ///
    /// The secret is only ever returned here; store it before dropping the value.
    #[instrument(skip(self, description, policy))]
    pub async fn create_access_key(
        &self,
        name: &str,
        description: Option<&str>,
        policy: Option<&str>,
        expiry: Option<&str>,
        status: Option<&str>,
    ) -> Result<AccessKey> {
        if name.is_empty() {
            return Err(TreeError::InvalidInput("access key name is required".to_string()));
        }

        let access_key = random_string(ACCESS_KEY_LEN);
        let secret_key = random_string(SECRET_KEY_LEN);
        let requested = AccessKey {
            name: name.to_string(),
            description: description.unwrap_or_default().to_string(),
            policy: policy.unwrap_or_default().to_string(),
            expiry: expiry.map(str::to_string),
            status: status.unwrap_or(DEFAULT_STATUS).to_string(),
            access_key: access_key.clone(),
            secret_key: None,
        };

        let mut body = serde_json::to_value(&requested).map_err(|e| TreeError::Decode(e.to_string()))?;
        if let Value::Object(map) = &mut body {
            map.insert("secretKey".to_string(), Value::String(secret_key.clone()));
        }

        let url = format!("{}/service-account-credentials", self.object_url);
        let response = self.rest.post(&url, &body).await?;

        let mut created = match response {
            Value::Object(_) => serde_json::from_value(response)
                .map_err(|e| TreeError::Decode(format!("access key: {}", e)))?,
            _ => requested,
        };
        if created.access_key.is_empty() {
            created.access_key = access_key;
        }
        created.secret_key = Some(secret_key);

        info!(access_key = %created.access_key, "Access key created");
        Ok(created)
    }

    /// Current server view of the key. The returned value carries no secret.
    pub async fn reload_access_key(&self, key: &AccessKey) -> Result<AccessKey> {
        let response = self.rest.get(&self.key_url(key)).await?;

        let mut reloaded = AccessKey {
            secret_key: None,
            ..key.clone()
        };
        if let Value::Object(map) = response {
            let text = |field: &str| map.get(field).and_then(Value::as_str).map(str::to_string);
            if let Some(name) = text("name") {
                reloaded.name = name;
            }
            if let Some(description) = text("description") {
                reloaded.description = description;
            }
            if let Some(status) = text("accountStatus").or_else(|| text("status")) {
                reloaded.status = status;
            }
            if let Some(policy) = text("policy") {
                reloaded.policy = policy;
            }
            if map.contains_key("expiry") {
                reloaded.expiry = text("expiry");
            }
        }
        Ok(reloaded)
    }

    #[instrument(skip(self, key), fields(access_key = %key.access_key))]
    pub async fn delete_access_key(&self, key: &AccessKey) -> Result<()> {
        self.rest.delete(&self.key_url(key)).await?;
        info!("Access key deleted");
        Ok(())
    }
}

impl std::fmt::Debug for AccessKeyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessKeyClient")
            .field("object_url", &self.object_url)
            .finish_non_exhaustive()
    }
}
