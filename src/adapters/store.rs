//! Content-addressable store adapter: fetch/upload/pin opaque
//! JSON blobs by content identifier.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch the JSON blob at `cid`. Returns `None` on fetch-miss or
    /// non-JSON content, which the caller treats as a dropped message.
    async fn fetch_json(&self, cid: &str) -> Result<Option<Value>>;

    /// Upload a JSON value, returning its content identifier.
    async fn upload_json(&self, value: &Value) -> Result<String>;

    /// Pin a content identifier so the node retains it.
    async fn pin(&self, cid: &str) -> Result<()>;
}

/// Convenience wrapper: fetch and deserialize into `T`, treating a
/// deserialize failure the same as a fetch-miss (structurally invalid).
pub async fn fetch_typed<T: DeserializeOwned>(
    store: &dyn ContentStore,
    cid: &str,
) -> Result<Option<T>> {
    let Some(value) = store.fetch_json(cid).await? else {
        return Ok(None);
    };
    match serde_json::from_value(value) {
        Ok(typed) => Ok(Some(typed)),
        Err(_) => Ok(None),
    }
}

/// Convenience wrapper: serialize `T` then upload.
pub async fn upload_typed<T: Serialize>(store: &dyn ContentStore, value: &T) -> Result<String> {
    let json = serde_json::to_value(value).context("failed to serialize snapshot")?;
    store.upload_json(&json).await
}

/// Production adapter: talks to a Kubo (IPFS) HTTP RPC API via
/// `/api/v0/add`, `/api/v0/cat`, and `/api/v0/pin/add`.
pub struct IpfsStore {
    api_base: String,
    client: reqwest::Client,
}

impl IpfsStore {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
        }
    }
}

#[async_trait]
impl ContentStore for IpfsStore {
    async fn fetch_json(&self, cid: &str) -> Result<Option<Value>> {
        let url = format!("{}/api/v0/cat?arg={}", self.api_base, cid);
        let response = match self.client.post(&url).send().await {
            Ok(r) => r,
            Err(_) => return Ok(None),
        };
        if !response.status().is_success() {
            return Ok(None);
        }
        match response.json::<Value>().await {
            Ok(value) => Ok(Some(value)),
            Err(_) => Ok(None),
        }
    }

    async fn upload_json(&self, value: &Value) -> Result<String> {
        let json_str = serde_json::to_string(value)?;
        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(json_str.into_bytes()).file_name("data.json"),
        );

        let url = format!("{}/api/v0/add", self.api_base);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .context("failed to upload to content store")?;

        let result: Value = response.json().await?;
        result["Hash"]
            .as_str()
            .map(|s| s.to_string())
            .context("content store returned no Hash field")
    }

    async fn pin(&self, cid: &str) -> Result<()> {
        let url = format!("{}/api/v0/pin/add?arg={}", self.api_base, cid);
        self.client
            .post(&url)
            .send()
            .await
            .context("failed to pin cid")?;
        Ok(())
    }
}
