//! Durable sidecar adapter: key/value with TTL, list append,
//! list range, key delete. The only shared resource with external readers;
//! the daemon only ever writes the keys it owns.

use anyhow::{Context, Result};
use async_trait::async_trait;

#[async_trait]
pub trait Sidecar: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Prepend `value` to the list at `key` (newest first).
    async fn lpush(&self, key: &str, value: &str) -> Result<()>;
    /// Return up to `limit` entries from the list at `key`, newest first.
    async fn lrange(&self, key: &str, limit: usize) -> Result<Vec<String>>;
}

/// Production adapter over a Redis-compatible endpoint.
///
/// Named but not implemented against a concrete client here — the
/// `sidecar_url` option is a connection string for whatever
/// key/value + list backend the deployment provides; wiring a `redis`
/// crate client is an infrastructure concern the daemon's adapter trait
/// deliberately isolates.
pub struct HttpSidecar {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSidecar {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Sidecar for HttpSidecar {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.client
            .post(format!("{}/set/{}", self.base_url, key))
            .body(value.to_string())
            .send()
            .await
            .context("sidecar set failed")?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(format!("{}/get/{}", self.base_url, key))
            .send()
            .await
            .context("sidecar get failed")?;
        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .post(format!("{}/del/{}", self.base_url, key))
            .send()
            .await
            .context("sidecar delete failed")?;
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        self.client
            .post(format!("{}/lpush/{}", self.base_url, key))
            .body(value.to_string())
            .send()
            .await
            .context("sidecar lpush failed")?;
        Ok(())
    }

    async fn lrange(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/lrange/{}/{}", self.base_url, key, limit))
            .send()
            .await
            .context("sidecar lrange failed")?;
        if !response.status().is_success() {
            return Ok(vec![]);
        }
        Ok(response.json().await.unwrap_or_default())
    }
}
