//! In-memory fake adapters used to drive the daemon deterministically in
//! tests.

use super::{store::ContentStore, transport::Message, Transport};
use crate::crypto;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct FakeStore {
    blobs: Mutex<HashMap<String, Value>>,
    pinned: Mutex<Vec<String>>,
    next_id: StdMutex<u64>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob under a caller-chosen cid (lets tests control sort order
    /// for Merkle-root assertions).
    pub async fn seed(&self, cid: &str, value: Value) {
        self.blobs.lock().await.insert(cid.to_string(), value);
    }

    pub async fn is_pinned(&self, cid: &str) -> bool {
        self.pinned.lock().await.iter().any(|c| c == cid)
    }
}

#[async_trait]
impl ContentStore for FakeStore {
    async fn fetch_json(&self, cid: &str) -> Result<Option<Value>> {
        Ok(self.blobs.lock().await.get(cid).cloned())
    }

    async fn upload_json(&self, value: &Value) -> Result<String> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let cid = format!("bafy-fake-{:06}", next_id);
        drop(next_id);
        self.blobs.lock().await.insert(cid.clone(), value.clone());
        Ok(cid)
    }

    async fn pin(&self, cid: &str) -> Result<()> {
        self.pinned.lock().await.push(cid.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTransport {
    queue: Mutex<VecDeque<Message>>,
    pub published: Mutex<Vec<(String, Value)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, topic: &str, payload: Value) {
        self.queue.lock().await.push_back(Message {
            topic: topic.to_string(),
            payload,
        });
    }

    pub async fn published_on(&self, topic: &str) -> Vec<Value> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn subscribe(&self, _topic: &str) -> Result<()> {
        Ok(())
    }

    async fn get_message(&self, _timeout: std::time::Duration) -> Result<Option<Message>> {
        Ok(self.queue.lock().await.pop_front())
    }

    async fn publish(&self, topic: &str, payload: &Value) -> Result<()> {
        self.published
            .lock()
            .await
            .push((topic.to_string(), payload.clone()));
        Ok(())
    }
}

/// A fake verifier that checks real EIP-191 signatures against an
/// identity->address registry, so tests exercise the same
/// canonicalize-then-verify path production does.
#[derive(Default)]
pub struct FakeVerifier {
    identities: Mutex<HashMap<String, String>>,
}

impl FakeVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, identity: &str, address: &str) {
        self.identities
            .lock()
            .await
            .insert(identity.to_string(), address.to_string());
    }
}

#[async_trait]
impl super::SignatureVerifier for FakeVerifier {
    async fn verify(&self, payload: &Value, claimed_identity: &str) -> Result<bool> {
        let identities = self.identities.lock().await;
        let Some(address) = identities.get(claimed_identity) else {
            return Ok(false);
        };
        let Some(sig) = payload.get("sig").and_then(Value::as_str) else {
            return Ok(false);
        };
        let mut stripped = payload.clone();
        if let Value::Object(map) = &mut stripped {
            map.remove("sig");
        }
        let canonical = crypto::canonicalize(&stripped)?;
        Ok(crypto::verify_signature(&canonical, sig, address).unwrap_or(false))
    }
}

#[derive(Default)]
pub struct FakeSidecar {
    kv: Mutex<HashMap<String, String>>,
    lists: Mutex<HashMap<String, VecDeque<String>>>,
}

impl FakeSidecar {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl super::Sidecar for FakeSidecar {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.kv.lock().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.kv.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.kv.lock().await.remove(key);
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        self.lists
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    async fn lrange(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .lists
            .lock()
            .await
            .get(key)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
