//! ENS-based signature verifier adapter: given a payload and a
//! claimed identity, answers valid/invalid. The verifier owns
//! canonicalization, stripping `sig`, and resolving the identity to a
//! public key — the daemon only ever calls `verify`.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify(&self, payload: &Value, claimed_identity: &str) -> Result<bool>;
}

/// Production adapter: calls an external ENS + signature resolution
/// service over HTTP. This client assumes a simple `POST /verify` returning
/// `{"valid": bool}`.
pub struct RemoteVerifier {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteVerifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SignatureVerifier for RemoteVerifier {
    async fn verify(&self, payload: &Value, claimed_identity: &str) -> Result<bool> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            payload: &'a Value,
            identity: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            valid: bool,
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&Req {
                payload,
                identity: claimed_identity,
            })
            .send()
            .await;

        match response {
            Ok(r) if r.status().is_success() => match r.json::<Resp>().await {
                Ok(body) => Ok(body.valid),
                Err(_) => Ok(false),
            },
            _ => Ok(false),
        }
    }
}
