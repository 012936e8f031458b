//! Canonical serialization and EIP-191 signing for outgoing snapshots.
//!
//! Canonicalization: strip the `sig` field at every nesting
//! level, serialize the rest with keys sorted lexicographically and no
//! insignificant whitespace. `serde_json::Map` is backed by a `BTreeMap`
//! by default (the `preserve_order` feature is not enabled), so a plain
//! `serde_json::to_string` over a stripped `Value` already produces
//! lexicographically-sorted keys at every level; canonicalization is
//! therefore just "strip `sig`, then serialize".

use anyhow::{Context, Result};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Signature;
use serde::Serialize;
use serde_json::Value;

/// Strip `sig` recursively and return the canonical JSON byte string.
pub fn canonicalize<T: Serialize>(data: &T) -> Result<String> {
    let mut value = serde_json::to_value(data)?;
    strip_sig(&mut value);
    Ok(serde_json::to_string(&value)?)
}

fn strip_sig(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("sig");
            for v in map.values_mut() {
                strip_sig(v);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                strip_sig(v);
            }
        }
        _ => {}
    }
}

/// Sign a snapshot with EIP-191 personal_sign under the operator key.
pub async fn sign_snapshot<T: Serialize>(data: &T, private_key: &str) -> Result<String> {
    let canonical = canonicalize(data)?;
    sign_canonical(&canonical, private_key).await
}

/// Sign an already-canonicalized byte string.
pub async fn sign_canonical(canonical: &str, private_key: &str) -> Result<String> {
    let hash = ethers::utils::keccak256(canonical.as_bytes());

    let wallet: LocalWallet = private_key
        .trim_start_matches("0x")
        .parse()
        .context("Invalid private key format")?;

    let message = format!(
        "\x19Ethereum Signed Message:\n{}{}",
        hash.len(),
        hex::encode(hash)
    );
    let message_hash = ethers::utils::keccak256(message.as_bytes());

    let signature: Signature = wallet
        .sign_message(&message_hash[..])
        .await
        .context("Failed to sign message")?;

    Ok(format!("0x{}", hex::encode(signature.to_vec())))
}

/// Verify an EIP-191 signature produced by [`sign_canonical`].
///
/// The production verifier adapter performs this remotely given
/// an ENS identity; this local routine exists for the in-memory fake
/// verifier used in tests.
pub fn verify_signature(canonical: &str, signature: &str, expected_address: &str) -> Result<bool> {
    let hash = ethers::utils::keccak256(canonical.as_bytes());
    let message = format!(
        "\x19Ethereum Signed Message:\n{}{}",
        hash.len(),
        hex::encode(hash)
    );
    let message_hash = ethers::utils::keccak256(message.as_bytes());

    let sig_bytes =
        hex::decode(signature.trim_start_matches("0x")).context("Invalid signature format")?;
    let signature: Signature = sig_bytes
        .as_slice()
        .try_into()
        .context("Invalid signature length")?;

    let recovered = signature
        .recover(&message_hash[..])
        .context("Failed to recover address from signature")?;

    Ok(format!("{:?}", recovered).to_lowercase() == expected_address.to_lowercase())
}

/// Generate a random hex nonce.
pub fn random_hex(bytes: usize) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let random_bytes: Vec<u8> = (0..bytes).map(|_| rng.gen()).collect();
    hex::encode(random_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_strips_sig_and_sorts_keys() {
        let value = json!({"b": 1, "sig": "0xdead", "a": {"z": 1, "sig": "0xbeef", "y": 2}});
        let canonical = serde_json::to_string(&{
            let mut v = value.clone();
            strip_sig(&mut v);
            v
        })
        .unwrap();
        assert_eq!(canonical, r#"{"a":{"y":2,"z":1},"b":1}"#);
        let _ = canonicalize(&value).unwrap();
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let value = json!({"b": 1, "a": 2});
        let once = canonicalize(&value).unwrap();
        let reparsed: Value = serde_json::from_str(&once).unwrap();
        let twice = canonicalize(&reparsed).unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn sign_and_verify_round_trip() {
        let key = "0x176ecbc1cece9f830ac4e521efd9ce220c975007a28023e62fb66613c46bdb34";
        let wallet: LocalWallet = key.trim_start_matches("0x").parse().unwrap();
        let address = format!("{:?}", wallet.address());

        let payload = json!({"job_id": "job-1", "timestamp": 1234});
        let canonical = canonicalize(&payload).unwrap();
        let sig = sign_canonical(&canonical, key).await.unwrap();

        assert!(verify_signature(&canonical, &sig, &address).unwrap());
        assert!(!verify_signature(&canonical, &sig, "0x0000000000000000000000000000000000dEaD").unwrap());
    }

    #[test]
    fn random_hex_is_unique_and_sized() {
        let a = random_hex(16);
        let b = random_hex(16);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
