//! Structural validation for snapshots fetched from the content store.
//!
//! Schema-first ingestion: a blob that fails validation is dropped before
//! it ever touches pool state.

use serde_json::Value;

/// Snapshot schema definitions, one per canonical wire shape.
pub mod schemas {
    pub const JOB: &str = r#"{
        "required": ["job_id", "job_type", "model", "input_cid", "reward", "client", "timestamp", "nonce", "sig"],
        "properties": {
            "job_id": { "type": "string", "minLength": 1 },
            "job_type": { "type": "string", "minLength": 1 },
            "model": { "type": "string", "minLength": 1 },
            "input_cid": { "type": "string", "minLength": 1 },
            "reward": { "type": "string" },
            "client": { "type": "string", "minLength": 1 },
            "timestamp": { "type": "integer", "minimum": 0 },
            "nonce": { "type": "string", "minLength": 1 },
            "sig": { "type": "string", "minLength": 1 }
        }
    }"#;

    pub const CLAIM: &str = r#"{
        "required": ["job_cid", "miner", "nonce", "timestamp", "sig"],
        "properties": {
            "job_cid": { "type": "string", "minLength": 1 },
            "miner": { "type": "string", "minLength": 1 },
            "nonce": { "type": "string", "minLength": 1 },
            "timestamp": { "type": "integer", "minimum": 0 },
            "sig": { "type": "string", "minLength": 1 }
        }
    }"#;

    pub const PROOF: &str = r#"{
        "required": ["job_cid", "status", "output_cid", "metrics", "proof_hash", "miner"],
        "properties": {
            "job_cid": { "type": "string", "minLength": 1 },
            "status": { "type": "string", "minLength": 1 },
            "output_cid": { "type": "string", "minLength": 1 },
            "metrics": { "type": "object" },
            "proof_hash": { "type": "string", "minLength": 1 },
            "miner": { "type": "string", "minLength": 1 }
        }
    }"#;

    pub const MINER_REGISTRATION: &str = r#"{
        "required": ["miner", "gpus", "models", "timestamp", "sig"],
        "properties": {
            "miner": { "type": "string", "minLength": 1 },
            "gpus": { "type": "array" },
            "models": { "type": "array" },
            "timestamp": { "type": "integer", "minimum": 0 },
            "sig": { "type": "string", "minLength": 1 }
        }
    }"#;

    pub const HEARTBEAT: &str = r#"{
        "required": ["miner", "timestamp", "sig"],
        "properties": {
            "miner": { "type": "string", "minLength": 1 },
            "timestamp": { "type": "integer", "minimum": 0 },
            "sig": { "type": "string", "minLength": 1 }
        }
    }"#;
}

/// Which canonical wire schema to validate against.
#[derive(Debug, Clone, Copy)]
pub enum SchemaType {
    Job,
    Claim,
    Proof,
    MinerRegistration,
    Heartbeat,
}

impl SchemaType {
    pub fn schema(&self) -> &'static str {
        match self {
            SchemaType::Job => schemas::JOB,
            SchemaType::Claim => schemas::CLAIM,
            SchemaType::Proof => schemas::PROOF,
            SchemaType::MinerRegistration => schemas::MINER_REGISTRATION,
            SchemaType::Heartbeat => schemas::HEARTBEAT,
        }
    }
}

/// Outcome of validating a JSON blob against a [`SchemaType`].
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Validate required fields, basic types, and non-emptiness.
///
/// Deliberately structural rather than a full JSON-Schema implementation:
/// the router only needs to discriminate "well-formed enough to act on"
/// from "structurally invalid, drop".
pub fn validate_snapshot(data: &Value, schema_type: SchemaType) -> ValidationResult {
    let schema: Value =
        serde_json::from_str(schema_type.schema()).expect("static schema is valid JSON");
    let mut errors = Vec::new();

    if let Some(required) = schema["required"].as_array() {
        for field in required {
            if let Some(name) = field.as_str() {
                if data.get(name).is_none() {
                    errors.push(format!("missing required field: {}", name));
                }
            }
        }
    }

    if let Some(properties) = schema["properties"].as_object() {
        for (key, prop_schema) in properties {
            let Some(value) = data.get(key) else {
                continue;
            };

            if let Some(expected_type) = prop_schema["type"].as_str() {
                let matches = match expected_type {
                    "string" => value.is_string(),
                    "integer" => value.is_i64() || value.is_u64(),
                    "number" => value.is_number(),
                    "array" => value.is_array(),
                    "object" => value.is_object(),
                    _ => true,
                };
                if !matches {
                    errors.push(format!(
                        "field '{}' has wrong type, expected {}",
                        key, expected_type
                    ));
                }
            }

            if let Some(min_len) = prop_schema["minLength"].as_u64() {
                if let Some(s) = value.as_str() {
                    if (s.len() as u64) < min_len {
                        errors.push(format!("field '{}' must be non-empty", key));
                    }
                }
            }

            if let Some(min) = prop_schema["minimum"].as_f64() {
                if let Some(n) = value.as_f64() {
                    if n < min {
                        errors.push(format!("field '{}' must be >= {}", key, min));
                    }
                }
            }
        }
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_job_passes() {
        let data = json!({
            "job_id": "job-1", "job_type": "inference", "model": "llama-3-70b",
            "input_cid": "bafy123", "reward": "1.00", "client": "alice.eth",
            "timestamp": 1704067200_i64, "nonce": "abc123", "sig": "0xdead"
        });
        let result = validate_snapshot(&data, SchemaType::Job);
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn missing_field_fails() {
        let data = json!({
            "job_id": "job-1", "job_type": "inference",
            "input_cid": "bafy123", "reward": "1.00", "client": "alice.eth",
            "timestamp": 1704067200_i64, "nonce": "abc123", "sig": "0xdead"
        });
        let result = validate_snapshot(&data, SchemaType::Job);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("model")));
    }

    #[test]
    fn empty_job_type_fails() {
        let data = json!({
            "job_id": "job-1", "job_type": "", "model": "llama-3-70b",
            "input_cid": "bafy123", "reward": "1.00", "client": "alice.eth",
            "timestamp": 1704067200_i64, "nonce": "abc123", "sig": "0xdead"
        });
        let result = validate_snapshot(&data, SchemaType::Job);
        assert!(!result.valid);
    }

    #[test]
    fn valid_heartbeat_passes() {
        let data = json!({"miner": "alice.eth", "timestamp": 10, "sig": "0xdead"});
        assert!(validate_snapshot(&data, SchemaType::Heartbeat).valid);
    }
}
