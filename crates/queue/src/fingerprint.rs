//! Payload fingerprinting for enqueue dedup (§4.5).
//!
//! The dedup unique index is keyed on `(task_type, student_id, module_id,
//! payload_fingerprint)`. Hashing the canonical JSON payload instead of
//! storing the payload itself in the index keeps the index narrow and
//! collation-independent.

use sha2::{Digest, Sha256};

/// Stable hex digest of a task payload. Relies on `serde_json::Value`'s
/// `Ord` impl ordering object keys, so two payloads built from the same
/// fields in a different insertion order still fingerprint identically.
pub fn fingerprint(payload: &serde_json::Value) -> String {
    let canonical = canonicalize(payload);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn canonicalize(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .into_iter()
                .map(|(k, v)| format!("{:?}:{}", k, canonicalize(v)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }
        serde_json::Value::Array(items) => {
            let body = items.iter().map(canonicalize).collect::<Vec<_>>().join(",");
            format!("[{body}]")
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_fingerprint() {
        let a = json!({"topic_id": "t1", "initial_topic_count": 3});
        let b = json!({"initial_topic_count": 3, "topic_id": "t1"});
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn differing_payloads_differ() {
        let a = json!({"topic_id": "t1"});
        let b = json!({"topic_id": "t2"});
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
