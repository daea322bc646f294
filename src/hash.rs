//! Deterministic JSON fingerprints.
//!
//! The digest depends only on content, never on key order: objects are
//! walked in sorted key order, arrays in element order. Only leaf text goes
//! into the hash (no delimiters, no type tags), so the walk is a
//! fingerprint for deduplication, not a canonical encoding.

use serde_json::Value;
use sha1::{Digest, Sha1};

/// Length of a subscription token in hex characters.
pub const TOKEN_LEN: usize = 15;

/// SHA-1 of `value`'s canonical walk, as lowercase hex.
pub fn hash_json(value: &Value) -> String {
    let mut hasher = Sha1::new();
    walk(&mut hasher, value);
    format!("{:x}", hasher.finalize())
}

/// The first [`TOKEN_LEN`] hex characters of [`hash_json`].
pub fn token_for(value: &Value) -> String {
    let mut digest = hash_json(value);
    digest.truncate(TOKEN_LEN);
    digest
}

fn walk(hasher: &mut Sha1, value: &Value) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| walk(hasher, item)),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for key in keys {
                hasher.update(key.as_bytes());
                walk(hasher, &map[key.as_str()]);
            }
        }
        Value::String(s) => hasher.update(s.as_bytes()),
        Value::Number(n) => hasher.update(n.to_string().as_bytes()),
        Value::Bool(true) => hasher.update(b"True"),
        Value::Bool(false) => hasher.update(b"False"),
        Value::Null => hasher.update(b"None"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // sha1("abc"), the FIPS 180 test vector.
    const SHA1_ABC: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";

    #[test]
    fn hashes_leaf_text_only() {
        assert_eq!(hash_json(&json!("abc")), SHA1_ABC);
        assert_eq!(hash_json(&json!({ "ab": "c" })), SHA1_ABC);
        assert_eq!(hash_json(&json!(["a", ["b"], { "c": [] }])), SHA1_ABC);
    }

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(
            r#"{"endpoint":"https://push.example/x","keys":{"p256dh":"P","auth":"A"},"expirationTime":null}"#,
        )
        .unwrap();
        let b: Value = serde_json::from_str(
            r#"{"keys":{"auth":"A","p256dh":"P"},"expirationTime":null,"endpoint":"https://push.example/x"}"#,
        )
        .unwrap();
        assert_eq!(hash_json(&a), hash_json(&b));
    }

    #[test]
    fn content_changes_the_digest() {
        let a = json!({ "endpoint": "https://push.example/1", "keys": {} });
        let b = json!({ "endpoint": "https://push.example/2", "keys": {} });
        assert_ne!(hash_json(&a), hash_json(&b));
    }

    #[test]
    fn scalars_hash_their_text() {
        assert_eq!(hash_json(&json!(true)), hash_json(&json!("True")));
        assert_eq!(hash_json(&json!(null)), hash_json(&json!("None")));
        assert_eq!(hash_json(&json!(42)), hash_json(&json!("42")));
    }

    #[test]
    fn token_is_digest_prefix() {
        let token = token_for(&json!("abc"));
        assert_eq!(token.len(), TOKEN_LEN);
        assert_eq!(token, &SHA1_ABC[..TOKEN_LEN]);
    }
}
