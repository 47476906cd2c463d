//! Request identity
//!
//! A request is identified by the SHA-256 of its endpoint name, testset name
//! and parameter pairs, in that order. The pairs are hashed in the order the
//! strategy produced them: the same parameters in a different order are a
//! different request.

use sha2::{Digest, Sha256};

use crate::types::Combination;

/// Compute the hex encoded request id
pub fn request_id(testset: &str, endpoint: &str, combination: &Combination) -> String {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    hasher.update(testset.as_bytes());
    for (name, value) in combination {
        hasher.update(name.as_bytes());
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combo(pairs: &[(&str, &str)]) -> Combination {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_identity_is_deterministic() {
        let c = combo(&[("limit", "10"), ("app", "1")]);
        assert_eq!(request_id("smoke", "/items", &c), request_id("smoke", "/items", &c));
        assert_eq!(request_id("smoke", "/items", &c).len(), 64);
    }

    #[test]
    fn test_pair_order_changes_identity() {
        let ab = combo(&[("a", "1"), ("b", "2")]);
        let ba = combo(&[("b", "2"), ("a", "1")]);
        assert_ne!(request_id("smoke", "/items", &ab), request_id("smoke", "/items", &ba));
    }

    #[test]
    fn test_testset_and_endpoint_are_part_of_identity() {
        let c = combo(&[("a", "1")]);
        let base = request_id("smoke", "/items", &c);
        assert_ne!(base, request_id("full", "/items", &c));
        assert_ne!(base, request_id("smoke", "/other", &c));
    }

    #[test]
    fn test_known_digest() {
        // sha256("/healthsmoke")
        let mut hasher = Sha256::new();
        hasher.update(b"/healthsmoke");
        let expected = hex::encode(hasher.finalize());
        assert_eq!(request_id("smoke", "/health", &Vec::new()), expected);
    }
}
