//! Deterministic rollout bucketing
//!
//! A user's bucket is a float in [0, 1) derived from a SHA-1 hash of
//! `key.salt.attributeValue`, with the user's secondary key appended when
//! present. The same inputs always produce the same bucket, which is what
//! makes percentage rollouts consistent across SDK instances.

use crate::model::{User, Value};
use sha1::{Digest, Sha1};

// Denominator for the 15-hex-digit hash fraction.
const LONG_SCALE: f64 = 0xFFF_FFFF_FFFF_FFFF_u64 as f64;

/// Compute the rollout bucket for a user
///
/// `bucket_by` names the attribute whose value seeds the hash; it defaults to
/// `key`. An absent attribute, or one that is not a string or integer, yields
/// bucket 0.
pub fn bucket_user(user: &User, key: &str, salt: &str, bucket_by: Option<&str>) -> f64 {
    let attribute = bucket_by.unwrap_or("key");
    let seed = match user.attribute(attribute).and_then(|v| bucketable(&v)) {
        Some(seed) => seed,
        None => return 0.0,
    };

    let mut input = format!("{}.{}.{}", key, salt, seed);
    if let Some(secondary) = &user.secondary {
        input.push('.');
        input.push_str(secondary);
    }

    let digest = hex::encode(Sha1::digest(input.as_bytes()));
    let numerator = u64::from_str_radix(&digest[..15], 16).unwrap_or(0);
    numerator as f64 / LONG_SCALE
}

// Integers are bucketed by their decimal representation; floats, booleans,
// null, and complex types are not bucketable.
fn bucketable(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Int(n) => Some(n.to_string()),
        _ => None,
    }
}
