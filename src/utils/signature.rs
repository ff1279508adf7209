use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_FIELD: &str = "signature";

/// Serialize `payload` with object keys sorted at every level and the
/// top-level signature field removed.
pub fn canonical_payload(payload: &Value) -> String {
    let stripped = match payload {
        Value::Object(map) => {
            let mut map = map.clone();
            map.remove(SIGNATURE_FIELD);
            Value::Object(map)
        }
        other => other.clone(),
    };
    sorted(stripped).to_string()
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = Map::new();
            for (key, value) in entries {
                out.insert(key, sorted(value));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// Hex HMAC-SHA256 of the canonical payload.
pub fn sign(payload: &Value, key: &str) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid checksum key: {}", e)))?;
    mac.update(canonical_payload(payload).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Recompute the signature of `payload` and compare it with the one it carries.
pub fn verify(payload: &Value, key: &str) -> bool {
    let Some(provided) = payload.get(SIGNATURE_FIELD).and_then(Value::as_str) else {
        return false;
    };
    let Ok(expected) = sign(payload, key) else {
        return false;
    };
    !provided.is_empty() && provided.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() == 1
}

/// Return `payload` with its signature field set.
pub fn attach(mut payload: Value, key: &str) -> AppResult<Value> {
    let signature = sign(&payload, key)?;
    if let Value::Object(map) = &mut payload {
        map.insert(SIGNATURE_FIELD.to_string(), Value::String(signature));
    }
    Ok(payload)
}
