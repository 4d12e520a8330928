//! Reservation metadata codec
//!
//! Reservations carry an open string map the relational schema cannot hold
//! natively. It is stored as a JSON blob; keys are kept sorted so the same
//! map always encodes to the same bytes.

use crate::error::AppError;
use crate::AppResult;
use std::collections::BTreeMap;

/// Open key/value annotations attached to a reservation
pub type Metadata = BTreeMap<String, String>;

/// Encode metadata for storage; an empty map encodes to `{}`
pub fn encode(meta: &Metadata) -> AppResult<Vec<u8>> {
    serde_json::to_vec(meta).map_err(|e| AppError::Serialization(format!("meta encode: {}", e)))
}

/// Decode a stored blob; an empty blob or JSON `null` yields an empty map
pub fn decode(raw: &[u8]) -> AppResult<Metadata> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Metadata::new());
    }

    let decoded: Option<Metadata> = serde_json::from_slice(raw)
        .map_err(|e| AppError::Serialization(format!("meta decode: {}", e)))?;

    Ok(decoded.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_map_is_object_token() {
        assert_eq!(encode(&Metadata::new()).unwrap(), b"{}".to_vec());
    }

    #[test]
    fn test_round_trip() {
        let mut meta = Metadata::new();
        meta.insert("campaign".to_string(), "spring-tv".to_string());
        meta.insert("utm_source".to_string(), "".to_string());
        meta.insert("note".to_string(), "quote \" and ünïcode".to_string());

        let raw = encode(&meta).unwrap();
        assert_eq!(decode(&raw).unwrap(), meta);
        assert_eq!(decode(&encode(&Metadata::new()).unwrap()).unwrap(), Metadata::new());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let mut a = Metadata::new();
        a.insert("b".into(), "2".into());
        a.insert("a".into(), "1".into());
        let mut b = Metadata::new();
        b.insert("a".into(), "1".into());
        b.insert("b".into(), "2".into());

        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
        assert_eq!(encode(&a).unwrap(), br#"{"a":"1","b":"2"}"#.to_vec());
    }

    #[test]
    fn test_absent_blob_decodes_empty() {
        assert!(decode(b"").unwrap().is_empty());
        assert!(decode(b"null").unwrap().is_empty());
    }

    #[test]
    fn test_garbage_is_serialization_error() {
        let err = decode(b"\x00\x01not json").unwrap_err();
        assert!(matches!(err, AppError::Serialization(_)));

        let err = decode(br#"{"a": 1}"#).unwrap_err();
        assert_eq!(err.error_code(), "serialization_error");
    }
}
