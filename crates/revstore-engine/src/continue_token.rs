//! Pagination cursor.
//!
//! Tokens are opaque to clients: base64 (standard alphabet) over a compact
//! JSON object `{"o": offset, "v": resource_version, "s": ascending}`.
//! `s` is omitted when false.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use revstore_types::ResourceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from decoding a continue token.
#[derive(Debug, Error)]
pub enum ContinueTokenError {
    #[error("invalid continue token encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid continue token payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ContinueTokenError> for ResourceError {
    fn from(err: ContinueTokenError) -> Self {
        ResourceError::Validation(err.to_string())
    }
}

/// Resume position of a paginated scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueToken {
    /// Rows of the pinned result already returned
    #[serde(rename = "o")]
    pub start_offset: i64,
    /// Snapshot revision for lists; last-seen revision for history
    #[serde(rename = "v")]
    pub resource_version: i64,
    /// History pages in ascending order
    #[serde(rename = "s", default, skip_serializing_if = "std::ops::Not::not")]
    pub sort_ascending: bool,
}

impl ContinueToken {
    pub fn new(start_offset: i64, resource_version: i64) -> Self {
        Self {
            start_offset,
            resource_version,
            sort_ascending: false,
        }
    }

    pub fn ascending(mut self, sort_ascending: bool) -> Self {
        self.sort_ascending = sort_ascending;
        self
    }

    pub fn encode(&self) -> String {
        // Serializing a struct of plain integers cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self, ContinueTokenError> {
        let bytes = STANDARD.decode(token.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Decode `token`, treating the empty string as "no token".
    pub fn parse_optional(token: &str) -> Result<Option<Self>, ContinueTokenError> {
        if token.is_empty() {
            return Ok(None);
        }
        Self::decode(token).map(Some)
    }
}

impl std::fmt::Display for ContinueToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encoding() {
        let token = ContinueToken::new(50, 100);
        assert_eq!(token.to_string(), "eyJvIjo1MCwidiI6MTAwfQ==");
    }

    #[test]
    fn test_decode_known_encoding() {
        let token = ContinueToken::decode("eyJvIjo1MCwidiI6MTAwfQ==").unwrap();
        assert_eq!(token, ContinueToken::new(50, 100));
        assert!(!token.sort_ascending);
    }

    #[test]
    fn test_sort_flag_roundtrip() {
        let token = ContinueToken::new(0, 42).ascending(true);
        let json = String::from_utf8(STANDARD.decode(token.encode()).unwrap()).unwrap();
        assert_eq!(json, r#"{"o":0,"v":42,"s":true}"#);
        assert_eq!(ContinueToken::decode(&token.encode()).unwrap(), token);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            ContinueToken::decode("not base64!"),
            Err(ContinueTokenError::Base64(_))
        ));
        let not_json = STANDARD.encode("hello");
        assert!(matches!(
            ContinueToken::decode(&not_json),
            Err(ContinueTokenError::Json(_))
        ));
        let err: ResourceError = ContinueToken::decode("!!").unwrap_err().into();
        assert!(matches!(err, ResourceError::Validation(_)));
    }

    #[test]
    fn test_parse_optional() {
        assert_eq!(ContinueToken::parse_optional("").unwrap(), None);
        assert_eq!(
            ContinueToken::parse_optional("eyJvIjo1MCwidiI6MTAwfQ==").unwrap(),
            Some(ContinueToken::new(50, 100))
        );
    }
}
