//! Cache Payload Serialization
//!
//! Typed encode/decode between cached values and the bytes kept in L2.
//! Decode failures surface as `Error::Serialization` so the facade can turn
//! them into a miss.
//!
//! # Example
//!
//! ```
//! use edcache::cache::{JsonSerializer, Serializer};
//!
//! let serializer = JsonSerializer;
//! let bytes = Serializer::<Vec<u32>>::encode(&serializer, &vec![1, 2, 3]).unwrap();
//! let back: Vec<u32> = serializer.decode(&bytes).unwrap();
//! assert_eq!(back, vec![1, 2, 3]);
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Trait for payload encodings
pub trait Serializer<T>: Send + Sync {
    /// Encoding name, used in errors and logs
    fn format(&self) -> &'static str;

    /// Encode a value
    fn encode(&self, value: &T) -> Result<Bytes>;

    /// Decode a value
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON encoding via serde_json
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl<T> Serializer<T> for JsonSerializer
where
    T: Serialize + DeserializeOwned,
{
    fn format(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &T) -> Result<Bytes> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| Error::Serialization {
                format: "json".into(),
                reason: e.to_string(),
            })
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization {
            format: "json".into(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
