use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

use crate::event_sourcing::core::{DecodeError, StoreError};

/// Converts store records to and from their on-log byte form
pub trait RecordCodec<T>: Send + Sync {
    fn encode(&self, record: &T) -> Result<Vec<u8>, StoreError>;

    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError>;
}

/// JSON record codec.
///
/// Bytes that are not JSON are `Corrupt`. Well-formed JSON naming an enum
/// variant this build does not know is `UnknownType`.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> RecordCodec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, record: &T) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(record).map_err(|e| StoreError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::Corrupt(e.to_string()))?;

        serde_json::from_value(value).map_err(|e| {
            let message = e.to_string();
            match unknown_variant(&message) {
                Some(variant) => DecodeError::UnknownType(variant.to_string()),
                None => DecodeError::Corrupt(message),
            }
        })
    }
}

/// serde reports "unknown variant `Name`, expected ..."
fn unknown_variant(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("unknown variant `")?;
    let end = rest.find('`')?;
    Some(&rest[..end])
}
