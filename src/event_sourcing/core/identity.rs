use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::errors::ValidationError;

// ============================================================================
// Aggregate Identity - Self-describing business identifier
// ============================================================================
//
// Format: <domain>.<object_type>.<SYMBOL>-<random>
//
//   domain       [a-z][a-z0-9_]*
//   object_type  [a-z][a-z0-9_]*
//   SYMBOL       1-4 ASCII uppercase letters
//   random       32 lowercase hex digits (uuid v4, simple form)
//
// Example: sales.order.ORD-5f0c2a8e4b7d4e1f9a3c6b2d8e0f1a2b
//
// The raw value doubles as a stream name, so every character must be legal
// in a Kafka topic name.
//
// ============================================================================

const RANDOM_LEN: usize = 32;
const MAX_SYMBOL_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AggregateIdentity {
    raw: String,
    // Byte offsets of the two '.' separators and the '-' separator
    domain_end: usize,
    object_type_end: usize,
    symbol_end: usize,
}

impl AggregateIdentity {
    /// Generate a fresh identity with a random component
    pub fn generate(domain: &str, object_type: &str, symbol: &str) -> Result<Self, ValidationError> {
        let raw = format!(
            "{}.{}.{}-{}",
            domain,
            object_type,
            symbol,
            Uuid::new_v4().simple()
        );
        Self::parse(&raw)
    }

    /// Validate an externally supplied identity string
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let malformed = |reason: &str| ValidationError::MalformedIdentity {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = value.splitn(3, '.');
        let domain = segments.next().unwrap_or_default();
        let object_type = segments.next().ok_or_else(|| malformed("missing object type"))?;
        let tail = segments.next().ok_or_else(|| malformed("missing symbol and random part"))?;

        if !is_lower_name(domain) {
            return Err(malformed("domain must match [a-z][a-z0-9_]*"));
        }
        if !is_lower_name(object_type) {
            return Err(malformed("object type must match [a-z][a-z0-9_]*"));
        }

        let (symbol, random) = tail
            .split_once('-')
            .ok_or_else(|| malformed("missing '-' between symbol and random part"))?;

        if symbol.is_empty()
            || symbol.len() > MAX_SYMBOL_LEN
            || !symbol.bytes().all(|b| b.is_ascii_uppercase())
        {
            return Err(malformed("symbol must be 1-4 uppercase ASCII letters"));
        }

        if random.len() != RANDOM_LEN
            || !random.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(malformed("random part must be 32 lowercase hex digits"));
        }

        let domain_end = domain.len();
        let object_type_end = domain_end + 1 + object_type.len();
        let symbol_end = object_type_end + 1 + symbol.len();

        Ok(Self {
            raw: value.to_string(),
            domain_end,
            object_type_end,
            symbol_end,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn domain(&self) -> &str {
        &self.raw[..self.domain_end]
    }

    pub fn object_type(&self) -> &str {
        &self.raw[self.domain_end + 1..self.object_type_end]
    }

    pub fn symbol(&self) -> &str {
        &self.raw[self.object_type_end + 1..self.symbol_end]
    }

    pub fn random_part(&self) -> &str {
        &self.raw[self.symbol_end + 1..]
    }
}

fn is_lower_name(segment: &str) -> bool {
    let mut bytes = segment.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

impl fmt::Display for AggregateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for AggregateIdentity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AggregateIdentity {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AggregateIdentity> for String {
    fn from(id: AggregateIdentity) -> Self {
        id.raw
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
