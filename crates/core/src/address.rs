//! Opaque content addresses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum accepted length of a content address.
pub const MAX_ADDRESS_LEN: usize = 256;

/// A backend-assigned, content-derived key.
///
/// The value is only ever compared, stored and handed back to the backend
/// that produced it. Construction rejects empty values, whitespace and
/// control characters so that an address is always safe to log and to put
/// in a URL query.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentAddress(String);

impl ContentAddress {
    /// Wrap a backend-produced address.
    pub fn new(value: impl Into<String>) -> crate::Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(crate::Error::InvalidAddress("empty address".to_string()));
        }
        if value.len() > MAX_ADDRESS_LEN {
            return Err(crate::Error::InvalidAddress(format!(
                "address length {} exceeds maximum {}",
                value.len(),
                MAX_ADDRESS_LEN
            )));
        }
        if value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(crate::Error::InvalidAddress(
                "address contains whitespace or control characters".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Get the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentAddress {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<ContentAddress> for String {
    fn from(address: ContentAddress) -> Self {
        address.0
    }
}

impl From<crate::ContentHash> for ContentAddress {
    fn from(hash: crate::ContentHash) -> Self {
        Self(hash.to_hex())
    }
}

impl AsRef<str> for ContentAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", self.0)
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
