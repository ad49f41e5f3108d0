//! Cache keys addressing previously fetched query results.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier for a unit of cached data, shaped like the API path it was
/// fetched from (e.g. `/api/notifications/unread-count`).
///
/// A key also addresses every key nested below it, so invalidating
/// `/api/bookings` covers `/api/bookings/42` but not `/api/bookings-archive`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Cow<'static, str>);

impl QueryKey {
    pub const fn from_static(path: &'static str) -> Self {
        Self(Cow::Borrowed(path))
    }

    pub fn new(path: impl Into<String>) -> Self {
        Self(Cow::Owned(path.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `other` is this key or nested below it.
    pub fn covers(&self, other: &QueryKey) -> bool {
        let prefix = self.as_str().trim_end_matches('/');
        match other.as_str().strip_prefix(prefix) {
            Some("") => true,
            Some(rest) => rest.starts_with('/'),
            None => false,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&'static str> for QueryKey {
    fn from(path: &'static str) -> Self {
        Self::from_static(path)
    }
}

impl From<String> for QueryKey {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}
