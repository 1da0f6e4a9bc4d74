//! DID model
//!
//! A DID is a phone number owned by the mediator. While a call is in
//! flight through the intermediate carrier, the DID stands in for the
//! real destination so the carrier never learns it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pool number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Did {
    /// The phone number (unique)
    pub number: String,

    /// The intermediate peer that receives calls to this number
    pub owner_peer: String,

    /// Whether the number is currently assigned to a call
    pub in_use: bool,

    /// The original DNIS this number is masking while in use
    pub destination: Option<String>,

    /// Descriptive country
    pub country: Option<String>,

    /// Descriptive city
    pub city: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Did {
    /// Create a free DID owned by a peer
    pub fn new(number: impl Into<String>, owner_peer: impl Into<String>) -> Self {
        let now = Utc::now();
        Did {
            number: number.into(),
            owner_peer: owner_peer.into(),
            in_use: false,
            destination: None,
            country: None,
            city: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the number is available for assignment
    #[inline]
    pub fn is_free(&self) -> bool {
        !self.in_use
    }
}

/// Pool occupancy counters
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DidCounts {
    pub total: i64,
    pub in_use: i64,
}

impl DidCounts {
    pub fn available(&self) -> i64 {
        self.total - self.in_use
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_did_is_free() {
        let did = Did::new("18005550001", "s3a");
        assert!(did.is_free());
        assert!(did.destination.is_none());
    }

    #[test]
    fn test_counts() {
        let counts = DidCounts { total: 5, in_use: 2 };
        assert_eq!(counts.available(), 3);
    }
}
