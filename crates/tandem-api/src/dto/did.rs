//! DID DTOs

use serde::Deserialize;
use tandem_core::models::Did;
use validator::Validate;

/// Add a single pool number
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DidRequest {
    /// The phone number
    #[validate(length(min = 1, message = "Number is required"))]
    pub number: String,

    /// Owning intermediate peer
    #[validate(length(min = 1, message = "Owner peer is required"))]
    pub owner_peer: String,

    /// Descriptive country
    pub country: Option<String>,

    /// Descriptive city
    pub city: Option<String>,
}

impl DidRequest {
    /// Convert to a Did entity
    pub fn into_did(self) -> Did {
        let mut did = Did::new(self.number, self.owner_peer);
        did.country = self.country;
        did.city = self.city;
        did
    }
}

/// Add a batch of pool numbers for one owner
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BulkDidRequest {
    /// The phone numbers
    #[validate(length(min = 1, message = "At least one number is required"))]
    pub numbers: Vec<String>,

    /// Owning intermediate peer
    #[validate(length(min = 1, message = "Owner peer is required"))]
    pub owner_peer: String,
}
