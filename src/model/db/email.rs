use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{EmailAddress, SecretKey},
    mongodb::Id,
};

/// Core email directory data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecordCore {
    /// The normalised address.
    pub address: EmailAddress,
    /// The voter this address belongs to; `None` while unclaimed.
    pub voter_id: Option<Id>,
    /// Has the owner proved they receive mail at this address?
    pub ownership_verified: bool,
    /// Key for the link in the verification email.
    pub secret_key: SecretKey,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl EmailRecordCore {
    /// A fresh, unverified record for the given address.
    pub fn new(address: EmailAddress, voter_id: Option<Id>) -> Self {
        Self {
            address,
            voter_id,
            ownership_verified: false,
            secret_key: SecretKey::random(),
            created_at: Utc::now(),
        }
    }
}

/// An email record without an ID.
pub type NewEmailRecord = EmailRecordCore;

/// An email record from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub record: EmailRecordCore,
}

impl EmailRecord {
    /// Is this address verified as belonging to someone other than `voter_id`?
    pub fn verified_by_other_than(&self, voter_id: Id) -> bool {
        self.ownership_verified && self.voter_id.map_or(false, |owner| owner != voter_id)
    }
}

impl Deref for EmailRecord {
    type Target = EmailRecordCore;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

impl DerefMut for EmailRecord {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.record
    }
}
