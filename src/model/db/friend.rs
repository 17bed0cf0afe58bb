use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// A mutual friendship between two voters.
///
/// Stored once per pair, with the lower ID first, so that the unique index on
/// the pair rules out duplicates in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentFriend {
    pub voter_one_id: Id,
    pub voter_two_id: Id,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl CurrentFriend {
    pub fn new(a: Id, b: Id) -> Self {
        let (voter_one_id, voter_two_id) = Self::pair(a, b);
        Self {
            voter_one_id,
            voter_two_id,
            created_at: Utc::now(),
        }
    }

    /// The canonical ordering of a pair of voters.
    pub fn pair(a: Id, b: Id) -> (Id, Id) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// The friend of `voter_id` in this pair, if `voter_id` is in it.
    pub fn other(&self, voter_id: Id) -> Option<Id> {
        if self.voter_one_id == voter_id {
            Some(self.voter_two_id)
        } else if self.voter_two_id == voter_id {
            Some(self.voter_one_id)
        } else {
            None
        }
    }
}
