use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::{common::EmailAddress, mongodb::Id};

/// Core voter profile data, as stored in the database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterCore {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub photo_url: String,
    #[serde(default)]
    pub twitter_screen_name: String,
    /// The voter's primary email address, if they have given one.
    #[serde(default)]
    pub email: Option<EmailAddress>,
    /// Has the voter proved they own `email`?
    #[serde(default)]
    pub email_ownership_verified: bool,
}

impl VoterCore {
    /// First and last name, whichever are present.
    pub fn full_name(&self) -> String {
        [self.first_name.trim(), self.last_name.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The primary email, only if its ownership is verified.
    pub fn verified_email(&self) -> Option<&EmailAddress> {
        self.email
            .as_ref()
            .filter(|_| self.email_ownership_verified)
    }
}

/// A voter without an ID.
pub type NewVoter = VoterCore;

/// A voter from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

impl DerefMut for Voter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voter
    }
}

/// Links a device token, as held by a client app, to the voter using it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterDevice {
    pub device_id: String,
    pub voter_id: Id,
}
