use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, Bson};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{EmailAddress, SecretKey},
    db::EmailRecord,
    mongodb::Id,
};

/// Where an invitation is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recipient {
    /// A voter who already has an account.
    Voter { voter_id: Id },
    /// An email address with no known owner yet.
    Email {
        email_id: Id,
        address: EmailAddress,
    },
}

impl Recipient {
    pub fn voter_id(&self) -> Option<Id> {
        match self {
            Self::Voter { voter_id } => Some(*voter_id),
            Self::Email { .. } => None,
        }
    }
}

/// The directory entry an invitation email is sent to.
///
/// This is the address the sender typed, which for a voter recipient need not
/// be their primary email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTarget {
    pub email_id: Id,
    pub address: EmailAddress,
}

impl From<&EmailRecord> for EmailTarget {
    fn from(record: &EmailRecord) -> Self {
        Self {
            email_id: record.id,
            address: record.address.clone(),
        }
    }
}

/// Lifecycle of an invitation.
///
/// New invitations are `Pending`. Accepting one also records a friendship.
/// Withdrawn invitations are removed rather than given a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Ignored,
}

impl InvitationStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Ignored => "IGNORED",
        }
    }
}

impl From<InvitationStatus> for Bson {
    fn from(status: InvitationStatus) -> Self {
        Bson::String(status.as_str().to_string())
    }
}

/// Core invitation data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationCore {
    pub sender_id: Id,
    pub recipient: Recipient,
    /// Where the invitation email goes. Absent on invitations written before
    /// this was recorded.
    #[serde(default)]
    pub delivery: Option<EmailTarget>,
    #[serde(default)]
    pub message: String,
    /// Key for the accept link in the invitation email.
    pub secret_key: SecretKey,
    pub status: InvitationStatus,
    /// Did the sender have a verified email when this was last written?
    /// Emails for unverified senders are held back until they verify.
    pub sender_email_verified: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl InvitationCore {
    pub fn new(
        sender_id: Id,
        recipient: Recipient,
        delivery: EmailTarget,
        message: String,
        sender_email_verified: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            sender_id,
            recipient,
            delivery: Some(delivery),
            message,
            secret_key: SecretKey::random(),
            status: InvitationStatus::Pending,
            sender_email_verified,
            created_at: now,
            updated_at: now,
        }
    }

    /// Where to send the invitation email, if known.
    pub fn delivery_target(&self) -> Option<EmailTarget> {
        match (&self.delivery, &self.recipient) {
            (Some(target), _) => Some(target.clone()),
            (None, Recipient::Email { email_id, address }) => Some(EmailTarget {
                email_id: *email_id,
                address: address.clone(),
            }),
            (None, Recipient::Voter { .. }) => None,
        }
    }
}

/// An invitation from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub invitation: InvitationCore,
}

impl Deref for Invitation {
    type Target = InvitationCore;

    fn deref(&self) -> &Self::Target {
        &self.invitation
    }
}

impl DerefMut for Invitation {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.invitation
    }
}
