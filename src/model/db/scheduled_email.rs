use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, Bson};
use serde::{Deserialize, Serialize};

use crate::model::{common::EmailAddress, mongodb::Id};

/// The kinds of email this service sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailTemplate {
    FriendInvitation,
    VerifyEmailAddress,
}

impl EmailTemplate {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FriendInvitation => "FRIEND_INVITATION",
            Self::VerifyEmailAddress => "VERIFY_EMAIL_ADDRESS",
        }
    }
}

/// Delivery state of a scheduled email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Scheduled,
    Sent,
    Failed,
}

impl SendStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

impl From<SendStatus> for Bson {
    fn from(status: SendStatus) -> Self {
        Bson::String(status.as_str().to_string())
    }
}

/// Core outbound email data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEmailCore {
    pub template: EmailTemplate,
    pub sender_voter_id: Id,
    pub sender_address: Option<EmailAddress>,
    pub recipient_voter_id: Option<Id>,
    pub recipient_email_id: Id,
    pub recipient_address: EmailAddress,
    /// Template variables, as a JSON object.
    pub variables: String,
    pub send_status: SendStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// A scheduled email without an ID.
pub type NewScheduledEmail = ScheduledEmailCore;

/// A scheduled email from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEmail {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub email: ScheduledEmailCore,
}

impl Deref for ScheduledEmail {
    type Target = ScheduledEmailCore;

    fn deref(&self) -> &Self::Target {
        &self.email
    }
}
