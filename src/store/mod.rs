//! The collaborators the friend service talks to.
//!
//! Each is a trait so the service can run against MongoDB and SNS in
//! production and against an in-memory store under test.

use std::sync::Arc;

use aws_sdk_sns::Client as SnsClient;
use mongodb::Database;

use crate::{
    config::Config,
    error::Result,
    model::{
        common::{EmailAddress, SecretKey},
        db::{
            EmailRecord, EmailTemplate, Invitation, InvitationStatus, NewScheduledEmail,
            ScheduledEmail, SendStatus, Voter,
        },
        mongodb::Id,
        template::VerifyEmailVariables,
    },
};

pub mod mongo;
pub mod outbound;

#[cfg(test)]
pub mod memory;

/// Looks up voters.
#[rocket::async_trait]
pub trait VoterDirectory: Send + Sync {
    /// The voter using the given device, if any.
    async fn resolve_by_device_token(&self, device_id: &str) -> Result<Option<Voter>>;

    async fn resolve_by_id(&self, voter_id: Id) -> Result<Option<Voter>>;

    /// The voter whose primary email is `address`, if any.
    async fn resolve_by_email(&self, address: &EmailAddress) -> Result<Option<Voter>>;

    /// Make `address` the voter's primary email, with verified ownership.
    async fn mark_email_verified(&self, voter_id: Id, address: &EmailAddress) -> Result<bool>;
}

/// Result of looking an address up in the [`EmailDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailLookup {
    None,
    Single(EmailRecord),
    /// More than one record, oldest first.
    Multiple(Vec<EmailRecord>),
}

impl EmailLookup {
    pub fn from_records(mut records: Vec<EmailRecord>) -> Self {
        match records.len() {
            0 => Self::None,
            1 => Self::Single(records.remove(0)),
            _ => Self::Multiple(records),
        }
    }
}

/// Stores email addresses and who owns them.
#[rocket::async_trait]
pub trait EmailDirectory: Send + Sync {
    async fn resolve_by_address(&self, address: &EmailAddress) -> Result<EmailLookup>;

    /// Create a record for `address`, or return the existing one if another
    /// request got there first.
    async fn create(&self, address: &EmailAddress, owner: Option<Id>) -> Result<EmailRecord>;

    /// Set or clear the owner of a record.
    async fn assign_owner(&self, email_id: Id, owner: Option<Id>) -> Result<bool>;

    async fn find_by_secret_key(&self, key: &SecretKey) -> Result<Option<EmailRecord>>;

    async fn mark_verified(&self, email_id: Id) -> Result<bool>;
}

/// Result of an invitation upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub invitation: Invitation,
    /// False if an existing invitation was updated.
    pub created: bool,
}

/// How a voter can act on an invitation between themselves and another voter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoterResponse {
    /// Accept a pending or ignored invitation and become friends.
    Accept,
    /// Ignore a pending invitation.
    Ignore,
    /// Withdraw an invitation the acting voter sent.
    DeleteSentByMe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    Accepted,
    Ignored,
    Deleted,
    NotFound,
}

/// Stores invitations and friendships.
#[rocket::async_trait]
pub trait InvitationStore: Send + Sync {
    /// Create or refresh the invitation from `sender_id` to a known voter,
    /// whose email goes to `email`.
    async fn upsert_voter_invitation(
        &self,
        sender_id: Id,
        recipient_id: Id,
        email: &EmailRecord,
        message: &str,
        sender_email_verified: bool,
    ) -> Result<Upserted>;

    /// Create or refresh the invitation from `sender_id` to an address.
    async fn upsert_email_invitation(
        &self,
        sender_id: Id,
        email: &EmailRecord,
        message: &str,
        sender_email_verified: bool,
    ) -> Result<Upserted>;

    /// IDs of the voter's current friends.
    async fn list_current_friends(&self, voter_id: Id) -> Result<Vec<Id>>;

    /// Invitations to the voter with the given status, oldest first.
    async fn list_invitations_received(
        &self,
        voter_id: Id,
        status: InvitationStatus,
    ) -> Result<Vec<Invitation>>;

    /// All invitations the voter has sent, oldest first.
    async fn list_invitations_sent(&self, voter_id: Id) -> Result<Vec<Invitation>>;

    /// End a friendship. False if there was none.
    async fn unfriend(&self, voter_id: Id, other_id: Id) -> Result<bool>;

    /// Apply `response` to the invitation between `sender_id` and `recipient_id`.
    async fn respond_voter_invitation(
        &self,
        sender_id: Id,
        recipient_id: Id,
        response: VoterResponse,
    ) -> Result<ResponseOutcome>;

    /// Remove the sender's invitations to `address`, returning how many there were.
    async fn delete_email_invitation(&self, sender_id: Id, address: &EmailAddress) -> Result<u64>;

    async fn find_by_secret_key(&self, key: &SecretKey) -> Result<Option<Invitation>>;

    /// Mark the invitation accepted by `recipient_id` and record the friendship.
    async fn accept_invitation(&self, invitation_id: Id, recipient_id: Id) -> Result<bool>;

    /// Invitations by the sender whose emails are being held back.
    async fn list_deferred(&self, sender_id: Id) -> Result<Vec<Invitation>>;

    async fn mark_sender_verified(&self, invitation_id: Id) -> Result<bool>;
}

/// Schedules and sends outbound email.
#[rocket::async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Record an email to be sent.
    async fn schedule_templated_email(&self, email: NewScheduledEmail) -> Result<ScheduledEmail>;

    /// Hand a scheduled email to the transport, returning its new status.
    async fn send_scheduled(&self, email: &ScheduledEmail) -> Result<SendStatus>;

    /// Schedule the email asking `record`'s owner to confirm the address.
    async fn schedule_verification_email(
        &self,
        config: &Config,
        sender_voter_id: Id,
        record: &EmailRecord,
    ) -> Result<ScheduledEmail> {
        let variables = VerifyEmailVariables::new(config, &record.address, &record.secret_key);
        let email = NewScheduledEmail {
            template: EmailTemplate::VerifyEmailAddress,
            sender_voter_id,
            sender_address: None,
            recipient_voter_id: record.voter_id,
            recipient_email_id: record.id,
            recipient_address: record.address.clone(),
            variables: rocket::serde::json::serde_json::to_string(&variables)?,
            send_status: SendStatus::Scheduled,
            created_at: chrono::Utc::now(),
        };
        self.schedule_templated_email(email).await
    }
}

/// Everything the friend service needs, as managed state.
#[derive(Clone)]
pub struct Backend {
    pub voters: Arc<dyn VoterDirectory>,
    pub emails: Arc<dyn EmailDirectory>,
    pub invitations: Arc<dyn InvitationStore>,
    pub notifier: Arc<dyn NotificationDispatcher>,
}

impl Backend {
    /// The production backend.
    pub fn mongo(db: &Database, sns: SnsClient, topic: outbound::EmailTopic) -> Self {
        Self {
            voters: Arc::new(mongo::MongoVoters::new(db)),
            emails: Arc::new(mongo::MongoEmails::new(db)),
            invitations: Arc::new(mongo::MongoInvitations::new(db)),
            notifier: Arc::new(outbound::SnsMailer::new(db, sns, topic)),
        }
    }
}
