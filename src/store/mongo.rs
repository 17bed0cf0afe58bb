use chrono::Utc;
use log::{debug, warn};
use mongodb::{
    bson::{doc, DateTime, Document},
    options::{FindOneOptions, FindOptions, UpdateOptions},
    Database,
};
use rocket::futures::TryStreamExt;

use crate::{
    error::{Error, Result},
    model::{
        common::{EmailAddress, SecretKey},
        db::{
            CurrentFriend, EmailRecord, Invitation, InvitationStatus, NewEmailRecord, Voter,
            VoterDevice,
        },
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
    store::{
        EmailDirectory, EmailLookup, InvitationStore, ResponseOutcome, Upserted, VoterDirectory,
        VoterResponse,
    },
};

fn oldest_first() -> Document {
    doc! { "_id": 1 }
}

fn now() -> DateTime {
    DateTime::from_chrono(Utc::now())
}

/// The stored form of an [`EmailTarget`](crate::model::db::EmailTarget).
fn delivery_doc(email: &EmailRecord) -> Document {
    doc! { "email_id": email.id, "address": email.address.as_str() }
}

/// Voter directory backed by the `voters` and `voter_devices` collections.
pub struct MongoVoters {
    voters: Coll<Voter>,
    devices: Coll<VoterDevice>,
}

impl MongoVoters {
    pub fn new(db: &Database) -> Self {
        Self {
            voters: Coll::from_db(db),
            devices: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl VoterDirectory for MongoVoters {
    async fn resolve_by_device_token(&self, device_id: &str) -> Result<Option<Voter>> {
        let device = self
            .devices
            .find_one(doc! { "device_id": device_id }, None)
            .await?;
        match device {
            Some(device) => self.resolve_by_id(device.voter_id).await,
            None => Ok(None),
        }
    }

    async fn resolve_by_id(&self, voter_id: Id) -> Result<Option<Voter>> {
        Ok(self.voters.find_one(voter_id.as_doc(), None).await?)
    }

    async fn resolve_by_email(&self, address: &EmailAddress) -> Result<Option<Voter>> {
        let options = FindOneOptions::builder().sort(oldest_first()).build();
        Ok(self
            .voters
            .find_one(doc! { "email": address.as_str() }, options)
            .await?)
    }

    async fn mark_email_verified(&self, voter_id: Id, address: &EmailAddress) -> Result<bool> {
        let update = doc! {
            "$set": {
                "email": address.as_str(),
                "email_ownership_verified": true,
            }
        };
        let result = self.voters.update_one(voter_id.as_doc(), update, None).await?;
        Ok(result.matched_count > 0)
    }
}

/// Email directory backed by the `email_addresses` collection.
pub struct MongoEmails {
    emails: Coll<EmailRecord>,
    new_emails: Coll<NewEmailRecord>,
}

impl MongoEmails {
    pub fn new(db: &Database) -> Self {
        Self {
            emails: Coll::from_db(db),
            new_emails: Coll::from_db(db),
        }
    }

    async fn find_by_address(&self, address: &EmailAddress) -> Result<Option<EmailRecord>> {
        let options = FindOneOptions::builder().sort(oldest_first()).build();
        Ok(self
            .emails
            .find_one(doc! { "address": address.as_str() }, options)
            .await?)
    }
}

#[rocket::async_trait]
impl EmailDirectory for MongoEmails {
    async fn resolve_by_address(&self, address: &EmailAddress) -> Result<EmailLookup> {
        let options = FindOptions::builder().sort(oldest_first()).build();
        let records = self
            .emails
            .find(doc! { "address": address.as_str() }, options)
            .await?
            .try_collect::<Vec<_>>()
            .await?;
        Ok(EmailLookup::from_records(records))
    }

    async fn create(&self, address: &EmailAddress, owner: Option<Id>) -> Result<EmailRecord> {
        let record = NewEmailRecord::new(address.clone(), owner);
        match self.new_emails.insert_one(&record, None).await {
            Ok(result) => {
                let id = result
                    .inserted_id
                    .as_object_id()
                    .ok_or_else(|| Error::Internal("inserted email record has no ID".to_string()))?;
                Ok(EmailRecord {
                    id: id.into(),
                    record,
                })
            }
            Err(e) if is_duplicate_key_error(&e) => {
                // Someone else created it between our lookup and insert.
                debug!("Email record for {address} already exists, using that");
                self.find_by_address(address)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("email record for {address}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn assign_owner(&self, email_id: Id, owner: Option<Id>) -> Result<bool> {
        let update = doc! { "$set": { "voter_id": owner } };
        let result = self.emails.update_one(email_id.as_doc(), update, None).await?;
        Ok(result.matched_count > 0)
    }

    async fn find_by_secret_key(&self, key: &SecretKey) -> Result<Option<EmailRecord>> {
        Ok(self
            .emails
            .find_one(doc! { "secret_key": key.as_str() }, None)
            .await?)
    }

    async fn mark_verified(&self, email_id: Id) -> Result<bool> {
        let update = doc! { "$set": { "ownership_verified": true } };
        let result = self.emails.update_one(email_id.as_doc(), update, None).await?;
        Ok(result.matched_count > 0)
    }
}

/// Invitation store backed by the `friend_invitations` and `current_friends` collections.
pub struct MongoInvitations {
    invitations: Coll<Invitation>,
    friends: Coll<CurrentFriend>,
}

impl MongoInvitations {
    pub fn new(db: &Database) -> Self {
        Self {
            invitations: Coll::from_db(db),
            friends: Coll::from_db(db),
        }
    }

    /// Filter for the voter invitation from `sender_id` to `recipient_id`.
    fn voter_filter(sender_id: Id, recipient_id: Id) -> Document {
        doc! {
            "sender_id": sender_id,
            "recipient.kind": "VOTER",
            "recipient.voter_id": recipient_id,
        }
    }

    /// Filter for the email invitation from `sender_id` to the given record.
    fn email_filter(sender_id: Id, email_id: Id) -> Document {
        doc! {
            "sender_id": sender_id,
            "recipient.kind": "EMAIL",
            "recipient.email_id": email_id,
        }
    }

    /// Insert or refresh the invitation matching `filter`.
    ///
    /// The recipient sub-document is seeded from the filter's equality
    /// clauses on insert, so `set` must not touch `recipient.kind` or the ID.
    async fn upsert(&self, filter: Document, mut set: Document) -> Result<Upserted> {
        let now = now();
        set.insert("secret_key", SecretKey::random());
        set.insert("updated_at", now);
        let update = doc! {
            "$set": set,
            "$setOnInsert": {
                "status": InvitationStatus::Pending,
                "created_at": now,
            },
        };
        let options = UpdateOptions::builder().upsert(true).build();

        let result = match self
            .invitations
            .update_one(filter.clone(), update.clone(), options.clone())
            .await
        {
            // Two upserts raced and the other inserted first; this one now updates.
            Err(e) if is_duplicate_key_error(&e) => {
                warn!("Concurrent invitation upsert detected, retrying");
                self.invitations.update_one(filter.clone(), update, options).await?
            }
            result => result?,
        };

        let invitation = self
            .invitations
            .find_one(filter, None)
            .await?
            .ok_or_else(|| Error::Internal("upserted invitation not found".to_string()))?;
        Ok(Upserted {
            invitation,
            created: result.upserted_id.is_some(),
        })
    }

    async fn find_sorted(&self, filter: Document) -> Result<Vec<Invitation>> {
        let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();
        Ok(self
            .invitations
            .find(filter, options)
            .await?
            .try_collect()
            .await?)
    }

    /// Record a friendship, tolerating one that already exists.
    async fn befriend(&self, a: Id, b: Id) -> Result<()> {
        match self.friends.insert_one(CurrentFriend::new(a, b), None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key_error(&e) => {
                debug!("Voters {a} and {b} are already friends");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[rocket::async_trait]
impl InvitationStore for MongoInvitations {
    async fn upsert_voter_invitation(
        &self,
        sender_id: Id,
        recipient_id: Id,
        email: &EmailRecord,
        message: &str,
        sender_email_verified: bool,
    ) -> Result<Upserted> {
        let set = doc! {
            "delivery": delivery_doc(email),
            "message": message,
            "sender_email_verified": sender_email_verified,
        };
        self.upsert(Self::voter_filter(sender_id, recipient_id), set)
            .await
    }

    async fn upsert_email_invitation(
        &self,
        sender_id: Id,
        email: &EmailRecord,
        message: &str,
        sender_email_verified: bool,
    ) -> Result<Upserted> {
        let set = doc! {
            "recipient.address": email.address.as_str(),
            "delivery": delivery_doc(email),
            "message": message,
            "sender_email_verified": sender_email_verified,
        };
        self.upsert(Self::email_filter(sender_id, email.id), set).await
    }

    async fn list_current_friends(&self, voter_id: Id) -> Result<Vec<Id>> {
        let filter = doc! {
            "$or": [
                { "voter_one_id": voter_id },
                { "voter_two_id": voter_id },
            ]
        };
        let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();
        let friendships = self
            .friends
            .find(filter, options)
            .await?
            .try_collect::<Vec<_>>()
            .await?;
        Ok(friendships
            .iter()
            .filter_map(|friendship| friendship.other(voter_id))
            .collect())
    }

    async fn list_invitations_received(
        &self,
        voter_id: Id,
        status: InvitationStatus,
    ) -> Result<Vec<Invitation>> {
        self.find_sorted(doc! {
            "recipient.kind": "VOTER",
            "recipient.voter_id": voter_id,
            "status": status,
        })
        .await
    }

    async fn list_invitations_sent(&self, voter_id: Id) -> Result<Vec<Invitation>> {
        self.find_sorted(doc! { "sender_id": voter_id }).await
    }

    async fn unfriend(&self, voter_id: Id, other_id: Id) -> Result<bool> {
        let (one, two) = CurrentFriend::pair(voter_id, other_id);
        let result = self
            .friends
            .delete_one(doc! { "voter_one_id": one, "voter_two_id": two }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn respond_voter_invitation(
        &self,
        sender_id: Id,
        recipient_id: Id,
        response: VoterResponse,
    ) -> Result<ResponseOutcome> {
        let mut filter = Self::voter_filter(sender_id, recipient_id);
        match response {
            VoterResponse::Accept => {
                filter.insert(
                    "status",
                    doc! { "$in": [InvitationStatus::Pending, InvitationStatus::Ignored] },
                );
                let update = doc! {
                    "$set": { "status": InvitationStatus::Accepted, "updated_at": now() }
                };
                let result = self.invitations.update_one(filter, update, None).await?;
                if result.matched_count == 0 {
                    return Ok(ResponseOutcome::NotFound);
                }
                self.befriend(sender_id, recipient_id).await?;
                Ok(ResponseOutcome::Accepted)
            }
            VoterResponse::Ignore => {
                filter.insert("status", InvitationStatus::Pending);
                let update = doc! {
                    "$set": { "status": InvitationStatus::Ignored, "updated_at": now() }
                };
                let result = self.invitations.update_one(filter, update, None).await?;
                Ok(if result.matched_count == 0 {
                    ResponseOutcome::NotFound
                } else {
                    ResponseOutcome::Ignored
                })
            }
            VoterResponse::DeleteSentByMe => {
                let result = self.invitations.delete_one(filter, None).await?;
                Ok(if result.deleted_count == 0 {
                    ResponseOutcome::NotFound
                } else {
                    ResponseOutcome::Deleted
                })
            }
        }
    }

    async fn delete_email_invitation(&self, sender_id: Id, address: &EmailAddress) -> Result<u64> {
        let filter = doc! {
            "sender_id": sender_id,
            "recipient.kind": "EMAIL",
            "recipient.address": address.as_str(),
        };
        let result = self.invitations.delete_many(filter, None).await?;
        Ok(result.deleted_count)
    }

    async fn find_by_secret_key(&self, key: &SecretKey) -> Result<Option<Invitation>> {
        Ok(self
            .invitations
            .find_one(doc! { "secret_key": key.as_str() }, None)
            .await?)
    }

    async fn accept_invitation(&self, invitation_id: Id, recipient_id: Id) -> Result<bool> {
        let invitation = match self.invitations.find_one(invitation_id.as_doc(), None).await? {
            Some(invitation) => invitation,
            None => return Ok(false),
        };

        // An email invitation becomes a voter invitation once claimed.
        let update = doc! {
            "$set": {
                "recipient": { "kind": "VOTER", "voter_id": recipient_id },
                "status": InvitationStatus::Accepted,
                "updated_at": now(),
            }
        };
        match self
            .invitations
            .update_one(invitation_id.as_doc(), update, None)
            .await
        {
            Ok(_) => {}
            // The sender had also invited this voter directly; keep that one.
            Err(e) if is_duplicate_key_error(&e) => {
                self.invitations
                    .delete_one(invitation_id.as_doc(), None)
                    .await?;
                let update = doc! {
                    "$set": { "status": InvitationStatus::Accepted, "updated_at": now() }
                };
                self.invitations
                    .update_one(
                        Self::voter_filter(invitation.sender_id, recipient_id),
                        update,
                        None,
                    )
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }

        self.befriend(invitation.sender_id, recipient_id).await?;
        Ok(true)
    }

    async fn list_deferred(&self, sender_id: Id) -> Result<Vec<Invitation>> {
        self.find_sorted(doc! {
            "sender_id": sender_id,
            "sender_email_verified": false,
        })
        .await
    }

    async fn mark_sender_verified(&self, invitation_id: Id) -> Result<bool> {
        let update = doc! {
            "$set": { "sender_email_verified": true, "updated_at": now() }
        };
        let result = self
            .invitations
            .update_one(invitation_id.as_doc(), update, None)
            .await?;
        Ok(result.matched_count > 0)
    }
}
