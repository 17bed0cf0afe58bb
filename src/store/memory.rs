//! An in-memory backend for tests, with hooks for inspecting state and
//! injecting failures.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::{
    error::{Error, Result},
    model::{
        common::{EmailAddress, SecretKey},
        db::{
            voter::examples::{FRIEND_DEVICE, UNVERIFIED_DEVICE, VERIFIED_DEVICE},
            CurrentFriend, EmailRecord, Invitation, InvitationCore, InvitationStatus,
            NewEmailRecord, NewScheduledEmail, Recipient, ScheduledEmail, SendStatus, Voter,
            VoterCore, VoterDevice,
        },
        mongodb::Id,
    },
    store::{
        Backend, EmailDirectory, EmailLookup, InvitationStore, NotificationDispatcher,
        ResponseOutcome, Upserted, VoterDirectory, VoterResponse,
    },
};

#[derive(Default)]
struct State {
    voters: Vec<Voter>,
    devices: Vec<VoterDevice>,
    emails: Vec<EmailRecord>,
    invitations: Vec<Invitation>,
    friends: Vec<CurrentFriend>,
    scheduled: Vec<ScheduledEmail>,
    failing_addresses: HashSet<EmailAddress>,
    failing_voters: HashSet<Id>,
    failing_sends: bool,
}

/// Shared in-memory state implementing every collaborator trait.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// A backend whose collaborators all share this store.
    pub fn backend(&self) -> Backend {
        Backend {
            voters: Arc::new(self.clone()),
            emails: Arc::new(self.clone()),
            invitations: Arc::new(self.clone()),
            notifier: Arc::new(self.clone()),
        }
    }

    /// Add the example voters, each on its example device.
    pub fn seed_example_voters(&self) {
        self.add_voter(VoterCore::example_verified(), Some(VERIFIED_DEVICE));
        self.add_voter(VoterCore::example_unverified(), Some(UNVERIFIED_DEVICE));
        self.add_voter(VoterCore::example_friend(), Some(FRIEND_DEVICE));
    }

    pub fn add_voter(&self, voter: VoterCore, device_id: Option<&str>) -> Voter {
        let voter = Voter {
            id: Id::new(),
            voter,
        };
        let mut state = self.lock();
        if let Some(device_id) = device_id {
            state.devices.push(VoterDevice {
                device_id: device_id.to_string(),
                voter_id: voter.id,
            });
        }
        state.voters.push(voter.clone());
        voter
    }

    /// Insert a record directly, even if the address already has one.
    pub fn add_email_record(
        &self,
        address: &str,
        owner: Option<Id>,
        ownership_verified: bool,
    ) -> EmailRecord {
        let mut record = NewEmailRecord::new(EmailAddress::example(address), owner);
        record.ownership_verified = ownership_verified;
        let record = EmailRecord {
            id: Id::new(),
            record,
        };
        self.lock().emails.push(record.clone());
        record
    }

    pub fn make_friends(&self, a: Id, b: Id) {
        self.lock().friends.push(CurrentFriend::new(a, b));
    }

    pub fn remove_voter(&self, voter_id: Id) {
        let mut state = self.lock();
        state.voters.retain(|voter| voter.id != voter_id);
        state.devices.retain(|device| device.voter_id != voter_id);
    }

    /// Make creating a record for `address` fail.
    pub fn fail_email_creation(&self, address: &str) {
        self.lock()
            .failing_addresses
            .insert(EmailAddress::example(address));
    }

    /// Make looking up `voter_id` by ID fail.
    pub fn fail_voter_lookup(&self, voter_id: Id) {
        self.lock().failing_voters.insert(voter_id);
    }

    /// Make every send report failure.
    pub fn fail_sends(&self) {
        self.lock().failing_sends = true;
    }

    pub fn voter_by_device(&self, device_id: &str) -> Voter {
        let state = self.lock();
        let device = state
            .devices
            .iter()
            .find(|device| device.device_id == device_id)
            .unwrap();
        state
            .voters
            .iter()
            .find(|voter| voter.id == device.voter_id)
            .cloned()
            .unwrap()
    }

    pub fn voter(&self, voter_id: Id) -> Option<Voter> {
        self.lock()
            .voters
            .iter()
            .find(|voter| voter.id == voter_id)
            .cloned()
    }

    pub fn email_records(&self, address: &str) -> Vec<EmailRecord> {
        let address = EmailAddress::example(address);
        self.lock()
            .emails
            .iter()
            .filter(|record| record.address == address)
            .cloned()
            .collect()
    }

    pub fn email_record(&self, email_id: Id) -> Option<EmailRecord> {
        self.lock()
            .emails
            .iter()
            .find(|record| record.id == email_id)
            .cloned()
    }

    pub fn invitations(&self) -> Vec<Invitation> {
        self.lock().invitations.clone()
    }

    pub fn friendships(&self) -> Vec<CurrentFriend> {
        self.lock().friends.clone()
    }

    pub fn scheduled_emails(&self) -> Vec<ScheduledEmail> {
        self.lock().scheduled.clone()
    }
}

impl State {
    fn upsert(
        &mut self,
        sender_id: Id,
        recipient: Recipient,
        email: &EmailRecord,
        message: &str,
        sender_email_verified: bool,
    ) -> Upserted {
        let existing = self.invitations.iter_mut().find(|invitation| {
            invitation.sender_id == sender_id && same_target(&invitation.recipient, &recipient)
        });
        match existing {
            Some(invitation) => {
                invitation.recipient = recipient;
                invitation.delivery = Some(email.into());
                invitation.message = message.to_string();
                invitation.secret_key = SecretKey::random();
                invitation.sender_email_verified = sender_email_verified;
                invitation.updated_at = Utc::now();
                Upserted {
                    invitation: invitation.clone(),
                    created: false,
                }
            }
            None => {
                let invitation = Invitation {
                    id: Id::new(),
                    invitation: InvitationCore::new(
                        sender_id,
                        recipient,
                        email.into(),
                        message.to_string(),
                        sender_email_verified,
                    ),
                };
                self.invitations.push(invitation.clone());
                Upserted {
                    invitation,
                    created: true,
                }
            }
        }
    }

    fn befriend(&mut self, a: Id, b: Id) {
        let (one, two) = CurrentFriend::pair(a, b);
        let exists = self
            .friends
            .iter()
            .any(|friend| friend.voter_one_id == one && friend.voter_two_id == two);
        if !exists {
            self.friends.push(CurrentFriend::new(a, b));
        }
    }

    /// Position of the voter invitation from `sender_id` to `recipient_id`.
    fn voter_invitation(&self, sender_id: Id, recipient_id: Id) -> Option<usize> {
        self.invitations.iter().position(|invitation| {
            invitation.sender_id == sender_id
                && invitation.recipient.voter_id() == Some(recipient_id)
        })
    }
}

/// Do two recipients identify the same upsert target?
fn same_target(a: &Recipient, b: &Recipient) -> bool {
    match (a, b) {
        (Recipient::Voter { voter_id: a }, Recipient::Voter { voter_id: b }) => a == b,
        (Recipient::Email { email_id: a, .. }, Recipient::Email { email_id: b, .. }) => a == b,
        _ => false,
    }
}

#[rocket::async_trait]
impl VoterDirectory for MemoryStore {
    async fn resolve_by_device_token(&self, device_id: &str) -> Result<Option<Voter>> {
        let voter_id = self
            .lock()
            .devices
            .iter()
            .find(|device| device.device_id == device_id)
            .map(|device| device.voter_id);
        match voter_id {
            Some(voter_id) => self.resolve_by_id(voter_id).await,
            None => Ok(None),
        }
    }

    async fn resolve_by_id(&self, voter_id: Id) -> Result<Option<Voter>> {
        if self.lock().failing_voters.contains(&voter_id) {
            return Err(Error::Internal(format!("lookup of voter {voter_id} failed")));
        }
        Ok(self.voter(voter_id))
    }

    async fn resolve_by_email(&self, address: &EmailAddress) -> Result<Option<Voter>> {
        Ok(self
            .lock()
            .voters
            .iter()
            .find(|voter| voter.email.as_ref() == Some(address))
            .cloned())
    }

    async fn mark_email_verified(&self, voter_id: Id, address: &EmailAddress) -> Result<bool> {
        let mut state = self.lock();
        match state.voters.iter_mut().find(|voter| voter.id == voter_id) {
            Some(voter) => {
                voter.email = Some(address.clone());
                voter.email_ownership_verified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[rocket::async_trait]
impl EmailDirectory for MemoryStore {
    async fn resolve_by_address(&self, address: &EmailAddress) -> Result<EmailLookup> {
        let records = self
            .lock()
            .emails
            .iter()
            .filter(|record| &record.address == address)
            .cloned()
            .collect();
        Ok(EmailLookup::from_records(records))
    }

    async fn create(&self, address: &EmailAddress, owner: Option<Id>) -> Result<EmailRecord> {
        let mut state = self.lock();
        if state.failing_addresses.contains(address) {
            return Err(Error::Internal(format!("could not create record for {address}")));
        }
        if let Some(existing) = state.emails.iter().find(|record| &record.address == address) {
            return Ok(existing.clone());
        }
        let record = EmailRecord {
            id: Id::new(),
            record: NewEmailRecord::new(address.clone(), owner),
        };
        state.emails.push(record.clone());
        Ok(record)
    }

    async fn assign_owner(&self, email_id: Id, owner: Option<Id>) -> Result<bool> {
        let mut state = self.lock();
        match state.emails.iter_mut().find(|record| record.id == email_id) {
            Some(record) => {
                record.voter_id = owner;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_secret_key(&self, key: &SecretKey) -> Result<Option<EmailRecord>> {
        Ok(self
            .lock()
            .emails
            .iter()
            .find(|record| &record.secret_key == key)
            .cloned())
    }

    async fn mark_verified(&self, email_id: Id) -> Result<bool> {
        let mut state = self.lock();
        match state.emails.iter_mut().find(|record| record.id == email_id) {
            Some(record) => {
                record.ownership_verified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[rocket::async_trait]
impl InvitationStore for MemoryStore {
    async fn upsert_voter_invitation(
        &self,
        sender_id: Id,
        recipient_id: Id,
        email: &EmailRecord,
        message: &str,
        sender_email_verified: bool,
    ) -> Result<Upserted> {
        let recipient = Recipient::Voter {
            voter_id: recipient_id,
        };
        Ok(self
            .lock()
            .upsert(sender_id, recipient, email, message, sender_email_verified))
    }

    async fn upsert_email_invitation(
        &self,
        sender_id: Id,
        email: &EmailRecord,
        message: &str,
        sender_email_verified: bool,
    ) -> Result<Upserted> {
        let recipient = Recipient::Email {
            email_id: email.id,
            address: email.address.clone(),
        };
        Ok(self
            .lock()
            .upsert(sender_id, recipient, email, message, sender_email_verified))
    }

    async fn list_current_friends(&self, voter_id: Id) -> Result<Vec<Id>> {
        Ok(self
            .lock()
            .friends
            .iter()
            .filter_map(|friend| friend.other(voter_id))
            .collect())
    }

    async fn list_invitations_received(
        &self,
        voter_id: Id,
        status: InvitationStatus,
    ) -> Result<Vec<Invitation>> {
        Ok(self
            .lock()
            .invitations
            .iter()
            .filter(|invitation| {
                invitation.recipient.voter_id() == Some(voter_id) && invitation.status == status
            })
            .cloned()
            .collect())
    }

    async fn list_invitations_sent(&self, voter_id: Id) -> Result<Vec<Invitation>> {
        Ok(self
            .lock()
            .invitations
            .iter()
            .filter(|invitation| invitation.sender_id == voter_id)
            .cloned()
            .collect())
    }

    async fn unfriend(&self, voter_id: Id, other_id: Id) -> Result<bool> {
        let (one, two) = CurrentFriend::pair(voter_id, other_id);
        let mut state = self.lock();
        let before = state.friends.len();
        state
            .friends
            .retain(|friend| !(friend.voter_one_id == one && friend.voter_two_id == two));
        Ok(state.friends.len() < before)
    }

    async fn respond_voter_invitation(
        &self,
        sender_id: Id,
        recipient_id: Id,
        response: VoterResponse,
    ) -> Result<ResponseOutcome> {
        let mut state = self.lock();
        let index = match state.voter_invitation(sender_id, recipient_id) {
            Some(index) => index,
            None => return Ok(ResponseOutcome::NotFound),
        };
        let invitation = &mut state.invitations[index];
        let outcome = match (response, invitation.status) {
            (VoterResponse::Accept, InvitationStatus::Pending | InvitationStatus::Ignored) => {
                invitation.status = InvitationStatus::Accepted;
                invitation.updated_at = Utc::now();
                state.befriend(sender_id, recipient_id);
                ResponseOutcome::Accepted
            }
            (VoterResponse::Ignore, InvitationStatus::Pending) => {
                invitation.status = InvitationStatus::Ignored;
                invitation.updated_at = Utc::now();
                ResponseOutcome::Ignored
            }
            (VoterResponse::DeleteSentByMe, _) => {
                state.invitations.remove(index);
                ResponseOutcome::Deleted
            }
            _ => ResponseOutcome::NotFound,
        };
        Ok(outcome)
    }

    async fn delete_email_invitation(&self, sender_id: Id, address: &EmailAddress) -> Result<u64> {
        let mut state = self.lock();
        let before = state.invitations.len();
        state.invitations.retain(|invitation| {
            let to_address = matches!(
                &invitation.recipient,
                Recipient::Email { address: a, .. } if a == address
            );
            !(invitation.sender_id == sender_id && to_address)
        });
        Ok((before - state.invitations.len()) as u64)
    }

    async fn find_by_secret_key(&self, key: &SecretKey) -> Result<Option<Invitation>> {
        Ok(self
            .lock()
            .invitations
            .iter()
            .find(|invitation| &invitation.secret_key == key)
            .cloned())
    }

    async fn accept_invitation(&self, invitation_id: Id, recipient_id: Id) -> Result<bool> {
        let mut state = self.lock();
        let sender_id = match state
            .invitations
            .iter()
            .find(|invitation| invitation.id == invitation_id)
        {
            Some(invitation) => invitation.sender_id,
            None => return Ok(false),
        };

        // The sender may also have invited this voter directly; keep that one.
        let index = match state.voter_invitation(sender_id, recipient_id) {
            Some(index) => {
                if state.invitations[index].id != invitation_id {
                    state
                        .invitations
                        .retain(|invitation| invitation.id != invitation_id);
                }
                state.voter_invitation(sender_id, recipient_id)
            }
            None => state
                .invitations
                .iter()
                .position(|invitation| invitation.id == invitation_id),
        };
        if let Some(index) = index {
            let invitation = &mut state.invitations[index];
            invitation.recipient = Recipient::Voter {
                voter_id: recipient_id,
            };
            invitation.status = InvitationStatus::Accepted;
            invitation.updated_at = Utc::now();
        }
        state.befriend(sender_id, recipient_id);
        Ok(true)
    }

    async fn list_deferred(&self, sender_id: Id) -> Result<Vec<Invitation>> {
        Ok(self
            .lock()
            .invitations
            .iter()
            .filter(|invitation| {
                invitation.sender_id == sender_id && !invitation.sender_email_verified
            })
            .cloned()
            .collect())
    }

    async fn mark_sender_verified(&self, invitation_id: Id) -> Result<bool> {
        let mut state = self.lock();
        match state
            .invitations
            .iter_mut()
            .find(|invitation| invitation.id == invitation_id)
        {
            Some(invitation) => {
                invitation.sender_email_verified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[rocket::async_trait]
impl NotificationDispatcher for MemoryStore {
    async fn schedule_templated_email(&self, email: NewScheduledEmail) -> Result<ScheduledEmail> {
        let email = ScheduledEmail {
            id: Id::new(),
            email,
        };
        self.lock().scheduled.push(email.clone());
        Ok(email)
    }

    async fn send_scheduled(&self, email: &ScheduledEmail) -> Result<SendStatus> {
        let mut state = self.lock();
        let status = if state.failing_sends {
            SendStatus::Failed
        } else {
            SendStatus::Sent
        };
        match state.scheduled.iter_mut().find(|scheduled| scheduled.id == email.id) {
            Some(scheduled) => {
                scheduled.email.send_status = status;
                Ok(status)
            }
            None => Err(Error::NotFound(format!("scheduled email {}", email.id))),
        }
    }
}
