use chrono::Utc;
use log::{error, info, warn};
use rocket::serde::json::serde_json;

use crate::{
    friend::FriendService,
    model::{
        api::{InvitationEmailRequest, InvitationSendResponse, RecipientOutcome},
        common::{split_raw_list, EmailAddress, StatusCode, Trail},
        db::{
            EmailRecord, EmailTemplate, Invitation, NewScheduledEmail, ScheduledEmail, SendStatus,
            Voter,
        },
        mongodb::Id,
        template::FriendInvitationVariables,
    },
    store::EmailLookup,
};

pub const NO_RECIPIENTS_MESSAGE: &str = "Please enter the email address of at least one friend.";

/// Where an invitation email goes.
pub(super) struct Delivery<'v> {
    pub recipient: Option<&'v Voter>,
    pub email_id: Id,
    pub address: &'v EmailAddress,
}

impl FriendService<'_> {
    /// Invite every address in the request to be the sender's friend.
    ///
    /// Senders without a verified email must supply one. Their invitations are
    /// saved but held back, and they are sent a verification email instead.
    pub async fn send_invitations(
        &self,
        request: &InvitationEmailRequest,
    ) -> InvitationSendResponse {
        let mut response = InvitationSendResponse {
            success: false,
            status: Trail::new(),
            voter_device_id: request.voter_device_id.clone(),
            sender_voter_email_address_missing: true,
            error_message_to_show_voter: String::new(),
            recipients: Vec::new(),
            rejected_email_addresses: Vec::new(),
        };
        let mut trail = Trail::new();

        let result = self.send_batch(request, &mut response, &mut trail).await;
        let saved = response
            .recipients
            .iter()
            .filter(|recipient| recipient.invitation_saved)
            .count();
        response.success = result.is_ok() && saved > 0 && saved == response.recipients.len();
        info!(
            "Saved {saved} of {} invitations ({})",
            response.recipients.len(),
            if response.success { "success" } else { "failure" }
        );

        response.status = trail;
        response
    }

    async fn send_batch(
        &self,
        request: &InvitationEmailRequest,
        response: &mut InvitationSendResponse,
        trail: &mut Trail,
    ) -> Result<(), StatusCode> {
        let sender = self
            .voter_from_device(&request.voter_device_id, trail)
            .await?;

        // Check everything before writing anything.
        let mut sender_address = sender.verified_email().cloned();
        let new_sender_address = match sender_address {
            Some(_) => None,
            None => match request
                .sender_email_address
                .as_deref()
                .and_then(|raw| raw.parse::<EmailAddress>().ok())
            {
                Some(address) => Some(address),
                None => return Err(trail.fail(StatusCode::VoterDoesNotHaveValidEmail)),
            },
        };
        response.sender_voter_email_address_missing = false;

        let list = split_raw_list(&request.email_addresses_raw);
        response.rejected_email_addresses = list.rejected.clone();
        if list.is_empty() {
            response.error_message_to_show_voter = NO_RECIPIENTS_MESSAGE.to_string();
            return Err(trail.fail(StatusCode::ListOfEmailsNotReceived));
        }

        if let Some(address) = new_sender_address {
            sender_address = self.claim_sender_email(&sender, &address, trail).await?;
        }

        for address in &list.addresses {
            let mut outcome = RecipientOutcome::new(address);
            self.invite_one(
                &sender,
                sender_address.as_ref(),
                &request.invitation_message,
                address,
                &mut outcome,
            )
            .await;
            trail.extend(outcome.status.clone());
            response.recipients.push(outcome);
        }
        Ok(())
    }

    /// Attach an unverified address to the sender and ask them to verify it.
    ///
    /// Returns the address if it turns out the sender has verified it already.
    async fn claim_sender_email(
        &self,
        sender: &Voter,
        address: &EmailAddress,
        trail: &mut Trail,
    ) -> Result<Option<EmailAddress>, StatusCode> {
        let emails = &self.backend.emails;
        let record = match emails.resolve_by_address(address).await {
            Ok(EmailLookup::Single(record)) => Some(record),
            Ok(EmailLookup::Multiple(records)) => {
                warn!("Found {} email records for sender address {address}", records.len());
                records.into_iter().next()
            }
            Ok(EmailLookup::None) => match emails.create(address, Some(sender.id)).await {
                Ok(record) => Some(record),
                Err(e) => {
                    error!("Failed to create sender email record for {address}: {e}");
                    None
                }
            },
            Err(e) => {
                error!("Failed to look up sender email record for {address}: {e}");
                None
            }
        };
        let mut record =
            record.ok_or_else(|| trail.fail(StatusCode::SenderEmailAddressRecordMissing))?;

        if record.verified_by_other_than(sender.id) {
            return Err(trail.fail(StatusCode::SenderEmailOwnedByAnotherVoter));
        }
        if record.voter_id == Some(sender.id) && record.ownership_verified {
            // Proved earlier, but never made the voter's primary email.
            match self.backend.voters.mark_email_verified(sender.id, address).await {
                Ok(_) => return Ok(Some(address.clone())),
                Err(e) => error!("Failed to mark {address} verified for voter {}: {e}", sender.id),
            }
        }
        if record.voter_id != Some(sender.id) {
            if let Err(e) = emails.assign_owner(record.id, Some(sender.id)).await {
                error!("Failed to claim {address} for voter {}: {e}", sender.id);
                return Err(
                    trail.fail_with(StatusCode::SenderEmailAddressRecordMissing, e.to_string())
                );
            }
            record.voter_id = Some(sender.id);
        }

        self.send_verification(sender, &record, trail).await;
        Ok(None)
    }

    async fn send_verification(&self, sender: &Voter, record: &EmailRecord, trail: &mut Trail) {
        match self
            .backend
            .notifier
            .schedule_verification_email(self.config, sender.id, record)
            .await
        {
            Ok(email) => {
                trail.push(StatusCode::VerificationEmailScheduled);
                self.dispatch(&email, trail).await;
            }
            Err(e) => {
                error!("Failed to schedule verification email to {}: {e}", record.address);
                trail.push_with(StatusCode::EmailScheduleFailed, e.to_string());
            }
        }
    }

    /// Invite one address, recording the result in `outcome`.
    ///
    /// Invitation emails go out only if the sender has a verified address.
    async fn invite_one(
        &self,
        sender: &Voter,
        sender_address: Option<&EmailAddress>,
        message: &str,
        address: &EmailAddress,
        outcome: &mut RecipientOutcome,
    ) {
        let trail = &mut outcome.status;
        let resolved = match self.resolve_recipient(address, trail).await {
            Ok(resolved) => resolved,
            Err(_) => return,
        };
        outcome.recipient_voter_we_vote_id = resolved.voter.as_ref().map(|voter| voter.id.into());

        let send_now = sender_address.is_some();
        let upserted = match self
            .create_invitation(sender, message, &resolved, send_now, trail)
            .await
        {
            Ok(upserted) => upserted,
            Err(_) => return,
        };
        outcome.invitation_saved = true;

        if send_now {
            let delivery = Delivery {
                recipient: resolved.voter.as_ref(),
                email_id: resolved.record.id,
                address: &resolved.record.address,
            };
            outcome.email_sent = self
                .notify_invitation(sender, sender_address, &upserted.invitation, delivery, trail)
                .await;
        } else {
            trail.push(StatusCode::InvitationEmailDeferred);
        }
    }

    /// Schedule and send the email for an invitation. Returns whether it was sent.
    pub(super) async fn notify_invitation(
        &self,
        sender: &Voter,
        sender_address: Option<&EmailAddress>,
        invitation: &Invitation,
        delivery: Delivery<'_>,
        trail: &mut Trail,
    ) -> bool {
        let variables = FriendInvitationVariables::new(
            self.config,
            sender,
            sender_address,
            delivery.recipient,
            delivery.address,
            &invitation.message,
            &invitation.secret_key,
        );
        let variables = match serde_json::to_string(&variables) {
            Ok(variables) => variables,
            Err(e) => {
                error!("Failed to serialise invitation variables: {e}");
                trail.push_with(StatusCode::EmailScheduleFailed, e.to_string());
                return false;
            }
        };

        let email = NewScheduledEmail {
            template: EmailTemplate::FriendInvitation,
            sender_voter_id: sender.id,
            sender_address: sender_address.cloned(),
            recipient_voter_id: delivery.recipient.map(|voter| voter.id),
            recipient_email_id: delivery.email_id,
            recipient_address: delivery.address.clone(),
            variables,
            send_status: SendStatus::Scheduled,
            created_at: Utc::now(),
        };
        match self.backend.notifier.schedule_templated_email(email).await {
            Ok(email) => {
                trail.push(StatusCode::EmailScheduled);
                self.dispatch(&email, trail).await
            }
            Err(e) => {
                error!("Failed to schedule invitation email to {}: {e}", delivery.address);
                trail.push_with(StatusCode::EmailScheduleFailed, e.to_string());
                false
            }
        }
    }

    /// Send a scheduled email. Returns whether it was sent.
    async fn dispatch(&self, email: &ScheduledEmail, trail: &mut Trail) -> bool {
        match self.backend.notifier.send_scheduled(email).await {
            Ok(SendStatus::Sent) => {
                trail.push(StatusCode::EmailSent);
                true
            }
            Ok(status) => {
                warn!("Scheduled email {} was not sent: {}", email.id, status.as_str());
                trail.push_with(StatusCode::EmailSendFailed, status.as_str());
                false
            }
            Err(e) => {
                error!("Failed to send scheduled email {}: {e}", email.id);
                trail.push_with(StatusCode::EmailSendFailed, e.to_string());
                false
            }
        }
    }
}
