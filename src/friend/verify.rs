use log::{debug, error, info, warn};

use crate::{
    friend::{send::Delivery, FriendService},
    model::{
        api::EmailVerifyResponse,
        common::{EmailAddress, SecretKey, StatusCode, Trail},
        db::{Invitation, Voter},
    },
};

impl FriendService<'_> {
    /// Confirm the email address a verification link was sent to.
    ///
    /// The address becomes its owner's verified primary email, and the
    /// invitations they sent while unverified finally go out.
    pub async fn verify_email(&self, secret_key: &SecretKey) -> EmailVerifyResponse {
        let mut response = EmailVerifyResponse {
            success: false,
            status: Trail::new(),
            email_address: None,
            invitations_released: 0,
        };
        let mut trail = Trail::new();
        match self.verify_inner(secret_key, &mut response, &mut trail).await {
            Ok(()) => response.success = true,
            Err(code) => info!("Email verification failed: {code}"),
        }
        response.status = trail;
        response
    }

    async fn verify_inner(
        &self,
        secret_key: &SecretKey,
        response: &mut EmailVerifyResponse,
        trail: &mut Trail,
    ) -> Result<(), StatusCode> {
        let record = match self.backend.emails.find_by_secret_key(secret_key).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(trail.fail(StatusCode::EmailAddressNotFound)),
            Err(e) => {
                error!("Failed to look up email record by secret key: {e}");
                return Err(
                    trail.fail_with(StatusCode::EmailAddressVerifyFailed, e.to_string())
                );
            }
        };
        response.email_address = Some(record.address.to_string());

        let owner = record
            .voter_id
            .ok_or_else(|| trail.fail(StatusCode::EmailAddressHasNoOwner))?;
        let mut owner = match self.backend.voters.resolve_by_id(owner).await {
            Ok(Some(voter)) => voter,
            Ok(None) => {
                warn!("Email record {} points at missing voter {owner}", record.id);
                return Err(trail.fail(StatusCode::EmailAddressHasNoOwner));
            }
            Err(e) => {
                error!("Failed to look up voter {owner}: {e}");
                return Err(trail.fail_with(StatusCode::VoterLookupFailed, e.to_string()));
            }
        };

        let verified = match self.backend.emails.mark_verified(record.id).await {
            Ok(_) => {
                self.backend
                    .voters
                    .mark_email_verified(owner.id, &record.address)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = verified {
            error!("Failed to verify {} for voter {}: {e}", record.address, owner.id);
            return Err(trail.fail_with(StatusCode::EmailAddressVerifyFailed, e.to_string()));
        }
        trail.push(StatusCode::EmailAddressVerified);
        owner.email = Some(record.address.clone());
        owner.email_ownership_verified = true;

        response.invitations_released = self
            .release_deferred(&owner, &record.address, trail)
            .await;
        Ok(())
    }

    /// Send the invitations held back until `sender` verified an address.
    ///
    /// Invitations whose email could not be sent stay held back, to be retried
    /// on the next verification. Returns how many were released.
    async fn release_deferred(
        &self,
        sender: &Voter,
        sender_address: &EmailAddress,
        trail: &mut Trail,
    ) -> usize {
        let deferred = match self.backend.invitations.list_deferred(sender.id).await {
            Ok(deferred) => deferred,
            Err(e) => {
                error!("Failed to list deferred invitations of {}: {e}", sender.id);
                trail.push_with(StatusCode::FriendListRetrieveFailed, e.to_string());
                return 0;
            }
        };

        let mut released = 0;
        for invitation in &deferred {
            if !self.release_one(sender, sender_address, invitation, trail).await {
                continue;
            }
            match self.backend.invitations.mark_sender_verified(invitation.id).await {
                Ok(_) => released += 1,
                Err(e) => {
                    error!("Failed to release invitation {}: {e}", invitation.id);
                    trail.push_with(StatusCode::FriendInvitationSaveFailed, e.to_string());
                }
            }
        }
        debug!("Released {released} of {} deferred invitations", deferred.len());
        trail.push_with(StatusCode::DeferredInvitationsReleased, released.to_string());
        released
    }

    /// Send one held-back invitation's email to the address the sender
    /// typed. Returns whether it was sent.
    async fn release_one(
        &self,
        sender: &Voter,
        sender_address: &EmailAddress,
        invitation: &Invitation,
        trail: &mut Trail,
    ) -> bool {
        let target = match invitation.delivery_target() {
            Some(target) => target,
            None => {
                warn!("Invitation {} has no delivery address", invitation.id);
                trail.push_with(StatusCode::RecipientEmailMissing, invitation.id.to_string());
                return false;
            }
        };

        let recipient = match invitation.recipient.voter_id() {
            Some(voter_id) => match self.backend.voters.resolve_by_id(voter_id).await {
                Ok(Some(voter)) => Some(voter),
                Ok(None) => {
                    warn!("Invitation {} is to missing voter {voter_id}", invitation.id);
                    trail.push_with(
                        StatusCode::VoterNotFoundFromOtherVoterWeVoteId,
                        voter_id.to_string(),
                    );
                    return false;
                }
                Err(e) => {
                    error!("Failed to look up invitation recipient {voter_id}: {e}");
                    trail.push_with(StatusCode::VoterLookupFailed, e.to_string());
                    return false;
                }
            },
            None => None,
        };

        let delivery = Delivery {
            recipient: recipient.as_ref(),
            email_id: target.email_id,
            address: &target.address,
        };
        self.notify_invitation(sender, Some(sender_address), invitation, delivery, trail)
            .await
    }
}
