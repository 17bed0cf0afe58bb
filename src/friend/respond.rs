use log::{error, info};

use crate::{
    friend::FriendService,
    model::{
        api::{AcceptInvitationResponse, ApiId, InviteResponseRequest, InviteResponseResult},
        common::{EmailAddress, InviteResponseKind, SecretKey, StatusCode, Trail},
        db::{Recipient, Voter},
        mongodb::Id,
    },
    store::{ResponseOutcome, VoterResponse},
};

impl FriendService<'_> {
    /// Act on an invitation or friendship between the acting voter and another.
    pub async fn respond(&self, request: &InviteResponseRequest) -> InviteResponseResult {
        let mut trail = Trail::new();
        let result = self.respond_inner(request, &mut trail).await;
        info!(
            "{:?} response finished: {trail}",
            request.kind_of_invite_response
        );
        InviteResponseResult {
            success: result.is_ok(),
            status: trail,
            voter_device_id: request.voter_device_id.clone(),
        }
    }

    async fn respond_inner(
        &self,
        request: &InviteResponseRequest,
        trail: &mut Trail,
    ) -> Result<(), StatusCode> {
        let me = self
            .voter_from_device(&request.voter_device_id, trail)
            .await?;

        let response = match request.kind_of_invite_response {
            InviteResponseKind::DeleteInvitationEmailSentByMe => {
                let address = request
                    .recipient_voter_email
                    .as_deref()
                    .and_then(|raw| raw.parse::<EmailAddress>().ok())
                    .ok_or_else(|| trail.fail(StatusCode::RecipientEmailMissing))?;
                return self.delete_email_invitation(&me, &address, trail).await;
            }
            InviteResponseKind::UnfriendCurrentFriend => None,
            InviteResponseKind::AcceptInvitation => Some(VoterResponse::Accept),
            InviteResponseKind::IgnoreInvitation => Some(VoterResponse::Ignore),
            InviteResponseKind::DeleteInvitationVoterSentByMe => {
                Some(VoterResponse::DeleteSentByMe)
            }
        };

        let other = self
            .other_voter(request.other_voter_we_vote_id.as_deref(), trail)
            .await?;
        match response {
            None => self.unfriend(&me, &other, trail).await,
            Some(response) => {
                // Accepting and ignoring act on invitations the other voter sent.
                let (sender, recipient) = match response {
                    VoterResponse::DeleteSentByMe => (&me, &other),
                    VoterResponse::Accept | VoterResponse::Ignore => (&other, &me),
                };
                match self
                    .backend
                    .invitations
                    .respond_voter_invitation(sender.id, recipient.id, response)
                    .await
                {
                    Ok(ResponseOutcome::Accepted) => {
                        trail.push(StatusCode::FriendInvitationAccepted);
                        Ok(())
                    }
                    Ok(ResponseOutcome::Ignored) => {
                        trail.push(StatusCode::FriendInvitationIgnored);
                        Ok(())
                    }
                    Ok(ResponseOutcome::Deleted) => {
                        trail.push(StatusCode::FriendInvitationDeleted);
                        Ok(())
                    }
                    Ok(ResponseOutcome::NotFound) => {
                        Err(trail.fail(StatusCode::FriendInvitationNotFound))
                    }
                    Err(e) => {
                        error!(
                            "Failed to apply {response:?} from {} to {}: {e}",
                            sender.id, recipient.id
                        );
                        Err(trail.fail_with(
                            StatusCode::FriendInvitationResponseFailed,
                            e.to_string(),
                        ))
                    }
                }
            }
        }
    }

    /// The voter named by an ID supplied in a request.
    async fn other_voter(
        &self,
        raw_id: Option<&str>,
        trail: &mut Trail,
    ) -> Result<Voter, StatusCode> {
        let id = match raw_id.map(str::parse::<ApiId>) {
            Some(Ok(id)) => id,
            _ => return Err(trail.fail(StatusCode::VoterNotFoundFromOtherVoterWeVoteId)),
        };
        match self.backend.voters.resolve_by_id(*id).await {
            Ok(Some(voter)) => Ok(voter),
            Ok(None) => Err(trail.fail(StatusCode::VoterNotFoundFromOtherVoterWeVoteId)),
            Err(e) => {
                error!("Failed to look up voter {id}: {e}");
                Err(trail.fail_with(StatusCode::VoterLookupFailed, e.to_string()))
            }
        }
    }

    async fn unfriend(
        &self,
        me: &Voter,
        other: &Voter,
        trail: &mut Trail,
    ) -> Result<(), StatusCode> {
        match self.backend.invitations.unfriend(me.id, other.id).await {
            Ok(true) => {
                trail.push(StatusCode::FriendshipRemoved);
                Ok(())
            }
            Ok(false) => Err(trail.fail(StatusCode::FriendshipNotFound)),
            Err(e) => {
                error!("Failed to end friendship of {} and {}: {e}", me.id, other.id);
                Err(trail.fail_with(StatusCode::FriendInvitationResponseFailed, e.to_string()))
            }
        }
    }

    async fn delete_email_invitation(
        &self,
        me: &Voter,
        address: &EmailAddress,
        trail: &mut Trail,
    ) -> Result<(), StatusCode> {
        match self
            .backend
            .invitations
            .delete_email_invitation(me.id, address)
            .await
        {
            Ok(0) => Err(trail.fail(StatusCode::FriendInvitationNotFound)),
            Ok(count) => {
                trail.push_with(StatusCode::FriendInvitationDeleted, count.to_string());
                Ok(())
            }
            Err(e) => {
                error!("Failed to delete invitations from {} to {address}: {e}", me.id);
                Err(trail.fail_with(StatusCode::FriendInvitationResponseFailed, e.to_string()))
            }
        }
    }

    /// Accept the invitation a confirmation link points at.
    ///
    /// An invitation sent to an address is claimed by whoever follows its link.
    pub async fn accept_by_secret_key(
        &self,
        device_id: &str,
        secret_key: &SecretKey,
    ) -> AcceptInvitationResponse {
        let mut response = AcceptInvitationResponse {
            success: false,
            status: Trail::new(),
            voter_device_id: device_id.to_string(),
            friend_voter_we_vote_id: None,
        };
        let mut trail = Trail::new();
        match self.accept_inner(device_id, secret_key, &mut trail).await {
            Ok(friend) => {
                response.success = true;
                response.friend_voter_we_vote_id = Some(friend.into());
            }
            Err(code) => info!("Invitation link not accepted: {code}"),
        }
        response.status = trail;
        response
    }

    async fn accept_inner(
        &self,
        device_id: &str,
        secret_key: &SecretKey,
        trail: &mut Trail,
    ) -> Result<Id, StatusCode> {
        let me = self.voter_from_device(device_id, trail).await?;
        let invitations = &self.backend.invitations;

        let invitation = match invitations.find_by_secret_key(secret_key).await {
            Ok(Some(invitation)) => invitation,
            Ok(None) => return Err(trail.fail(StatusCode::FriendInvitationNotFound)),
            Err(e) => {
                error!("Failed to look up invitation by secret key: {e}");
                return Err(
                    trail.fail_with(StatusCode::FriendInvitationResponseFailed, e.to_string())
                );
            }
        };
        if invitation.sender_id == me.id {
            return Err(trail.fail(StatusCode::CannotInviteSelf));
        }
        if let Recipient::Voter { voter_id } = invitation.recipient {
            if voter_id != me.id {
                return Err(trail.fail(StatusCode::FriendInvitationNotForThisVoter));
            }
        }

        match invitations.accept_invitation(invitation.id, me.id).await {
            Ok(true) => {
                trail.push(StatusCode::FriendInvitationAccepted);
                Ok(invitation.sender_id)
            }
            Ok(false) => Err(trail.fail(StatusCode::FriendInvitationNotFound)),
            Err(e) => {
                error!("Failed to accept invitation {}: {e}", invitation.id);
                Err(trail.fail_with(StatusCode::FriendInvitationResponseFailed, e.to_string()))
            }
        }
    }
}
