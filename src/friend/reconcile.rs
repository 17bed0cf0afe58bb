use log::{debug, error, warn};

use crate::{
    friend::FriendService,
    model::{
        common::{EmailAddress, StatusCode, Trail},
        db::{EmailRecord, Voter},
    },
    store::{EmailLookup, Upserted},
};

/// An invitee's directory entry, and the voter who owns it if known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecipient {
    pub record: EmailRecord,
    pub voter: Option<Voter>,
}

impl FriendService<'_> {
    /// Find or create the directory entry for `address`, and its owner.
    ///
    /// Owner links to voters that no longer exist are cleared as they are found.
    pub async fn resolve_recipient(
        &self,
        address: &EmailAddress,
        trail: &mut Trail,
    ) -> Result<ResolvedRecipient, StatusCode> {
        let (mut record, mut voter) = self.find_or_create_record(address, trail).await?;

        if voter.is_none() {
            if let Some(owner) = record.voter_id {
                match self.backend.voters.resolve_by_id(owner).await {
                    Ok(Some(found)) => voter = Some(found),
                    Ok(None) => {
                        warn!("Email record {} points at missing voter {owner}", record.id);
                        match self.backend.emails.assign_owner(record.id, None).await {
                            Ok(_) => trail.push(StatusCode::EmailOwnerCleared),
                            Err(e) => {
                                error!("Failed to clear owner of email record {}: {e}", record.id);
                                trail.push_with(StatusCode::EmailOwnerClearFailed, e.to_string());
                            }
                        }
                        record.voter_id = None;
                    }
                    // The link may be fine; leave it and treat the address as unclaimed for now.
                    Err(e) => {
                        error!("Failed to look up owner of email record {}: {e}", record.id);
                        trail.push_with(StatusCode::EmailOwnerLookupFailed, e.to_string());
                    }
                }
            }
        }

        Ok(ResolvedRecipient { record, voter })
    }

    async fn find_or_create_record(
        &self,
        address: &EmailAddress,
        trail: &mut Trail,
    ) -> Result<(EmailRecord, Option<Voter>), StatusCode> {
        let lookup = match self.backend.emails.resolve_by_address(address).await {
            Ok(lookup) => lookup,
            Err(e) => {
                error!("Failed to look up email record for {address}: {e}");
                return Err(
                    trail.fail_with(StatusCode::EmailAddressResolutionFailed, e.to_string())
                );
            }
        };

        match lookup {
            EmailLookup::Single(record) => {
                debug!("Found email record {} for {address}", record.id);
                trail.push(StatusCode::EmailAddressFound);
                Ok((record, None))
            }
            EmailLookup::Multiple(records) => {
                let count = records.len();
                warn!("Found {count} email records for {address}, using the oldest");
                trail.push_with(StatusCode::MultipleEmailRecordsFound, count.to_string());
                match records.into_iter().next() {
                    Some(record) => Ok((record, None)),
                    None => Err(trail.fail(StatusCode::EmailAddressResolutionFailed)),
                }
            }
            EmailLookup::None => {
                let voter = match self.backend.voters.resolve_by_email(address).await {
                    Ok(voter) => voter,
                    Err(e) => {
                        error!("Failed to look up voter by email {address}: {e}");
                        return Err(
                            trail.fail_with(StatusCode::EmailAddressResolutionFailed, e.to_string())
                        );
                    }
                };
                let owner = voter.as_ref().map(|voter| voter.id);
                match self.backend.emails.create(address, owner).await {
                    Ok(record) => {
                        debug!("Created email record {} for {address}", record.id);
                        trail.push(StatusCode::EmailAddressCreated);
                        Ok((record, voter))
                    }
                    Err(e) => {
                        error!("Failed to create email record for {address}: {e}");
                        Err(trail.fail_with(
                            StatusCode::EmailAddressResolutionFailed,
                            e.to_string(),
                        ))
                    }
                }
            }
        }
    }

    /// Create or refresh `sender`'s invitation to the resolved recipient.
    ///
    /// Invites the owning voter if known, or else the address itself.
    pub async fn create_invitation(
        &self,
        sender: &Voter,
        message: &str,
        recipient: &ResolvedRecipient,
        sender_email_verified: bool,
        trail: &mut Trail,
    ) -> Result<Upserted, StatusCode> {
        let invitations = &self.backend.invitations;
        let result = match &recipient.voter {
            Some(voter) if voter.id == sender.id => {
                return Err(trail.fail(StatusCode::CannotInviteSelf));
            }
            Some(voter) => {
                invitations
                    .upsert_voter_invitation(
                        sender.id,
                        voter.id,
                        &recipient.record,
                        message,
                        sender_email_verified,
                    )
                    .await
            }
            None => {
                invitations
                    .upsert_email_invitation(
                        sender.id,
                        &recipient.record,
                        message,
                        sender_email_verified,
                    )
                    .await
            }
        };

        match result {
            Ok(upserted) => {
                trail.push(if upserted.created {
                    StatusCode::FriendInvitationCreated
                } else {
                    StatusCode::FriendInvitationUpdated
                });
                Ok(upserted)
            }
            Err(e) => {
                error!("Failed to save invitation from {}: {e}", sender.id);
                Err(trail.fail_with(StatusCode::FriendInvitationSaveFailed, e.to_string()))
            }
        }
    }
}
