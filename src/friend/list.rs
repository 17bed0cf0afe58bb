use log::{debug, error, warn};

use crate::{
    error::Error,
    friend::FriendService,
    model::{
        api::{FriendEntry, FriendListResponse},
        common::{KindOfList, StatusCode, Trail},
        db::{Invitation, InvitationStatus, Recipient},
        mongodb::Id,
    },
};

impl FriendService<'_> {
    /// One of the acting voter's friend lists. `kind` defaults to current friends.
    pub async fn friend_list(
        &self,
        device_id: &str,
        kind: Option<&str>,
        state_code: Option<&str>,
    ) -> FriendListResponse {
        let kind_of_list = match kind.map(str::trim) {
            Some(kind) if !kind.is_empty() => kind.to_string(),
            _ => KindOfList::default().as_str().to_string(),
        };
        let mut trail = Trail::new();
        let (success, friend_list) = match self
            .list_inner(device_id, &kind_of_list, &mut trail)
            .await
        {
            Ok(list) => (true, list),
            Err(_) => (false, Vec::new()),
        };

        FriendListResponse {
            success,
            status: trail,
            voter_device_id: device_id.to_string(),
            state_code: state_code.unwrap_or_default().to_string(),
            kind_of_list,
            friend_list_found: !friend_list.is_empty(),
            friend_list,
        }
    }

    async fn list_inner(
        &self,
        device_id: &str,
        kind_of_list: &str,
        trail: &mut Trail,
    ) -> Result<Vec<FriendEntry>, StatusCode> {
        let me = self.voter_from_device(device_id, trail).await?;
        let kind = kind_of_list.parse::<KindOfList>().map_err(|e| {
            debug!("{e}");
            trail.fail_with(StatusCode::KindOfListNotImplementedYet, kind_of_list)
        })?;

        let invitations = &self.backend.invitations;
        let list = match kind {
            KindOfList::CurrentFriends => match invitations.list_current_friends(me.id).await {
                Ok(ids) => self.voter_rows(ids, None, trail).await?,
                Err(e) => return Err(retrieve_failed(kind, e, trail)),
            },
            KindOfList::FriendInvitationsSentToMe => {
                match invitations
                    .list_invitations_received(me.id, InvitationStatus::Pending)
                    .await
                {
                    Ok(received) => self.sender_rows(received, None, trail).await?,
                    Err(e) => return Err(retrieve_failed(kind, e, trail)),
                }
            }
            KindOfList::IgnoredFriendInvitations => {
                match invitations
                    .list_invitations_received(me.id, InvitationStatus::Ignored)
                    .await
                {
                    Ok(received) => {
                        self.sender_rows(received, Some(InvitationStatus::Ignored), trail)
                            .await?
                    }
                    Err(e) => return Err(retrieve_failed(kind, e, trail)),
                }
            }
            KindOfList::FriendInvitationsSentByMe => {
                match invitations.list_invitations_sent(me.id).await {
                    Ok(sent) => self.recipient_rows(sent, trail).await?,
                    Err(e) => return Err(retrieve_failed(kind, e, trail)),
                }
            }
            KindOfList::FriendsInCommon | KindOfList::SuggestedFriends => {
                return Err(
                    trail.fail_with(StatusCode::KindOfListNotImplementedYet, kind.as_str())
                );
            }
        };

        trail.push_with(StatusCode::FriendListRetrieved, list.len().to_string());
        Ok(list)
    }

    /// Rows for the given voters, skipping any that no longer exist.
    async fn voter_rows(
        &self,
        ids: Vec<Id>,
        status: Option<InvitationStatus>,
        trail: &mut Trail,
    ) -> Result<Vec<FriendEntry>, StatusCode> {
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(row) = self.voter_row(id, status, trail).await? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    async fn voter_row(
        &self,
        id: Id,
        status: Option<InvitationStatus>,
        trail: &mut Trail,
    ) -> Result<Option<FriendEntry>, StatusCode> {
        match self.backend.voters.resolve_by_id(id).await {
            Ok(Some(voter)) => {
                let row = FriendEntry::for_voter(&voter);
                Ok(Some(match status {
                    Some(status) => row.with_status(status),
                    None => row,
                }))
            }
            Ok(None) => {
                warn!("Friend list refers to missing voter {id}");
                Ok(None)
            }
            Err(e) => {
                error!("Failed to look up voter {id} for friend list: {e}");
                Err(trail.fail_with(StatusCode::FriendListRetrieveFailed, e.to_string()))
            }
        }
    }

    async fn sender_rows(
        &self,
        received: Vec<Invitation>,
        status: Option<InvitationStatus>,
        trail: &mut Trail,
    ) -> Result<Vec<FriendEntry>, StatusCode> {
        let senders = received.iter().map(|invitation| invitation.sender_id).collect();
        self.voter_rows(senders, status, trail).await
    }

    /// Rows for invitations the voter sent, whoever they went to.
    async fn recipient_rows(
        &self,
        sent: Vec<Invitation>,
        trail: &mut Trail,
    ) -> Result<Vec<FriendEntry>, StatusCode> {
        let mut rows = Vec::with_capacity(sent.len());
        for invitation in sent {
            match &invitation.recipient {
                Recipient::Voter { voter_id } => {
                    if let Some(row) = self
                        .voter_row(*voter_id, Some(invitation.status), trail)
                        .await?
                    {
                        rows.push(row);
                    }
                }
                Recipient::Email { address, .. } => {
                    rows.push(FriendEntry::for_email(address).with_status(invitation.status));
                }
            }
        }
        Ok(rows)
    }
}

fn retrieve_failed(kind: KindOfList, e: Error, trail: &mut Trail) -> StatusCode {
    error!("Failed to retrieve {}: {e}", kind.as_str());
    trail.fail_with(StatusCode::FriendListRetrieveFailed, e.to_string())
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::model::db::{
        voter::examples::{FRIEND_DEVICE, UNVERIFIED_DEVICE, VERIFIED_DEVICE},
        EmailRecord, VoterCore,
    };
    use crate::store::{memory::MemoryStore, InvitationStore, VoterResponse};

    use super::*;

    #[backend_test(voters)]
    async fn current_friends(store: MemoryStore) {
        let backend = store.backend();
        let config = Config::example();
        let service = FriendService::new(&backend, &config);
        let me = store.voter_by_device(VERIFIED_DEVICE);
        let friend = store.voter_by_device(FRIEND_DEVICE);
        let gone = store.add_voter(VoterCore::example_unverified(), None);
        store.make_friends(me.id, friend.id);
        store.make_friends(gone.id, me.id);
        store.remove_voter(gone.id);

        let response = service
            .friend_list(VERIFIED_DEVICE, None, Some("CA"))
            .await;
        assert!(response.success);
        assert!(response.friend_list_found);
        assert_eq!(response.kind_of_list, "CURRENT_FRIENDS");
        assert_eq!(response.state_code, "CA");
        assert_eq!(response.status.to_string(), "FRIEND_LIST_RETRIEVED:1");

        let row = &response.friend_list[0];
        assert_eq!(row.voter_we_vote_id, friend.id.to_string());
        assert_eq!(row.voter_display_name, "Frances Friend");
        assert_eq!(row.voter_twitter_description, "");
        assert_eq!(row.voter_twitter_followers_count, 0);
        assert_eq!(row.invitation_status, "");
    }

    #[backend_test(voters)]
    async fn empty_list_is_still_a_success(store: MemoryStore) {
        let backend = store.backend();
        let config = Config::example();
        let service = FriendService::new(&backend, &config);

        let response = service
            .friend_list(UNVERIFIED_DEVICE, Some("FRIEND_INVITATIONS_SENT_TO_ME"), None)
            .await;
        assert!(response.success);
        assert!(!response.friend_list_found);
        assert_eq!(response.state_code, "");
    }

    #[backend_test(voters)]
    async fn invitations_sent_to_me(store: MemoryStore) {
        let backend = store.backend();
        let config = Config::example();
        let service = FriendService::new(&backend, &config);
        let me = store.voter_by_device(FRIEND_DEVICE);
        let pending = store.voter_by_device(VERIFIED_DEVICE);
        let ignored = store.voter_by_device(UNVERIFIED_DEVICE);
        let typed = EmailRecord::example("frances@example.org", Some(me.id));
        store
            .upsert_voter_invitation(pending.id, me.id, &typed, "hi", true)
            .await
            .unwrap();
        store
            .upsert_voter_invitation(ignored.id, me.id, &typed, "hi", true)
            .await
            .unwrap();
        store
            .respond_voter_invitation(ignored.id, me.id, VoterResponse::Ignore)
            .await
            .unwrap();

        let response = service
            .friend_list(FRIEND_DEVICE, Some("FRIEND_INVITATIONS_SENT_TO_ME"), None)
            .await;
        assert!(response.success);
        assert_eq!(response.friend_list.len(), 1);
        assert_eq!(response.friend_list[0].voter_we_vote_id, pending.id.to_string());
        assert_eq!(response.friend_list[0].invitation_status, "");

        let response = service
            .friend_list(FRIEND_DEVICE, Some("IGNORED_FRIEND_INVITATIONS"), None)
            .await;
        assert_eq!(response.friend_list.len(), 1);
        assert_eq!(response.friend_list[0].voter_we_vote_id, ignored.id.to_string());
        assert_eq!(response.friend_list[0].invitation_status, "IGNORED");
    }

    #[backend_test(voters)]
    async fn invitations_sent_by_me(store: MemoryStore) {
        let backend = store.backend();
        let config = Config::example();
        let service = FriendService::new(&backend, &config);
        let me = store.voter_by_device(VERIFIED_DEVICE);
        let friend = store.voter_by_device(FRIEND_DEVICE);
        let record = store.add_email_record("a@x.com", None, false);
        let typed = EmailRecord::example("frances@example.org", Some(friend.id));
        store
            .upsert_voter_invitation(me.id, friend.id, &typed, "hi", true)
            .await
            .unwrap();
        store
            .upsert_email_invitation(me.id, &record, "hi", true)
            .await
            .unwrap();
        store
            .respond_voter_invitation(me.id, friend.id, VoterResponse::Accept)
            .await
            .unwrap();

        let response = service
            .friend_list(VERIFIED_DEVICE, Some("FRIEND_INVITATIONS_SENT_BY_ME"), None)
            .await;
        assert!(response.success);
        let rows = &response.friend_list;
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].voter_we_vote_id, friend.id.to_string());
        assert_eq!(rows[0].voter_email_address, "");
        assert_eq!(rows[0].invitation_status, "ACCEPTED");

        assert_eq!(rows[1].voter_we_vote_id, "");
        assert_eq!(rows[1].voter_display_name, "");
        assert_eq!(rows[1].voter_email_address, "a@x.com");
        assert_eq!(rows[1].invitation_status, "PENDING");
    }

    #[backend_test(voters)]
    async fn unimplemented_kinds(store: MemoryStore) {
        let backend = store.backend();
        let config = Config::example();
        let service = FriendService::new(&backend, &config);

        for kind in ["FRIENDS_IN_COMMON", "SUGGESTED_FRIENDS", "BEST_FRIENDS"] {
            let response = service.friend_list(VERIFIED_DEVICE, Some(kind), None).await;
            assert!(!response.success);
            assert!(!response.friend_list_found);
            assert_eq!(response.kind_of_list, kind);
            assert_eq!(
                response.status.to_string(),
                format!("KIND_OF_LIST_NOT_IMPLEMENTED_YET:{kind}")
            );
        }
    }

    #[backend_test]
    async fn unknown_device(store: MemoryStore) {
        let backend = store.backend();
        let config = Config::example();
        let service = FriendService::new(&backend, &config);

        let response = service.friend_list("nobody", None, None).await;
        assert!(!response.success);
        assert_eq!(
            response.status.last(),
            Some(StatusCode::VoterNotFoundFromVoterDeviceId)
        );
    }
}
