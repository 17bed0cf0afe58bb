use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a voter responds to an invitation or to an existing friendship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InviteResponseKind {
    /// Accept an invitation another voter sent me.
    AcceptInvitation,
    /// Ignore an invitation another voter sent me.
    IgnoreInvitation,
    /// Withdraw an invitation I sent to another voter.
    DeleteInvitationVoterSentByMe,
    /// Withdraw an invitation I sent to an email address.
    DeleteInvitationEmailSentByMe,
    /// End an existing friendship.
    UnfriendCurrentFriend,
}

/// The views a voter can ask for on their friends and invitations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindOfList {
    CurrentFriends,
    FriendInvitationsSentToMe,
    FriendInvitationsSentByMe,
    IgnoredFriendInvitations,
    FriendsInCommon,
    SuggestedFriends,
}

impl KindOfList {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentFriends => "CURRENT_FRIENDS",
            Self::FriendInvitationsSentToMe => "FRIEND_INVITATIONS_SENT_TO_ME",
            Self::FriendInvitationsSentByMe => "FRIEND_INVITATIONS_SENT_BY_ME",
            Self::IgnoredFriendInvitations => "IGNORED_FRIEND_INVITATIONS",
            Self::FriendsInCommon => "FRIENDS_IN_COMMON",
            Self::SuggestedFriends => "SUGGESTED_FRIENDS",
        }
    }
}

impl Default for KindOfList {
    fn default() -> Self {
        Self::CurrentFriends
    }
}

impl FromStr for KindOfList {
    type Err = UnknownKindOfList;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::CurrentFriends,
            Self::FriendInvitationsSentToMe,
            Self::FriendInvitationsSentByMe,
            Self::IgnoredFriendInvitations,
            Self::FriendsInCommon,
            Self::SuggestedFriends,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == s.trim())
        .ok_or_else(|| UnknownKindOfList(s.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown kind of list `{0}`")]
pub struct UnknownKindOfList(pub String);

#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json;

    use super::*;

    #[test]
    fn kind_of_list_names() {
        assert_eq!(
            "FRIEND_INVITATIONS_SENT_BY_ME".parse(),
            Ok(KindOfList::FriendInvitationsSentByMe)
        );
        assert_eq!(
            "friends".parse::<KindOfList>(),
            Err(UnknownKindOfList("friends".to_string()))
        );
        assert_eq!(KindOfList::default().as_str(), "CURRENT_FRIENDS");
    }

    #[test]
    fn response_kind_wire_names() {
        let kind: InviteResponseKind = serde_json::from_str("\"UNFRIEND_CURRENT_FRIEND\"").unwrap();
        assert_eq!(kind, InviteResponseKind::UnfriendCurrentFriend);
        assert_eq!(
            serde_json::to_string(&InviteResponseKind::DeleteInvitationEmailSentByMe).unwrap(),
            "\"DELETE_INVITATION_EMAIL_SENT_BY_ME\""
        );
    }
}
