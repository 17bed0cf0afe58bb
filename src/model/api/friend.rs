use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::{EmailAddress, InviteResponseKind, Trail},
    db::{InvitationStatus, Voter},
};

/// Body of a request to invite friends by email.
#[derive(Debug, Clone, Deserialize)]
pub struct InvitationEmailRequest {
    pub voter_device_id: String,
    /// Free-form list of addresses, as typed or pasted by the voter.
    #[serde(default)]
    pub email_addresses_raw: String,
    #[serde(default)]
    pub invitation_message: String,
    /// The sender's own address, needed if they have no verified email yet.
    #[serde(default)]
    pub sender_email_address: Option<String>,
}

/// Body of a request to respond to an invitation or a friendship.
#[derive(Debug, Clone, Deserialize)]
pub struct InviteResponseRequest {
    pub voter_device_id: String,
    pub kind_of_invite_response: InviteResponseKind,
    #[serde(default)]
    pub other_voter_we_vote_id: Option<String>,
    #[serde(default)]
    pub recipient_voter_email: Option<String>,
}

/// What happened for one address in an invitation batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientOutcome {
    pub recipient_voter_email: String,
    /// Set when the address belongs to a known voter.
    pub recipient_voter_we_vote_id: Option<ApiId>,
    pub invitation_saved: bool,
    pub email_sent: bool,
    pub status: Trail,
}

impl RecipientOutcome {
    pub fn new(address: &EmailAddress) -> Self {
        Self {
            recipient_voter_email: address.to_string(),
            recipient_voter_we_vote_id: None,
            invitation_saved: false,
            email_sent: false,
            status: Trail::new(),
        }
    }
}

/// Result of sending a batch of invitations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvitationSendResponse {
    /// True iff every recipient's invitation was saved.
    pub success: bool,
    pub status: Trail,
    pub voter_device_id: String,
    pub sender_voter_email_address_missing: bool,
    pub error_message_to_show_voter: String,
    pub recipients: Vec<RecipientOutcome>,
    /// Input tokens that were not valid addresses.
    pub rejected_email_addresses: Vec<String>,
}

/// Result of responding to an invitation or a friendship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InviteResponseResult {
    pub success: bool,
    pub status: Trail,
    pub voter_device_id: String,
}

/// Result of following an invitation's confirmation link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptInvitationResponse {
    pub success: bool,
    pub status: Trail,
    pub voter_device_id: String,
    pub friend_voter_we_vote_id: Option<ApiId>,
}

/// One row of a friend list. All list kinds share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendEntry {
    pub voter_we_vote_id: String,
    pub voter_display_name: String,
    pub voter_photo_url: String,
    pub voter_twitter_handle: String,
    pub voter_twitter_description: String,
    pub voter_twitter_followers_count: u64,
    pub voter_state_code: String,
    pub voter_email_address: String,
    pub invitation_status: String,
}

impl FriendEntry {
    /// A row describing a known voter.
    pub fn for_voter(voter: &Voter) -> Self {
        Self {
            voter_we_vote_id: voter.id.to_string(),
            voter_display_name: voter.full_name(),
            voter_photo_url: voter.photo_url.clone(),
            voter_twitter_handle: voter.twitter_screen_name.clone(),
            voter_twitter_description: String::new(),
            voter_twitter_followers_count: 0,
            voter_state_code: String::new(),
            voter_email_address: String::new(),
            invitation_status: String::new(),
        }
    }

    /// A row describing an invitation to an address with no known voter.
    pub fn for_email(address: &EmailAddress) -> Self {
        Self {
            voter_we_vote_id: String::new(),
            voter_display_name: String::new(),
            voter_photo_url: String::new(),
            voter_twitter_handle: String::new(),
            voter_twitter_description: String::new(),
            voter_twitter_followers_count: 0,
            voter_state_code: String::new(),
            voter_email_address: address.to_string(),
            invitation_status: String::new(),
        }
    }

    pub fn with_status(mut self, status: InvitationStatus) -> Self {
        self.invitation_status = status.as_str().to_string();
        self
    }
}

/// A friend list view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendListResponse {
    pub success: bool,
    pub status: Trail,
    pub voter_device_id: String,
    pub state_code: String,
    pub kind_of_list: String,
    pub friend_list_found: bool,
    pub friend_list: Vec<FriendEntry>,
}

/// Result of following an email verification link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailVerifyResponse {
    pub success: bool,
    pub status: Trail,
    pub email_address: Option<String>,
    /// Held-back invitations whose emails went out once the address was verified.
    pub invitations_released: usize,
}
