use std::fmt::{Display, Formatter};

use serde::{Serialize, Serializer};

/// Every step an operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    // Voter identification
    ValidVoterDeviceIdMissing,
    VoterNotFoundFromVoterDeviceId,
    VoterNotFoundFromOtherVoterWeVoteId,
    VoterLookupFailed,
    // Sender email
    VoterDoesNotHaveValidEmail,
    SenderEmailAddressRecordMissing,
    SenderEmailOwnedByAnotherVoter,
    ListOfEmailsNotReceived,
    // Recipient reconciliation
    EmailAddressFound,
    MultipleEmailRecordsFound,
    EmailAddressCreated,
    EmailOwnerCleared,
    EmailOwnerClearFailed,
    EmailOwnerLookupFailed,
    EmailAddressResolutionFailed,
    // Invitations
    CannotInviteSelf,
    FriendInvitationCreated,
    FriendInvitationUpdated,
    FriendInvitationSaveFailed,
    // Outbound email
    VerificationEmailScheduled,
    EmailScheduled,
    EmailScheduleFailed,
    EmailSent,
    EmailSendFailed,
    InvitationEmailDeferred,
    // Responses
    FriendshipRemoved,
    FriendshipNotFound,
    FriendInvitationAccepted,
    FriendInvitationIgnored,
    FriendInvitationDeleted,
    FriendInvitationNotFound,
    FriendInvitationNotForThisVoter,
    FriendInvitationResponseFailed,
    RecipientEmailMissing,
    // Lists
    FriendListRetrieved,
    FriendListRetrieveFailed,
    KindOfListNotImplementedYet,
    // Email verification
    EmailAddressNotFound,
    EmailAddressHasNoOwner,
    EmailAddressVerified,
    EmailAddressVerifyFailed,
    DeferredInvitationsReleased,
}

impl StatusCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ValidVoterDeviceIdMissing => "VALID_VOTER_DEVICE_ID_MISSING",
            Self::VoterNotFoundFromVoterDeviceId => "VOTER_NOT_FOUND_FROM_VOTER_DEVICE_ID",
            Self::VoterNotFoundFromOtherVoterWeVoteId => {
                "VOTER_NOT_FOUND_FROM_OTHER_VOTER_WE_VOTE_ID"
            }
            Self::VoterLookupFailed => "VOTER_LOOKUP_FAILED",
            Self::VoterDoesNotHaveValidEmail => "VOTER_DOES_NOT_HAVE_VALID_EMAIL",
            Self::SenderEmailAddressRecordMissing => "SENDER_EMAIL_ADDRESS_RECORD_MISSING",
            Self::SenderEmailOwnedByAnotherVoter => "SENDER_EMAIL_OWNED_BY_ANOTHER_VOTER",
            Self::ListOfEmailsNotReceived => "LIST_OF_EMAILS_NOT_RECEIVED",
            Self::EmailAddressFound => "EMAIL_ADDRESS_FOUND",
            Self::MultipleEmailRecordsFound => "MULTIPLE_EMAIL_RECORDS_FOUND",
            Self::EmailAddressCreated => "EMAIL_ADDRESS_CREATED",
            Self::EmailOwnerCleared => "EMAIL_OWNER_CLEARED",
            Self::EmailOwnerClearFailed => "EMAIL_OWNER_CLEAR_FAILED",
            Self::EmailOwnerLookupFailed => "EMAIL_OWNER_LOOKUP_FAILED",
            Self::EmailAddressResolutionFailed => "EMAIL_ADDRESS_RESOLUTION_FAILED",
            Self::CannotInviteSelf => "CANNOT_INVITE_SELF",
            Self::FriendInvitationCreated => "FRIEND_INVITATION_CREATED",
            Self::FriendInvitationUpdated => "FRIEND_INVITATION_UPDATED",
            Self::FriendInvitationSaveFailed => "FRIEND_INVITATION_SAVE_FAILED",
            Self::VerificationEmailScheduled => "VERIFICATION_EMAIL_SCHEDULED",
            Self::EmailScheduled => "EMAIL_SCHEDULED",
            Self::EmailScheduleFailed => "EMAIL_SCHEDULE_FAILED",
            Self::EmailSent => "EMAIL_SENT",
            Self::EmailSendFailed => "EMAIL_SEND_FAILED",
            Self::InvitationEmailDeferred => "INVITATION_EMAIL_DEFERRED",
            Self::FriendshipRemoved => "FRIENDSHIP_REMOVED",
            Self::FriendshipNotFound => "FRIENDSHIP_NOT_FOUND",
            Self::FriendInvitationAccepted => "FRIEND_INVITATION_ACCEPTED",
            Self::FriendInvitationIgnored => "FRIEND_INVITATION_IGNORED",
            Self::FriendInvitationDeleted => "FRIEND_INVITATION_DELETED",
            Self::FriendInvitationNotFound => "FRIEND_INVITATION_NOT_FOUND",
            Self::FriendInvitationNotForThisVoter => "FRIEND_INVITATION_NOT_FOR_THIS_VOTER",
            Self::FriendInvitationResponseFailed => "FRIEND_INVITATION_RESPONSE_FAILED",
            Self::RecipientEmailMissing => "RECIPIENT_EMAIL_MISSING",
            Self::FriendListRetrieved => "FRIEND_LIST_RETRIEVED",
            Self::FriendListRetrieveFailed => "FRIEND_LIST_RETRIEVE_FAILED",
            Self::KindOfListNotImplementedYet => "KIND_OF_LIST_NOT_IMPLEMENTED_YET",
            Self::EmailAddressNotFound => "EMAIL_ADDRESS_NOT_FOUND",
            Self::EmailAddressHasNoOwner => "EMAIL_ADDRESS_HAS_NO_OWNER",
            Self::EmailAddressVerified => "EMAIL_ADDRESS_VERIFIED",
            Self::EmailAddressVerifyFailed => "EMAIL_ADDRESS_VERIFY_FAILED",
            Self::DeferredInvitationsReleased => "DEFERRED_INVITATIONS_RELEASED",
        }
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One entry in a [`Trail`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The ordered record of what an operation did.
///
/// Displays as the codes (and details) joined by spaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Trail(Vec<Step>);

impl Trail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, code: StatusCode) {
        self.0.push(Step { code, detail: None });
    }

    pub fn push_with(&mut self, code: StatusCode, detail: impl Into<String>) {
        self.0.push(Step {
            code,
            detail: Some(detail.into()),
        });
    }

    /// Record a failure and hand back its code, for use as `Err(trail.fail(..))`.
    pub fn fail(&mut self, code: StatusCode) -> StatusCode {
        self.push(code);
        code
    }

    /// As [`Self::fail`], with a detail.
    pub fn fail_with(&mut self, code: StatusCode, detail: impl Into<String>) -> StatusCode {
        self.push_with(code, detail);
        code
    }

    /// Append all steps of another trail.
    pub fn extend(&mut self, other: Trail) {
        self.0.extend(other.0);
    }

    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    pub fn contains(&self, code: StatusCode) -> bool {
        self.0.iter().any(|step| step.code == code)
    }

    pub fn last(&self) -> Option<StatusCode> {
        self.0.last().map(|step| step.code)
    }
}

impl Display for Trail {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for step in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match &step.detail {
                Some(detail) => write!(f, "{}:{detail}", step.code)?,
                None => write!(f, "{}", step.code)?,
            }
        }
        Ok(())
    }
}
