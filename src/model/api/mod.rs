//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - IDs are serialised as hex strings.
//! - Status trails are serialised as lists of `{code, detail}` steps.

pub mod friend;
pub mod id;

pub use friend::{
    AcceptInvitationResponse, EmailVerifyResponse, FriendEntry, FriendListResponse,
    InvitationEmailRequest, InvitationSendResponse, InviteResponseRequest, InviteResponseResult,
    RecipientOutcome,
};
pub use id::ApiId;
