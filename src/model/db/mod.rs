//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.
//! - Enums are serialised as their SCREAMING_SNAKE_CASE names.

pub mod email;
pub use email::{EmailRecord, EmailRecordCore, NewEmailRecord};

pub mod friend;
pub use friend::CurrentFriend;

pub mod invitation;
pub use invitation::{EmailTarget, Invitation, InvitationCore, InvitationStatus, Recipient};

pub mod scheduled_email;
pub use scheduled_email::{
    EmailTemplate, NewScheduledEmail, ScheduledEmail, ScheduledEmailCore, SendStatus,
};

pub mod voter;
pub use voter::{NewVoter, Voter, VoterCore, VoterDevice};
