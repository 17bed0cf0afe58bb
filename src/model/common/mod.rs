//! Types compatible with both API and DB.

pub mod email;
pub mod friend;
pub mod secret;
pub mod status;

pub use email::{split_raw_list, EmailAddress, RawEmailList};
pub use friend::{InviteResponseKind, KindOfList};
pub use secret::SecretKey;
pub use status::{StatusCode, Step, Trail};
