//! The friend invitation service: reconciling invitees against the email
//! directory, responding to invitations, and projecting friend lists.
//!
//! Entry points never fail outright. Each returns an API response carrying
//! `success` and the [`Trail`] of what happened.

use log::{debug, error};
use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
};

use crate::{
    config::Config,
    model::{
        common::{StatusCode, Trail},
        db::Voter,
    },
    store::Backend,
};

mod list;
mod reconcile;
mod respond;
mod send;
mod verify;

pub use reconcile::ResolvedRecipient;

/// Longest device token accepted.
pub const MAX_DEVICE_ID_LENGTH: usize = 255;

/// The friend service, borrowing its collaborators and config for one request.
pub struct FriendService<'a> {
    backend: &'a Backend,
    config: &'a Config,
}

impl<'a> FriendService<'a> {
    pub fn new(backend: &'a Backend, config: &'a Config) -> Self {
        Self { backend, config }
    }

    /// Identify the acting voter from their device token.
    async fn voter_from_device(
        &self,
        device_id: &str,
        trail: &mut Trail,
    ) -> Result<Voter, StatusCode> {
        let device_id = device_id.trim();
        if device_id.is_empty() || device_id.chars().count() > MAX_DEVICE_ID_LENGTH {
            return Err(trail.fail(StatusCode::ValidVoterDeviceIdMissing));
        }
        match self.backend.voters.resolve_by_device_token(device_id).await {
            Ok(Some(voter)) => {
                debug!("Device resolved to voter {}", voter.id);
                Ok(voter)
            }
            Ok(None) => Err(trail.fail(StatusCode::VoterNotFoundFromVoterDeviceId)),
            Err(e) => {
                error!("Failed to look up voter device: {e}");
                Err(trail.fail_with(StatusCode::VoterLookupFailed, e.to_string()))
            }
        }
    }
}

/// Build the service from managed state.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for FriendService<'r> {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let rocket = req.rocket();
        match (rocket.state::<Backend>(), rocket.state::<Config>()) {
            (Some(backend), Some(config)) => request::Outcome::Success(Self::new(backend, config)),
            _ => {
                error!("Friend service requested without a managed backend and config");
                request::Outcome::Failure((Status::InternalServerError, ()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::db::voter::examples::VERIFIED_DEVICE;
    use crate::store::memory::MemoryStore;

    use super::*;

    #[backend_test(voters)]
    async fn device_validation(store: MemoryStore) {
        let backend = store.backend();
        let config = Config::example();
        let service = FriendService::new(&backend, &config);

        let mut trail = Trail::new();
        let voter = service
            .voter_from_device(&format!("  {VERIFIED_DEVICE} "), &mut trail)
            .await
            .unwrap();
        assert_eq!(voter, store.voter_by_device(VERIFIED_DEVICE));
        assert!(trail.steps().is_empty());

        let too_long = "x".repeat(MAX_DEVICE_ID_LENGTH + 1);
        for bad in ["", "   ", too_long.as_str()] {
            let mut trail = Trail::new();
            let result = service.voter_from_device(bad, &mut trail).await;
            assert_eq!(result, Err(StatusCode::ValidVoterDeviceIdMissing));
            assert_eq!(trail.last(), Some(StatusCode::ValidVoterDeviceIdMissing));
        }

        let mut trail = Trail::new();
        let result = service.voter_from_device("unknown-device", &mut trail).await;
        assert_eq!(result, Err(StatusCode::VoterNotFoundFromVoterDeviceId));
    }
}
